//! The Kiosk: a configured intake pipeline over durable local state.

use std::sync::Arc;

use tokio::sync::mpsc;

use xccepta_core::ClaimPayload;
use xccepta_net::{HttpSettlementSink, RippledKeyResolver};
use xccepta_store::SqliteStore;
use xccepta_vend::{BleLink, ConnectedDevice, VendEvent, VendSession};

use crate::config::KioskConfig;
use crate::error::{KioskError, Result};
use crate::intake::{ClaimIntake, IntakeConfig, ProcessReport};
use crate::ledger::ExposureLedger;

/// Which outer services to wire in.
#[derive(Debug, Clone, Copy, Default)]
pub struct KioskOptions {
    /// Do not resolve keys on the ledger; claims must carry `pubkey`.
    pub offline: bool,
    /// Do not forward accepted claims to the settlement backend.
    pub no_settlement: bool,
}

/// A kiosk instance.
pub struct Kiosk {
    config: KioskConfig,
    intake: ClaimIntake<SqliteStore>,
    settlement: Option<Arc<HttpSettlementSink>>,
    vend: Option<VendSession>,
}

impl Kiosk {
    /// Open local state and build the pipeline without a vend link.
    pub fn open(config: KioskConfig, options: KioskOptions) -> Result<Self> {
        config.validate()?;
        let store = SqliteStore::open(&config.state_path)?;
        let ledger = Arc::new(ExposureLedger::new(store, config.exposure_cap()));

        let mut intake = ClaimIntake::new(ledger, intake_config(&config));

        if !options.offline {
            let resolver = RippledKeyResolver::new(&config.ledger.rpc_url, config.ledger_timeout())?;
            intake = intake.with_resolver(Arc::new(resolver));
        }

        let settlement = match config.settlement_url() {
            Some(url) if !options.no_settlement => Some(Arc::new(HttpSettlementSink::new(
                &url,
                config.settlement_timeout(),
            )?)),
            _ => None,
        };
        if let Some(sink) = &settlement {
            intake = intake.with_sink(sink.clone());
        }

        tracing::info!(
            device_id = %config.device_id,
            cap = %config.exposure_cap(),
            state = %config.state_path.display(),
            resolver = !options.offline,
            settlement = settlement.is_some(),
            "kiosk opened"
        );

        Ok(Self {
            config,
            intake,
            settlement,
            vend: None,
        })
    }

    /// Open, then start a vend session over `link`.
    ///
    /// Returns the receiver for device telemetry and link-loss events.
    pub fn open_with_link<L: BleLink>(
        config: KioskConfig,
        options: KioskOptions,
        link: L,
    ) -> Result<(Self, mpsc::Receiver<VendEvent>)> {
        let mut kiosk = Self::open(config, options)?;
        let (session, events) = VendSession::spawn(link, kiosk.config.vend.session_config())?;
        kiosk.intake = kiosk.intake.with_vend(session.clone());
        kiosk.vend = Some(session);
        Ok((kiosk, events))
    }

    pub fn config(&self) -> &KioskConfig {
        &self.config
    }

    pub fn intake(&self) -> &ClaimIntake<SqliteStore> {
        &self.intake
    }

    pub fn ledger(&self) -> &ExposureLedger<SqliteStore> {
        self.intake.ledger()
    }

    pub fn vend(&self) -> Option<&VendSession> {
        self.vend.as_ref()
    }

    /// The settlement backend client, when enabled.
    pub fn settlement(&self) -> Option<&HttpSettlementSink> {
        self.settlement.as_deref()
    }

    /// Scan for and connect to the vending device.
    pub async fn connect_vend(&self) -> Result<ConnectedDevice> {
        let session = self
            .vend
            .as_ref()
            .ok_or_else(|| KioskError::Config("no vend link configured".into()))?;
        Ok(session.connect().await?)
    }

    pub async fn process(&self, payload: ClaimPayload) -> Result<ProcessReport> {
        self.intake.process(payload).await
    }

    pub async fn process_json(&self, text: &str) -> Result<ProcessReport> {
        self.intake.process_json(text).await
    }

    /// Disconnect from the vending device, if connected.
    pub async fn shutdown(&self) {
        if let Some(session) = &self.vend {
            if let Err(e) = session.disconnect().await {
                tracing::debug!(error = %e, "vend disconnect on shutdown");
            }
        }
    }
}

fn intake_config(config: &KioskConfig) -> IntakeConfig {
    IntakeConfig {
        device_id: config.device_id.clone(),
        vend_slot: config.vend.slot,
        pulse_ms: config.vend.pulse_ms,
    }
}
