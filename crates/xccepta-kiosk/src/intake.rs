//! The claim intake pipeline.
//!
//! Turns one presented claim into exactly one [`Outcome`]. Each step is a
//! hard gate, and nothing is written before the exposure ledger accepts:
//!
//! 1. Structural validation
//! 2. Canonical message reconstruction
//! 3. Key material (presented, or resolved from the ledger)
//! 4. Signature verification
//! 5. Exposure evaluation, durably recorded on accept
//! 6. Vend hand-off (failure never undoes the acceptance)
//! 7. Settlement notification (fire-and-forget)

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;

use xccepta_core::{
    claim_signing_bytes, normalize_amount, ChannelId, Claim, ClaimDigest, ClaimPayload,
    CoreError, DeclineReason, Drops, ExposureDecision, Outcome, VendCommand, VerifierChain,
    VerifyErrorKind,
};
use xccepta_net::{ChannelKeyResolver, KeyLookup, SettlementSink};
use xccepta_store::{DispenseStatus, ExposureStore, JournalEntry};
use xccepta_vend::VendSession;

use crate::error::Result;
use crate::ledger::ExposureLedger;

/// Per-kiosk settings the pipeline needs.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub device_id: String,
    pub vend_slot: u32,
    pub pulse_ms: u32,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            device_id: "dev-kiosk".to_string(),
            vend_slot: 1,
            pulse_ms: 600,
        }
    }
}

/// What happened to the hardware hand-off for an approved claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum VendDelivery {
    /// The device acknowledged the command write.
    Dispatched,
    /// The hand-off failed. The acceptance stands.
    Failed(String),
    /// No vend session was configured.
    Skipped,
}

impl VendDelivery {
    fn journal_status(&self) -> (DispenseStatus, Option<&str>) {
        match self {
            VendDelivery::Dispatched => (DispenseStatus::Dispatched, None),
            VendDelivery::Failed(reason) => (DispenseStatus::Undispensed, Some(reason.as_str())),
            VendDelivery::Skipped => (DispenseStatus::Undispensed, Some("vend disabled")),
        }
    }
}

/// Result of the settlement notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkStatus {
    Queued,
    /// The backend answered but did not accept the claim.
    Rejected,
    Unavailable(String),
}

/// Everything the pipeline decided and did for one claim.
#[derive(Debug)]
pub struct ProcessReport {
    pub outcome: Outcome,
    /// Present only for approved claims.
    pub vend: Option<VendDelivery>,
    /// Journal key of an approved claim.
    pub digest: Option<ClaimDigest>,
    /// The settlement notification, still running. Dropping it does not
    /// cancel the notification.
    pub settlement: Option<JoinHandle<SinkStatus>>,
}

impl ProcessReport {
    fn decided(outcome: Outcome) -> Self {
        Self {
            outcome,
            vend: None,
            digest: None,
            settlement: None,
        }
    }

    /// Wait for the settlement notification, if one was started.
    pub async fn settlement_status(&mut self) -> Option<SinkStatus> {
        let handle = self.settlement.take()?;
        Some(
            handle
                .await
                .unwrap_or_else(|e| SinkStatus::Unavailable(e.to_string())),
        )
    }
}

impl fmt::Display for ProcessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.outcome)?;
        match &self.vend {
            Some(VendDelivery::Dispatched) => write!(f, " (vend dispatched)"),
            Some(VendDelivery::Failed(reason)) => write!(f, " (vend failed: {})", reason),
            Some(VendDelivery::Skipped) => write!(f, " (vend skipped)"),
            None => Ok(()),
        }
    }
}

/// The intake pipeline.
pub struct ClaimIntake<S: ExposureStore> {
    ledger: Arc<ExposureLedger<S>>,
    verifier: VerifierChain,
    resolver: Option<Arc<dyn ChannelKeyResolver>>,
    sink: Option<Arc<dyn SettlementSink>>,
    vend: Option<VendSession>,
    config: IntakeConfig,
}

impl<S: ExposureStore + 'static> ClaimIntake<S> {
    pub fn new(ledger: Arc<ExposureLedger<S>>, config: IntakeConfig) -> Self {
        Self {
            ledger,
            verifier: VerifierChain::default(),
            resolver: None,
            sink: None,
            vend: None,
            config,
        }
    }

    pub fn with_verifier(mut self, verifier: VerifierChain) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ChannelKeyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn SettlementSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_vend(mut self, session: VendSession) -> Self {
        self.vend = Some(session);
        self
    }

    pub fn ledger(&self) -> &ExposureLedger<S> {
        &self.ledger
    }

    /// Process claim JSON as received from a buyer device.
    ///
    /// Text that is not a JSON object is a structural failure.
    pub async fn process_json(&self, text: &str) -> Result<ProcessReport> {
        match ClaimPayload::from_json(text) {
            Ok(payload) => self.process(payload).await,
            Err(e) => {
                tracing::info!(error = %e, "claim rejected: unparseable");
                Ok(ProcessReport::decided(Outcome::Declined(
                    DeclineReason::MissingFields,
                )))
            }
        }
    }

    /// Run one claim through the pipeline.
    ///
    /// `Err` means local storage failed and no decision could be made.
    pub async fn process(&self, payload: ClaimPayload) -> Result<ProcessReport> {
        // 1. Structure
        let claim = match payload.into_claim() {
            Ok(claim) => claim,
            Err(e) => {
                tracing::info!(error = %e, "claim declined: structure");
                return Ok(ProcessReport::decided(Outcome::Declined(
                    DeclineReason::MissingFields,
                )));
            }
        };

        // 2. Canonical message
        let (channel, amount, message) = match reconstruct(&claim) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::info!(channel = claim.channel_id(), error = %e, "claim unverifiable: encoding");
                return Ok(ProcessReport::decided(Outcome::VerifyError(
                    VerifyErrorKind::BadEncoding,
                )));
            }
        };

        // 3. Key material
        let claim = match claim.pubkey() {
            Some(_) => claim,
            None => match self.resolve_key(&channel).await {
                Some(key) => claim.with_pubkey(key),
                None => return Ok(self.decline(&channel, amount, DeclineReason::NoPubkey)),
            },
        };
        let pubkey = claim.pubkey().unwrap_or_default();

        // 4. Signature
        if !self
            .verifier
            .verify_hex(&message, claim.signature(), pubkey)
            .is_valid()
        {
            return Ok(self.decline(&channel, amount, DeclineReason::SignatureInvalid));
        }

        // 5. Exposure, durably recorded on accept
        let signature = hex::decode(claim.signature().trim()).unwrap_or_default();
        let digest = ClaimDigest::compute(&message, &signature);
        let payload = claim.to_payload();
        let journal = JournalEntry::pending(
            digest,
            channel,
            amount,
            self.config.device_id.clone(),
            payload.clone(),
            xccepta_store::now_millis(),
        );
        if let ExposureDecision::Decline(reason) =
            self.ledger.try_accept(&channel, amount, &journal).await?
        {
            return Ok(self.decline(&channel, amount, reason.into()));
        }
        tracing::info!(channel = %channel, amount = %amount, digest = %digest, "claim approved");

        // 6. Vend hand-off
        let vend = self.dispatch(channel, amount).await;
        let (status, detail) = vend.journal_status();
        if let Err(e) = self.ledger.mark_dispense(&digest, status, detail).await {
            tracing::error!(digest = %digest, error = %e, "failed to record dispense status");
        }

        // 7. Settlement notification
        let settlement = self.notify_sink(payload);

        Ok(ProcessReport {
            outcome: Outcome::Approved,
            vend: Some(vend),
            digest: Some(digest),
            settlement,
        })
    }

    fn decline(&self, channel: &ChannelId, amount: Drops, reason: DeclineReason) -> ProcessReport {
        tracing::info!(channel = %channel, amount = %amount, reason = reason.as_str(), "claim declined");
        ProcessReport::decided(Outcome::Declined(reason))
    }

    async fn resolve_key(&self, channel: &ChannelId) -> Option<String> {
        let resolver = self.resolver.as_ref()?;
        match resolver.resolve(channel).await {
            KeyLookup::Found(key) => Some(key),
            KeyLookup::NotFound => {
                tracing::debug!(channel = %channel, "no key registered for channel");
                None
            }
            KeyLookup::Unavailable(reason) => {
                tracing::warn!(channel = %channel, reason = %reason, "key resolver unavailable");
                None
            }
        }
    }

    async fn dispatch(&self, channel: ChannelId, amount: Drops) -> VendDelivery {
        let Some(session) = &self.vend else {
            return VendDelivery::Skipped;
        };
        let command = VendCommand {
            slot: self.config.vend_slot,
            pulse_ms: self.config.pulse_ms,
            claim_channel: channel,
            claim_amount_drops: amount,
            device_id: self.config.device_id.clone(),
        };
        match session.send(command).await {
            Ok(()) => VendDelivery::Dispatched,
            Err(e) => {
                tracing::warn!(channel = %channel, amount = %amount, error = %e, "vend hand-off failed; acceptance stands");
                VendDelivery::Failed(e.to_string())
            }
        }
    }

    fn notify_sink(&self, payload: ClaimPayload) -> Option<JoinHandle<SinkStatus>> {
        let sink = self.sink.clone()?;
        let device_id = self.config.device_id.clone();
        Some(tokio::spawn(async move {
            match sink.queue_claim(&payload, &device_id).await {
                Ok(ack) if ack.accepted => {
                    tracing::debug!("claim queued for settlement");
                    SinkStatus::Queued
                }
                Ok(_) => {
                    tracing::warn!("settlement backend did not accept claim");
                    SinkStatus::Rejected
                }
                Err(e) => {
                    tracing::warn!(error = %e, "settlement backend unavailable");
                    SinkStatus::Unavailable(e.to_string())
                }
            }
        }))
    }
}

/// Parse the channel, normalize the amount and rebuild the signed message.
fn reconstruct(claim: &Claim) -> std::result::Result<(ChannelId, Drops, Vec<u8>), CoreError> {
    let channel = ChannelId::from_hex(claim.channel_id())?;
    let (amount, _) = normalize_amount(claim.amount_drops())?;
    Ok((channel, amount, claim_signing_bytes(&channel, amount).to_vec()))
}
