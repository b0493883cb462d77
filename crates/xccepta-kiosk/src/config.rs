//! Kiosk configuration with TOML file support.
//!
//! Every field has a default, so an empty file (or no file) is a working
//! configuration. A handful of environment variables override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use xccepta_core::Drops;
use xccepta_net::normalize_api_base;
use xccepta_vend::{VendSessionConfig, DEFAULT_COMMAND_UUID, DEFAULT_NAME_HINT, DEFAULT_NOTIFY_UUID};

use crate::error::{KioskError, Result};
use crate::logging::LogFormat;

/// Configuration for a kiosk.
///
/// Can be loaded from a TOML file via [`KioskConfig::load`] or built
/// programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KioskConfig {
    /// Identifies this kiosk to the hardware and the settlement backend.
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Maximum unsettled amount accepted per channel.
    #[serde(default = "default_exposure_cap")]
    pub exposure_cap_drops: u64,

    /// SQLite file holding exposure state and the dispense journal.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub settlement: SettlementConfig,

    #[serde(default)]
    pub vend: VendConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Ledger node used to resolve channel keys.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    #[serde(default = "default_ledger_timeout_ms")]
    pub timeout_ms: u64,
}

/// Settlement backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Blank disables the backend.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_settlement_timeout_ms")]
    pub timeout_ms: u64,
}

/// Vending hardware link.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VendConfig {
    #[serde(default = "default_name_hint")]
    pub name_hint: String,

    #[serde(default = "default_notify_uuid")]
    pub notify_uuid: Uuid,

    #[serde(default = "default_command_uuid")]
    pub command_uuid: Uuid,

    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_slot")]
    pub slot: u32,

    #[serde(default = "default_pulse_ms")]
    pub pulse_ms: u32,

    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,

    /// Filter directive, e.g. `"info"` or `"debug,xccepta_vend=trace"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_device_id() -> String {
    "dev-kiosk".to_string()
}

fn default_exposure_cap() -> u64 {
    3_000_000
}

fn default_state_path() -> PathBuf {
    PathBuf::from("kiosk.db")
}

fn default_rpc_url() -> String {
    "https://s.altnet.rippletest.net:51234".to_string()
}

fn default_ledger_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_settlement_timeout_ms() -> u64 {
    6_000
}

fn default_name_hint() -> String {
    DEFAULT_NAME_HINT.to_string()
}

fn default_notify_uuid() -> Uuid {
    DEFAULT_NOTIFY_UUID
}

fn default_command_uuid() -> Uuid {
    DEFAULT_COMMAND_UUID
}

fn default_scan_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    15_000
}

fn default_slot() -> u32 {
    1
}

fn default_pulse_ms() -> u32 {
    600
}

fn default_notification_buffer() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            timeout_ms: default_ledger_timeout_ms(),
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base_url: default_api_base_url(),
            timeout_ms: default_settlement_timeout_ms(),
        }
    }
}

impl Default for VendConfig {
    fn default() -> Self {
        Self {
            name_hint: default_name_hint(),
            notify_uuid: DEFAULT_NOTIFY_UUID,
            command_uuid: DEFAULT_COMMAND_UUID,
            scan_timeout_ms: default_scan_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            slot: default_slot(),
            pulse_ms: default_pulse_ms(),
            notification_buffer: default_notification_buffer(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            exposure_cap_drops: default_exposure_cap(),
            state_path: default_state_path(),
            ledger: LedgerConfig::default(),
            settlement: SettlementConfig::default(),
            vend: VendConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl KioskConfig {
    /// Load from an optional TOML file, apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            KioskError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| KioskError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| KioskError::Config(e.to_string()))
    }

    /// Apply `DEVICE_ID`, `EXPOSURE_CAP_DROPS`, `KIOSK_STATE_PATH`,
    /// `XRP_RPC_HTTP`, `USE_API` and `API_BASE_URL` from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(device_id) = lookup("DEVICE_ID") {
            self.device_id = device_id;
        }
        if let Some(cap) = lookup("EXPOSURE_CAP_DROPS") {
            self.exposure_cap_drops = cap
                .trim()
                .parse()
                .map_err(|_| KioskError::Config(format!("EXPOSURE_CAP_DROPS: {:?}", cap)))?;
        }
        if let Some(path) = lookup("KIOSK_STATE_PATH") {
            self.state_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("XRP_RPC_HTTP") {
            self.ledger.rpc_url = url;
        }
        if let Some(flag) = lookup("USE_API") {
            self.settlement.enabled = parse_flag(&flag)
                .ok_or_else(|| KioskError::Config(format!("USE_API: {:?}", flag)))?;
        }
        if let Some(url) = lookup("API_BASE_URL") {
            self.settlement.api_base_url = url;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.exposure_cap_drops == 0 {
            return Err(KioskError::Config("exposure_cap_drops must be positive".into()));
        }
        if self.device_id.trim().is_empty() {
            return Err(KioskError::Config("device_id must not be empty".into()));
        }
        if self.vend.scan_timeout_ms == 0 || self.vend.connect_timeout_ms == 0 {
            return Err(KioskError::Config("vend timeouts must be positive".into()));
        }
        Ok(())
    }

    pub fn exposure_cap(&self) -> Drops {
        Drops(self.exposure_cap_drops)
    }

    /// The settlement backend URL, if the backend is enabled and configured.
    pub fn settlement_url(&self) -> Option<String> {
        if !self.settlement.enabled {
            return None;
        }
        normalize_api_base(&self.settlement.api_base_url)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger.timeout_ms)
    }

    pub fn settlement_timeout(&self) -> Duration {
        Duration::from_millis(self.settlement.timeout_ms)
    }
}

impl VendConfig {
    pub fn session_config(&self) -> VendSessionConfig {
        VendSessionConfig {
            name_hint: self.name_hint.clone(),
            notify_uuid: self.notify_uuid,
            command_uuid: self.command_uuid,
            scan_timeout: Duration::from_millis(self.scan_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            notification_buffer: self.notification_buffer,
            ..VendSessionConfig::default()
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = KioskConfig::default();
        let text = config.to_toml_string().unwrap();
        let parsed = KioskConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.device_id, "dev-kiosk");
        assert_eq!(parsed.exposure_cap_drops, 3_000_000);
        assert_eq!(parsed.vend.command_uuid, DEFAULT_COMMAND_UUID);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = KioskConfig::from_toml_str("").unwrap();
        assert_eq!(config.vend.slot, 1);
        assert_eq!(config.vend.pulse_ms, 600);
        assert_eq!(config.vend.scan_timeout_ms, 10_000);
        assert_eq!(config.log.format, LogFormat::Human);
        assert_eq!(
            config.vend.notify_uuid.to_string(),
            "12345678-1234-5678-1234-56789abcdef0"
        );
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = KioskConfig::from_toml_str(
            r#"
            device_id = "kiosk-7"
            exposure_cap_drops = 5000000

            [settlement]
            enabled = false

            [vend]
            slot = 3

            [log]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.device_id, "kiosk-7");
        assert_eq!(config.exposure_cap(), Drops(5_000_000));
        assert_eq!(config.vend.slot, 3);
        assert_eq!(config.vend.pulse_ms, 600);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.settlement_url(), None);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = KioskConfig::default();
        config
            .apply_env(env(&[
                ("DEVICE_ID", "kiosk-9"),
                ("EXPOSURE_CAP_DROPS", " 1000 "),
                ("KIOSK_STATE_PATH", "/var/lib/kiosk/state.db"),
                ("XRP_RPC_HTTP", "http://node:5005"),
                ("API_BASE_URL", "backend.local:3000/"),
                ("USE_API", "yes"),
            ]))
            .unwrap();
        assert_eq!(config.device_id, "kiosk-9");
        assert_eq!(config.exposure_cap_drops, 1000);
        assert_eq!(config.state_path, PathBuf::from("/var/lib/kiosk/state.db"));
        assert_eq!(config.ledger.rpc_url, "http://node:5005");
        assert_eq!(
            config.settlement_url().as_deref(),
            Some("http://backend.local:3000")
        );
    }

    #[test]
    fn test_bad_env_values_rejected() {
        let mut config = KioskConfig::default();
        assert!(config.apply_env(env(&[("EXPOSURE_CAP_DROPS", "lots")])).is_err());
        assert!(config.apply_env(env(&[("USE_API", "maybe")])).is_err());
    }

    #[test]
    fn test_vend_characteristics_reach_session() {
        let config = KioskConfig::from_toml_str(
            r#"
            [vend]
            service_uuid = "12345678-1234-5678-1234-56789abcdef0"
            notify_uuid = "0000ffe1-0000-1000-8000-00805f9b34fb"
            "#,
        )
        .unwrap();
        let session = config.vend.session_config();
        assert_eq!(
            session.notify_uuid.to_string(),
            "0000ffe1-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(session.command_uuid, DEFAULT_COMMAND_UUID);
        assert_eq!(session.name_hint, DEFAULT_NAME_HINT);
    }

    #[test]
    fn test_zero_cap_invalid() {
        let config = KioskConfig {
            exposure_cap_drops: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(KioskError::Config(_))));
    }

    #[test]
    fn test_blank_api_base_disables_sink() {
        let mut config = KioskConfig::default();
        config.settlement.api_base_url = "  ".into();
        assert_eq!(config.settlement_url(), None);
    }

    #[test]
    fn test_missing_file_returns_config_error() {
        let result = KioskConfig::from_toml_file(Path::new("/nonexistent/kiosk.toml"));
        assert!(matches!(result, Err(KioskError::Config(_))));
    }

    #[test]
    fn test_session_config_mapping() {
        let vend = VendConfig {
            scan_timeout_ms: 2_500,
            ..Default::default()
        };
        let session = vend.session_config();
        assert_eq!(session.scan_timeout, Duration::from_millis(2_500));
        assert_eq!(session.connect_timeout, Duration::from_secs(15));
        assert_eq!(session.name_hint, "ESP32_BLE_SERVER");
    }
}
