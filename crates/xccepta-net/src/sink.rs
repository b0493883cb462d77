//! Settlement backend client.
//!
//! Accepted claims are forwarded, best-effort, to a backend that batches
//! them into on-ledger settlements. Nothing here affects a vend decision:
//! the caller logs failures and moves on.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use xccepta_core::{normalize_amount, ChannelId, ClaimPayload, Drops};

use crate::error::{NetError, Result};

/// Backend reply to `POST /claims/queue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct QueueAck {
    #[serde(default)]
    pub accepted: bool,
}

/// Backend reply to `POST /claims/settle`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct SettleReply {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub tx_hash: Option<String>,
}

/// Amount as the backend reports it: a JSON integer or a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReceiptAmount {
    Drops(u64),
    Text(String),
}

/// One on-ledger settlement, from `GET /receipts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub amount_drops: Option<ReceiptAmount>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default, rename = "settledAt")]
    pub settled_at: Option<String>,
}

impl SettlementReceipt {
    pub fn channel(&self) -> Option<ChannelId> {
        ChannelId::from_hex(self.channel_id.as_deref()?).ok()
    }

    /// Cumulative amount settled on the channel, if readable.
    pub fn amount(&self) -> Option<Drops> {
        match self.amount_drops.as_ref()? {
            ReceiptAmount::Drops(n) => Some(Drops(*n)),
            ReceiptAmount::Text(s) => normalize_amount(s).ok().map(|(drops, _)| drops),
        }
    }
}

/// Where accepted claims go for eventual settlement.
#[async_trait]
pub trait SettlementSink: Send + Sync {
    /// Forward the claim as presented, tagged with the kiosk's device id.
    async fn queue_claim(&self, claim: &ClaimPayload, device_id: &str) -> Result<QueueAck>;
}

#[derive(Serialize)]
struct QueueClaimRequest<'a> {
    #[serde(flatten)]
    claim: &'a ClaimPayload,
    device_id: &'a str,
}

#[derive(Serialize)]
struct RegisterDeviceRequest<'a> {
    device_id: &'a str,
    exposure_cap_drops: u64,
}

/// Normalize an operator-entered backend address.
///
/// Blank input means "no backend". `//host` gains `http:`, a bare host gains
/// `http://`, and trailing slashes are dropped.
pub fn normalize_api_base(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let with_scheme = if raw.starts_with("//") {
        format!("http:{}", raw)
    } else if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    Some(with_scheme.trim_end_matches('/').to_string())
}

/// HTTP client for the settlement backend.
#[derive(Debug, Clone)]
pub struct HttpSettlementSink {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSettlementSink {
    /// Create a client for `base_url` (normalized) with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url =
            normalize_api_base(base_url).ok_or_else(|| NetError::InvalidUrl(base_url.into()))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| NetError::Http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `POST /devices/register`
    pub async fn register_device(&self, device_id: &str, exposure_cap: Drops) -> Result<()> {
        let response = self
            .http
            .post(self.url("/devices/register"))
            .json(&RegisterDeviceRequest {
                device_id,
                exposure_cap_drops: exposure_cap.get(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NetError::Status(response.status().as_u16()));
        }
        tracing::info!(device_id, cap = %exposure_cap, "device registered with settlement backend");
        Ok(())
    }

    /// `POST /claims/settle`: ask the backend to settle queued claims now.
    ///
    /// A reply with `ok: false` is returned as-is; only transport and HTTP
    /// failures are errors.
    pub async fn settle_now(&self) -> Result<SettleReply> {
        let response = self
            .http
            .post(self.url("/claims/settle"))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NetError::Status(response.status().as_u16()));
        }
        let reply = response
            .json::<SettleReply>()
            .await
            .map_err(|e| NetError::InvalidResponse(format!("settle reply: {e}")))?;
        if reply.ok {
            tracing::info!(tx_hash = ?reply.tx_hash, "settlement submitted");
        } else {
            tracing::warn!("settlement backend declined to settle");
        }
        Ok(reply)
    }

    /// `GET /receipts`, oldest first.
    pub async fn receipts(&self) -> Result<Vec<SettlementReceipt>> {
        let response = self.http.get(self.url("/receipts")).send().await?;
        if !response.status().is_success() {
            return Err(NetError::Status(response.status().as_u16()));
        }
        let receipts = response
            .json::<Option<Vec<SettlementReceipt>>>()
            .await
            .map_err(|e| NetError::InvalidResponse(format!("receipts: {e}")))?;
        Ok(receipts.unwrap_or_default())
    }

    /// `GET /health`, returning the body text.
    pub async fn health(&self) -> Result<String> {
        let response = self.http.get(self.url("/health")).send().await?;
        if !response.status().is_success() {
            return Err(NetError::Status(response.status().as_u16()));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl SettlementSink for HttpSettlementSink {
    async fn queue_claim(&self, claim: &ClaimPayload, device_id: &str) -> Result<QueueAck> {
        let response = self
            .http
            .post(self.url("/claims/queue"))
            .json(&QueueClaimRequest { claim, device_id })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NetError::Status(response.status().as_u16()));
        }
        response
            .json::<QueueAck>()
            .await
            .map_err(|e| NetError::InvalidResponse(format!("queue reply: {e}")))
    }
}

/// In-memory sinks for tests.
pub mod memory {
    use super::*;
    use std::sync::Mutex;

    /// Records every queued claim.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        queued: Mutex<Vec<(ClaimPayload, String)>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queued(&self) -> Vec<(ClaimPayload, String)> {
            self.queued
                .lock()
                .map(|q| q.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl SettlementSink for RecordingSink {
        async fn queue_claim(&self, claim: &ClaimPayload, device_id: &str) -> Result<QueueAck> {
            self.queued
                .lock()
                .map_err(|e| NetError::Http(e.to_string()))?
                .push((claim.clone(), device_id.to_string()));
            Ok(QueueAck { accepted: true })
        }
    }

    /// Always fails, like a backend that is down.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct FailingSink;

    #[async_trait]
    impl SettlementSink for FailingSink {
        async fn queue_claim(&self, _claim: &ClaimPayload, _device_id: &str) -> Result<QueueAck> {
            Err(NetError::Http("backend unavailable".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server;
    use serde_json::Value;

    fn claim() -> ClaimPayload {
        ClaimPayload {
            channel_id: Some("AA".repeat(32)),
            amount_drops: Some("1000000".into()),
            signature: Some("CD".repeat(64)),
            pubkey: Some(format!("ED{}", "11".repeat(32))),
            key_type: Some("ed25519".into()),
            generated_at: None,
        }
    }

    #[test]
    fn test_normalize_api_base() {
        assert_eq!(normalize_api_base(""), None);
        assert_eq!(normalize_api_base("   "), None);
        assert_eq!(
            normalize_api_base("//10.0.0.5:3000/").as_deref(),
            Some("http://10.0.0.5:3000")
        );
        assert_eq!(
            normalize_api_base("kiosk.local:3000").as_deref(),
            Some("http://kiosk.local:3000")
        );
        assert_eq!(
            normalize_api_base("https://api.example.com//").as_deref(),
            Some("https://api.example.com")
        );
    }

    #[tokio::test]
    async fn test_queue_claim_posts_claim_with_device_id() {
        let server = test_server::respond_once(200, r#"{"accepted":true}"#.into()).await;
        let sink = HttpSettlementSink::new(&server.url(), Duration::from_secs(2)).unwrap();

        let ack = sink.queue_claim(&claim(), "dev-kiosk").await.unwrap();
        assert!(ack.accepted);

        let request = server.request().await;
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/claims/queue");
        let body: Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["device_id"], "dev-kiosk");
        assert_eq!(body["amount_drops"], "1000000");
        assert_eq!(body["key_type"], "ed25519");
        assert!(body.get("generated_at").is_none());
    }

    #[tokio::test]
    async fn test_queue_rejection_is_not_an_error() {
        let server = test_server::respond_once(200, r#"{"accepted":false}"#.into()).await;
        let sink = HttpSettlementSink::new(&server.url(), Duration::from_secs(2)).unwrap();
        assert!(!sink.queue_claim(&claim(), "dev-kiosk").await.unwrap().accepted);
    }

    #[tokio::test]
    async fn test_queue_unreachable_backend() {
        let sink = HttpSettlementSink::new(&test_server::closed_url().await, Duration::from_secs(1))
            .unwrap();
        assert!(sink.queue_claim(&claim(), "dev-kiosk").await.is_err());
    }

    #[tokio::test]
    async fn test_register_device() {
        let server = test_server::respond_once(200, "{}".into()).await;
        let sink = HttpSettlementSink::new(&server.url(), Duration::from_secs(2)).unwrap();
        sink.register_device("kiosk-7", Drops(3_000_000)).await.unwrap();

        let request = server.request().await;
        assert_eq!(request.path, "/devices/register");
        let body: Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["device_id"], "kiosk-7");
        assert_eq!(body["exposure_cap_drops"], 3_000_000);
    }

    #[tokio::test]
    async fn test_health_status_error() {
        let server = test_server::respond_once(500, "oops".into()).await;
        let sink = HttpSettlementSink::new(&server.url(), Duration::from_secs(2)).unwrap();
        assert!(matches!(sink.health().await, Err(NetError::Status(500))));
    }

    #[tokio::test]
    async fn test_settle_now() {
        let server =
            test_server::respond_once(200, r#"{"ok":true,"tx_hash":"ABC123"}"#.into()).await;
        let sink = HttpSettlementSink::new(&server.url(), Duration::from_secs(2)).unwrap();
        let reply = sink.settle_now().await.unwrap();
        assert!(reply.ok);
        assert_eq!(reply.tx_hash.as_deref(), Some("ABC123"));

        let request = server.request().await;
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/claims/settle");
        assert_eq!(request.body, "{}");
    }

    #[tokio::test]
    async fn test_settle_now_declined() {
        let server = test_server::respond_once(200, r#"{"ok":false}"#.into()).await;
        let sink = HttpSettlementSink::new(&server.url(), Duration::from_secs(2)).unwrap();
        let reply = sink.settle_now().await.unwrap();
        assert!(!reply.ok);
        assert_eq!(reply.tx_hash, None);
    }

    #[tokio::test]
    async fn test_receipts() {
        let body = format!(
            r#"[{{"channel_id":"{}","amount_drops":1500000,"tx_hash":"T1","settledAt":"2024-05-01T10:00:00Z"}},
                {{"channel_id":"{}","amount_drops":"002500000"}},
                {{"channel_id":"nope","amount_drops":"x"}}]"#,
            "AA".repeat(32),
            "bb".repeat(32)
        );
        let server = test_server::respond_once(200, body).await;
        let sink = HttpSettlementSink::new(&server.url(), Duration::from_secs(2)).unwrap();
        let receipts = sink.receipts().await.unwrap();
        assert_eq!(receipts.len(), 3);
        assert_eq!(receipts[0].channel(), Some(ChannelId::from_bytes([0xAA; 32])));
        assert_eq!(receipts[0].amount(), Some(Drops(1_500_000)));
        assert_eq!(receipts[0].settled_at.as_deref(), Some("2024-05-01T10:00:00Z"));
        assert_eq!(receipts[1].channel(), Some(ChannelId::from_bytes([0xBB; 32])));
        assert_eq!(receipts[1].amount(), Some(Drops(2_500_000)));
        assert_eq!(receipts[2].channel(), None);
        assert_eq!(receipts[2].amount(), None);

        assert_eq!(server.request().await.path, "/receipts");
    }

    #[tokio::test]
    async fn test_receipts_null_is_empty() {
        let server = test_server::respond_once(200, "null".into()).await;
        let sink = HttpSettlementSink::new(&server.url(), Duration::from_secs(2)).unwrap();
        assert!(sink.receipts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recording_sink() {
        let sink = memory::RecordingSink::new();
        sink.queue_claim(&claim(), "dev-kiosk").await.unwrap();
        let queued = sink.queued();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].1, "dev-kiosk");
    }

    #[test]
    fn test_blank_base_url_rejected() {
        assert!(matches!(
            HttpSettlementSink::new("", Duration::from_secs(1)),
            Err(NetError::InvalidUrl(_))
        ));
    }
}
