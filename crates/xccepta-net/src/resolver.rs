//! Channel public-key resolution.
//!
//! When a buyer omits `pubkey`, the kiosk looks the channel up on the ledger
//! and uses the key the channel was opened with. Only validated ledger state
//! is consulted. Every failure collapses to "no key" for the caller; the
//! distinction between absent and unreachable is kept for logging.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use xccepta_core::ChannelId;

use crate::error::{NetError, Result};

/// Outcome of a key lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLookup {
    /// Uppercase hex public key registered on the channel.
    Found(String),
    /// The channel does not exist or carries no key.
    NotFound,
    /// The lookup could not complete (network, timeout, malformed reply).
    Unavailable(String),
}

impl KeyLookup {
    /// Collapse to the key, if any.
    pub fn into_key(self) -> Option<String> {
        match self {
            KeyLookup::Found(key) => Some(key),
            KeyLookup::NotFound | KeyLookup::Unavailable(_) => None,
        }
    }
}

/// Resolves the public key bound to a payment channel.
///
/// Implementations must return within a bounded time and never substitute a
/// default key.
#[async_trait]
pub trait ChannelKeyResolver: Send + Sync {
    async fn resolve(&self, channel: &ChannelId) -> KeyLookup;
}

// ─────────────────────────────────────────────────────────────────────────────
// rippled JSON-RPC
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct RpcRequest<'a> {
    method: &'static str,
    params: [LedgerEntryParams<'a>; 1],
}

#[derive(Serialize)]
struct LedgerEntryParams<'a> {
    index: &'a str,
    ledger_index: &'static str,
}

/// Resolver backed by a rippled node's `ledger_entry` method.
#[derive(Debug, Clone)]
pub struct RippledKeyResolver {
    http: reqwest::Client,
    rpc_url: String,
}

impl RippledKeyResolver {
    /// Create a resolver targeting `rpc_url` with an overall request timeout.
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let rpc_url = rpc_url.into();
        if rpc_url.trim().is_empty() {
            return Err(NetError::InvalidUrl(rpc_url));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| NetError::Http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { http, rpc_url })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Query the validated ledger for the channel's key.
    pub async fn lookup(&self, channel: &ChannelId) -> Result<KeyLookup> {
        let index = channel.to_hex();
        let request = RpcRequest {
            method: "ledger_entry",
            params: [LedgerEntryParams {
                index: &index,
                ledger_index: "validated",
            }],
        };

        let response = self.http.post(&self.rpc_url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(NetError::Status(response.status().as_u16()));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| NetError::InvalidResponse(format!("invalid JSON response: {e}")))?;

        extract_public_key(&body)
    }
}

#[async_trait]
impl ChannelKeyResolver for RippledKeyResolver {
    async fn resolve(&self, channel: &ChannelId) -> KeyLookup {
        match self.lookup(channel).await {
            Ok(lookup) => {
                tracing::debug!(channel = %channel, found = matches!(lookup, KeyLookup::Found(_)), "channel key lookup");
                lookup
            }
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "channel key lookup unavailable");
                KeyLookup::Unavailable(e.to_string())
            }
        }
    }
}

/// Pull `result.node.PublicKey` out of a `ledger_entry` reply.
///
/// `entryNotFound` is an answer, not a failure. Any other `error` is.
fn extract_public_key(body: &Value) -> Result<KeyLookup> {
    let result = body
        .get("result")
        .ok_or_else(|| NetError::InvalidResponse("missing result".into()))?;

    if let Some(error) = result.get("error").and_then(Value::as_str) {
        return match error {
            "entryNotFound" | "objectNotFound" => Ok(KeyLookup::NotFound),
            other => Err(NetError::Rpc(other.to_string())),
        };
    }

    Ok(result
        .get("node")
        .and_then(|node| node.get("PublicKey"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(|key| KeyLookup::Found(key.to_ascii_uppercase()))
        .unwrap_or(KeyLookup::NotFound))
}

/// In-memory resolvers for tests and offline operation.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers from a fixed table.
    #[derive(Debug, Default)]
    pub struct StaticKeyResolver {
        keys: HashMap<ChannelId, String>,
        calls: AtomicUsize,
    }

    impl StaticKeyResolver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_key(mut self, channel: ChannelId, pubkey: impl Into<String>) -> Self {
            self.keys.insert(channel, pubkey.into().to_ascii_uppercase());
            self
        }

        /// How many times `resolve` has been called.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChannelKeyResolver for StaticKeyResolver {
        async fn resolve(&self, channel: &ChannelId) -> KeyLookup {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.keys.get(channel) {
                Some(key) => KeyLookup::Found(key.clone()),
                None => KeyLookup::NotFound,
            }
        }
    }

    /// Always unreachable: the kiosk with no network.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct OfflineResolver;

    #[async_trait]
    impl ChannelKeyResolver for OfflineResolver {
        async fn resolve(&self, _channel: &ChannelId) -> KeyLookup {
            KeyLookup::Unavailable("offline".into())
        }
    }
}
