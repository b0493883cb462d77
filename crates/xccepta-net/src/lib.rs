//! # XcceptaPay Net
//!
//! The kiosk's two optional network dependencies, each behind a trait so the
//! intake pipeline can run with in-memory stand-ins:
//!
//! - [`ChannelKeyResolver`] - look up a channel's public key on the ledger
//!   ([`RippledKeyResolver`] queries validated state over JSON-RPC)
//! - [`SettlementSink`] - forward accepted claims for settlement
//!   ([`HttpSettlementSink`] talks to the backend's REST API)
//!
//! Both clients use bounded timeouts. Neither is required for the kiosk to
//! reach a decision.

pub mod error;
pub mod resolver;
pub mod sink;

#[cfg(test)]
mod test_server;

pub use error::{NetError, Result};
pub use resolver::{ChannelKeyResolver, KeyLookup, RippledKeyResolver};
pub use sink::{
    normalize_api_base, HttpSettlementSink, QueueAck, ReceiptAmount, SettleReply,
    SettlementReceipt, SettlementSink,
};
