//! Exposure policy: per-channel monotonicity and uncollected-liability cap.
//!
//! The kiosk remembers two numbers per channel:
//!
//! - `last_seen_amount`: the highest cumulative amount it has accepted.
//! - `settled_amount`: the highest cumulative amount known to be redeemed.
//!
//! A claim is honored only if it strictly advances `last_seen_amount` and the
//! unsettled remainder `amount - settled_amount` stays within the cap.
//!
//! ## Invariants
//!
//! - `settled_amount <= last_seen_amount`
//! - `last_seen_amount` never decreases
//! - `settled_amount` never decreases

use serde::{Deserialize, Serialize};

use crate::amount::Drops;
use crate::error::CoreError;
use crate::types::ChannelId;

/// Why an authentic claim was refused by policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecline {
    /// Amount does not exceed the last accepted amount (replay or stale).
    StaleOrLowerAmount,
    /// Accepting would leave more than the cap unsettled.
    ExposureCapExceeded,
}

impl PolicyDecline {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyDecline::StaleOrLowerAmount => "stale_or_lower_amount",
            PolicyDecline::ExposureCapExceeded => "exposure_cap_exceeded",
        }
    }
}

/// Result of evaluating a claim amount against channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureDecision {
    Accept,
    Decline(PolicyDecline),
}

impl ExposureDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, ExposureDecision::Accept)
    }
}

/// Persisted exposure state for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelExposureState {
    pub channel_id: ChannelId,
    pub last_seen_amount: Drops,
    pub settled_amount: Drops,
    /// Local time of the last change (Unix ms).
    pub updated_at: i64,
}

impl ChannelExposureState {
    /// State for a channel the kiosk has never accepted a claim on.
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            last_seen_amount: Drops::ZERO,
            settled_amount: Drops::ZERO,
            updated_at: 0,
        }
    }

    /// Decide whether `amount` may be accepted under `cap`.
    ///
    /// Checks run in order: staleness first, then the exposure cap.
    pub fn evaluate(&self, amount: Drops, cap: Drops) -> ExposureDecision {
        if amount <= self.last_seen_amount {
            return ExposureDecision::Decline(PolicyDecline::StaleOrLowerAmount);
        }
        if amount.saturating_sub(self.settled_amount) > cap {
            return ExposureDecision::Decline(PolicyDecline::ExposureCapExceeded);
        }
        ExposureDecision::Accept
    }

    /// Advance `last_seen_amount` to an accepted amount.
    pub fn record_accept(&mut self, amount: Drops, now: i64) -> Result<(), CoreError> {
        if amount <= self.last_seen_amount {
            return Err(CoreError::NonMonotonic {
                current: self.last_seen_amount.get(),
                amount: amount.get(),
            });
        }
        self.last_seen_amount = amount;
        self.updated_at = now;
        Ok(())
    }

    /// Advance `settled_amount` after an external settlement confirmation.
    ///
    /// A confirmation at or below the current settled amount is a no-op and
    /// returns `Ok(false)`. A confirmation above `last_seen_amount` is
    /// rejected; the kiosk never treats more as settled than it accepted.
    pub fn record_settlement(&mut self, amount: Drops, now: i64) -> Result<bool, CoreError> {
        if amount > self.last_seen_amount {
            return Err(CoreError::SettlementAhead {
                settled: amount.get(),
                last_seen: self.last_seen_amount.get(),
            });
        }
        if amount <= self.settled_amount {
            return Ok(false);
        }
        self.settled_amount = amount;
        self.updated_at = now;
        Ok(true)
    }

    /// Accepted but not yet settled.
    pub fn outstanding(&self) -> Drops {
        self.last_seen_amount.saturating_sub(self.settled_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CAP: Drops = Drops(3_000_000);

    fn state(last_seen: u64, settled: u64) -> ChannelExposureState {
        ChannelExposureState {
            channel_id: ChannelId::from_bytes([0xAA; 32]),
            last_seen_amount: Drops(last_seen),
            settled_amount: Drops(settled),
            updated_at: 0,
        }
    }

    #[test]
    fn test_first_claim_accepted() {
        assert_eq!(state(0, 0).evaluate(Drops(1_000_000), CAP), ExposureDecision::Accept);
    }

    #[test]
    fn test_lower_and_equal_amounts_are_stale() {
        let s = state(1_000_000, 0);
        assert_eq!(
            s.evaluate(Drops(500_000), CAP),
            ExposureDecision::Decline(PolicyDecline::StaleOrLowerAmount)
        );
        assert_eq!(
            s.evaluate(Drops(1_000_000), CAP),
            ExposureDecision::Decline(PolicyDecline::StaleOrLowerAmount)
        );
    }

    #[test]
    fn test_cap_exceeded() {
        assert_eq!(
            state(1_000_000, 0).evaluate(Drops(4_500_000), CAP),
            ExposureDecision::Decline(PolicyDecline::ExposureCapExceeded)
        );
    }

    #[test]
    fn test_cap_boundary() {
        let s = state(0, 500);
        assert!(s.evaluate(Drops(3_000_500), CAP).is_accept());
        assert_eq!(
            s.evaluate(Drops(3_000_501), CAP),
            ExposureDecision::Decline(PolicyDecline::ExposureCapExceeded)
        );
    }

    #[test]
    fn test_stale_checked_before_cap() {
        let s = state(10_000_000, 0);
        assert_eq!(
            s.evaluate(Drops(9_000_000), CAP),
            ExposureDecision::Decline(PolicyDecline::StaleOrLowerAmount)
        );
    }

    #[test]
    fn test_record_accept_is_monotonic() {
        let mut s = state(0, 0);
        s.record_accept(Drops(10), 1).unwrap();
        assert_eq!(s.last_seen_amount, Drops(10));
        assert!(matches!(
            s.record_accept(Drops(10), 2),
            Err(CoreError::NonMonotonic { current: 10, amount: 10 })
        ));
        assert_eq!(s.updated_at, 1);
    }

    #[test]
    fn test_settlement_bounded_by_last_seen() {
        let mut s = state(2_000_000, 0);
        assert!(s.record_settlement(Drops(1_500_000), 5).unwrap());
        assert_eq!(s.outstanding(), Drops(500_000));
        assert!(!s.record_settlement(Drops(1_000_000), 6).unwrap());
        assert_eq!(s.settled_amount, Drops(1_500_000));
        assert!(s.record_settlement(Drops(2_000_001), 7).is_err());
    }

    #[test]
    fn test_settlement_reopens_headroom() {
        let mut s = state(3_000_000, 0);
        assert!(!s.evaluate(Drops(4_500_000), CAP).is_accept());
        s.record_settlement(Drops(3_000_000), 1).unwrap();
        assert!(s.evaluate(Drops(4_500_000), CAP).is_accept());
    }

    proptest! {
        #[test]
        fn test_exposure_bound(
            settled in 0u64..1_000_000_000,
            extra in 0u64..1_000_000_000,
            cap in 1u64..1_000_000_000,
            amount in 1u64..3_000_000_000,
        ) {
            let last_seen = settled + extra;
            let s = state(last_seen, settled);
            let accepted = s.evaluate(Drops(amount), Drops(cap)).is_accept();
            let expected = amount > last_seen && amount - settled <= cap;
            prop_assert_eq!(accepted, expected);

            let just_over = s.evaluate(Drops(settled + cap + 1), Drops(cap));
            prop_assert!(!just_over.is_accept());
        }

        #[test]
        fn test_monotonicity_after_accept(accepted in 1u64..u64::MAX, later in 0u64..u64::MAX) {
            let mut s = state(0, 0);
            s.record_accept(Drops(accepted), 0).unwrap();
            if later <= accepted {
                prop_assert_eq!(
                    s.evaluate(Drops(later), Drops(u64::MAX)),
                    ExposureDecision::Decline(PolicyDecline::StaleOrLowerAmount)
                );
            }
        }
    }
}
