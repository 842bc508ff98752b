//! Derived virtual balances: "subscription is currently active" as a pure
//! function of checkpoint state and the caller's clock.
//!
//! Nothing here is stored. A subscriber's balance is the configured payment
//! amount while the paid-for window is running and zero from the instant
//! `last_settled_at + period_seconds` is reached; the aggregate rises on
//! settlement and decays with no transition event. Because every query
//! recomputes from the checkpoint table, the answer can never drift from
//! the state the settlement engine wrote.

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::mandate::{Address, MandateDigest};
use chrono::{DateTime, Utc};

/// Read-only balance view over a shared [`CheckpointStore`].
#[derive(Clone)]
pub struct VirtualBalanceLedger {
    store: CheckpointStore,
    grace_period_seconds: i64,
}

impl VirtualBalanceLedger {
    /// Build a view over `store`. A negative grace period is treated as
    /// zero.
    pub fn new(store: CheckpointStore, grace_period_seconds: i64) -> Self {
        Self {
            store,
            grace_period_seconds: grace_period_seconds.max(0),
        }
    }

    /// Sum of payment amounts over the subscriber's currently active
    /// mandates. Zero once every window has elapsed.
    pub fn balance_of(
        &self,
        subscriber: &Address,
        now: DateTime<Utc>,
    ) -> Result<u64, CheckpointError> {
        self.store.sum_active_for_subscriber(subscriber, now)
    }

    /// The single mandate's amount while its window is running, else zero.
    pub fn mandate_balance(
        &self,
        id: &MandateDigest,
        now: DateTime<Utc>,
    ) -> Result<u64, CheckpointError> {
        match self.store.record_of(id)? {
            Some(record) if record.is_active(now) => Ok(record.amount),
            _ => Ok(0),
        }
    }

    /// Aggregate of all currently active mandate amounts.
    pub fn total_active(&self, now: DateTime<Utc>) -> Result<u64, CheckpointError> {
        self.store.sum_active_total(now)
    }

    /// Recipient-side honor window: true in
    /// `[last_settled_at + period, last_settled_at + period + grace)`.
    ///
    /// This never extends `balance_of` and never gates settlement
    /// eligibility; it exists for downstream consumers that treat a lapsed
    /// mandate as still honorable for late processing.
    pub fn is_within_grace(
        &self,
        id: &MandateDigest,
        now: DateTime<Utc>,
    ) -> Result<bool, CheckpointError> {
        let record = match self.store.record_of(id)? {
            Some(record) => record,
            None => return Ok(false),
        };
        let window_end = record.eligible_at().timestamp();
        let grace_end = window_end.saturating_add(self.grace_period_seconds);
        Ok(now.timestamp() >= window_end && now.timestamp() < grace_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mandate::{Mandate, TokenId};
    use chrono::TimeZone;

    fn test_mandate() -> Mandate {
        Mandate {
            subscriber: Address::from_bytes([0x11; 32]),
            recipient: Address::from_bytes([0x22; 32]),
            token: TokenId::from_bytes([0x33; 32]),
            amount: 10,
            period_seconds: 2,
            execution_fee_price: 1,
            nonce: 0,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn at(offset_seconds: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(offset_seconds)
    }

    fn settled_ledger(grace: i64) -> (VirtualBalanceLedger, Mandate) {
        let store = CheckpointStore::memory().unwrap();
        let mandate = test_mandate();
        store.mark_settled(&mandate, t0()).unwrap();
        (VirtualBalanceLedger::new(store, grace), mandate)
    }

    // === A) Decay ===

    #[test]
    fn test_balance_is_amount_inside_window_and_zero_at_boundary() {
        let (ledger, mandate) = settled_ledger(0);

        assert_eq!(ledger.balance_of(&mandate.subscriber, t0()).unwrap(), 10);
        assert_eq!(ledger.balance_of(&mandate.subscriber, at(1)).unwrap(), 10);
        // Decays exactly at last_settled_at + period_seconds.
        assert_eq!(ledger.balance_of(&mandate.subscriber, at(2)).unwrap(), 0);
        assert_eq!(ledger.balance_of(&mandate.subscriber, at(100)).unwrap(), 0);
    }

    #[test]
    fn test_mandate_balance_tracks_single_identity() {
        let (ledger, mandate) = settled_ledger(0);
        let id = mandate.digest();

        assert_eq!(ledger.mandate_balance(&id, at(1)).unwrap(), 10);
        assert_eq!(ledger.mandate_balance(&id, at(2)).unwrap(), 0);

        let never_settled = Mandate { nonce: 9, ..mandate }.digest();
        assert_eq!(ledger.mandate_balance(&never_settled, t0()).unwrap(), 0);
    }

    #[test]
    fn test_unknown_subscriber_has_zero_balance() {
        let (ledger, _) = settled_ledger(0);
        let stranger = Address::from_bytes([0x99; 32]);
        assert_eq!(ledger.balance_of(&stranger, t0()).unwrap(), 0);
    }

    // === B) Aggregate ===

    #[test]
    fn test_total_active_sums_across_mandates_and_decays_per_window() {
        let store = CheckpointStore::memory().unwrap();
        let short = test_mandate();
        let long = Mandate {
            subscriber: Address::from_bytes([0x44; 32]),
            amount: 25,
            period_seconds: 10,
            ..short
        };
        store.mark_settled(&short, t0()).unwrap();
        store.mark_settled(&long, t0()).unwrap();
        let ledger = VirtualBalanceLedger::new(store, 0);

        assert_eq!(ledger.total_active(at(1)).unwrap(), 35);
        // The short window lapses first.
        assert_eq!(ledger.total_active(at(2)).unwrap(), 25);
        assert_eq!(ledger.total_active(at(10)).unwrap(), 0);
    }

    #[test]
    fn test_grace_does_not_extend_balance_visibility() {
        let (ledger, mandate) = settled_ledger(60);
        assert_eq!(ledger.balance_of(&mandate.subscriber, at(2)).unwrap(), 0);
        assert_eq!(ledger.total_active(at(2)).unwrap(), 0);
    }

    // === C) Grace window ===

    #[test]
    fn test_grace_window_brackets() {
        let (ledger, mandate) = settled_ledger(3);
        let id = mandate.digest();

        assert!(!ledger.is_within_grace(&id, at(1)).unwrap());
        assert!(ledger.is_within_grace(&id, at(2)).unwrap());
        assert!(ledger.is_within_grace(&id, at(4)).unwrap());
        assert!(!ledger.is_within_grace(&id, at(5)).unwrap());
    }

    #[test]
    fn test_zero_grace_has_empty_window() {
        let (ledger, mandate) = settled_ledger(0);
        assert!(!ledger.is_within_grace(&mandate.digest(), at(2)).unwrap());
    }
}
