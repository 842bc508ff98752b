//! End-to-end settlement flow against a file-backed checkpoint store.
//!
//! Mirrors the reference subscription lifecycle: a mandate signed once,
//! offline, settles repeatedly across periods while the virtual balance
//! rises and decays purely as a function of elapsed time.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ed25519_dalek::SigningKey;
use remit_core::{
    sign_mandate, subscriber_address, Address, CheckpointStore, EngineConfig, Mandate,
    MemoryTokenLedger, SettlementEngine, SettlementError, TokenId, TokenLedger,
};
use tempfile::NamedTempFile;

const TOKEN: TokenId = TokenId::from_bytes([0xda; 32]);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

#[test]
fn test_reference_subscription_lifecycle() {
    let tmp = NamedTempFile::new().unwrap();
    let store = CheckpointStore::open(tmp.path()).unwrap();

    let key = SigningKey::generate(&mut rand::thread_rng());
    let subscriber = subscriber_address(&key.verifying_key());
    let recipient = Address::from_bytes([0x22; 32]);

    let mandate = Mandate {
        subscriber,
        recipient,
        token: TOKEN,
        amount: 10,
        period_seconds: 2,
        execution_fee_price: 1,
        nonce: 0,
    };
    let signature = sign_mandate(&mandate, &key);

    // Subscriber funds the account and grants the engine a standing
    // allowance covering many periods up front.
    let mut ledger = MemoryTokenLedger::new();
    ledger.mint(subscriber, TOKEN, 1_000);
    ledger.approve(subscriber, TOKEN, mandate.amount * 100);

    let mut engine = SettlementEngine::new(
        store,
        ledger,
        EngineConfig {
            grace_period_seconds: 1,
            ..EngineConfig::default()
        },
    );

    // First submission at t=0.
    let receipt = engine
        .execute_settlement(&mandate, &signature, t0())
        .unwrap();
    assert_eq!(receipt.amount, 10);
    assert_eq!(engine.balance_of(&subscriber, t0()).unwrap(), 10);
    assert_eq!(engine.total_active(t0()).unwrap(), 10);

    // A replayed submission inside the window is rejected and charges
    // nothing.
    let replay = engine
        .execute_settlement(&mandate, &signature, t0() + Duration::milliseconds(500))
        .unwrap_err();
    assert!(matches!(replay, SettlementError::NotYetEligible { .. }));
    assert_eq!(engine.ledger().balance_of(&recipient, &TOKEN), 10);

    // Past the period (t=5.5s) the balance has decayed with no transition
    // event.
    let later = t0() + Duration::milliseconds(5_500);
    assert_eq!(engine.balance_of(&subscriber, later).unwrap(), 0);
    assert_eq!(engine.total_active(later).unwrap(), 0);

    // The very same signed mandate settles again.
    let receipt = engine.execute_settlement(&mandate, &signature, later).unwrap();
    assert_eq!(receipt.settlement_count, 2);
    assert_eq!(engine.balance_of(&subscriber, later).unwrap(), 10);
    assert_eq!(engine.total_active(later).unwrap(), 10);
    assert_eq!(engine.ledger().balance_of(&recipient, &TOKEN), 20);

    // And decays again at t=11s.
    let end = t0() + Duration::seconds(11);
    assert_eq!(engine.balance_of(&subscriber, end).unwrap(), 0);
    assert_eq!(engine.total_active(end).unwrap(), 0);
}

#[test]
fn test_checkpoint_state_survives_reopening_the_store() {
    let tmp = NamedTempFile::new().unwrap();

    let key = SigningKey::generate(&mut rand::thread_rng());
    let subscriber = subscriber_address(&key.verifying_key());
    let mandate = Mandate {
        subscriber,
        recipient: Address::from_bytes([0x22; 32]),
        token: TOKEN,
        amount: 10,
        period_seconds: 3_600,
        execution_fee_price: 0,
        nonce: 0,
    };
    let signature = sign_mandate(&mandate, &key);

    {
        let store = CheckpointStore::open(tmp.path()).unwrap();
        let mut ledger = MemoryTokenLedger::new();
        ledger.mint(subscriber, TOKEN, 100);
        ledger.approve(subscriber, TOKEN, 100);
        let mut engine = SettlementEngine::new(store, ledger, EngineConfig::default());
        engine
            .execute_settlement(&mandate, &signature, t0())
            .unwrap();
    }

    // A fresh process reopening the same database still refuses a replay
    // inside the window.
    let store = CheckpointStore::open(tmp.path()).unwrap();
    let record = store.record_of(&mandate.digest()).unwrap().unwrap();
    assert_eq!(record.last_settled_at, t0());
    assert_eq!(record.settlement_count, 1);
    assert!(!store
        .is_eligible(&mandate.digest(), t0() + Duration::seconds(60))
        .unwrap());
}
