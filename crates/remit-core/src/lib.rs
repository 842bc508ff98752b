//! Recurring-payment mandate settlement engine.
//!
//! A subscriber signs a single offline mandate authorizing a recipient to
//! collect a fixed amount of a fixed token every period, forever. Any
//! executor can submit that mandate for settlement; the engine guarantees
//! that only a genuinely signed mandate moves funds, that a mandate settles
//! at most once per period, that retries never double-charge, and that
//! "the subscription is active" is always derived from elapsed time since
//! the last settlement rather than a stored flag.

pub mod balance;
pub mod checkpoint;
pub mod engine;
pub mod ledger;
pub mod mandate;
pub mod schema;
pub mod signature;

// Convenience re-exports
pub use balance::VirtualBalanceLedger;
pub use checkpoint::{CheckpointError, CheckpointRecord, CheckpointStore};
pub use engine::{
    compute_settlement_id, EngineConfig, RequiredTerms, SettlementEngine, SettlementError,
    SettlementReceipt,
};
pub use ledger::{LedgerError, MemoryTokenLedger, TokenLedger};
pub use mandate::{Address, Mandate, MandateDigest, MandateError, TokenId};
pub use schema::CHECKPOINT_SCHEMA;
pub use signature::{
    sign_mandate, subscriber_address, verify_mandate_signature, SIGNATURE_LENGTH,
};
