//! Settlement orchestration.
//!
//! [`SettlementEngine`] is the single mutating entry point of the system:
//! it validates a submitted mandate, verifies the subscriber's signature
//! over the mandate digest, checks the eligibility window, moves funds on
//! the external token ledger, and only then advances the checkpoint. Every
//! failure is synchronous and typed, and leaves the checkpoint untouched,
//! so an executor can always decide from the error kind whether
//! resubmission is worthwhile.
//!
//! Submissions are totally ordered: settlement takes `&mut self`, so two
//! in-flight settlements for the same engine cannot interleave. Balance
//! queries go through read-only [`VirtualBalanceLedger`] views and never
//! contend with settlement.

use crate::balance::VirtualBalanceLedger;
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::ledger::{LedgerError, TokenLedger};
use crate::mandate::{Address, Mandate, MandateDigest, MandateError, TokenId};
use crate::signature::verify_mandate_signature;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Settlement failure taxonomy.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Structurally invalid mandate, rejected before any verification work.
    #[error("malformed mandate: {0}")]
    MalformedMandate(#[from] MandateError),

    /// The submitted mandate deviates from a term this deployment pinned.
    #[error("mandate {field} differs from the deployment's committed terms")]
    TermsMismatch { field: &'static str },

    /// The signature does not verify against the claimed subscriber.
    #[error("signature does not verify against the claimed subscriber")]
    InvalidSignature,

    /// The mandate's current period has not elapsed. Expected during normal
    /// operation; the executor may retry at `eligible_at`.
    #[error("settlement not yet eligible, next window opens at {eligible_at}")]
    NotYetEligible { eligible_at: DateTime<Utc> },

    /// The external ledger declined the transfer. No state was mutated.
    #[error("token ledger declined the transfer: {0}")]
    InsufficientFundsOrAllowance(#[from] LedgerError),

    /// Checkpoint storage failure.
    #[error("checkpoint storage error: {0}")]
    Checkpoint(CheckpointError),
}

impl From<CheckpointError> for SettlementError {
    fn from(e: CheckpointError) -> Self {
        match e {
            CheckpointError::StillActive { eligible_at } => {
                SettlementError::NotYetEligible { eligible_at }
            }
            CheckpointError::InvalidMandate(e) => SettlementError::MalformedMandate(e),
            other => SettlementError::Checkpoint(other),
        }
    }
}

/// Per-deployment term commitments, the counterpart of the terms a
/// prospective signer audits before signing. A pinned term makes the
/// engine reject any mandate that deviates from it; an unpinned term
/// accepts whatever the mandate carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredTerms {
    pub recipient: Option<Address>,
    pub token: Option<TokenId>,
    pub amount: Option<u64>,
    pub period_seconds: Option<i64>,
    pub execution_fee_price: Option<u64>,
}

impl RequiredTerms {
    pub fn with_recipient(mut self, recipient: Address) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn with_token(mut self, token: TokenId) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_period_seconds(mut self, period_seconds: i64) -> Self {
        self.period_seconds = Some(period_seconds);
        self
    }

    pub fn with_execution_fee_price(mut self, execution_fee_price: u64) -> Self {
        self.execution_fee_price = Some(execution_fee_price);
        self
    }

    /// First pinned term the mandate deviates from, if any.
    fn mismatch(&self, mandate: &Mandate) -> Option<&'static str> {
        if self.recipient.is_some_and(|r| r != mandate.recipient) {
            return Some("recipient");
        }
        if self.token.is_some_and(|t| t != mandate.token) {
            return Some("token");
        }
        if self.amount.is_some_and(|a| a != mandate.amount) {
            return Some("amount");
        }
        if self
            .period_seconds
            .is_some_and(|p| p != mandate.period_seconds)
        {
            return Some("period_seconds");
        }
        if self
            .execution_fee_price
            .is_some_and(|f| f != mandate.execution_fee_price)
        {
            return Some("execution_fee_price");
        }
        None
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Recipient-side honor window after a period lapses. Does not affect
    /// eligibility or balances.
    pub grace_period_seconds: i64,
    /// Address reimbursed `execution_fee_price` per settlement submitted
    /// through this engine. None disables the fee leg.
    pub executor: Option<Address>,
    /// Term pins enforced on every submitted mandate.
    pub required_terms: RequiredTerms,
}

/// Receipt returned to the executor after a successful settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementReceipt {
    /// Content-addressed receipt id, deterministic for a given settlement.
    pub settlement_id: String,
    /// `sha256:<hex>` mandate digest.
    pub mandate_id: String,
    pub subscriber: Address,
    pub recipient: Address,
    pub token: TokenId,
    pub amount: u64,
    /// Fee reimbursed to the configured executor (zero when disabled).
    pub executor_fee: u64,
    pub settled_at: DateTime<Utc>,
    /// How many times this mandate identity has settled, this one included.
    pub settlement_count: u32,
}

/// Compute the deterministic receipt id.
///
/// ```text
/// settlement_id = "sha256:" + hex(SHA256(mandate_id + ":" + count + ":" + settled_at))
/// ```
pub fn compute_settlement_id(mandate_id: &str, settlement_count: u32, settled_at: i64) -> String {
    let input = format!("{mandate_id}:{settlement_count}:{settled_at}");
    let hash = Sha256::digest(input.as_bytes());
    format!("sha256:{}", hex::encode(hash))
}

/// The recurring-payment settlement engine.
///
/// Owns the token-ledger handle and the sole write path into the
/// checkpoint store. Read-only state (balances, records, grace windows) is
/// served from store clones and can be queried at any time.
pub struct SettlementEngine<L: TokenLedger> {
    checkpoints: CheckpointStore,
    ledger: L,
    config: EngineConfig,
}

impl<L: TokenLedger> SettlementEngine<L> {
    pub fn new(checkpoints: CheckpointStore, ledger: L, config: EngineConfig) -> Self {
        Self {
            checkpoints,
            ledger,
            config,
        }
    }

    /// The digest a subscriber must sign for `mandate`, after structural
    /// validation. Read-only helper so an off-process signer can produce
    /// exactly the committed bytes.
    pub fn mandate_digest(&self, mandate: &Mandate) -> Result<MandateDigest, SettlementError> {
        mandate.validate()?;
        Ok(mandate.digest())
    }

    /// Execute one settlement of a signed mandate. All-or-nothing: on any
    /// error the checkpoint is untouched and no receipt is issued.
    pub fn execute_settlement(
        &mut self,
        mandate: &Mandate,
        signature: &[u8],
        now: DateTime<Utc>,
    ) -> Result<SettlementReceipt, SettlementError> {
        mandate.validate()?;

        if let Some(field) = self.config.required_terms.mismatch(mandate) {
            return Err(SettlementError::TermsMismatch { field });
        }

        let digest = mandate.digest();
        if !verify_mandate_signature(&digest, signature, &mandate.subscriber) {
            return Err(SettlementError::InvalidSignature);
        }

        if let Some(record) = self.checkpoints.record_of(&digest)? {
            if record.is_active(now) {
                let eligible_at = record.eligible_at();
                tracing::debug!(
                    mandate_id = %record.mandate_id,
                    %eligible_at,
                    "settlement attempted inside the active window"
                );
                return Err(SettlementError::NotYetEligible { eligible_at });
            }
        }

        let executor_fee = match self.config.executor {
            Some(_) => mandate.execution_fee_price,
            None => 0,
        };
        let total = mandate.amount.saturating_add(executor_fee);

        // Pre-flight both legs so the fee leg can never strand a completed
        // payment leg; submissions are totally ordered, so nothing can
        // invalidate this check before the transfers run.
        let remaining = self.ledger.allowance(&mandate.subscriber, &mandate.token);
        if remaining < total {
            return Err(LedgerError::InsufficientAllowance {
                required: total,
                remaining,
            }
            .into());
        }
        let available = self.ledger.balance_of(&mandate.subscriber, &mandate.token);
        if available < total {
            return Err(LedgerError::InsufficientFunds {
                required: total,
                available,
            }
            .into());
        }

        self.ledger.transfer_from(
            &mandate.subscriber,
            &mandate.recipient,
            &mandate.token,
            mandate.amount,
        )?;
        if executor_fee > 0 {
            if let Some(executor) = self.config.executor {
                self.ledger.transfer_from(
                    &mandate.subscriber,
                    &executor,
                    &mandate.token,
                    executor_fee,
                )?;
            }
        }

        let record = self.checkpoints.mark_settled(mandate, now)?;

        let receipt = SettlementReceipt {
            settlement_id: compute_settlement_id(
                &record.mandate_id,
                record.settlement_count,
                record.last_settled_at.timestamp(),
            ),
            mandate_id: record.mandate_id,
            subscriber: record.subscriber,
            recipient: record.recipient,
            token: record.token,
            amount: record.amount,
            executor_fee,
            settled_at: record.last_settled_at,
            settlement_count: record.settlement_count,
        };

        tracing::info!(
            mandate_id = %receipt.mandate_id,
            settlement_id = %receipt.settlement_id,
            amount = receipt.amount,
            executor_fee = receipt.executor_fee,
            settlement_count = receipt.settlement_count,
            "settlement executed"
        );

        Ok(receipt)
    }

    /// Read-only balance view sharing this engine's checkpoint state.
    pub fn balances(&self) -> VirtualBalanceLedger {
        VirtualBalanceLedger::new(self.checkpoints.clone(), self.config.grace_period_seconds)
    }

    /// Active balance for a subscriber at `now`.
    pub fn balance_of(
        &self,
        subscriber: &Address,
        now: DateTime<Utc>,
    ) -> Result<u64, SettlementError> {
        Ok(self.balances().balance_of(subscriber, now)?)
    }

    /// Aggregate active balance at `now`.
    pub fn total_active(&self, now: DateTime<Utc>) -> Result<u64, SettlementError> {
        Ok(self.balances().total_active(now)?)
    }

    /// Shared handle to the checkpoint state.
    pub fn checkpoints(&self) -> CheckpointStore {
        self.checkpoints.clone()
    }

    /// The underlying token ledger (read access).
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn grace_period_seconds(&self) -> i64 {
        self.config.grace_period_seconds
    }

    pub fn executor(&self) -> Option<&Address> {
        self.config.executor.as_ref()
    }

    // Committed deployment terms, each independently inspectable so a
    // prospective signer can audit them before signing.

    pub fn required_recipient(&self) -> Option<&Address> {
        self.config.required_terms.recipient.as_ref()
    }

    pub fn required_token(&self) -> Option<&TokenId> {
        self.config.required_terms.token.as_ref()
    }

    pub fn required_amount(&self) -> Option<u64> {
        self.config.required_terms.amount
    }

    pub fn required_period_seconds(&self) -> Option<i64> {
        self.config.required_terms.period_seconds
    }

    pub fn required_execution_fee_price(&self) -> Option<u64> {
        self.config.required_terms.execution_fee_price
    }
}
