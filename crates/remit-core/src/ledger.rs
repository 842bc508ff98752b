//! Token-ledger boundary.
//!
//! The settlement engine never holds custody of funds: it moves them on an
//! external fungible-token ledger through a standing delegated allowance
//! the subscriber granted to the engine ahead of time. The trait is the
//! seam a deployment implements against its real ledger;
//! [`MemoryTokenLedger`] is the in-process implementation used by tests
//! and the simulation tooling.

use crate::mandate::{Address, TokenId};
use std::collections::HashMap;
use thiserror::Error;

/// Reasons a ledger declines a delegated transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("delegated allowance exhausted: required {required}, remaining {remaining}")]
    InsufficientAllowance { required: u64, remaining: u64 },

    #[error("owner balance too low: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },
}

/// External fungible-token ledger the engine settles against.
pub trait TokenLedger {
    /// The owner's standing delegated allowance to this engine.
    fn allowance(&self, owner: &Address, token: &TokenId) -> u64;

    /// The owner's spendable balance.
    fn balance_of(&self, owner: &Address, token: &TokenId) -> u64;

    /// Delegated transfer: debit `owner`, credit `recipient`, consume
    /// allowance. Must either apply fully or decline with no effect.
    fn transfer_from(
        &mut self,
        owner: &Address,
        recipient: &Address,
        token: &TokenId,
        amount: u64,
    ) -> Result<(), LedgerError>;
}

/// In-process token ledger keyed by `(account, token)`.
#[derive(Debug, Default, Clone)]
pub struct MemoryTokenLedger {
    balances: HashMap<(Address, TokenId), u64>,
    allowances: HashMap<(Address, TokenId), u64>,
}

impl MemoryTokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an account out of thin air (test/simulation setup).
    pub fn mint(&mut self, owner: Address, token: TokenId, amount: u64) {
        *self.balances.entry((owner, token)).or_insert(0) += amount;
    }

    /// Set the owner's standing delegated allowance to the engine.
    pub fn approve(&mut self, owner: Address, token: TokenId, amount: u64) {
        self.allowances.insert((owner, token), amount);
    }
}

impl TokenLedger for MemoryTokenLedger {
    fn allowance(&self, owner: &Address, token: &TokenId) -> u64 {
        self.allowances.get(&(*owner, *token)).copied().unwrap_or(0)
    }

    fn balance_of(&self, owner: &Address, token: &TokenId) -> u64 {
        self.balances.get(&(*owner, *token)).copied().unwrap_or(0)
    }

    fn transfer_from(
        &mut self,
        owner: &Address,
        recipient: &Address,
        token: &TokenId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let remaining = self.allowance(owner, token);
        if remaining < amount {
            return Err(LedgerError::InsufficientAllowance {
                required: amount,
                remaining,
            });
        }
        let available = self.balance_of(owner, token);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available,
            });
        }

        self.allowances.insert((*owner, *token), remaining - amount);
        self.balances.insert((*owner, *token), available - amount);
        *self.balances.entry((*recipient, *token)).or_insert(0) += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(fill: u8) -> Address {
        Address::from_bytes([fill; 32])
    }

    const TOKEN: TokenId = TokenId::from_bytes([0x33; 32]);

    #[test]
    fn test_transfer_debits_owner_credits_recipient_consumes_allowance() {
        let mut ledger = MemoryTokenLedger::new();
        ledger.mint(addr(1), TOKEN, 100);
        ledger.approve(addr(1), TOKEN, 30);

        ledger
            .transfer_from(&addr(1), &addr(2), &TOKEN, 10)
            .unwrap();

        assert_eq!(ledger.balance_of(&addr(1), &TOKEN), 90);
        assert_eq!(ledger.balance_of(&addr(2), &TOKEN), 10);
        assert_eq!(ledger.allowance(&addr(1), &TOKEN), 20);
    }

    #[test]
    fn test_transfer_without_allowance_declines_with_no_effect() {
        let mut ledger = MemoryTokenLedger::new();
        ledger.mint(addr(1), TOKEN, 100);

        let err = ledger
            .transfer_from(&addr(1), &addr(2), &TOKEN, 10)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientAllowance {
                required: 10,
                remaining: 0
            }
        );
        assert_eq!(ledger.balance_of(&addr(1), &TOKEN), 100);
        assert_eq!(ledger.balance_of(&addr(2), &TOKEN), 0);
    }

    #[test]
    fn test_transfer_beyond_balance_declines_with_no_effect() {
        let mut ledger = MemoryTokenLedger::new();
        ledger.mint(addr(1), TOKEN, 5);
        ledger.approve(addr(1), TOKEN, 100);

        let err = ledger
            .transfer_from(&addr(1), &addr(2), &TOKEN, 10)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                required: 10,
                available: 5
            }
        );
        assert_eq!(ledger.allowance(&addr(1), &TOKEN), 100);
        assert_eq!(ledger.balance_of(&addr(2), &TOKEN), 0);
    }

    #[test]
    fn test_tokens_are_segregated_per_asset() {
        let other = TokenId::from_bytes([0x44; 32]);
        let mut ledger = MemoryTokenLedger::new();
        ledger.mint(addr(1), TOKEN, 100);
        ledger.approve(addr(1), TOKEN, 100);

        let err = ledger
            .transfer_from(&addr(1), &addr(2), &other, 10)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientAllowance { .. }));
    }
}
