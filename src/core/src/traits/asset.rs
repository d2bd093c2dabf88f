//! External fungible-asset ledger interface
//!
//! The incentive ledger never holds token balances itself. Stake deposits,
//! stake returns and reward payouts are transfers on an external asset
//! ledger (the token contract), reached through [`AssetLedger`]. The ledger
//! acts as operator of its own custody account.

use crate::types::{serde_amount, AccountId, Amount, TokenId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Rejections reported by the asset ledger
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("Insufficient balance: have {available}, need {requested}")]
    InsufficientBalance { available: Amount, requested: Amount },

    #[error("Insufficient allowance: approved {approved}, need {requested}")]
    InsufficientAllowance { approved: Amount, requested: Amount },

    #[error("Unknown token: {0}")]
    UnknownToken(String),
}

/// Fungible asset ledger abstraction
pub trait AssetLedger: Send {
    /// Balance held by `owner`
    fn balance_of(&self, token: &TokenId, owner: &AccountId) -> Amount;

    /// Amount `spender` may move out of `owner`'s balance
    fn allowance(&self, token: &TokenId, owner: &AccountId, spender: &AccountId) -> Amount;

    /// Move `amount` out of an account the caller operates (custody)
    fn transfer(
        &mut self,
        token: &TokenId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), AssetError>;

    /// Move `amount` out of `from` using an allowance granted to `spender`
    fn transfer_from(
        &mut self,
        token: &TokenId,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), AssetError>;

    /// Full state of an asset ledger hosted in-process, stored by the
    /// incentive ledger next to its own records. Ledgers that persist
    /// themselves return `None`.
    fn export_state(&self) -> Option<AssetSnapshot> {
        None
    }
}

/// In-process asset ledger used by tests and single-node deployments
#[derive(Debug, Clone, Default)]
pub struct InMemoryAssetLedger {
    tokens: HashSet<TokenId>,
    balances: HashMap<(TokenId, AccountId), Amount>,
    allowances: HashMap<(TokenId, AccountId, AccountId), Amount>,
}

impl InMemoryAssetLedger {
    /// Create an empty asset ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit freshly minted tokens to an account
    pub fn mint(&mut self, token: &TokenId, to: &AccountId, amount: Amount) {
        self.tokens.insert(token.clone());
        *self.balances.entry((token.clone(), *to)).or_insert(0) += amount;
    }

    /// Grant `spender` an allowance over `owner`'s balance
    pub fn approve(&mut self, token: &TokenId, owner: &AccountId, spender: &AccountId, amount: Amount) {
        self.tokens.insert(token.clone());
        self.allowances
            .insert((token.clone(), *owner, *spender), amount);
    }

    fn ensure_known(&self, token: &TokenId) -> Result<(), AssetError> {
        if self.tokens.contains(token) {
            Ok(())
        } else {
            Err(AssetError::UnknownToken(token.to_string()))
        }
    }

    fn move_balance(
        &mut self,
        token: &TokenId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), AssetError> {
        let available = self.balance_of(token, from);
        if available < amount {
            return Err(AssetError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        if amount == 0 || from == to {
            return Ok(());
        }
        self.balances.insert((token.clone(), *from), available - amount);
        *self.balances.entry((token.clone(), *to)).or_insert(0) += amount;
        Ok(())
    }
}

/// Portable copy of an [`InMemoryAssetLedger`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    pub tokens: Vec<TokenId>,
    pub balances: Vec<BalanceEntry>,
    pub allowances: Vec<AllowanceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub token: TokenId,
    pub owner: AccountId,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceEntry {
    pub token: TokenId,
    pub owner: AccountId,
    pub spender: AccountId,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
}

impl InMemoryAssetLedger {
    /// Export every known token, non-zero balance and allowance
    pub fn snapshot(&self) -> AssetSnapshot {
        let mut tokens: Vec<TokenId> = self.tokens.iter().cloned().collect();
        tokens.sort_by(|a, b| a.0.cmp(&b.0));

        let mut balances: Vec<BalanceEntry> = self
            .balances
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|((token, owner), amount)| BalanceEntry {
                token: token.clone(),
                owner: *owner,
                amount: *amount,
            })
            .collect();
        balances.sort_by(|a, b| (&a.token.0, a.owner).cmp(&(&b.token.0, b.owner)));

        let mut allowances: Vec<AllowanceEntry> = self
            .allowances
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|((token, owner, spender), amount)| AllowanceEntry {
                token: token.clone(),
                owner: *owner,
                spender: *spender,
                amount: *amount,
            })
            .collect();
        allowances.sort_by(|a, b| {
            (&a.token.0, a.owner, a.spender).cmp(&(&b.token.0, b.owner, b.spender))
        });

        AssetSnapshot {
            tokens,
            balances,
            allowances,
        }
    }

    /// Rebuild a ledger from a snapshot
    pub fn from_snapshot(snapshot: AssetSnapshot) -> Self {
        let mut ledger = Self::new();
        ledger.tokens.extend(snapshot.tokens);
        for entry in snapshot.balances {
            ledger.tokens.insert(entry.token.clone());
            ledger.balances.insert((entry.token, entry.owner), entry.amount);
        }
        for entry in snapshot.allowances {
            ledger.tokens.insert(entry.token.clone());
            ledger
                .allowances
                .insert((entry.token, entry.owner, entry.spender), entry.amount);
        }
        ledger
    }
}

impl AssetLedger for InMemoryAssetLedger {
    fn balance_of(&self, token: &TokenId, owner: &AccountId) -> Amount {
        self.balances
            .get(&(token.clone(), *owner))
            .copied()
            .unwrap_or(0)
    }

    fn allowance(&self, token: &TokenId, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(&(token.clone(), *owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(
        &mut self,
        token: &TokenId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), AssetError> {
        self.ensure_known(token)?;
        self.move_balance(token, from, to, amount)
    }

    fn transfer_from(
        &mut self,
        token: &TokenId,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), AssetError> {
        self.ensure_known(token)?;
        let approved = self.allowance(token, from, spender);
        if approved < amount {
            return Err(AssetError::InsufficientAllowance {
                approved,
                requested: amount,
            });
        }
        self.move_balance(token, from, to, amount)?;
        self.allowances
            .insert((token.clone(), *from, *spender), approved - amount);
        Ok(())
    }

    fn export_state(&self) -> Option<AssetSnapshot> {
        Some(self.snapshot())
    }
}
