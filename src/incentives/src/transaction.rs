//! Unit of work for one ledger operation
//!
//! A [`Transaction`] reads through its own staged writes, so components can
//! compose freely inside one operation. Nothing reaches the backend or the
//! asset ledger until the ledger commits the staged changes; dropping the
//! transaction discards them.

use std::collections::BTreeMap;

use relaynet_core::{AccountId, Amount, AssetError, AssetLedger, MessageId, TokenId};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{LedgerError, Result};
use crate::events::LedgerEvent;
use crate::store::{decode, encode, keys, BatchOp, KvBackend};
use crate::types::{GlobalState, Identity, RelayNode, RelayedMessage, ReputationRecord};

/// Purpose of a staged asset movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Allowance-based pull from the owner into custody
    StakeDeposit,
    StakeReturn,
    RewardPayout,
    /// Allowance-based pull from a funder into custody
    PoolFunding,
    ExcessWithdrawal,
}

impl TransferKind {
    /// Deposits pull through an allowance; everything else leaves custody
    pub fn is_pull(&self) -> bool {
        matches!(self, TransferKind::StakeDeposit | TransferKind::PoolFunding)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedTransfer {
    pub kind: TransferKind,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

/// Everything a transaction produced, detached from the stores it read
#[derive(Debug, Default)]
pub struct StagedChanges {
    pub writes: Vec<BatchOp>,
    pub transfers: Vec<StagedTransfer>,
    pub events: Vec<LedgerEvent>,
}

pub struct Transaction<'a> {
    kv: &'a dyn KvBackend,
    assets: &'a dyn AssetLedger,
    token: TokenId,
    custody: AccountId,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    transfers: Vec<StagedTransfer>,
    events: Vec<LedgerEvent>,
}

impl<'a> Transaction<'a> {
    pub fn new(
        kv: &'a dyn KvBackend,
        assets: &'a dyn AssetLedger,
        token: TokenId,
        custody: AccountId,
    ) -> Self {
        Self {
            kv,
            assets,
            token,
            custody,
            writes: BTreeMap::new(),
            transfers: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn token(&self) -> &TokenId {
        &self.token
    }

    pub fn custody(&self) -> &AccountId {
        &self.custody
    }

    // ---- raw key access ----

    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => self.kv.get(key),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.get_raw(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize>(&mut self, key: Vec<u8>, value: &T) -> Result<()> {
        self.writes.insert(key, Some(encode(value)?));
        Ok(())
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.writes.insert(key, None);
    }

    /// Backend entries under `prefix` merged with staged writes, key ordered
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.kv.scan_prefix(prefix)?.into_iter().collect();
        for (key, staged) in self.writes.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match staged {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    // ---- typed records ----

    pub fn identity(&self, account: &AccountId) -> Result<Option<Identity>> {
        self.get(&keys::identity(account))
    }

    pub fn put_identity(&mut self, identity: &Identity) -> Result<()> {
        self.put(keys::identity(&identity.account), identity)
    }

    pub fn relay_node(&self, account: &AccountId) -> Result<Option<RelayNode>> {
        self.get(&keys::node(account))
    }

    /// The account's relay node, if it is currently active
    pub fn active_relay_node(&self, account: &AccountId) -> Result<Option<RelayNode>> {
        Ok(self.relay_node(account)?.filter(|node| node.active))
    }

    pub fn put_relay_node(&mut self, node: &RelayNode) -> Result<()> {
        self.put(keys::node(&node.account), node)
    }

    pub fn reputation(&self, account: &AccountId) -> Result<Option<ReputationRecord>> {
        self.get(&keys::reputation(account))
    }

    pub fn put_reputation(&mut self, record: &ReputationRecord) -> Result<()> {
        self.put(keys::reputation(&record.account), record)
    }

    pub fn message(&self, id: &MessageId) -> Result<Option<RelayedMessage>> {
        self.get(&keys::message(id))
    }

    pub fn put_message(&mut self, message: &RelayedMessage) -> Result<()> {
        self.put(keys::message(&message.message_id), message)
    }

    pub fn globals(&self) -> Result<GlobalState> {
        self.get(keys::GLOBALS)?
            .ok_or_else(|| LedgerError::Storage("global state missing; store not migrated".into()))
    }

    pub fn put_globals(&mut self, globals: &GlobalState) -> Result<()> {
        self.put(keys::GLOBALS.to_vec(), globals)
    }

    /// Accounts of the active-node index in registration order
    pub fn active_accounts(&self) -> Result<Vec<AccountId>> {
        self.scan_prefix(keys::ACTIVE_PREFIX.as_bytes())?
            .into_iter()
            .map(|(_, bytes)| decode(&bytes))
            .collect()
    }

    pub fn add_active(&mut self, seq: u64, account: &AccountId) -> Result<()> {
        self.put(keys::active(seq), account)
    }

    pub fn remove_active(&mut self, seq: u64) {
        self.delete(keys::active(seq));
    }

    // ---- asset movements ----

    fn staged_delta(&self, account: &AccountId) -> (Amount, Amount) {
        self.transfers.iter().fold((0, 0), |(inflow, outflow), t| {
            let inflow = if t.to == *account { inflow + t.amount } else { inflow };
            let outflow = if t.from == *account { outflow + t.amount } else { outflow };
            (inflow, outflow)
        })
    }

    /// Balance of `account` after the transfers staged so far
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        let (inflow, outflow) = self.staged_delta(account);
        (self.assets.balance_of(&self.token, account) + inflow).saturating_sub(outflow)
    }

    pub fn custody_balance(&self) -> Amount {
        self.balance_of(&self.custody)
    }

    /// Remaining allowance `owner` granted to custody, net of staged pulls
    pub fn custody_allowance(&self, owner: &AccountId) -> Amount {
        let pulled: Amount = self
            .transfers
            .iter()
            .filter(|t| t.kind.is_pull() && t.from == *owner)
            .map(|t| t.amount)
            .sum();
        self.assets
            .allowance(&self.token, owner, &self.custody)
            .saturating_sub(pulled)
    }

    /// Stage an allowance-based transfer from `owner` into custody
    pub fn pull_into_custody(
        &mut self,
        kind: TransferKind,
        owner: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let available = self.balance_of(owner);
        if available < amount {
            return Err(LedgerError::TransferFailed(AssetError::InsufficientBalance {
                available,
                requested: amount,
            }));
        }
        let approved = self.custody_allowance(owner);
        if approved < amount {
            return Err(LedgerError::TransferFailed(AssetError::InsufficientAllowance {
                approved,
                requested: amount,
            }));
        }
        self.transfers.push(StagedTransfer {
            kind,
            from: *owner,
            to: self.custody,
            amount,
        });
        Ok(())
    }

    /// Stage a transfer out of custody; the caller checks solvency first
    pub fn pay_from_custody(&mut self, kind: TransferKind, to: &AccountId, amount: Amount) {
        if amount == 0 {
            return;
        }
        self.transfers.push(StagedTransfer {
            kind,
            from: self.custody,
            to: *to,
            amount,
        });
    }

    // ---- events ----

    pub fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn into_staged(self) -> StagedChanges {
        StagedChanges {
            writes: self
                .writes
                .into_iter()
                .map(|(key, value)| match value {
                    Some(value) => BatchOp::Put(key, value),
                    None => BatchOp::Delete(key),
                })
                .collect(),
            transfers: self.transfers,
            events: self.events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::store::{migrate, MemoryBackend};
    use relaynet_core::InMemoryAssetLedger;

    fn setup() -> (MemoryBackend, InMemoryAssetLedger, LedgerConfig) {
        let config = LedgerConfig::default();
        let mut kv = MemoryBackend::new();
        migrate(&mut kv, &config).unwrap();
        (kv, InMemoryAssetLedger::new(), config)
    }

    #[test]
    fn test_reads_see_staged_writes() {
        let (kv, assets, config) = setup();
        let mut tx = Transaction::new(&kv, &assets, config.token.clone(), config.custody);

        let mut globals = tx.globals().unwrap();
        globals.total_users = 3;
        tx.put_globals(&globals).unwrap();

        assert_eq!(tx.globals().unwrap().total_users, 3);
        // Backend untouched until commit
        let stored: GlobalState = decode(&kv.get(keys::GLOBALS).unwrap().unwrap()).unwrap();
        assert_eq!(stored.total_users, 0);
    }

    #[test]
    fn test_scan_merges_staged_puts_and_deletes() {
        let (mut kv, assets, config) = setup();
        let a = AccountId::from_label("a");
        let b = AccountId::from_label("b");
        kv.apply(vec![BatchOp::Put(keys::active(0), encode(&a).unwrap())])
            .unwrap();

        let mut tx = Transaction::new(&kv, &assets, config.token.clone(), config.custody);
        tx.add_active(1, &b).unwrap();
        assert_eq!(tx.active_accounts().unwrap(), vec![a, b]);

        tx.remove_active(0);
        assert_eq!(tx.active_accounts().unwrap(), vec![b]);
    }

    #[test]
    fn test_pull_checks_balance_and_allowance() {
        let (kv, mut assets, config) = setup();
        let owner = AccountId::from_label("owner");
        assets.mint(&config.token, &owner, 150);
        assets.approve(&config.token, &owner, &config.custody, 100);

        let mut tx = Transaction::new(&kv, &assets, config.token.clone(), config.custody);
        assert!(matches!(
            tx.pull_into_custody(TransferKind::StakeDeposit, &owner, 120),
            Err(LedgerError::TransferFailed(AssetError::InsufficientAllowance { .. }))
        ));
        tx.pull_into_custody(TransferKind::StakeDeposit, &owner, 100).unwrap();

        assert_eq!(tx.balance_of(&owner), 50);
        assert_eq!(tx.custody_balance(), 100);
        assert_eq!(tx.custody_allowance(&owner), 0);

        let staged = tx.into_staged();
        assert_eq!(staged.transfers.len(), 1);
    }
}
