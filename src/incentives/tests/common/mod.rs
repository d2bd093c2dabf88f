//! Shared fixtures for ledger integration tests

#![allow(dead_code)]

use relaynet_core::{AccountId, Amount, AssetLedger, PublicKey, Timestamp, ONE_TOKEN, SECONDS_PER_DAY};
use relaynet_incentives::{IncentiveLedger, LedgerConfig};

/// Midnight of an arbitrary day
pub const DAY0: Timestamp = 20_000 * SECONDS_PER_DAY;

/// One hour into DAY0
pub const T0: Timestamp = DAY0 + 3_600;

pub const STARTING_BALANCE: Amount = 1_000 * ONE_TOKEN;

pub struct Harness {
    pub ledger: IncentiveLedger,
    pub governance: AccountId,
    pub authority: AccountId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        let ledger = IncentiveLedger::in_memory(config).unwrap();
        Self {
            governance: ledger.config().governance,
            authority: ledger.config().relay_authority,
            ledger,
        }
    }

    /// Mint a balance and approve custody for all of it
    pub fn fund(&mut self, account: &AccountId, amount: Amount) {
        let token = self.ledger.token().clone();
        let custody = self.ledger.config().custody;
        let assets = self.ledger.assets_mut();
        assets.mint(&token, account, amount);
        let approved = assets.allowance(&token, account, &custody);
        assets.approve(&token, account, &custody, approved + amount);
    }

    pub fn balance(&self, account: &AccountId) -> Amount {
        self.ledger.assets().balance_of(self.ledger.token(), account)
    }

    /// Funded account with an active identity
    pub fn user(&mut self, label: &str, now: Timestamp) -> AccountId {
        let account = AccountId::from_label(label);
        self.fund(&account, STARTING_BALANCE);
        self.ledger
            .register(account, key_for(label), label, now)
            .unwrap();
        account
    }

    /// Funded account running a relay node
    pub fn relay(&mut self, label: &str, storage_mb: u64, now: Timestamp) -> AccountId {
        let account = self.user(label, now);
        self.ledger
            .register_as_relay(account, &format!("wss://{}.relay.example", label), storage_mb, now)
            .unwrap();
        account
    }

    /// Top up the reward pool from a dedicated treasury account
    pub fn fund_pool(&mut self, amount: Amount, now: Timestamp) {
        let treasury = AccountId::from_label("treasury");
        self.fund(&treasury, amount);
        self.ledger.fund_reward_pool(treasury, amount, now).unwrap();
    }

    /// Heartbeat every `interval` seconds, `beats` times, starting after `from`
    pub fn beat(&mut self, account: AccountId, from: Timestamp, interval: u64, beats: u64) -> Timestamp {
        let mut now = from;
        for _ in 0..beats {
            now += interval;
            self.ledger.heartbeat(account, now).unwrap();
        }
        now
    }
}

pub fn key_for(label: &str) -> PublicKey {
    let mut bytes = [0u8; 32];
    bytes[..20].copy_from_slice(AccountId::from_label(label).as_bytes());
    bytes[31] = 1;
    PublicKey::new(bytes)
}
