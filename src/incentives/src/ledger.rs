//! The incentive ledger
//!
//! [`IncentiveLedger`] is the single-writer state machine behind every
//! operation. Each mutating call runs against one [`Transaction`]. On
//! commit the staged pulls into custody execute first, then the record batch
//! is applied, then the payouts leave custody. A failure at any step undoes
//! the earlier ones, so any error leaves both the store and the asset ledger
//! as they were.
//!
//! A fatal error (custody unable to return stake, or a transfer that cannot
//! be reversed) halts the ledger: from then on every mutation fails with
//! `LedgerHalted` while queries keep answering.

use relaynet_core::{
    day_index, AccountId, Amount, AssetError, AssetLedger, AssetSnapshot, InMemoryAssetLedger, MessageId, PublicKey,
    Timestamp, TokenId,
};
use tracing::{debug, error, info, warn};

use crate::config::{LedgerConfig, TierRequirements};
use crate::error::{LedgerError, Result};
use crate::events::LedgerEvent;
use crate::guard::ReentrancyGuard;
use crate::identity::IdentityStore;
use crate::rate_limit::RateLimiter;
use crate::registry::RelayNodeRegistry;
use crate::reputation_guard::ReputationGuard;
use crate::reward_distributor::RewardDistributor;
use crate::stake_ledger::StakeLedger;
use crate::store::{encode, keys, migrate, BatchOp, KvBackend, MemoryBackend};
use crate::tier::TierEngine;
use crate::transaction::{StagedChanges, StagedTransfer, Transaction, TransferKind};
use crate::types::{
    BlacklistOutcome, CycleReport, GlobalState, HeartbeatReceipt, Identity, NetworkStats,
    NodeSecurityInfo, RateLimitStatus, RelayNode, RelayReceipt, ReputationRecord, SlashOutcome,
    Tier, ViolationReceipt,
};
use crate::uptime::UptimeTracker;

/// The ledger components, wired from one configuration
#[derive(Debug, Clone)]
pub struct Components {
    pub identities: IdentityStore,
    pub stake: StakeLedger,
    pub registry: RelayNodeRegistry,
    pub rewards: RewardDistributor,
    pub reputation: ReputationGuard,
}

impl Components {
    pub fn new(config: &LedgerConfig) -> Self {
        let tiers = TierEngine::new(config.tiers.clone());
        let stake = StakeLedger::new(config.slash_percentage);
        let uptime = UptimeTracker::new(config.heartbeat_timeout_secs, tiers.clone());
        Self {
            identities: IdentityStore::new(config.max_display_name_len),
            registry: RelayNodeRegistry::new(uptime, stake.clone(), config.max_endpoint_len),
            rewards: RewardDistributor::new(config.base_reward_per_1000_msg, tiers, stake.clone()),
            reputation: ReputationGuard::new(config, stake.clone()),
            stake,
        }
    }

    pub fn tiers(&self) -> &TierEngine {
        self.registry.tiers()
    }
}

pub struct IncentiveLedger<A: AssetLedger = InMemoryAssetLedger> {
    config: LedgerConfig,
    kv: Box<dyn KvBackend>,
    assets: A,
    token: TokenId,
    components: Components,
    rate_limiter: RateLimiter,
    guard: ReentrancyGuard,
    events: Vec<LedgerEvent>,
    halted: Option<String>,
    persist_assets: bool,
}

impl IncentiveLedger<InMemoryAssetLedger> {
    /// Ledger over an in-memory store and asset ledger
    pub fn in_memory(config: LedgerConfig) -> Result<Self> {
        Self::open(Box::new(MemoryBackend::new()), InMemoryAssetLedger::new(), config)
    }
}

impl<A: AssetLedger> IncentiveLedger<A> {
    /// Validate the configuration, migrate the store and load the ledger
    pub fn open(mut kv: Box<dyn KvBackend>, assets: A, config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let found = migrate(kv.as_mut(), &config)?;

        let token = {
            let tx = Transaction::new(kv.as_ref(), &assets, config.token.clone(), config.custody);
            tx.globals()?.asset_token
        };

        info!(
            schema_version = found,
            token = %token,
            custody = %config.custody,
            "Incentive ledger opened"
        );

        Ok(Self {
            rate_limiter: RateLimiter::new(config.report_rate_limit.clone()),
            components: Components::new(&config),
            guard: ReentrancyGuard::new(),
            events: Vec::new(),
            halted: None,
            persist_assets: false,
            config,
            kv,
            assets,
            token,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn assets(&self) -> &A {
        &self.assets
    }

    /// Direct access to the asset ledger, for funding and approvals outside
    /// the incentive flows
    pub fn assets_mut(&mut self) -> &mut A {
        &mut self.assets
    }

    pub fn token(&self) -> &TokenId {
        &self.token
    }

    pub fn reentrancy_guard(&self) -> &ReentrancyGuard {
        &self.guard
    }

    /// Reason the ledger halted, if it did
    pub fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    /// Events committed since the last drain
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn flush(&self) -> Result<()> {
        self.kv.flush()
    }

    /// Asset state stored with the records, if any was
    pub fn persisted_assets(&self) -> Result<Option<AssetSnapshot>> {
        self.read().get(keys::ASSETS)
    }

    /// Store the asset ledger's state now and with every later commit, so
    /// balances and records can only change together.
    ///
    /// Changes made through [`assets_mut`](Self::assets_mut) afterwards are
    /// picked up by the next commit.
    pub fn persist_assets(&mut self) -> Result<()> {
        let snapshot = self.assets.export_state().ok_or_else(|| {
            LedgerError::Storage("asset ledger does not export its state".into())
        })?;
        self.kv
            .apply(vec![BatchOp::Put(keys::ASSETS.to_vec(), encode(&snapshot)?)])?;
        self.persist_assets = true;
        Ok(())
    }

    // ---- execution ----

    fn read(&self) -> Transaction<'_> {
        Transaction::new(self.kv.as_ref(), &self.assets, self.token.clone(), self.config.custody)
    }

    fn execute<R>(
        &mut self,
        operation: &'static str,
        guarded: Option<AccountId>,
        f: impl FnOnce(&Components, &mut Transaction<'_>) -> Result<R>,
    ) -> Result<R> {
        if let Some(reason) = &self.halted {
            return Err(LedgerError::LedgerHalted(reason.clone()));
        }
        let _ticket = match guarded {
            Some(account) => Some(self.guard.enter(account, operation)?),
            None => None,
        };

        let staged = {
            let mut tx = Transaction::new(
                self.kv.as_ref(),
                &self.assets,
                self.token.clone(),
                self.config.custody,
            );
            f(&self.components, &mut tx).map(|value| (value, tx.into_staged()))
        };

        let outcome = match staged {
            Ok((value, changes)) => self.commit(changes).map(|()| value),
            Err(err) => Err(err),
        };

        if let Err(err) = &outcome {
            if err.is_fatal() {
                self.halt(operation, err);
            } else {
                debug!(operation, error = %err, kind = err.kind().as_str(), "Operation rejected");
            }
        }
        outcome
    }

    fn commit(&mut self, changes: StagedChanges) -> Result<()> {
        let StagedChanges {
            writes,
            transfers,
            events,
        } = changes;
        let (pulls, payouts): (Vec<StagedTransfer>, Vec<StagedTransfer>) =
            transfers.into_iter().partition(|t| t.kind.is_pull());

        // Pulls only raise custody, so running them first never starves a payout
        let mut pulled: Vec<&StagedTransfer> = Vec::new();
        for transfer in &pulls {
            if let Err(err) = self.assets.transfer_from(
                &self.token,
                &self.config.custody,
                &transfer.from,
                &transfer.to,
                transfer.amount,
            ) {
                self.reverse_pulls(&pulled)?;
                return Err(LedgerError::TransferFailed(err));
            }
            pulled.push(transfer);
        }

        let mut writes = writes;
        match self.projected_assets(&payouts) {
            Ok(Some(op)) => writes.push(op),
            Ok(None) => {}
            Err(err) => {
                self.reverse_pulls(&pulled)?;
                return Err(err);
            }
        }

        let undo = match self.undo_batch(&writes) {
            Ok(undo) => undo,
            Err(err) => {
                self.reverse_pulls(&pulled)?;
                return Err(err);
            }
        };
        if let Err(err) = self.kv.apply(writes) {
            error!(error = %err, "Failed to persist ledger batch, reversing transfers");
            self.reverse_pulls(&pulled)?;
            return Err(err);
        }

        // Payouts were checked against staged custody balances; one failing
        // here means the asset ledger disagrees with the books
        for (index, transfer) in payouts.iter().enumerate() {
            let Err(err) = self
                .assets
                .transfer(&self.token, &transfer.from, &transfer.to, transfer.amount)
            else {
                continue;
            };

            let mapped = self.payout_error(transfer, err);
            if index > 0 {
                return Err(LedgerError::LedgerHalted(format!(
                    "payout of {} to {} failed after {} earlier payouts: {}",
                    transfer.amount, transfer.to, index, mapped
                )));
            }
            if let Err(restore) = self.kv.apply(undo) {
                return Err(LedgerError::LedgerHalted(format!(
                    "could not restore records after {}: {}",
                    mapped, restore
                )));
            }
            self.reverse_pulls(&pulled)?;
            return Err(mapped);
        }

        self.events.extend(events);
        Ok(())
    }

    fn payout_error(&self, transfer: &StagedTransfer, err: AssetError) -> LedgerError {
        match transfer.kind {
            TransferKind::StakeReturn => LedgerError::CustodyInsolvent {
                account: transfer.to,
                available: self.assets.balance_of(&self.token, &self.config.custody),
                requested: transfer.amount,
            },
            _ => LedgerError::TransferFailed(err),
        }
    }

    /// Asset state as it will be once `payouts` have run, as a store write
    fn projected_assets(&self, payouts: &[StagedTransfer]) -> Result<Option<BatchOp>> {
        if !self.persist_assets {
            return Ok(None);
        }
        let Some(snapshot) = self.assets.export_state() else {
            return Ok(None);
        };

        let mut projected = InMemoryAssetLedger::from_snapshot(snapshot);
        for transfer in payouts {
            projected
                .transfer(&self.token, &transfer.from, &transfer.to, transfer.amount)
                .map_err(|err| self.payout_error(transfer, err))?;
        }
        Ok(Some(BatchOp::Put(
            keys::ASSETS.to_vec(),
            encode(&projected.snapshot())?,
        )))
    }

    /// Batch restoring the current values of every key `writes` touches
    fn undo_batch(&self, writes: &[BatchOp]) -> Result<Vec<BatchOp>> {
        writes
            .iter()
            .map(|op| {
                let key = match op {
                    BatchOp::Put(key, _) | BatchOp::Delete(key) => key,
                };
                Ok(match self.kv.get(key)? {
                    Some(previous) => BatchOp::Put(key.clone(), previous),
                    None => BatchOp::Delete(key.clone()),
                })
            })
            .collect()
    }

    /// Hand pulled funds back to their owners, newest first
    fn reverse_pulls(&mut self, executed: &[&StagedTransfer]) -> Result<()> {
        for transfer in executed.iter().rev() {
            if let Err(err) =
                self.assets
                    .transfer(&self.token, &transfer.to, &transfer.from, transfer.amount)
            {
                return Err(LedgerError::LedgerHalted(format!(
                    "could not reverse transfer of {} from {} to {}: {}",
                    transfer.amount, transfer.from, transfer.to, err
                )));
            }
        }
        Ok(())
    }

    fn halt(&mut self, operation: &'static str, err: &LedgerError) {
        error!(operation, error = %err, "Fatal invariant violation, halting ledger");
        if self.halted.is_none() {
            self.halted = Some(format!("{} failed: {}", operation, err));
        }
    }

    fn authorize(&self, caller: &AccountId, allowed: &[AccountId], operation: &'static str) -> Result<()> {
        if allowed.contains(caller) {
            return Ok(());
        }
        warn!(caller = %caller, operation, "Unauthorized privileged call");
        Err(LedgerError::Unauthorized {
            caller: *caller,
            operation,
        })
    }

    // ---- identity ----

    pub fn register(
        &mut self,
        caller: AccountId,
        public_key: PublicKey,
        display_name: &str,
        now: Timestamp,
    ) -> Result<Identity> {
        self.execute("register", None, |c, tx| {
            c.identities.register(tx, &caller, public_key, display_name, now)
        })
    }

    pub fn rotate_key(&mut self, caller: AccountId, new_key: PublicKey, now: Timestamp) -> Result<Identity> {
        self.execute("rotate_key", None, |c, tx| {
            c.identities.rotate_key(tx, &caller, new_key, now)
        })
    }

    pub fn update_display_name(&mut self, caller: AccountId, name: &str, now: Timestamp) -> Result<Identity> {
        self.execute("update_display_name", None, |c, tx| {
            c.identities.update_display_name(tx, &caller, name, now)
        })
    }

    pub fn deactivate(&mut self, caller: AccountId, now: Timestamp) -> Result<()> {
        self.execute("deactivate", None, |c, tx| c.identities.deactivate(tx, &caller, now))
    }

    // ---- relay nodes ----

    pub fn register_as_relay(
        &mut self,
        caller: AccountId,
        endpoint: &str,
        storage_capacity_mb: u64,
        now: Timestamp,
    ) -> Result<RelayNode> {
        self.execute("register_as_relay", Some(caller), |c, tx| {
            c.registry
                .register_as_relay(tx, &c.reputation, &caller, endpoint, storage_capacity_mb, now)
        })
    }

    /// Registration form predating storage declarations
    pub fn register_as_relay_legacy(
        &mut self,
        caller: AccountId,
        endpoint: &str,
        now: Timestamp,
    ) -> Result<RelayNode> {
        let storage = self.config.legacy_default_storage_mb;
        self.register_as_relay(caller, endpoint, storage, now)
    }

    pub fn heartbeat(&mut self, caller: AccountId, now: Timestamp) -> Result<HeartbeatReceipt> {
        self.execute("heartbeat", None, |c, tx| c.registry.heartbeat(tx, &caller, now))
    }

    pub fn update_storage(
        &mut self,
        caller: AccountId,
        storage_capacity_mb: u64,
        now: Timestamp,
    ) -> Result<RelayNode> {
        self.execute("update_storage", None, |c, tx| {
            c.registry.update_storage(tx, &caller, storage_capacity_mb, now)
        })
    }

    pub fn update_endpoint(&mut self, caller: AccountId, endpoint: &str, now: Timestamp) -> Result<RelayNode> {
        self.execute("update_endpoint", None, |c, tx| {
            c.registry.update_endpoint(tx, &caller, endpoint, now)
        })
    }

    /// Returns the stake paid back
    pub fn deactivate_relay(&mut self, caller: AccountId, now: Timestamp) -> Result<Amount> {
        self.execute("deactivate_relay", Some(caller), |c, tx| {
            c.registry.deactivate_relay(tx, &caller, now)
        })
    }

    // ---- rewards ----

    pub fn claim_fee_reward(&mut self, caller: AccountId, now: Timestamp) -> Result<Amount> {
        self.execute("claim_fee_reward", Some(caller), |c, tx| {
            c.rewards.claim_fee_reward(tx, &c.registry, &caller, now)
        })
    }

    pub fn record_relayed_message(
        &mut self,
        caller: AccountId,
        relayer: AccountId,
        message_id: MessageId,
        base_reward: Amount,
        now: Timestamp,
    ) -> Result<RelayReceipt> {
        self.authorize(&caller, &[self.config.relay_authority], "record relayed messages")?;
        self.execute("record_relayed_message", Some(relayer), |c, tx| {
            c.rewards
                .record_relayed_message(tx, &relayer, message_id, base_reward, now)
        })
    }

    /// Settle the cycle of the day `now` falls in
    pub fn settle_cycle(&mut self, caller: AccountId, now: Timestamp) -> Result<CycleReport> {
        self.settle_day(caller, day_index(now), now)
    }

    /// Settle the cycle of `day`, which may also be the day before `now`
    pub fn settle_day(&mut self, caller: AccountId, day: u64, now: Timestamp) -> Result<CycleReport> {
        self.authorize(
            &caller,
            &[self.config.governance, self.config.relay_authority],
            "settle distribution cycles",
        )?;
        self.execute("settle_cycle", None, |c, tx| {
            c.rewards.settle_cycle(tx, &c.registry, day, now)
        })
    }

    /// Top up the reward pool from the caller's allowance
    pub fn fund_reward_pool(&mut self, caller: AccountId, amount: Amount, now: Timestamp) -> Result<()> {
        self.execute("fund_reward_pool", Some(caller), |c, tx| {
            c.stake.fund_reward_pool(tx, &caller, amount)?;
            tx.emit(LedgerEvent::RewardPoolFunded {
                from: caller,
                amount,
                at: now,
            });
            Ok(())
        })
    }

    // ---- reputation ----

    pub fn report_violation(
        &mut self,
        caller: AccountId,
        target: AccountId,
        reason: &str,
        now: Timestamp,
    ) -> Result<ViolationReceipt> {
        let window = self.rate_limiter.check(&caller, now);
        if !window.allowed {
            warn!(reporter = %caller, "Violation report rate limited");
            return Err(LedgerError::RateLimited {
                account: caller,
                retry_after: window.resets_at.unwrap_or(now),
            });
        }

        let receipt = self.execute("report_violation", Some(target), |c, tx| {
            c.reputation
                .report_violation(tx, &c.registry, &caller, &target, reason, now)
        })?;

        self.rate_limiter.prune(now);
        self.rate_limiter.record(&caller, now);
        Ok(receipt)
    }

    pub fn slash_node(
        &mut self,
        caller: AccountId,
        target: AccountId,
        reason: &str,
        now: Timestamp,
    ) -> Result<SlashOutcome> {
        self.authorize(&caller, &[self.config.governance], "slash nodes")?;
        self.execute("slash_node", Some(target), |c, tx| {
            c.reputation.slash_node(tx, &c.registry, &target, reason, now)
        })
    }

    pub fn blacklist_node(
        &mut self,
        caller: AccountId,
        target: AccountId,
        reason: &str,
        now: Timestamp,
    ) -> Result<BlacklistOutcome> {
        self.authorize(&caller, &[self.config.governance], "blacklist nodes")?;
        self.execute("blacklist_node", Some(target), |c, tx| {
            c.reputation.blacklist_node(tx, &c.registry, &target, reason, now)
        })
    }

    pub fn increase_reputation(&mut self, caller: AccountId, target: AccountId, now: Timestamp) -> Result<u8> {
        self.authorize(&caller, &[self.config.governance], "increase reputation")?;
        self.execute("increase_reputation", None, |c, tx| {
            c.reputation.increase_reputation(tx, &target, now)
        })
    }

    // ---- governance ----

    pub fn set_min_relay_stake(&mut self, caller: AccountId, amount: Amount, now: Timestamp) -> Result<()> {
        self.authorize(&caller, &[self.config.governance], "set the minimum relay stake")?;
        if amount == 0 {
            return Err(LedgerError::InvalidAmount("minimum relay stake must be positive".into()));
        }
        self.execute("set_min_relay_stake", None, |_, tx| {
            let mut globals = tx.globals()?;
            let previous = globals.min_relay_stake;
            globals.min_relay_stake = amount;
            tx.put_globals(&globals)?;
            tx.emit(LedgerEvent::MinRelayStakeUpdated {
                previous,
                current: amount,
                at: now,
            });
            Ok(())
        })?;
        info!(amount, "Minimum relay stake updated");
        Ok(())
    }

    /// Withdraw custody funds backing neither stake nor pending entitlements
    pub fn withdraw_excess(
        &mut self,
        caller: AccountId,
        to: AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<()> {
        self.authorize(&caller, &[self.config.governance], "withdraw excess funds")?;
        let custody = self.config.custody;
        self.execute("withdraw_excess", Some(custody), |c, tx| {
            c.stake.withdraw_excess(tx, &to, amount)?;
            tx.emit(LedgerEvent::ExcessWithdrawn { to, amount, at: now });
            Ok(())
        })?;
        info!(to = %to, amount, "Excess custody funds withdrawn");
        Ok(())
    }

    /// Switch the stake/reward asset; only while no stake is outstanding
    pub fn set_asset_token(&mut self, caller: AccountId, token: TokenId, now: Timestamp) -> Result<()> {
        self.authorize(&caller, &[self.config.governance], "change the asset token")?;
        let next = token.clone();
        self.execute("set_asset_token", None, move |_, tx| {
            let mut globals = tx.globals()?;
            if globals.total_staked > 0 {
                return Err(LedgerError::StakeOutstanding(globals.total_staked));
            }
            let previous = std::mem::replace(&mut globals.asset_token, next.clone());
            tx.put_globals(&globals)?;
            tx.emit(LedgerEvent::AssetTokenUpdated {
                previous,
                current: next,
                at: now,
            });
            Ok(())
        })?;
        info!(token = %token, "Asset token updated");
        self.token = token;
        Ok(())
    }

    // ---- queries ----

    pub fn is_registered(&self, account: &AccountId) -> Result<bool> {
        self.components.identities.is_registered(&self.read(), account)
    }

    pub fn get_identity(&self, account: &AccountId) -> Result<Option<Identity>> {
        self.read().identity(account)
    }

    pub fn get_active_relay_nodes(&self) -> Result<Vec<AccountId>> {
        self.components.registry.active_nodes(&self.read())
    }

    pub fn get_relay_node(&self, account: &AccountId) -> Result<Option<RelayNode>> {
        self.read().relay_node(account)
    }

    pub fn get_tier_requirements(&self, tier: Tier) -> TierRequirements {
        self.components.tiers().requirements(tier)
    }

    /// Multiplier of the node's current tier; 0 without an active node
    pub fn get_reward_multiplier(&self, account: &AccountId) -> Result<u32> {
        Ok(self
            .read()
            .active_relay_node(account)?
            .map_or(0, |node| self.components.tiers().reward_multiplier(node.tier)))
    }

    pub fn is_node_online(&self, account: &AccountId, now: Timestamp) -> Result<bool> {
        self.components.registry.is_online(&self.read(), account, now)
    }

    pub fn get_reputation(&self, account: &AccountId) -> Result<Option<ReputationRecord>> {
        self.read().reputation(account)
    }

    pub fn get_node_security_info(&self, account: &AccountId) -> Result<NodeSecurityInfo> {
        self.components.reputation.security_info(&self.read(), account)
    }

    pub fn check_rate_limit(&self, account: &AccountId, now: Timestamp) -> RateLimitStatus {
        self.rate_limiter.check(account, now)
    }

    pub fn global_state(&self) -> Result<GlobalState> {
        self.read().globals()
    }

    pub fn network_stats(&self, now: Timestamp) -> Result<NetworkStats> {
        let tx = self.read();
        let globals = tx.globals()?;

        let mut online = 0u64;
        let mut per_tier = [0u64; 4];
        for account in tx.active_accounts()? {
            if let Some(node) = tx.active_relay_node(&account)? {
                if self.components.registry.uptime().is_online(&node, now) {
                    online += 1;
                }
                per_tier[node.tier as usize] += 1;
            }
        }

        Ok(NetworkStats {
            total_users: globals.total_users,
            total_relay_nodes: globals.total_relay_nodes,
            online_relay_nodes: online,
            total_staked: globals.total_staked,
            fee_pool_total: globals.fee_pool_total,
            pending_fee_total: globals.pending_fee_total,
            reward_pool_available: self.components.stake.spendable_rewards(&tx, &globals),
            total_messages_relayed: globals.total_messages_relayed,
            total_rewards_paid: globals.total_rewards_paid,
            min_relay_stake: globals.min_relay_stake,
            daily_pool_cap: globals.daily_pool_cap,
            last_settled_day: globals.last_settled_day,
            asset_token: globals.asset_token.clone(),
            nodes_per_tier: Tier::ALL
                .iter()
                .map(|tier| (*tier, per_tier[*tier as usize]))
                .collect(),
            halted: self.halted.is_some(),
        })
    }
}
