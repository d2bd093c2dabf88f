//! Relay node registration and lifecycle
//!
//! The registry owns each node's record. It pulls stake through the
//! [`StakeLedger`], feeds heartbeats to the [`UptimeTracker`] and asks the
//! [`ReputationGuard`] whether an account may relay at all.

use relaynet_core::{day_index, AccountId, Amount, Timestamp};
use tracing::{debug, info};

use crate::error::{LedgerError, Result};
use crate::events::LedgerEvent;
use crate::reputation_guard::ReputationGuard;
use crate::stake_ledger::StakeLedger;
use crate::tier::TierEngine;
use crate::transaction::Transaction;
use crate::types::{HeartbeatReceipt, RelayNode, Tier};
use crate::uptime::UptimeTracker;

#[derive(Debug, Clone)]
pub struct RelayNodeRegistry {
    uptime: UptimeTracker,
    stake: StakeLedger,
    max_endpoint_len: usize,
}

impl RelayNodeRegistry {
    pub fn new(uptime: UptimeTracker, stake: StakeLedger, max_endpoint_len: usize) -> Self {
        Self {
            uptime,
            stake,
            max_endpoint_len,
        }
    }

    pub fn uptime(&self) -> &UptimeTracker {
        &self.uptime
    }

    pub fn tiers(&self) -> &TierEngine {
        self.uptime.tiers()
    }

    fn validate_endpoint(&self, endpoint: &str) -> Result<String> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(LedgerError::InvalidEndpoint("endpoint must not be empty".into()));
        }
        if endpoint.len() > self.max_endpoint_len {
            return Err(LedgerError::InvalidEndpoint(format!(
                "{} bytes exceeds limit of {}",
                endpoint.len(),
                self.max_endpoint_len
            )));
        }
        if endpoint.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(LedgerError::InvalidEndpoint(format!(
                "endpoint {:?} contains whitespace",
                endpoint
            )));
        }
        Ok(endpoint.to_string())
    }

    fn require_active(&self, tx: &Transaction<'_>, account: &AccountId) -> Result<RelayNode> {
        tx.active_relay_node(account)?
            .ok_or(LedgerError::NotRelaying(*account))
    }

    fn emit_tier_change(tx: &mut Transaction<'_>, account: &AccountId, from: Tier, to: Tier, now: Timestamp) {
        if from != to {
            info!(account = %account, from = %from, to = %to, "Tier changed");
            tx.emit(LedgerEvent::TierChanged {
                account: *account,
                from,
                to,
                at: now,
            });
        }
    }

    /// Stake the current minimum and open a relay node
    pub fn register_as_relay(
        &self,
        tx: &mut Transaction<'_>,
        reputation: &ReputationGuard,
        account: &AccountId,
        endpoint: &str,
        storage_capacity_mb: u64,
        now: Timestamp,
    ) -> Result<RelayNode> {
        let endpoint = self.validate_endpoint(endpoint)?;
        if !tx.identity(account)?.map_or(false, |identity| identity.active) {
            return Err(LedgerError::IdentityRequired(*account));
        }
        if tx.active_relay_node(account)?.is_some() {
            return Err(LedgerError::AlreadyRelaying(*account));
        }
        reputation.ensure_not_blacklisted(tx, account)?;

        let stake = tx.globals()?.min_relay_stake;
        self.stake.deposit_stake(tx, account, stake)?;
        let mut globals = tx.globals()?;

        let node = RelayNode {
            account: *account,
            endpoint: endpoint.clone(),
            staked_amount: stake,
            registered_at: now,
            messages_relayed: 0,
            rewards_earned: 0,
            active: true,
            total_uptime_seconds: 0,
            last_heartbeat: now,
            current_session_start: now,
            storage_capacity_mb,
            daily_uptime_seconds: 0,
            last_day_index: day_index(now),
            previous_day_uptime_seconds: 0,
            tier: Tier::Bronze,
            active_seq: globals.next_active_seq,
            cycle_messages: 0,
            cycle_relay_paid: 0,
            pending_fee_reward: 0,
        };
        tx.put_relay_node(&node)?;
        tx.add_active(node.active_seq, account)?;

        globals.next_active_seq += 1;
        globals.total_relay_nodes += 1;
        tx.put_globals(&globals)?;

        reputation.ensure_record(tx, account)?;

        tx.emit(LedgerEvent::RelayRegistered {
            account: *account,
            endpoint,
            stake,
            storage_capacity_mb,
            at: now,
        });
        info!(
            account = %account,
            stake,
            storage_mb = storage_capacity_mb,
            "Relay node registered"
        );
        Ok(node)
    }

    pub fn heartbeat(
        &self,
        tx: &mut Transaction<'_>,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<HeartbeatReceipt> {
        let mut node = self.require_active(tx, account)?;
        let receipt = self.record_session(tx, &mut node, now);
        tx.put_relay_node(&node)?;

        debug!(
            account = %account,
            credited = receipt.credited_seconds,
            daily = receipt.daily_uptime_seconds,
            tier = %receipt.tier,
            "Heartbeat recorded"
        );
        Ok(receipt)
    }

    /// Credit uptime up to `now` and emit the matching events
    fn record_session(
        &self,
        tx: &mut Transaction<'_>,
        node: &mut RelayNode,
        now: Timestamp,
    ) -> HeartbeatReceipt {
        let receipt = self.uptime.record_heartbeat(node, now);
        tx.emit(LedgerEvent::HeartbeatReceived {
            account: node.account,
            daily_uptime_seconds: receipt.daily_uptime_seconds,
            total_uptime_seconds: receipt.total_uptime_seconds,
            tier: receipt.tier,
            at: now,
        });
        Self::emit_tier_change(tx, &node.account, receipt.previous_tier, receipt.tier, now);
        receipt
    }

    pub fn update_storage(
        &self,
        tx: &mut Transaction<'_>,
        account: &AccountId,
        storage_capacity_mb: u64,
        now: Timestamp,
    ) -> Result<RelayNode> {
        let mut node = self.require_active(tx, account)?;
        let previous_tier = node.tier;
        node.storage_capacity_mb = storage_capacity_mb;
        node.tier = self.uptime.current_tier(&node, now);
        tx.put_relay_node(&node)?;

        tx.emit(LedgerEvent::StorageUpdated {
            account: *account,
            storage_capacity_mb,
            tier: node.tier,
            at: now,
        });
        Self::emit_tier_change(tx, account, previous_tier, node.tier, now);
        Ok(node)
    }

    pub fn update_endpoint(
        &self,
        tx: &mut Transaction<'_>,
        account: &AccountId,
        endpoint: &str,
        now: Timestamp,
    ) -> Result<RelayNode> {
        let endpoint = self.validate_endpoint(endpoint)?;
        let mut node = self.require_active(tx, account)?;
        let previous_tier = node.tier;
        node.endpoint = endpoint.clone();
        node.tier = self.uptime.current_tier(&node, now);
        tx.put_relay_node(&node)?;

        tx.emit(LedgerEvent::EndpointUpdated {
            account: *account,
            endpoint,
            at: now,
        });
        Self::emit_tier_change(tx, account, previous_tier, node.tier, now);
        Ok(node)
    }

    /// Take the node out of the active set and drop unclaimed fee entitlements
    fn detach(&self, tx: &mut Transaction<'_>, node: &mut RelayNode) -> Result<()> {
        node.active = false;
        tx.remove_active(node.active_seq);

        let mut globals = tx.globals()?;
        globals.total_relay_nodes = globals.total_relay_nodes.saturating_sub(1);
        globals.pending_fee_total = globals
            .pending_fee_total
            .saturating_sub(node.pending_fee_reward);
        tx.put_globals(&globals)?;

        if node.pending_fee_reward > 0 {
            info!(
                account = %node.account,
                forfeited = node.pending_fee_reward,
                "Unclaimed fee reward dropped on deactivation"
            );
        }
        node.pending_fee_reward = 0;
        Ok(())
    }

    /// Voluntary exit: close the uptime session and return the full stake
    pub fn deactivate_relay(
        &self,
        tx: &mut Transaction<'_>,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<Amount> {
        let mut node = self.require_active(tx, account)?;
        self.record_session(tx, &mut node, now);

        let stake = node.staked_amount;
        node.staked_amount = 0;
        self.detach(tx, &mut node)?;
        self.stake.return_stake(tx, account, stake)?;
        tx.put_relay_node(&node)?;

        tx.emit(LedgerEvent::RelayDeactivated {
            account: *account,
            stake_returned: stake,
            forced: false,
            at: now,
        });
        info!(account = %account, returned = stake, "Relay node deactivated");
        Ok(stake)
    }

    /// Forced exit after slashing or blacklisting; the remaining stake is
    /// forfeited to the fee pool. Returns the forfeited amount.
    pub fn force_deactivate(
        &self,
        tx: &mut Transaction<'_>,
        node: &mut RelayNode,
        now: Timestamp,
    ) -> Result<Amount> {
        let forfeited = self.stake.forfeit(tx, node)?;
        self.detach(tx, node)?;
        tx.put_relay_node(node)?;

        tx.emit(LedgerEvent::RelayDeactivated {
            account: node.account,
            stake_returned: 0,
            forced: true,
            at: now,
        });
        info!(account = %node.account, forfeited, "Relay node force-deactivated");
        Ok(forfeited)
    }

    /// Active relay accounts in registration order
    pub fn active_nodes(&self, tx: &Transaction<'_>) -> Result<Vec<AccountId>> {
        tx.active_accounts()
    }

    pub fn is_online(&self, tx: &Transaction<'_>, account: &AccountId, now: Timestamp) -> Result<bool> {
        Ok(tx
            .relay_node(account)?
            .map_or(false, |node| self.uptime.is_online(&node, now)))
    }
}
