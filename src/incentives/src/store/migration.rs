//! Schema versioning
//!
//! `migrate` runs every time a ledger is opened. A fresh store is seeded with
//! the initial global state; older stores are upgraded in one atomic batch.
//!
//! Version history:
//! - 1: relay nodes without storage capacity, daily uptime or tier
//! - 2: storage-aware tiers, daily uptime and per-cycle reward counters
//! - 3: previous-day uptime retained for late cycle settlement

use relaynet_core::{day_index, AccountId, Amount, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{decode, encode, keys, BatchOp, KvBackend};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::tier::TierEngine;
use crate::types::{GlobalState, RelayNode, Tier};

pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Relay node record as written by schema version 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayNodeV1 {
    pub account: AccountId,
    pub endpoint: String,
    pub staked_amount: Amount,
    pub registered_at: Timestamp,
    pub messages_relayed: u64,
    pub rewards_earned: Amount,
    pub active: bool,
    pub total_uptime_seconds: u64,
    pub last_heartbeat: Timestamp,
    pub current_session_start: Timestamp,
    pub active_seq: u64,
}

impl RelayNodeV1 {
    fn upgrade(self, storage_capacity_mb: u64, tiers: &TierEngine) -> RelayNode {
        RelayNode {
            account: self.account,
            endpoint: self.endpoint,
            staked_amount: self.staked_amount,
            registered_at: self.registered_at,
            messages_relayed: self.messages_relayed,
            rewards_earned: self.rewards_earned,
            active: self.active,
            total_uptime_seconds: self.total_uptime_seconds,
            last_heartbeat: self.last_heartbeat,
            current_session_start: self.current_session_start,
            storage_capacity_mb,
            daily_uptime_seconds: 0,
            last_day_index: day_index(self.last_heartbeat),
            previous_day_uptime_seconds: 0,
            tier: tiers.compute_tier(0, storage_capacity_mb),
            active_seq: self.active_seq,
            cycle_messages: 0,
            cycle_relay_paid: 0,
            pending_fee_reward: 0,
        }
    }
}

/// Relay node record as written by schema version 2
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayNodeV2 {
    pub account: AccountId,
    pub endpoint: String,
    pub staked_amount: Amount,
    pub registered_at: Timestamp,
    pub messages_relayed: u64,
    pub rewards_earned: Amount,
    pub active: bool,
    pub total_uptime_seconds: u64,
    pub last_heartbeat: Timestamp,
    pub current_session_start: Timestamp,
    pub storage_capacity_mb: u64,
    pub daily_uptime_seconds: u64,
    pub last_day_index: u64,
    pub tier: Tier,
    pub active_seq: u64,
    pub cycle_messages: u64,
    pub cycle_relay_paid: Amount,
    pub pending_fee_reward: Amount,
}

impl From<RelayNodeV2> for RelayNode {
    fn from(node: RelayNodeV2) -> Self {
        RelayNode {
            account: node.account,
            endpoint: node.endpoint,
            staked_amount: node.staked_amount,
            registered_at: node.registered_at,
            messages_relayed: node.messages_relayed,
            rewards_earned: node.rewards_earned,
            active: node.active,
            total_uptime_seconds: node.total_uptime_seconds,
            last_heartbeat: node.last_heartbeat,
            current_session_start: node.current_session_start,
            storage_capacity_mb: node.storage_capacity_mb,
            daily_uptime_seconds: node.daily_uptime_seconds,
            last_day_index: node.last_day_index,
            previous_day_uptime_seconds: 0,
            tier: node.tier,
            active_seq: node.active_seq,
            cycle_messages: node.cycle_messages,
            cycle_relay_paid: node.cycle_relay_paid,
            pending_fee_reward: node.pending_fee_reward,
        }
    }
}

/// Bring the store to `CURRENT_SCHEMA_VERSION`, returning the version found
pub fn migrate(kv: &mut dyn KvBackend, config: &LedgerConfig) -> Result<u32> {
    let stored = match kv.get(keys::SCHEMA_VERSION)? {
        Some(bytes) => Some(decode::<u32>(&bytes)?),
        None => None,
    };
    let has_globals = kv.get(keys::GLOBALS)?.is_some();

    let found = match (stored, has_globals) {
        (Some(version), _) => version,
        // Version 1 stores predate the version key
        (None, true) => 1,
        (None, false) => {
            let globals = GlobalState::new(
                config.min_relay_stake,
                config.daily_pool_cap,
                config.token.clone(),
            );
            kv.apply(vec![
                BatchOp::Put(keys::GLOBALS.to_vec(), encode(&globals)?),
                BatchOp::Put(keys::SCHEMA_VERSION.to_vec(), encode(&CURRENT_SCHEMA_VERSION)?),
            ])?;
            info!(version = CURRENT_SCHEMA_VERSION, "Initialized empty ledger store");
            return Ok(CURRENT_SCHEMA_VERSION);
        }
    };

    if found > CURRENT_SCHEMA_VERSION {
        return Err(LedgerError::UnsupportedSchema {
            found,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if found < CURRENT_SCHEMA_VERSION {
        let tiers = TierEngine::new(config.tiers.clone());
        let mut batch = Vec::new();
        for (key, bytes) in kv.scan_prefix(keys::NODE_PREFIX.as_bytes())? {
            let upgraded = if found == 1 {
                decode::<RelayNodeV1>(&bytes)?.upgrade(config.legacy_default_storage_mb, &tiers)
            } else {
                RelayNode::from(decode::<RelayNodeV2>(&bytes)?)
            };
            batch.push(BatchOp::Put(key, encode(&upgraded)?));
        }
        let upgraded_nodes = batch.len();
        batch.push(BatchOp::Put(
            keys::SCHEMA_VERSION.to_vec(),
            encode(&CURRENT_SCHEMA_VERSION)?,
        ));
        kv.apply(batch)?;

        info!(
            from = found,
            to = CURRENT_SCHEMA_VERSION,
            upgraded_nodes,
            "Migrated ledger schema"
        );
    }

    Ok(found)
}
