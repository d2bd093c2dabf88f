//! Persistent records and value types of the incentive ledger

use relaynet_core::{serde_amount, AccountId, Amount, MessageId, PublicKey, Timestamp, TokenId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Service tier of a relay node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    /// All tiers, lowest first
    pub const ALL: [Tier; 4] = [Tier::Bronze, Tier::Silver, Tier::Gold, Tier::Platinum];

    /// Evaluation order: highest tier first
    pub const DESCENDING: [Tier; 4] = [Tier::Platinum, Tier::Gold, Tier::Silver, Tier::Bronze];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
            Tier::Platinum => "platinum",
        }
    }

    /// Parse a case-insensitive tier name
    pub fn parse(name: &str) -> Option<Tier> {
        Tier::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(name))
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Bronze
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered participant identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub account: AccountId,
    pub public_key: PublicKey,
    pub display_name: String,
    pub registered_at: Timestamp,
    pub last_updated: Timestamp,
    pub active: bool,
}

/// Relay node operated by an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayNode {
    pub account: AccountId,
    pub endpoint: String,

    /// Stake currently held in custody for this node
    #[serde(with = "serde_amount")]
    pub staked_amount: Amount,
    pub registered_at: Timestamp,

    /// Lifetime relayed messages
    pub messages_relayed: u64,

    /// Lifetime rewards paid out (both channels)
    #[serde(with = "serde_amount")]
    pub rewards_earned: Amount,
    pub active: bool,

    /// Lifetime credited uptime
    pub total_uptime_seconds: u64,
    pub last_heartbeat: Timestamp,
    pub current_session_start: Timestamp,
    pub storage_capacity_mb: u64,

    /// Uptime credited within `last_day_index`, never above one day
    pub daily_uptime_seconds: u64,
    pub last_day_index: u64,

    /// Uptime credited within the day before `last_day_index`
    pub previous_day_uptime_seconds: u64,
    pub tier: Tier,

    /// Position in the active-node index
    pub active_seq: u64,

    /// Messages relayed since the last settled cycle
    pub cycle_messages: u64,

    /// Per-message rewards paid since the last settled cycle
    #[serde(with = "serde_amount")]
    pub cycle_relay_paid: Amount,

    /// Tier fee-pool entitlement awaiting `claim_fee_reward`
    #[serde(with = "serde_amount")]
    pub pending_fee_reward: Amount,
}

/// Reputation and violation bookkeeping of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub account: AccountId,
    pub score: u8,

    /// Lifetime violation reports
    pub violation_count: u32,

    /// Violations already answered by a slash
    pub settled_violations: u32,
    pub blacklisted: bool,
    pub slash_count: u32,
    #[serde(with = "serde_amount")]
    pub total_slashed: Amount,
    pub last_slash_at: Option<Timestamp>,
}

impl ReputationRecord {
    pub fn new(account: AccountId, score: u8) -> Self {
        Self {
            account,
            score,
            violation_count: 0,
            settled_violations: 0,
            blacklisted: false,
            slash_count: 0,
            total_slashed: 0,
            last_slash_at: None,
        }
    }

    /// Violations reported since the last slash
    pub fn unsettled_violations(&self) -> u32 {
        self.violation_count.saturating_sub(self.settled_violations)
    }
}

/// Derived security posture of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationStatus {
    Normal,
    AtRisk,
    Slashed,
    Blacklisted,
}

/// Ledger-wide counters and parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalState {
    /// Active identities
    pub total_users: u64,

    /// Active relay nodes
    pub total_relay_nodes: u64,
    #[serde(with = "serde_amount")]
    pub min_relay_stake: Amount,
    #[serde(with = "serde_amount")]
    pub daily_pool_cap: Amount,

    /// Sum of stake held in custody for active nodes
    #[serde(with = "serde_amount")]
    pub total_staked: Amount,

    /// Slashed and forfeited stake routed to the community fee pool
    #[serde(with = "serde_amount")]
    pub fee_pool_total: Amount,

    /// Settled but unclaimed tier fee-pool entitlements
    #[serde(with = "serde_amount")]
    pub pending_fee_total: Amount,
    pub total_messages_relayed: u64,
    #[serde(with = "serde_amount")]
    pub total_rewards_paid: Amount,
    pub next_active_seq: u64,
    pub last_settled_day: Option<u64>,
    pub asset_token: TokenId,
}

impl GlobalState {
    pub fn new(min_relay_stake: Amount, daily_pool_cap: Amount, asset_token: TokenId) -> Self {
        Self {
            total_users: 0,
            total_relay_nodes: 0,
            min_relay_stake,
            daily_pool_cap,
            total_staked: 0,
            fee_pool_total: 0,
            pending_fee_total: 0,
            total_messages_relayed: 0,
            total_rewards_paid: 0,
            next_active_seq: 0,
            last_settled_day: None,
            asset_token,
        }
    }
}

/// Recorded relayed message, kept for duplicate detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayedMessage {
    pub message_id: MessageId,
    pub relayer: AccountId,
    #[serde(with = "serde_amount")]
    pub reward_paid: Amount,
    pub recorded_at: Timestamp,
}

/// Tier evaluation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAssessment {
    pub tier: Tier,
    pub reward_multiplier_bps: u32,
    pub fee_pool_percent: u8,
}

/// Outcome of `heartbeat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatReceipt {
    pub credited_seconds: u64,
    pub daily_uptime_seconds: u64,
    pub total_uptime_seconds: u64,
    pub tier: Tier,
    pub previous_tier: Tier,
    pub day_rolled_over: bool,
}

/// Outcome of `record_relayed_message`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReceipt {
    pub message_id: MessageId,
    pub relayer: AccountId,
    #[serde(with = "serde_amount")]
    pub reward_paid: Amount,
    pub messages_relayed: u64,
}

/// Outcome of a slash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashOutcome {
    pub account: AccountId,
    #[serde(with = "serde_amount")]
    pub slashed_amount: Amount,
    #[serde(with = "serde_amount")]
    pub remaining_stake: Amount,
    pub force_deactivated: bool,
    #[serde(with = "serde_amount")]
    pub forfeited_amount: Amount,
}

/// Outcome of `report_violation`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationReceipt {
    pub target: AccountId,
    pub violation_count: u32,
    pub score: u8,
    pub slash: Option<SlashOutcome>,
}

/// Outcome of `blacklist_node`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistOutcome {
    pub account: AccountId,
    pub already_blacklisted: bool,
    pub relay_deactivated: bool,
    #[serde(with = "serde_amount")]
    pub forfeited_amount: Amount,
}

/// Security summary of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSecurityInfo {
    pub account: AccountId,
    pub score: u8,
    pub violation_count: u32,
    pub unsettled_violations: u32,
    pub slash_count: u32,
    #[serde(with = "serde_amount")]
    pub total_slashed: Amount,
    pub last_slash_at: Option<Timestamp>,
    pub blacklisted: bool,
    pub relay_active: bool,
    #[serde(with = "serde_amount")]
    pub staked_amount: Amount,
    pub status: ReputationStatus,
}

/// Rate-limit window status of a reporter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub account: AccountId,
    pub allowed: bool,
    pub remaining: u32,
    pub limit: u32,
    pub window_secs: u64,

    /// When the oldest report in the window expires
    pub resets_at: Option<Timestamp>,
}

/// Payout from one distribution channel to one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePayout {
    pub account: AccountId,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
}

/// Fee-pool settlement of one tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSettlement {
    pub tier: Tier,
    pub participants: usize,
    #[serde(with = "serde_amount")]
    pub tier_pool: Amount,
    #[serde(with = "serde_amount")]
    pub potential_per_node: Amount,
    #[serde(with = "serde_amount")]
    pub missed_total: Amount,
    #[serde(with = "serde_amount")]
    pub redistributed: Amount,
    pub entitlements: Vec<NodePayout>,
}

/// Result of a settled distribution cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub day: u64,
    pub participants: usize,
    pub relay_payouts: Vec<NodePayout>,
    #[serde(with = "serde_amount")]
    pub relay_paid_total: Amount,
    pub tiers: Vec<TierSettlement>,
    #[serde(with = "serde_amount")]
    pub fee_credited_total: Amount,
}

/// Network-wide statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub total_users: u64,
    pub total_relay_nodes: u64,
    pub online_relay_nodes: u64,
    #[serde(with = "serde_amount")]
    pub total_staked: Amount,
    #[serde(with = "serde_amount")]
    pub fee_pool_total: Amount,
    #[serde(with = "serde_amount")]
    pub pending_fee_total: Amount,
    #[serde(with = "serde_amount")]
    pub reward_pool_available: Amount,
    pub total_messages_relayed: u64,
    #[serde(with = "serde_amount")]
    pub total_rewards_paid: Amount,
    #[serde(with = "serde_amount")]
    pub min_relay_stake: Amount,
    #[serde(with = "serde_amount")]
    pub daily_pool_cap: Amount,
    pub last_settled_day: Option<u64>,
    pub asset_token: TokenId,
    pub nodes_per_tier: Vec<(Tier, u64)>,
    pub halted: bool,
}
