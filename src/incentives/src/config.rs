//! Ledger parameters
//!
//! Every economic constant of the ledger lives here so deployments and tests
//! can tune them without touching the components. Defaults are the
//! production values.

use relaynet_core::{serde_amount, AccountId, Amount, TokenId, ONE_TOKEN};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::types::Tier;

/// Stake required to register a relay node (100 tokens)
pub const MIN_RELAY_STAKE: Amount = 100 * ONE_TOKEN;

/// Heartbeat gap after which a node counts as offline
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 300;

/// Upper bound on rewards distributed per cycle (100 tokens)
pub const DAILY_POOL_CAP: Amount = 100 * ONE_TOKEN;

/// Reward per 1000 relayed messages (0.001 token)
pub const BASE_REWARD_PER_1000_MSG: Amount = ONE_TOKEN / 1000;

pub const SLASH_PERCENTAGE: u8 = 10;
pub const MAX_VIOLATIONS: u32 = 5;
pub const VIOLATION_PENALTY: u8 = 5;
pub const SLASH_REPUTATION_PENALTY: u8 = 10;
pub const INITIAL_REPUTATION: u8 = 50;
pub const MAX_REPUTATION: u8 = 100;

/// Storage assumed for relay nodes registered before storage was tracked
pub const LEGACY_DEFAULT_STORAGE_MB: u64 = 50;

pub const MAX_DISPLAY_NAME_LEN: usize = 64;
pub const MAX_ENDPOINT_LEN: usize = 256;

/// Requirements and economics of one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRequirements {
    pub min_uptime_secs: u64,
    pub min_storage_mb: u64,
    /// Reward multiplier in hundredths (100 = 1.0x)
    pub reward_multiplier_bps: u32,
    /// Share of the daily pool cap reserved for this tier
    pub fee_pool_percent: u8,
}

/// Requirement table of all four tiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTable {
    pub bronze: TierRequirements,
    pub silver: TierRequirements,
    pub gold: TierRequirements,
    pub platinum: TierRequirements,
}

impl TierTable {
    pub fn get(&self, tier: Tier) -> &TierRequirements {
        match tier {
            Tier::Bronze => &self.bronze,
            Tier::Silver => &self.silver,
            Tier::Gold => &self.gold,
            Tier::Platinum => &self.platinum,
        }
    }

    fn validate(&self) -> Result<()> {
        let mut percent_total = 0u32;
        let mut previous: Option<(Tier, &TierRequirements)> = None;
        for tier in Tier::ALL {
            let req = self.get(tier);
            if let Some((lower, prev)) = previous {
                if req.min_uptime_secs < prev.min_uptime_secs
                    || req.min_storage_mb < prev.min_storage_mb
                {
                    return Err(LedgerError::InvalidConfig(format!(
                        "tier {} requirements must not be below tier {}",
                        tier, lower
                    )));
                }
            }
            if req.min_uptime_secs > relaynet_core::SECONDS_PER_DAY {
                return Err(LedgerError::InvalidConfig(format!(
                    "tier {} requires more uptime than a day holds",
                    tier
                )));
            }
            percent_total += req.fee_pool_percent as u32;
            previous = Some((tier, req));
        }
        if percent_total > 100 {
            return Err(LedgerError::InvalidConfig(format!(
                "tier fee-pool shares add up to {}%",
                percent_total
            )));
        }
        Ok(())
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            bronze: TierRequirements {
                min_uptime_secs: 3_600,
                min_storage_mb: 50,
                reward_multiplier_bps: 100,
                fee_pool_percent: 10,
            },
            silver: TierRequirements {
                min_uptime_secs: 14_400,
                min_storage_mb: 200,
                reward_multiplier_bps: 150,
                fee_pool_percent: 20,
            },
            gold: TierRequirements {
                min_uptime_secs: 43_200,
                min_storage_mb: 500,
                reward_multiplier_bps: 200,
                fee_pool_percent: 30,
            },
            platinum: TierRequirements {
                min_uptime_secs: 72_000,
                min_storage_mb: 1_000,
                reward_multiplier_bps: 300,
                fee_pool_percent: 40,
            },
        }
    }
}

/// Sliding window for violation reports per reporter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_reports: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_reports: 10,
            window_secs: 3_600,
        }
    }
}

/// Complete ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Governance account (privileged administration)
    pub governance: AccountId,

    /// Account allowed to report relayed-message volume
    pub relay_authority: AccountId,

    /// Custody account holding stake and the reward pool
    pub custody: AccountId,

    /// Asset used for stake and rewards
    pub token: TokenId,

    #[serde(with = "serde_amount")]
    pub min_relay_stake: Amount,

    #[serde(with = "serde_amount")]
    pub daily_pool_cap: Amount,

    #[serde(with = "serde_amount")]
    pub base_reward_per_1000_msg: Amount,

    pub heartbeat_timeout_secs: u64,
    pub slash_percentage: u8,
    pub max_violations: u32,
    pub violation_penalty: u8,
    pub slash_reputation_penalty: u8,
    pub initial_reputation: u8,
    pub max_reputation: u8,

    /// Unsettled violations at which a node is reported at risk
    pub at_risk_violations: u32,

    /// Score below which a node is reported at risk
    pub at_risk_score: u8,
    pub legacy_default_storage_mb: u64,
    pub max_display_name_len: usize,
    pub max_endpoint_len: usize,
    pub report_rate_limit: RateLimitConfig,
    pub tiers: TierTable,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            governance: AccountId::from_label("relaynet/governance"),
            relay_authority: AccountId::from_label("relaynet/relay-authority"),
            custody: AccountId::from_label("relaynet/custody"),
            token: TokenId::default(),
            min_relay_stake: MIN_RELAY_STAKE,
            daily_pool_cap: DAILY_POOL_CAP,
            base_reward_per_1000_msg: BASE_REWARD_PER_1000_MSG,
            heartbeat_timeout_secs: HEARTBEAT_TIMEOUT_SECS,
            slash_percentage: SLASH_PERCENTAGE,
            max_violations: MAX_VIOLATIONS,
            violation_penalty: VIOLATION_PENALTY,
            slash_reputation_penalty: SLASH_REPUTATION_PENALTY,
            initial_reputation: INITIAL_REPUTATION,
            max_reputation: MAX_REPUTATION,
            at_risk_violations: 3,
            at_risk_score: 30,
            legacy_default_storage_mb: LEGACY_DEFAULT_STORAGE_MB,
            max_display_name_len: MAX_DISPLAY_NAME_LEN,
            max_endpoint_len: MAX_ENDPOINT_LEN,
            report_rate_limit: RateLimitConfig::default(),
            tiers: TierTable::default(),
        }
    }
}

impl LedgerConfig {
    /// Reward paid for a single relayed message
    pub fn base_reward_per_message(&self) -> Amount {
        self.base_reward_per_1000_msg / 1000
    }

    /// Check parameter consistency
    pub fn validate(&self) -> Result<()> {
        if self.min_relay_stake == 0 {
            return Err(LedgerError::InvalidConfig("min_relay_stake must be positive".into()));
        }
        if self.heartbeat_timeout_secs == 0 {
            return Err(LedgerError::InvalidConfig(
                "heartbeat_timeout_secs must be positive".into(),
            ));
        }
        if self.slash_percentage == 0 || self.slash_percentage > 100 {
            return Err(LedgerError::InvalidConfig(format!(
                "slash_percentage must be within 1..=100, got {}",
                self.slash_percentage
            )));
        }
        if self.max_violations == 0 {
            return Err(LedgerError::InvalidConfig("max_violations must be positive".into()));
        }
        if self.max_reputation == 0 || self.initial_reputation > self.max_reputation {
            return Err(LedgerError::InvalidConfig(format!(
                "initial_reputation {} must not exceed max_reputation {}",
                self.initial_reputation, self.max_reputation
            )));
        }
        if self.report_rate_limit.max_reports == 0 || self.report_rate_limit.window_secs == 0 {
            return Err(LedgerError::InvalidConfig(
                "report_rate_limit needs a positive budget and window".into(),
            ));
        }
        if self.max_display_name_len == 0 || self.max_endpoint_len == 0 {
            return Err(LedgerError::InvalidConfig("length limits must be positive".into()));
        }
        if self.custody == self.governance || self.custody == self.relay_authority {
            return Err(LedgerError::InvalidConfig(
                "custody account must be distinct from privileged accounts".into(),
            ));
        }
        self.tiers.validate()
    }
}
