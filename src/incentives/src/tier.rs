//! Tier evaluation
//!
//! A node holds the highest tier whose uptime *and* storage thresholds it
//! meets. Tables are evaluated Platinum first; Bronze is the floor.

use crate::config::{TierRequirements, TierTable};
use crate::types::{Tier, TierAssessment};

#[derive(Debug, Clone, Default)]
pub struct TierEngine {
    table: TierTable,
}

impl TierEngine {
    pub fn new(table: TierTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &TierTable {
        &self.table
    }

    pub fn requirements(&self, tier: Tier) -> TierRequirements {
        *self.table.get(tier)
    }

    /// Highest tier satisfied on both axes
    pub fn compute_tier(&self, daily_uptime_seconds: u64, storage_capacity_mb: u64) -> Tier {
        Tier::DESCENDING
            .into_iter()
            .find(|tier| {
                let req = self.table.get(*tier);
                daily_uptime_seconds >= req.min_uptime_secs
                    && storage_capacity_mb >= req.min_storage_mb
            })
            .unwrap_or(Tier::Bronze)
    }

    /// Tier together with its multiplier and fee-pool share
    pub fn evaluate(&self, daily_uptime_seconds: u64, storage_capacity_mb: u64) -> TierAssessment {
        let tier = self.compute_tier(daily_uptime_seconds, storage_capacity_mb);
        let req = self.table.get(tier);
        TierAssessment {
            tier,
            reward_multiplier_bps: req.reward_multiplier_bps,
            fee_pool_percent: req.fee_pool_percent,
        }
    }

    pub fn reward_multiplier(&self, tier: Tier) -> u32 {
        self.table.get(tier).reward_multiplier_bps
    }

    pub fn fee_pool_percent(&self, tier: Tier) -> u8 {
        self.table.get(tier).fee_pool_percent
    }
}
