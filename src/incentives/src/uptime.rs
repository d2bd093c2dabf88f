//! Heartbeat-driven uptime accounting
//!
//! Uptime is only credited in increments bounded by the heartbeat timeout:
//! a gap longer than the timeout is treated as downtime. Daily counters
//! reset once when a heartbeat lands on a later calendar day.

use relaynet_core::{day_index, day_start, Timestamp, SECONDS_PER_DAY};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tier::TierEngine;
use crate::types::{HeartbeatReceipt, RelayNode, Tier};

/// Per-node accounting state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UptimeState {
    /// Registered, no heartbeat credited yet
    NeverStarted,
    Accruing,
    /// Next heartbeat starts a new day
    DayBoundaryPending,
}

#[derive(Debug, Clone)]
pub struct UptimeTracker {
    heartbeat_timeout_secs: u64,
    tiers: TierEngine,
}

impl UptimeTracker {
    pub fn new(heartbeat_timeout_secs: u64, tiers: TierEngine) -> Self {
        Self {
            heartbeat_timeout_secs,
            tiers,
        }
    }

    pub fn heartbeat_timeout(&self) -> u64 {
        self.heartbeat_timeout_secs
    }

    pub fn tiers(&self) -> &TierEngine {
        &self.tiers
    }

    pub fn state(&self, node: &RelayNode, now: Timestamp) -> UptimeState {
        if day_index(now) > node.last_day_index {
            UptimeState::DayBoundaryPending
        } else if node.total_uptime_seconds == 0 && node.last_heartbeat == node.registered_at {
            UptimeState::NeverStarted
        } else {
            UptimeState::Accruing
        }
    }

    /// Credit the interval since the previous heartbeat and recompute the tier.
    ///
    /// Across a day boundary only the part of the interval inside the new
    /// day counts towards the daily counter; the whole interval counts
    /// towards lifetime uptime.
    pub fn record_heartbeat(&self, node: &mut RelayNode, now: Timestamp) -> HeartbeatReceipt {
        let previous_tier = node.tier;
        let today = day_index(now);

        let mut day_rolled_over = false;
        if today > node.last_day_index {
            node.previous_day_uptime_seconds = if today == node.last_day_index + 1 {
                node.daily_uptime_seconds
            } else {
                0
            };
            node.daily_uptime_seconds = 0;
            node.last_day_index = today;
            node.current_session_start = now;
            day_rolled_over = true;
        }

        let elapsed = now.saturating_sub(node.last_heartbeat);
        let mut credited_seconds = 0;
        if elapsed <= self.heartbeat_timeout_secs {
            let within_day = if day_rolled_over {
                elapsed.min(now - day_start(now))
            } else {
                elapsed
            };
            node.total_uptime_seconds = node.total_uptime_seconds.saturating_add(elapsed);
            node.daily_uptime_seconds =
                (node.daily_uptime_seconds + within_day).min(SECONDS_PER_DAY);
            credited_seconds = within_day;
        } else {
            debug!(
                account = %node.account,
                gap = elapsed,
                "Heartbeat gap exceeds timeout, not credited"
            );
            node.current_session_start = now;
        }

        node.last_heartbeat = node.last_heartbeat.max(now);
        node.tier = self.current_tier(node, now);

        HeartbeatReceipt {
            credited_seconds,
            daily_uptime_seconds: node.daily_uptime_seconds,
            total_uptime_seconds: node.total_uptime_seconds,
            tier: node.tier,
            previous_tier,
            day_rolled_over,
        }
    }

    /// Daily uptime as of `now`: zero once the recorded day has passed
    pub fn effective_daily_uptime(&self, node: &RelayNode, now: Timestamp) -> u64 {
        self.uptime_for_day(node, day_index(now))
    }

    /// Uptime credited within `day`; only the last two days are retained
    pub fn uptime_for_day(&self, node: &RelayNode, day: u64) -> u64 {
        if day == node.last_day_index {
            node.daily_uptime_seconds
        } else if day + 1 == node.last_day_index {
            node.previous_day_uptime_seconds
        } else {
            0
        }
    }

    pub fn current_tier(&self, node: &RelayNode, now: Timestamp) -> Tier {
        self.tiers
            .compute_tier(self.effective_daily_uptime(node, now), node.storage_capacity_mb)
    }

    pub fn is_online(&self, node: &RelayNode, now: Timestamp) -> bool {
        node.active && now.saturating_sub(node.last_heartbeat) <= self.heartbeat_timeout_secs
    }
}
