//! Sliding-window limit on violation reports per reporter

use std::collections::{HashMap, VecDeque};

use relaynet_core::{AccountId, Timestamp};

use crate::config::RateLimitConfig;
use crate::types::RateLimitStatus;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: HashMap<AccountId, VecDeque<Timestamp>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
        }
    }

    fn in_window(&self, account: &AccountId, now: Timestamp) -> Vec<Timestamp> {
        let cutoff = now.saturating_sub(self.config.window_secs);
        self.windows
            .get(account)
            .map(|window| window.iter().copied().filter(|t| *t > cutoff).collect())
            .unwrap_or_default()
    }

    /// Window status without recording anything
    pub fn check(&self, account: &AccountId, now: Timestamp) -> RateLimitStatus {
        let recent = self.in_window(account, now);
        let used = recent.len() as u32;
        RateLimitStatus {
            account: *account,
            allowed: used < self.config.max_reports,
            remaining: self.config.max_reports.saturating_sub(used),
            limit: self.config.max_reports,
            window_secs: self.config.window_secs,
            resets_at: recent.first().map(|t| t + self.config.window_secs),
        }
    }

    pub fn record(&mut self, account: &AccountId, now: Timestamp) {
        let cutoff = now.saturating_sub(self.config.window_secs);
        let window = self.windows.entry(*account).or_default();
        while window.front().map_or(false, |t| *t <= cutoff) {
            window.pop_front();
        }
        window.push_back(now);
    }

    /// Drop windows with no report inside the window
    pub fn prune(&mut self, now: Timestamp) {
        let cutoff = now.saturating_sub(self.config.window_secs);
        self.windows
            .retain(|_, window| window.back().map_or(false, |t| *t > cutoff));
    }
}
