//! Reputation scoring, violation reports, slashing and blacklisting
//!
//! Scores range over `0..=max_reputation` and start at the initial value
//! when an account first registers a relay node. Every report costs the
//! target a fixed penalty; enough reports since the last slash trigger an
//! automatic slash. Blacklisting is permanent and zeroes the score.

use relaynet_core::{AccountId, Timestamp};
use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::events::LedgerEvent;
use crate::registry::RelayNodeRegistry;
use crate::stake_ledger::StakeLedger;
use crate::transaction::Transaction;
use crate::types::{
    BlacklistOutcome, NodeSecurityInfo, RelayNode, ReputationRecord, ReputationStatus,
    SlashOutcome, ViolationReceipt,
};

#[derive(Debug, Clone)]
pub struct ReputationGuard {
    initial_score: u8,
    max_score: u8,
    violation_penalty: u8,
    slash_penalty: u8,
    max_violations: u32,
    at_risk_violations: u32,
    at_risk_score: u8,
    stake: StakeLedger,
}

impl ReputationGuard {
    pub fn new(config: &LedgerConfig, stake: StakeLedger) -> Self {
        Self {
            initial_score: config.initial_reputation,
            max_score: config.max_reputation,
            violation_penalty: config.violation_penalty,
            slash_penalty: config.slash_reputation_penalty,
            max_violations: config.max_violations,
            at_risk_violations: config.at_risk_violations,
            at_risk_score: config.at_risk_score,
            stake,
        }
    }

    /// Fetch the record, creating it with the initial score if absent
    pub fn ensure_record(
        &self,
        tx: &mut Transaction<'_>,
        account: &AccountId,
    ) -> Result<ReputationRecord> {
        if let Some(record) = tx.reputation(account)? {
            return Ok(record);
        }
        let record = ReputationRecord::new(*account, self.initial_score);
        tx.put_reputation(&record)?;
        Ok(record)
    }

    pub fn ensure_not_blacklisted(&self, tx: &Transaction<'_>, account: &AccountId) -> Result<()> {
        match tx.reputation(account)? {
            Some(record) if record.blacklisted => Err(LedgerError::Blacklisted(*account)),
            _ => Ok(()),
        }
    }

    fn set_score(
        &self,
        tx: &mut Transaction<'_>,
        record: &mut ReputationRecord,
        score: u8,
        now: Timestamp,
    ) {
        let previous = record.score;
        record.score = score.min(self.max_score);
        if previous != record.score {
            tx.emit(LedgerEvent::ReputationChanged {
                account: record.account,
                from: previous,
                to: record.score,
                at: now,
            });
        }
    }

    pub fn report_violation(
        &self,
        tx: &mut Transaction<'_>,
        registry: &RelayNodeRegistry,
        reporter: &AccountId,
        target: &AccountId,
        reason: &str,
        now: Timestamp,
    ) -> Result<ViolationReceipt> {
        if reporter == target {
            return Err(LedgerError::SelfReport(*reporter));
        }
        if !tx.identity(reporter)?.map_or(false, |identity| identity.active) {
            return Err(LedgerError::ReporterNotRegistered(*reporter));
        }
        let mut node = tx
            .active_relay_node(target)?
            .ok_or(LedgerError::TargetNotActive(*target))?;

        let mut record = self.ensure_record(tx, target)?;
        record.violation_count += 1;
        let score = record.score.saturating_sub(self.violation_penalty);
        self.set_score(tx, &mut record, score, now);

        tx.emit(LedgerEvent::ViolationReported {
            reporter: *reporter,
            target: *target,
            reason: reason.to_string(),
            violation_count: record.violation_count,
            at: now,
        });
        info!(
            reporter = %reporter,
            target = %target,
            violations = record.violation_count,
            reason,
            "Violation reported"
        );

        let slash = if record.unsettled_violations() >= self.max_violations {
            let reason = format!(
                "automatic: {} violations since last slash",
                record.unsettled_violations()
            );
            Some(self.apply_slash(tx, registry, &mut node, &mut record, &reason, now)?)
        } else {
            tx.put_reputation(&record)?;
            None
        };

        Ok(ViolationReceipt {
            target: *target,
            violation_count: record.violation_count,
            score: record.score,
            slash,
        })
    }

    /// Governance slash of an active relay node
    pub fn slash_node(
        &self,
        tx: &mut Transaction<'_>,
        registry: &RelayNodeRegistry,
        account: &AccountId,
        reason: &str,
        now: Timestamp,
    ) -> Result<SlashOutcome> {
        let mut node = tx
            .active_relay_node(account)?
            .ok_or(LedgerError::NotRelaying(*account))?;
        let mut record = self.ensure_record(tx, account)?;
        self.apply_slash(tx, registry, &mut node, &mut record, reason, now)
    }

    fn apply_slash(
        &self,
        tx: &mut Transaction<'_>,
        registry: &RelayNodeRegistry,
        node: &mut RelayNode,
        record: &mut ReputationRecord,
        reason: &str,
        now: Timestamp,
    ) -> Result<SlashOutcome> {
        let slashed_amount = self.stake.slash(tx, node)?;

        record.slash_count += 1;
        record.total_slashed += slashed_amount;
        record.last_slash_at = Some(now);
        record.settled_violations = record.violation_count;
        let score = record.score.saturating_sub(self.slash_penalty);
        self.set_score(tx, record, score, now);
        tx.put_reputation(record)?;

        tx.emit(LedgerEvent::NodeSlashed {
            account: node.account,
            amount: slashed_amount,
            remaining_stake: node.staked_amount,
            reason: reason.to_string(),
            at: now,
        });
        warn!(
            account = %node.account,
            slashed = slashed_amount,
            remaining = node.staked_amount,
            reason,
            "Relay node slashed"
        );

        let remaining_stake = node.staked_amount;
        let min_relay_stake = tx.globals()?.min_relay_stake;
        let (force_deactivated, forfeited_amount) = if remaining_stake < min_relay_stake {
            (true, registry.force_deactivate(tx, node, now)?)
        } else {
            tx.put_relay_node(node)?;
            (false, 0)
        };

        Ok(SlashOutcome {
            account: node.account,
            slashed_amount,
            remaining_stake,
            force_deactivated,
            forfeited_amount,
        })
    }

    /// Permanently bar an account; an active node is force-deactivated
    pub fn blacklist_node(
        &self,
        tx: &mut Transaction<'_>,
        registry: &RelayNodeRegistry,
        account: &AccountId,
        reason: &str,
        now: Timestamp,
    ) -> Result<BlacklistOutcome> {
        let mut record = self.ensure_record(tx, account)?;
        if record.blacklisted {
            return Ok(BlacklistOutcome {
                account: *account,
                already_blacklisted: true,
                relay_deactivated: false,
                forfeited_amount: 0,
            });
        }

        record.blacklisted = true;
        self.set_score(tx, &mut record, 0, now);
        tx.put_reputation(&record)?;

        let (relay_deactivated, forfeited_amount) = match tx.active_relay_node(account)? {
            Some(mut node) => (true, registry.force_deactivate(tx, &mut node, now)?),
            None => (false, 0),
        };

        tx.emit(LedgerEvent::NodeBlacklisted {
            account: *account,
            reason: reason.to_string(),
            at: now,
        });
        warn!(account = %account, reason, forfeited = forfeited_amount, "Account blacklisted");

        Ok(BlacklistOutcome {
            account: *account,
            already_blacklisted: false,
            relay_deactivated,
            forfeited_amount,
        })
    }

    /// +1, capped at the maximum score
    pub fn increase_reputation(
        &self,
        tx: &mut Transaction<'_>,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<u8> {
        let mut record = tx
            .reputation(account)?
            .ok_or(LedgerError::ReputationNotFound(*account))?;
        if record.blacklisted {
            return Err(LedgerError::Blacklisted(*account));
        }
        let score = record.score.saturating_add(1);
        self.set_score(tx, &mut record, score, now);
        tx.put_reputation(&record)?;
        Ok(record.score)
    }

    pub fn status(&self, record: &ReputationRecord, relay_active: bool) -> ReputationStatus {
        if record.blacklisted {
            ReputationStatus::Blacklisted
        } else if record.slash_count > 0 && !relay_active {
            ReputationStatus::Slashed
        } else if record.unsettled_violations() >= self.at_risk_violations
            || record.score < self.at_risk_score
        {
            ReputationStatus::AtRisk
        } else {
            ReputationStatus::Normal
        }
    }

    /// Security summary; unknown accounts report the initial defaults
    pub fn security_info(&self, tx: &Transaction<'_>, account: &AccountId) -> Result<NodeSecurityInfo> {
        let record = tx
            .reputation(account)?
            .unwrap_or_else(|| ReputationRecord::new(*account, self.initial_score));
        let node = tx.active_relay_node(account)?;
        let relay_active = node.is_some();

        Ok(NodeSecurityInfo {
            account: *account,
            score: record.score,
            violation_count: record.violation_count,
            unsettled_violations: record.unsettled_violations(),
            slash_count: record.slash_count,
            total_slashed: record.total_slashed,
            last_slash_at: record.last_slash_at,
            blacklisted: record.blacklisted,
            relay_active,
            staked_amount: node.map_or(0, |node| node.staked_amount),
            status: self.status(&record, relay_active),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> ReputationGuard {
        ReputationGuard::new(&LedgerConfig::default(), StakeLedger::new(10))
    }

    #[test]
    fn test_status_transitions() {
        let guard = guard();
        let mut record = ReputationRecord::new(AccountId::from_label("n"), 50);
        assert_eq!(guard.status(&record, true), ReputationStatus::Normal);

        record.violation_count = 3;
        assert_eq!(guard.status(&record, true), ReputationStatus::AtRisk);

        record.settled_violations = 3;
        record.score = 29;
        assert_eq!(guard.status(&record, true), ReputationStatus::AtRisk);

        record.score = 40;
        record.slash_count = 1;
        assert_eq!(guard.status(&record, true), ReputationStatus::Normal);
        assert_eq!(guard.status(&record, false), ReputationStatus::Slashed);

        record.blacklisted = true;
        assert_eq!(guard.status(&record, false), ReputationStatus::Blacklisted);
    }
}
