//! Reward distribution
//!
//! Two channels, each capped on its own:
//!
//! - **Relay volume**: a fixed reward per relayed message with no tier
//!   multiplier. The network total is capped at the daily pool and every
//!   node's proportional share is capped again at what its own volume earns
//!   under the base rate.
//! - **Tier fee pool**: each tier owns a slice of the daily pool, split
//!   evenly between its nodes and scaled by how much of the tier's uptime
//!   requirement each node met. Whatever under-performing nodes miss goes to
//!   the nodes of the same tier at full uptime.
//!
//! Both channels are computed in a single pass over one snapshot of the
//! active nodes when a cycle is settled.

use std::collections::HashMap;

use primitive_types::{U256, U512};
use relaynet_core::{day_index, AccountId, Amount, MessageId, Timestamp};
use tracing::{info, warn};

use crate::error::{LedgerError, Result};
use crate::events::{LedgerEvent, RewardChannel};
use crate::registry::RelayNodeRegistry;
use crate::stake_ledger::StakeLedger;
use crate::tier::TierEngine;
use crate::transaction::{Transaction, TransferKind};
use crate::types::{
    CycleReport, NodePayout, RelayReceipt, RelayedMessage, Tier, TierSettlement,
};

/// Full uptime, in basis points
pub const FULL_UPTIME_BPS: u128 = 10_000;

/// `a * b / c` rounded down, exact over the full 256-bit product.
///
/// Saturates at `Amount::MAX` if the quotient does not fit; a zero divisor
/// yields zero.
pub fn mul_div(a: Amount, b: Amount, c: Amount) -> Amount {
    let product = U256::from(a).full_mul(U256::from(b));
    match product.checked_div(U512::from(c)) {
        None => 0,
        Some(quotient) if quotient > U512::from(Amount::MAX) => Amount::MAX,
        Some(quotient) => quotient.low_u128(),
    }
}

/// Relay-volume figures of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayVolume {
    pub account: AccountId,
    pub messages: u64,
}

/// Tier fee-pool participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeParticipant {
    pub account: AccountId,
    pub tier: Tier,
    pub daily_uptime_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct RewardDistributor {
    base_reward_per_1000_msg: Amount,
    tiers: TierEngine,
    stake: StakeLedger,
}

impl RewardDistributor {
    pub fn new(base_reward_per_1000_msg: Amount, tiers: TierEngine, stake: StakeLedger) -> Self {
        Self {
            base_reward_per_1000_msg,
            tiers,
            stake,
        }
    }

    /// What `messages` earn under the base rate
    pub fn base_entitlement(&self, messages: u64) -> Amount {
        mul_div(messages as Amount, self.base_reward_per_1000_msg, 1_000)
    }

    /// Capped relay-volume shares, in input order
    pub fn relay_channel(&self, volumes: &[RelayVolume], pool_cap: Amount) -> Vec<NodePayout> {
        let total_messages: Amount = volumes.iter().map(|v| v.messages as Amount).sum();
        let total_earned = mul_div(total_messages, self.base_reward_per_1000_msg, 1_000);
        let effective_pool = total_earned.min(pool_cap);

        volumes
            .iter()
            .map(|volume| {
                let share = mul_div(volume.messages as Amount, effective_pool, total_messages);
                NodePayout {
                    account: volume.account,
                    amount: share.min(self.base_entitlement(volume.messages)),
                }
            })
            .collect()
    }

    /// Share of the tier requirement met, in basis points
    pub fn uptime_bps(&self, tier: Tier, daily_uptime_seconds: u64) -> u128 {
        let required = self.tiers.requirements(tier).min_uptime_secs as u128;
        if required == 0 {
            return FULL_UPTIME_BPS;
        }
        (daily_uptime_seconds as u128 * FULL_UPTIME_BPS / required).min(FULL_UPTIME_BPS)
    }

    /// Entitlements of every tier that has participants
    pub fn tier_fee_channel(
        &self,
        participants: &[FeeParticipant],
        pool_cap: Amount,
    ) -> Vec<TierSettlement> {
        let mut settlements = Vec::new();

        for tier in Tier::ALL {
            let members: Vec<&FeeParticipant> =
                participants.iter().filter(|p| p.tier == tier).collect();
            if members.is_empty() {
                continue;
            }

            let tier_pool = mul_div(pool_cap, self.tiers.fee_pool_percent(tier) as Amount, 100);
            let potential = tier_pool / members.len() as Amount;

            let mut actual = Vec::with_capacity(members.len());
            let mut missed_total: Amount = 0;
            let mut full_potential: Amount = 0;
            for member in &members {
                let bps = self.uptime_bps(tier, member.daily_uptime_seconds);
                let reward = mul_div(potential, bps, FULL_UPTIME_BPS);
                missed_total += potential - reward;
                if bps == FULL_UPTIME_BPS {
                    full_potential += potential;
                }
                actual.push((member.account, reward, bps == FULL_UPTIME_BPS));
            }

            let mut redistributed: Amount = 0;
            let entitlements = actual
                .into_iter()
                .map(|(account, reward, full)| {
                    let bonus = if full {
                        mul_div(missed_total, potential, full_potential)
                    } else {
                        0
                    };
                    redistributed += bonus;
                    NodePayout {
                        account,
                        amount: reward + bonus,
                    }
                })
                .collect();

            settlements.push(TierSettlement {
                tier,
                participants: members.len(),
                tier_pool,
                potential_per_node: potential,
                missed_total,
                redistributed,
                entitlements,
            });
        }

        settlements
    }

    /// Record one relayed message and pay the per-message reward if the
    /// pool covers it. Pool exhaustion pays zero but still records volume.
    pub fn record_relayed_message(
        &self,
        tx: &mut Transaction<'_>,
        relayer: &AccountId,
        message_id: MessageId,
        base_reward: Amount,
        now: Timestamp,
    ) -> Result<RelayReceipt> {
        let mut node = tx
            .active_relay_node(relayer)?
            .ok_or(LedgerError::NotRelaying(*relayer))?;
        if tx.message(&message_id)?.is_some() {
            return Err(LedgerError::DuplicateMessage(message_id));
        }

        let mut globals = tx.globals()?;
        let available = self.stake.spendable_rewards(tx, &globals);
        let reward_paid = if base_reward <= available {
            base_reward
        } else {
            warn!(
                relayer = %relayer,
                available,
                requested = base_reward,
                "Reward pool exhausted, message recorded without payout"
            );
            0
        };

        node.messages_relayed += 1;
        node.cycle_messages += 1;
        node.rewards_earned += reward_paid;
        node.cycle_relay_paid += reward_paid;
        tx.put_relay_node(&node)?;

        globals.total_messages_relayed += 1;
        globals.total_rewards_paid += reward_paid;
        tx.put_globals(&globals)?;

        tx.put_message(&RelayedMessage {
            message_id,
            relayer: *relayer,
            reward_paid,
            recorded_at: now,
        })?;

        if reward_paid > 0 {
            tx.pay_from_custody(TransferKind::RewardPayout, relayer, reward_paid);
            tx.emit(LedgerEvent::RewardPaid {
                account: *relayer,
                channel: RewardChannel::RelayMessage,
                amount: reward_paid,
                at: now,
            });
        }
        tx.emit(LedgerEvent::MessageRelayed {
            account: *relayer,
            message_id,
            reward_paid,
            at: now,
        });

        Ok(RelayReceipt {
            message_id,
            relayer: *relayer,
            reward_paid,
            messages_relayed: node.messages_relayed,
        })
    }

    /// Settle the cycle of `day`, either the day `now` falls in or the one
    /// before it. Messages count from the previous settlement up to `now`.
    pub fn settle_cycle(
        &self,
        tx: &mut Transaction<'_>,
        registry: &RelayNodeRegistry,
        day: u64,
        now: Timestamp,
    ) -> Result<CycleReport> {
        let today = day_index(now);
        if day > today || day + 1 < today {
            return Err(LedgerError::CycleNotSettleable { day, today });
        }
        let mut globals = tx.globals()?;
        if globals.last_settled_day.map_or(false, |settled| settled >= day) {
            return Err(LedgerError::CycleAlreadySettled(day));
        }

        // One snapshot for both channels
        let mut nodes = Vec::new();
        for account in registry.active_nodes(tx)? {
            if let Some(node) = tx.active_relay_node(&account)? {
                let blacklisted = tx.reputation(&account)?.map_or(false, |r| r.blacklisted);
                if !blacklisted {
                    nodes.push(node);
                }
            }
        }

        let volumes: Vec<RelayVolume> = nodes
            .iter()
            .map(|node| RelayVolume {
                account: node.account,
                messages: node.cycle_messages,
            })
            .collect();
        let shares = self.relay_channel(&volumes, globals.daily_pool_cap);

        let participants: Vec<FeeParticipant> = nodes
            .iter()
            .map(|node| {
                let daily_uptime_seconds = registry.uptime().uptime_for_day(node, day);
                FeeParticipant {
                    account: node.account,
                    tier: self
                        .tiers
                        .compute_tier(daily_uptime_seconds, node.storage_capacity_mb),
                    daily_uptime_seconds,
                }
            })
            .collect();
        let tiers = self.tier_fee_channel(&participants, globals.daily_pool_cap);

        // Relay channel: top up what per-message payments left short
        let relay_payouts: Vec<NodePayout> = nodes
            .iter()
            .zip(&shares)
            .map(|(node, share)| NodePayout {
                account: node.account,
                amount: share.amount.saturating_sub(node.cycle_relay_paid),
            })
            .collect();
        let relay_paid_total: Amount = relay_payouts.iter().map(|p| p.amount).sum();

        let available = self.stake.spendable_rewards(tx, &globals);
        if relay_paid_total > available {
            return Err(LedgerError::InsufficientRewardPool {
                available,
                requested: relay_paid_total,
            });
        }

        let entitlements: HashMap<AccountId, Amount> = tiers
            .iter()
            .flat_map(|t| t.entitlements.iter())
            .map(|e| (e.account, e.amount))
            .collect();

        let mut fee_credited_total: Amount = 0;
        for (mut node, payout) in nodes.into_iter().zip(&relay_payouts) {
            let entitlement = entitlements.get(&node.account).copied().unwrap_or(0);

            node.rewards_earned += payout.amount;
            node.pending_fee_reward += entitlement;
            node.cycle_messages = 0;
            node.cycle_relay_paid = 0;
            tx.put_relay_node(&node)?;

            fee_credited_total += entitlement;
            if payout.amount > 0 {
                tx.pay_from_custody(TransferKind::RewardPayout, &node.account, payout.amount);
                tx.emit(LedgerEvent::RewardPaid {
                    account: node.account,
                    channel: RewardChannel::RelayVolume,
                    amount: payout.amount,
                    at: now,
                });
            }
        }

        globals.total_rewards_paid += relay_paid_total;
        globals.pending_fee_total += fee_credited_total;
        globals.last_settled_day = Some(day);
        tx.put_globals(&globals)?;

        let report = CycleReport {
            day,
            participants: relay_payouts.len(),
            relay_payouts,
            relay_paid_total,
            tiers,
            fee_credited_total,
        };
        tx.emit(LedgerEvent::CycleSettled {
            day,
            participants: report.participants,
            relay_paid: relay_paid_total,
            fee_credited: fee_credited_total,
            at: now,
        });
        info!(
            day,
            participants = report.participants,
            relay_paid = relay_paid_total,
            fee_credited = fee_credited_total,
            "Distribution cycle settled"
        );
        Ok(report)
    }

    /// Pay out the node's settled tier fee-pool entitlement
    pub fn claim_fee_reward(
        &self,
        tx: &mut Transaction<'_>,
        registry: &RelayNodeRegistry,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<Amount> {
        let mut node = tx
            .active_relay_node(account)?
            .ok_or(LedgerError::NotRelaying(*account))?;
        if !registry.uptime().is_online(&node, now) {
            return Err(LedgerError::MustBeOnline(*account));
        }
        let amount = node.pending_fee_reward;
        if amount == 0 {
            return Err(LedgerError::NothingToClaim(*account));
        }

        let mut globals = tx.globals()?;
        let available = self.stake.unreserved_balance(tx, &globals);
        if amount > available {
            return Err(LedgerError::InsufficientRewardPool {
                available,
                requested: amount,
            });
        }

        node.pending_fee_reward = 0;
        node.rewards_earned += amount;
        tx.put_relay_node(&node)?;

        globals.pending_fee_total = globals.pending_fee_total.saturating_sub(amount);
        globals.total_rewards_paid += amount;
        tx.put_globals(&globals)?;

        tx.pay_from_custody(TransferKind::RewardPayout, account, amount);
        tx.emit(LedgerEvent::RewardPaid {
            account: *account,
            channel: RewardChannel::TierFee,
            amount,
            at: now,
        });
        info!(account = %account, amount, "Fee reward claimed");
        Ok(amount)
    }
}
