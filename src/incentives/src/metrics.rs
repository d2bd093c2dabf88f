//! Prometheus metrics for the incentive ledger
//!
//! Two kinds of series are exported:
//! - **Event counters**: one increment per committed ledger event, plus
//!   reward and slash totals in whole tokens
//! - **State gauges**: network-wide figures refreshed from [`NetworkStats`]
//!   after every commit
//!
//! Metrics are scraped from the node's `/metrics` endpoint.

use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry,
    register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry, register_gauge_with_registry, Counter, CounterVec, Gauge,
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use lazy_static::lazy_static;
use parking_lot::RwLock;
use relaynet_core::{Amount, ONE_TOKEN};
use std::sync::Arc;

use crate::error::LedgerError;
use crate::events::LedgerEvent;
use crate::types::NetworkStats;

/// Reward amounts in tokens
const REWARD_AMOUNT_BUCKETS: &[f64] = &[0.00001, 0.0001, 0.001, 0.01, 0.1, 1.0, 10.0, 100.0];

/// Operation latency in seconds
const OPERATION_SECONDS_BUCKETS: &[f64] = &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

lazy_static! {
    /// Registry shared by every ledger in the process
    static ref METRICS_REGISTRY: Arc<RwLock<Option<Registry>>> = Arc::new(RwLock::new(None));

    static ref LEDGER_METRICS: RwLock<Option<Arc<LedgerMetrics>>> = RwLock::new(None);
}

pub struct LedgerMetrics {
    // === EVENTS ===

    /// Committed events by name
    pub events_total: IntCounterVec,

    /// Rejected operations by error kind
    pub rejections_total: IntCounterVec,

    /// Rewards paid by channel, in tokens
    pub rewards_paid_tokens: CounterVec,

    /// Distribution of single reward payments
    pub reward_amount: Histogram,

    /// Stake slashed, in tokens
    pub slashed_tokens_total: Counter,

    /// Mutating operation latency
    pub operation_seconds: HistogramVec,

    // === STATE ===

    pub users: IntGauge,
    pub relay_nodes: IntGauge,
    pub online_relay_nodes: IntGauge,
    pub relay_nodes_per_tier: IntGaugeVec,
    pub total_staked_tokens: Gauge,
    pub fee_pool_tokens: Gauge,
    pub pending_fee_tokens: Gauge,
    pub reward_pool_tokens: Gauge,
    pub messages_relayed: IntGauge,

    /// 1 once the ledger halted on an invariant violation
    pub halted: IntGauge,
}

impl LedgerMetrics {
    /// Create the metric set on a specific registry
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let events_total = register_int_counter_vec_with_registry!(
            Opts::new("relaynet_ledger_events_total", "Committed ledger events by type"),
            &["event"],
            registry
        )?;

        let rejections_total = register_int_counter_vec_with_registry!(
            Opts::new("relaynet_ledger_rejections_total", "Rejected ledger operations by error kind"),
            &["kind"],
            registry
        )?;

        let rewards_paid_tokens = register_counter_vec_with_registry!(
            Opts::new("relaynet_rewards_paid_tokens_total", "Rewards paid out, in tokens"),
            &["channel"],
            registry
        )?;

        let reward_amount = register_histogram_with_registry!(
            HistogramOpts::new("relaynet_reward_amount_tokens", "Single reward payment, in tokens")
                .buckets(REWARD_AMOUNT_BUCKETS.to_vec()),
            registry
        )?;

        let slashed_tokens_total = register_counter_with_registry!(
            Opts::new("relaynet_slashed_tokens_total", "Stake slashed, in tokens"),
            registry
        )?;

        let operation_seconds = register_histogram_vec_with_registry!(
            HistogramOpts::new("relaynet_ledger_operation_seconds", "Ledger operation latency")
                .buckets(OPERATION_SECONDS_BUCKETS.to_vec()),
            &["operation"],
            registry
        )?;

        let users = register_int_gauge_with_registry!(
            Opts::new("relaynet_users", "Active registered identities"),
            registry
        )?;

        let relay_nodes = register_int_gauge_with_registry!(
            Opts::new("relaynet_relay_nodes", "Active relay nodes"),
            registry
        )?;

        let online_relay_nodes = register_int_gauge_with_registry!(
            Opts::new("relaynet_relay_nodes_online", "Active relay nodes within the heartbeat timeout"),
            registry
        )?;

        let relay_nodes_per_tier = register_int_gauge_vec_with_registry!(
            Opts::new("relaynet_relay_nodes_per_tier", "Active relay nodes by current tier"),
            &["tier"],
            registry
        )?;

        let total_staked_tokens = register_gauge_with_registry!(
            Opts::new("relaynet_total_staked_tokens", "Stake held in custody, in tokens"),
            registry
        )?;

        let fee_pool_tokens = register_gauge_with_registry!(
            Opts::new("relaynet_fee_pool_tokens", "Slashed and forfeited stake retained, in tokens"),
            registry
        )?;

        let pending_fee_tokens = register_gauge_with_registry!(
            Opts::new("relaynet_pending_fee_tokens", "Settled but unclaimed tier rewards, in tokens"),
            registry
        )?;

        let reward_pool_tokens = register_gauge_with_registry!(
            Opts::new("relaynet_reward_pool_tokens", "Custody funds spendable on rewards, in tokens"),
            registry
        )?;

        let messages_relayed = register_int_gauge_with_registry!(
            Opts::new("relaynet_messages_relayed", "Messages relayed since genesis"),
            registry
        )?;

        let halted = register_int_gauge_with_registry!(
            Opts::new("relaynet_ledger_halted", "1 when the ledger refuses mutations"),
            registry
        )?;

        Ok(Self {
            events_total,
            rejections_total,
            rewards_paid_tokens,
            reward_amount,
            slashed_tokens_total,
            operation_seconds,
            users,
            relay_nodes,
            online_relay_nodes,
            relay_nodes_per_tier,
            total_staked_tokens,
            fee_pool_tokens,
            pending_fee_tokens,
            reward_pool_tokens,
            messages_relayed,
            halted,
        })
    }
}

/// Initialize the global registry and metric set
///
/// Repeated calls return the metric set created by the first one.
pub fn register_metrics() -> Result<Arc<LedgerMetrics>, prometheus::Error> {
    if let Some(metrics) = LEDGER_METRICS.read().as_ref() {
        return Ok(Arc::clone(metrics));
    }

    let mut metrics_lock = LEDGER_METRICS.write();
    if let Some(metrics) = metrics_lock.as_ref() {
        return Ok(Arc::clone(metrics));
    }

    let mut registry_lock = METRICS_REGISTRY.write();
    let registry = registry_lock.get_or_insert_with(Registry::new);
    let metrics = Arc::new(LedgerMetrics::new(registry)?);
    *metrics_lock = Some(Arc::clone(&metrics));
    Ok(metrics)
}

/// The global registry, once [`register_metrics`] ran
pub fn get_registry() -> Option<Registry> {
    METRICS_REGISTRY.read().clone()
}

/// Token amount as a float for gauges; precision loss is acceptable here
pub fn tokens(amount: Amount) -> f64 {
    amount as f64 / ONE_TOKEN as f64
}

/// Count a committed event and its amounts
pub fn observe_event(metrics: &LedgerMetrics, event: &LedgerEvent) {
    metrics.events_total.with_label_values(&[event.name()]).inc();

    match event {
        LedgerEvent::RewardPaid { channel, amount, .. } => {
            metrics
                .rewards_paid_tokens
                .with_label_values(&[channel.as_str()])
                .inc_by(tokens(*amount));
            metrics.reward_amount.observe(tokens(*amount));
        }
        LedgerEvent::NodeSlashed { amount, .. } => {
            metrics.slashed_tokens_total.inc_by(tokens(*amount));
        }
        _ => {}
    }
}

/// Count a rejected operation
pub fn record_rejection(metrics: &LedgerMetrics, err: &LedgerError) {
    metrics
        .rejections_total
        .with_label_values(&[err.kind().as_str()])
        .inc();
}

/// Record how long an operation took
pub fn observe_operation(metrics: &LedgerMetrics, operation: &str, seconds: f64) {
    metrics
        .operation_seconds
        .with_label_values(&[operation])
        .observe(seconds);
}

/// Refresh the state gauges
pub fn update_network_stats(metrics: &LedgerMetrics, stats: &NetworkStats) {
    metrics.users.set(stats.total_users as i64);
    metrics.relay_nodes.set(stats.total_relay_nodes as i64);
    metrics.online_relay_nodes.set(stats.online_relay_nodes as i64);
    for (tier, count) in &stats.nodes_per_tier {
        metrics
            .relay_nodes_per_tier
            .with_label_values(&[tier.as_str()])
            .set(*count as i64);
    }
    metrics.total_staked_tokens.set(tokens(stats.total_staked));
    metrics.fee_pool_tokens.set(tokens(stats.fee_pool_total));
    metrics.pending_fee_tokens.set(tokens(stats.pending_fee_total));
    metrics.reward_pool_tokens.set(tokens(stats.reward_pool_available));
    metrics.messages_relayed.set(stats.total_messages_relayed as i64);
    metrics.halted.set(i64::from(stats.halted));
}
