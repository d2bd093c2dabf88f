//! Ledger node: storage, service task, RPC and metrics servers

use anyhow::{Context, Result};
use prometheus::{Encoder, TextEncoder};
use relaynet_core::types::time;
use relaynet_core::{
    day_index, format_amount, AccountId, AssetLedger, InMemoryAssetLedger, Timestamp, SECONDS_PER_DAY,
};
use relaynet_incentives::{
    get_registry, register_metrics, update_network_stats, CycleReport, IncentiveLedger, KvBackend,
    LedgerError, LedgerHandle, LedgerMetrics, LedgerService, MemoryBackend, SledBackend,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::config::NodeConfig;
use crate::rpc::RpcHandler;

/// Single-process ledger node
pub struct LedgerNode {
    config: NodeConfig,
    handle: Option<LedgerHandle>,
    service_task: Option<JoinHandle<IncentiveLedger>>,
    metrics: Option<Arc<LedgerMetrics>>,
    tasks: Vec<JoinHandle<()>>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: Option<mpsc::Receiver<()>>,
}

impl LedgerNode {
    /// Open storage, restore balances and start the ledger service
    pub async fn new(config: NodeConfig) -> Result<Self> {
        info!("Initializing ledger node {}", config.node.id);

        let kv = Self::open_store(&config)?;
        let mut ledger = IncentiveLedger::open(kv, InMemoryAssetLedger::new(), config.ledger.clone())
            .context("Failed to open incentive ledger")?;

        match ledger.persisted_assets()? {
            Some(snapshot) => {
                *ledger.assets_mut() = InMemoryAssetLedger::from_snapshot(snapshot);
                info!("Restored asset balances from the ledger store");
            }
            None => {
                let state = ledger.global_state()?;
                if state.total_staked > 0 {
                    anyhow::bail!(
                        "Ledger store holds {} of stake but no asset balances; refusing to apply genesis",
                        format_amount(state.total_staked)
                    );
                }
                Self::apply_genesis(&mut ledger, &config);
            }
        }
        ledger
            .persist_assets()
            .context("Failed to store asset balances")?;

        let metrics = if config.metrics.enabled {
            Some(register_metrics().context("Failed to register ledger metrics")?)
        } else {
            None
        };

        let (handle, service_task) = LedgerService::spawn(ledger, metrics.clone());

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        Ok(Self {
            config,
            handle: Some(handle),
            service_task: Some(service_task),
            metrics,
            tasks: Vec::new(),
            shutdown_tx,
            shutdown_rx: Some(shutdown_rx),
        })
    }

    fn open_store(config: &NodeConfig) -> Result<Box<dyn KvBackend>> {
        match config.storage.backend.as_str() {
            "memory" => {
                warn!("Using in-memory storage; ledger state is lost on exit");
                Ok(Box::new(MemoryBackend::new()))
            }
            _ => {
                let path = config.storage_path();
                std::fs::create_dir_all(&path)
                    .with_context(|| format!("Failed to create storage directory {:?}", path))?;
                let backend = SledBackend::open_with_config(
                    &path,
                    config.storage.cache_capacity_mb * 1024 * 1024,
                    config.storage.flush_on_commit,
                )?;
                Ok(Box::new(backend))
            }
        }
    }

    fn apply_genesis(ledger: &mut IncentiveLedger, config: &NodeConfig) {
        let token = ledger.token().clone();
        let custody = ledger.config().custody;
        let assets = ledger.assets_mut();

        for allocation in &config.genesis.allocations {
            assets.mint(&token, &allocation.account, allocation.amount);
            if allocation.approve_custody {
                let approved = assets.allowance(&token, &allocation.account, &custody);
                assets.approve(&token, &allocation.account, &custody, approved + allocation.amount);
            }
        }

        if !config.genesis.allocations.is_empty() {
            info!(
                "Applied {} genesis allocations of {}",
                config.genesis.allocations.len(),
                token
            );
        }
    }

    /// Submission handle of the running ledger service
    pub fn handle(&self) -> Option<LedgerHandle> {
        self.handle.clone()
    }

    /// Run the node until shutdown
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting ledger node...");

        let handle = self
            .handle
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Ledger service is not running"))?;

        let mut shutdown_rx = self
            .shutdown_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("Node is already running"))?;

        if self.config.rpc.enabled {
            let addr = self.config.rpc_addr()?;
            let handler = RpcHandler::new(handle.clone());
            let max_body = self.config.rpc.max_body_bytes;
            self.tasks.push(tokio::spawn(async move {
                if let Err(e) = Self::run_rpc_server(addr, handler, max_body).await {
                    error!("RPC server error: {}", e);
                }
            }));
        }

        if self.config.metrics.enabled {
            let port = self.config.metrics.port;
            self.tasks.push(tokio::spawn(async move {
                if let Err(e) = Self::run_metrics_server(port).await {
                    error!("Metrics server error: {}", e);
                }
            }));
        }

        let periodic = self.start_periodic_tasks(&handle);
        self.tasks.extend(periodic);

        shutdown_rx.recv().await;
        info!("Received internal shutdown signal");
        Ok(())
    }

    /// Sender that makes `run` return
    pub fn shutdown_sender(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Graceful shutdown: stop servers and drain the service
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Initiating graceful shutdown...");

        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }

        // The service exits once the last handle is gone
        self.handle = None;
        let Some(service_task) = self.service_task.take() else {
            return Ok(());
        };
        let ledger = service_task
            .await
            .context("Ledger service task failed")?;

        if let Some(reason) = ledger.halted() {
            error!("Ledger stopped in halted state: {}", reason);
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Serve JSON-RPC on `POST /rpc`
    async fn run_rpc_server(addr: SocketAddr, handler: RpcHandler, max_body: u64) -> Result<()> {
        use warp::Filter;

        let rpc_route = warp::post()
            .and(warp::path("rpc"))
            .and(warp::path::end())
            .and(warp::body::content_length_limit(max_body))
            .and(warp::body::bytes())
            .then(move |body: warp::hyper::body::Bytes| {
                let handler = handler.clone();
                async move {
                    let request = String::from_utf8_lossy(&body);
                    let response = handler.handle_request(&request).await;
                    warp::reply::with_header(response, "content-type", "application/json")
                }
            });

        let (bound, server) = warp::serve(rpc_route)
            .try_bind_ephemeral(addr)
            .with_context(|| format!("Failed to bind RPC server to {}", addr))?;
        info!("JSON-RPC server listening on http://{}/rpc", bound);
        server.await;

        Ok(())
    }

    /// Run Prometheus metrics server
    async fn run_metrics_server(port: u16) -> Result<()> {
        use warp::Filter;

        let metrics_route = warp::path("metrics").map(|| {
            let encoder = TextEncoder::new();
            let metric_families = match get_registry() {
                Some(registry) => registry.gather(),
                None => prometheus::gather(),
            };
            let mut buffer = Vec::new();

            encoder.encode(&metric_families, &mut buffer).ok();
            String::from_utf8(buffer).unwrap_or_default()
        });

        let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
        let (bound, server) = warp::serve(metrics_route)
            .try_bind_ephemeral(addr)
            .with_context(|| format!("Failed to bind metrics server to {}", addr))?;
        info!("Metrics server listening on http://{}/metrics", bound);
        server.await;

        Ok(())
    }

    /// Start periodic maintenance tasks
    fn start_periodic_tasks(&self, handle: &LedgerHandle) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        if self.config.distribution.enabled {
            let handle = handle.clone();
            let authority = self.config.ledger.relay_authority;
            let settle_at = self.config.distribution.settle_at_second_of_day;
            let check_interval = self.config.distribution.check_interval_secs;

            tasks.push(tokio::spawn(async move {
                let mut ticker = interval(Duration::from_secs(check_interval));
                loop {
                    ticker.tick().await;
                    match settle_if_due(&handle, authority, settle_at, time::now()).await {
                        Ok(reports) => {
                            for report in reports {
                                info!(
                                    day = report.day,
                                    participants = report.participants,
                                    relay_paid = %format_amount(report.relay_paid_total),
                                    fee_credited = %format_amount(report.fee_credited_total),
                                    "Settled distribution cycle"
                                );
                            }
                        }
                        Err(LedgerError::ServiceStopped) => break,
                        Err(e) => warn!("Cycle settlement failed: {}", e),
                    }
                }
            }));
        }

        // Online counts drift with time even when no call arrives
        if let Some(metrics) = self.metrics.clone() {
            let handle = handle.clone();
            let collection_interval = self.config.metrics.collection_interval_secs;

            tasks.push(tokio::spawn(async move {
                let mut ticker = interval(Duration::from_secs(collection_interval));
                loop {
                    ticker.tick().await;
                    let now = time::now();
                    match handle.execute(move |l| l.network_stats(now)).await {
                        Ok(Ok(stats)) => {
                            update_network_stats(&metrics, &stats);
                            debug!(
                                "Network: {} relay nodes, {} online",
                                stats.total_relay_nodes,
                                stats.online_relay_nodes
                            );
                        }
                        Ok(Err(e)) => warn!("Failed to collect network stats: {}", e),
                        Err(_) => break,
                    }
                }
            }));
        }

        tasks
    }
}

/// Settle every cycle that is due at `now`
///
/// The previous day is settled first when its window was missed, then the
/// current day once its settlement second has passed.
pub async fn settle_if_due<A: AssetLedger + 'static>(
    handle: &LedgerHandle<A>,
    authority: AccountId,
    settle_at_second_of_day: u64,
    now: Timestamp,
) -> relaynet_incentives::Result<Vec<CycleReport>> {
    let today = day_index(now);
    let state = handle.execute(|l| l.global_state()).await??;
    let unsettled = |day: u64| state.last_settled_day.map_or(true, |settled| settled < day);

    let mut due = Vec::new();
    if today > 0 && unsettled(today - 1) {
        due.push(today - 1);
    }
    if now % SECONDS_PER_DAY >= settle_at_second_of_day && unsettled(today) {
        due.push(today);
    }

    let mut reports = Vec::new();
    for day in due {
        match handle
            .call("settle_cycle", move |l| l.settle_day(authority, day, now))
            .await
        {
            Ok(report) => {
                if day < today {
                    warn!(day, "Settled a cycle whose settlement window was missed");
                }
                reports.push(report);
            }
            Err(LedgerError::CycleAlreadySettled(day)) => {
                debug!(day, "Cycle already settled");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenesisAllocation;
    use relaynet_core::{PublicKey, ONE_TOKEN};
    use relaynet_incentives::store::{keys, BatchOp};
    use relaynet_incentives::LedgerConfig;
    use std::path::Path;

    const DAY: Timestamp = 20_000 * SECONDS_PER_DAY;

    fn config_in(dir: &Path, backend: &str) -> NodeConfig {
        let mut config = NodeConfig::from_toml(&format!(
            r#"
            [node]
            id = "test-node"
            data_dir = "{}"

            [storage]
            backend = "{}"

            [rpc]
            enabled = false

            [metrics]
            enabled = false

            [distribution]
            enabled = false
            "#,
            dir.display(),
            backend
        ))
        .unwrap();
        config.genesis.allocations.push(GenesisAllocation {
            account: AccountId::from_label("alice"),
            amount: 500 * ONE_TOKEN,
            approve_custody: true,
        });
        config
    }

    async fn register_relay(handle: &LedgerHandle, account: AccountId, now: Timestamp) {
        handle
            .call("register", move |l| {
                l.register(account, PublicKey::new([7u8; 32]), "alice", now)
            })
            .await
            .unwrap();
        handle
            .call("register_as_relay", move |l| {
                l.register_as_relay(account, "wss://alice.example", 128, now)
            })
            .await
            .unwrap();
    }

    /// Stop the service without `shutdown`, as a crash would
    async fn abandon(mut node: LedgerNode) {
        node.handle = None;
        if let Some(task) = node.service_task.take() {
            drop(task.await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_balances_and_stake_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let alice = AccountId::from_label("alice");
        let now = time::now();

        let mut node = LedgerNode::new(config_in(dir.path(), "sled")).await.unwrap();
        let handle = node.handle().unwrap();
        register_relay(&handle, alice, now).await;
        drop(handle);
        node.shutdown().await.unwrap();

        // Genesis is not applied twice
        let mut node = LedgerNode::new(config_in(dir.path(), "sled")).await.unwrap();
        let handle = node.handle().unwrap();
        let (balance, custody_balance, staked) = handle
            .execute(move |l| {
                let token = l.token().clone();
                let custody = l.config().custody;
                (
                    l.assets().balance_of(&token, &alice),
                    l.assets().balance_of(&token, &custody),
                    l.get_relay_node(&alice).unwrap().map(|n| n.staked_amount),
                )
            })
            .await
            .unwrap();
        assert_eq!(balance, 400 * ONE_TOKEN);
        assert_eq!(custody_balance, 100 * ONE_TOKEN);
        assert_eq!(staked, Some(100 * ONE_TOKEN));

        drop(handle);
        node.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stake_returns_after_unclean_stop() {
        let dir = tempfile::tempdir().unwrap();
        let alice = AccountId::from_label("alice");
        let now = time::now();

        let node = LedgerNode::new(config_in(dir.path(), "sled")).await.unwrap();
        let handle = node.handle().unwrap();
        register_relay(&handle, alice, now).await;
        drop(handle);
        abandon(node).await;

        let mut node = LedgerNode::new(config_in(dir.path(), "sled")).await.unwrap();
        let handle = node.handle().unwrap();
        let returned = handle
            .call("deactivate_relay", move |l| l.deactivate_relay(alice, now + 60))
            .await
            .unwrap();
        assert_eq!(returned, 100 * ONE_TOKEN);

        let (balance, halted) = handle
            .execute(move |l| {
                let token = l.token().clone();
                (l.assets().balance_of(&token, &alice), l.halted().is_some())
            })
            .await
            .unwrap();
        assert_eq!(balance, 500 * ONE_TOKEN);
        assert!(!halted);

        drop(handle);
        node.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_genesis_refused_when_stake_has_no_balances() {
        let dir = tempfile::tempdir().unwrap();
        let alice = AccountId::from_label("alice");
        let config = config_in(dir.path(), "sled");

        let node = LedgerNode::new(config.clone()).await.unwrap();
        let handle = node.handle().unwrap();
        register_relay(&handle, alice, time::now()).await;
        drop(handle);
        abandon(node).await;

        {
            let mut store = SledBackend::open_with_config(&config.storage_path(), 8 * 1024 * 1024, true)
                .unwrap();
            store
                .apply(vec![BatchOp::Delete(keys::ASSETS.to_vec())])
                .unwrap();
        }

        let err = LedgerNode::new(config).await.err().unwrap();
        assert!(err.to_string().contains("refusing to apply genesis"));
    }

    #[tokio::test]
    async fn test_run_returns_on_shutdown_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path(), "memory");
        config.distribution.enabled = true;
        config.distribution.check_interval_secs = 1;

        let mut node = LedgerNode::new(config).await.unwrap();
        let stop = node.shutdown_sender();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = stop.send(()).await;
        });

        node.run().await.unwrap();
        assert!(node.run().await.is_err());
        node.shutdown().await.unwrap();
        assert!(node.handle().is_none());
    }

    #[tokio::test]
    async fn test_settle_if_due_settles_each_day_once() {
        let ledger = IncentiveLedger::in_memory(LedgerConfig::default()).unwrap();
        let authority = ledger.config().relay_authority;
        let (handle, _task) = LedgerService::spawn(ledger, None);
        let settle_at = 86_100;
        let today = day_index(DAY);

        // A fresh ledger first closes the day before
        let early = settle_if_due(&handle, authority, settle_at, DAY + 3_600).await.unwrap();
        assert_eq!(early.iter().map(|r| r.day).collect::<Vec<_>>(), vec![today - 1]);
        assert!(settle_if_due(&handle, authority, settle_at, DAY + 7_200)
            .await
            .unwrap()
            .is_empty());

        let due = settle_if_due(&handle, authority, settle_at, DAY + 86_200).await.unwrap();
        assert_eq!(due.iter().map(|r| r.day).collect::<Vec<_>>(), vec![today]);

        let again = settle_if_due(&handle, authority, settle_at, DAY + 86_300).await.unwrap();
        assert!(again.is_empty());

        let next = settle_if_due(&handle, authority, settle_at, DAY + SECONDS_PER_DAY + 86_200)
            .await
            .unwrap();
        assert_eq!(next.iter().map(|r| r.day).collect::<Vec<_>>(), vec![today + 1]);
    }

    #[tokio::test]
    async fn test_missed_window_is_settled_after_midnight() {
        let mut ledger = IncentiveLedger::in_memory(LedgerConfig::default()).unwrap();
        let authority = ledger.config().relay_authority;
        let token = ledger.token().clone();
        let custody = ledger.config().custody;
        let alice = AccountId::from_label("alice");
        ledger.assets_mut().mint(&token, &alice, 200 * ONE_TOKEN);
        ledger
            .assets_mut()
            .approve(&token, &alice, &custody, 200 * ONE_TOKEN);
        ledger.register(alice, PublicKey::new([5u8; 32]), "alice", DAY).unwrap();
        ledger
            .register_as_relay(alice, "wss://alice.example", 1_024, DAY)
            .unwrap();
        let (handle, _task) = LedgerService::spawn(ledger, None);
        let settle_at = 86_100;
        let today = day_index(DAY);

        let settled = settle_if_due(&handle, authority, settle_at, DAY + 60).await.unwrap();
        assert_eq!(settled.len(), 1);

        // Two hours online, then the node is down through the settlement window
        let mut t = DAY;
        while t < DAY + 7_200 {
            t += 60;
            handle.call("heartbeat", move |l| l.heartbeat(alice, t)).await.unwrap();
        }
        // First heartbeat of the next day rolls the counters over
        let tomorrow = DAY + SECONDS_PER_DAY;
        handle
            .call("heartbeat", move |l| l.heartbeat(alice, tomorrow + 30))
            .await
            .unwrap();

        let reports = settle_if_due(&handle, authority, settle_at, tomorrow + 60).await.unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.day, today);
        assert_eq!(report.participants, 1);
        assert!(report.fee_credited_total > 0);

        let pending = handle
            .execute(move |l| l.get_relay_node(&alice).unwrap().map(|n| n.pending_fee_reward))
            .await
            .unwrap();
        assert_eq!(pending, Some(report.fee_credited_total));
    }
}
