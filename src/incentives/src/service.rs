//! Async front end for the ledger
//!
//! The ledger is a single-writer state machine. [`LedgerService`] owns it on
//! one task and applies queued jobs strictly in arrival order; any number of
//! cloned [`LedgerHandle`]s submit jobs and await their replies. Committed
//! events fan out to subscribers over a broadcast channel and are mirrored
//! into the metrics.

use std::sync::Arc;
use std::time::Instant;

use relaynet_core::types::time;
use relaynet_core::{AssetLedger, InMemoryAssetLedger};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{LedgerError, Result};
use crate::events::LedgerEvent;
use crate::ledger::IncentiveLedger;
use crate::metrics::{self, LedgerMetrics};

type Job<A> = Box<dyn FnOnce(&mut IncentiveLedger<A>) + Send>;

/// Default depth of the job queue
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

/// Default capacity of the event broadcast buffer
pub const DEFAULT_EVENT_BUFFER: usize = 4096;

pub struct LedgerService<A: AssetLedger + 'static = InMemoryAssetLedger> {
    ledger: IncentiveLedger<A>,
    jobs: mpsc::Receiver<Job<A>>,
    events: broadcast::Sender<LedgerEvent>,
    metrics: Option<Arc<LedgerMetrics>>,
}

impl<A: AssetLedger + 'static> LedgerService<A> {
    /// Start the service task
    ///
    /// The task ends once every handle is dropped; it then flushes the store
    /// and yields the ledger back.
    pub fn spawn(
        ledger: IncentiveLedger<A>,
        metrics: Option<Arc<LedgerMetrics>>,
    ) -> (LedgerHandle<A>, JoinHandle<IncentiveLedger<A>>) {
        Self::spawn_with_capacity(ledger, metrics, DEFAULT_QUEUE_DEPTH, DEFAULT_EVENT_BUFFER)
    }

    pub fn spawn_with_capacity(
        ledger: IncentiveLedger<A>,
        metrics: Option<Arc<LedgerMetrics>>,
        queue_depth: usize,
        event_buffer: usize,
    ) -> (LedgerHandle<A>, JoinHandle<IncentiveLedger<A>>) {
        let (jobs_tx, jobs_rx) = mpsc::channel(queue_depth);
        let (events_tx, _) = broadcast::channel(event_buffer);

        let handle = LedgerHandle {
            jobs: jobs_tx,
            events: events_tx.clone(),
            metrics: metrics.clone(),
        };
        let service = Self {
            ledger,
            jobs: jobs_rx,
            events: events_tx,
            metrics,
        };
        (handle, tokio::spawn(service.run()))
    }

    async fn run(mut self) -> IncentiveLedger<A> {
        info!("Ledger service started");
        self.publish_state();

        while let Some(job) = self.jobs.recv().await {
            job(&mut self.ledger);
            self.publish_events();
        }

        if let Err(e) = self.ledger.flush() {
            error!("Failed to flush ledger store on shutdown: {}", e);
        }
        info!("Ledger service stopped");
        self.ledger
    }

    fn publish_events(&mut self) {
        let events = self.ledger.drain_events();
        if events.is_empty() {
            return;
        }

        for event in events {
            if let Some(metrics) = &self.metrics {
                metrics::observe_event(metrics, &event);
            }
            // No subscribers is fine
            let _ = self.events.send(event);
        }
        self.publish_state();
    }

    fn publish_state(&self) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        match self.ledger.network_stats(time::now()) {
            Ok(stats) => metrics::update_network_stats(metrics, &stats),
            Err(e) => warn!("Failed to refresh ledger gauges: {}", e),
        }
    }
}

/// Cloneable submission handle
pub struct LedgerHandle<A: AssetLedger + 'static = InMemoryAssetLedger> {
    jobs: mpsc::Sender<Job<A>>,
    events: broadcast::Sender<LedgerEvent>,
    metrics: Option<Arc<LedgerMetrics>>,
}

impl<A: AssetLedger + 'static> Clone for LedgerHandle<A> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            events: self.events.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<A: AssetLedger + 'static> LedgerHandle<A> {
    /// Run a closure against the ledger on the service task
    pub async fn execute<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut IncentiveLedger<A>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job<A> = Box::new(move |ledger| {
            let _ = reply_tx.send(f(ledger));
        });

        self.jobs
            .send(job)
            .await
            .map_err(|_| LedgerError::ServiceStopped)?;
        reply_rx.await.map_err(|_| LedgerError::ServiceStopped)
    }

    /// Run a fallible ledger operation, recording latency and rejections
    pub async fn call<R, F>(&self, operation: &'static str, f: F) -> Result<R>
    where
        F: FnOnce(&mut IncentiveLedger<A>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let started = Instant::now();
        let result = self.execute(f).await.and_then(|inner| inner);

        if let Some(metrics) = &self.metrics {
            metrics::observe_operation(metrics, operation, started.elapsed().as_secs_f64());
            if let Err(e) = &result {
                metrics::record_rejection(metrics, e);
            }
        }
        if let Err(e) = &result {
            debug!(operation, error = %e, "Ledger call failed");
        }
        result
    }

    /// Receive events committed from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.jobs.is_closed()
    }
}
