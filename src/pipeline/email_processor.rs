//! Background inbox service. Owns the processor, the live cycle settings
//! and the run statistics.
//!
//! Cycles come from two places:
//! 1. `spawn_inbox_poller()`: timer loop, waits for any running cycle
//! 2. `InboxService::run_now()`: on-demand, refused while a cycle runs
//!
//! At most one cycle touches the mailbox at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::CycleConfig;
use crate::error::{InboxError, MailboxError};
use crate::pipeline::processor::InboxProcessor;
use crate::pipeline::types::CycleReport;
use crate::routing::RoutingTable;

/// Counters across all cycles since startup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub cycles: u64,
    /// Cycles that ended with a connection or listing error.
    pub failed_cycles: u64,
    pub processed: u64,
    pub failed_messages: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_report: Option<CycleReport>,
    pub last_error: Option<String>,
}

impl RunStats {
    fn record(&mut self, result: &Result<CycleReport, MailboxError>) {
        self.cycles += 1;
        self.last_run_at = Some(Utc::now());
        match result {
            Ok(report) => {
                self.processed += report.processed_count as u64;
                self.failed_messages += report.failed_count() as u64;
                self.last_report = Some(report.clone());
                self.last_error = None;
            }
            Err(e) => {
                self.failed_cycles += 1;
                self.last_error = Some(e.to_string());
            }
        }
    }
}

pub struct InboxService {
    processor: InboxProcessor,
    config: RwLock<CycleConfig>,
    run_lock: Arc<Mutex<()>>,
    stats: RwLock<RunStats>,
}

impl InboxService {
    pub fn new(processor: InboxProcessor, config: CycleConfig) -> Self {
        Self {
            processor,
            config: RwLock::new(config),
            run_lock: Arc::new(Mutex::new(())),
            stats: RwLock::new(RunStats::default()),
        }
    }

    /// Run a cycle now, unless one is already running.
    pub async fn run_now(self: &Arc<Self>) -> Result<CycleReport, InboxError> {
        let guard = Arc::clone(&self.run_lock)
            .try_lock_owned()
            .map_err(|_| InboxError::CycleInProgress)?;
        Ok(self.spawn_cycle(guard).await?)
    }

    /// Run a cycle, waiting for any running one to finish first.
    pub async fn run_when_idle(self: &Arc<Self>) -> Result<CycleReport, MailboxError> {
        let guard = Arc::clone(&self.run_lock).lock_owned().await;
        self.spawn_cycle(guard).await
    }

    /// Wait until no cycle is running.
    pub async fn wait_idle(&self) {
        let _guard = self.run_lock.lock().await;
    }

    /// The cycle runs on its own task holding `guard`, so a caller that goes
    /// away mid-cycle cannot skip the disconnect or the stats update.
    async fn spawn_cycle(
        self: &Arc<Self>,
        guard: OwnedMutexGuard<()>,
    ) -> Result<CycleReport, MailboxError> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            service.run_locked().await
        })
        .await
        .map_err(|e| MailboxError::Command {
            command: "cycle".into(),
            reason: format!("cycle task failed: {e}"),
        })?
    }

    async fn run_locked(&self) -> Result<CycleReport, MailboxError> {
        let snapshot = self.config.read().await.clone();
        let result = self.processor.run_cycle(&snapshot).await;
        self.stats.write().await.record(&result);
        result
    }

    pub async fn stats(&self) -> RunStats {
        self.stats.read().await.clone()
    }

    pub async fn config(&self) -> CycleConfig {
        self.config.read().await.clone()
    }

    pub async fn routing(&self) -> RoutingTable {
        self.config.read().await.routing.clone()
    }

    /// Replace the routing table. Takes effect from the next cycle.
    pub async fn set_routing(&self, routing: RoutingTable) {
        info!(routes = routing.configured_count(), "Routing table updated");
        self.config.write().await.routing = routing;
    }
}

/// Spawn a background task that runs a cycle every `interval`.
///
/// The first cycle runs immediately. Returns a `JoinHandle` and shutdown flag.
/// Aborting the handle never interrupts a cycle already started; use
/// `InboxService::wait_idle` to wait for it.
pub fn spawn_inbox_poller(
    service: Arc<InboxService>,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!("Inbox poller started, checking every {}s", interval.as_secs());

        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Inbox poller shutting down");
                return;
            }

            match service.run_when_idle().await {
                Ok(report) => debug!(
                    run_id = %report.run_id,
                    processed = report.processed_count,
                    "Scheduled cycle finished"
                ),
                Err(e) => error!("Scheduled cycle failed: {e}"),
            }
        }
    });

    (handle, shutdown_flag)
}
