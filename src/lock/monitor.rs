//! Background reconciliation of locked UTXOs
//!
//! The monitor wakes on a fixed cadence, snapshots the registry, evaluates
//! every unlock condition without holding the registry lock, and releases the
//! UTXOs whose condition fired. A panicking condition is logged and its UTXO
//! stays locked until a later pass or an explicit unlock.

use super::LockRegistry;
use crate::metrics::{self, ReleaseReason};

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Default time between two sweeps
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of a single sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evaluated: usize,
    pub released: usize,
    pub faulted: usize,
}

/// Periodically releases locks whose unlock condition holds
pub struct LockMonitor {
    bridge: String,
    registry: Arc<LockRegistry>,
    interval: Duration,
}

impl LockMonitor {
    pub fn new(bridge: impl Into<String>, registry: Arc<LockRegistry>, interval: Duration) -> Self {
        Self {
            bridge: bridge.into(),
            registry,
            // tokio intervals reject a zero period
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Start the monitor on the current runtime
    pub fn spawn(self) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        MonitorHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Sweep loop; stops between passes once shutdown is signalled
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Lock monitor started for bridge {} (interval {:?})",
            self.bridge, self.interval
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }

        info!("Lock monitor stopped for bridge {}", self.bridge);
    }

    /// Run one reconciliation pass
    pub async fn sweep_once(&self) -> SweepReport {
        let started = Instant::now();
        let candidates = self.registry.snapshot().await;
        debug!(
            "Checking {} locked UTXOs for bridge {}",
            candidates.len(),
            self.bridge
        );

        let mut report = SweepReport {
            evaluated: candidates.len(),
            ..SweepReport::default()
        };

        let now = Utc::now();
        let mut due = Vec::new();
        for candidate in candidates {
            match candidate.condition.evaluate_at(now) {
                Ok(true) => due.push(candidate),
                Ok(false) => {}
                Err(fault) => {
                    warn!(
                        "Skipping UTXO {} on bridge {}: {}",
                        candidate.key, self.bridge, fault
                    );
                    metrics::record_condition_fault(&self.bridge);
                    report.faulted += 1;
                }
            }
        }

        for candidate in due {
            if self
                .registry
                .release_if_current(&candidate.key, candidate.generation)
                .await
            {
                debug!(
                    "Unlock UTXO {} on bridge {} ({} condition)",
                    candidate.key,
                    self.bridge,
                    candidate.condition.kind()
                );
                metrics::record_release(&self.bridge, ReleaseReason::Sweep);
                report.released += 1;
            }
        }

        metrics::record_locked_utxos(&self.bridge, self.registry.len().await);
        metrics::record_sweep_duration(&self.bridge, started.elapsed().as_secs_f64());

        if report.released > 0 {
            info!(
                "Released {} of {} locked UTXOs on bridge {}",
                report.released, report.evaluated, self.bridge
            );
        }

        report
    }
}

/// Controls a running [`LockMonitor`]
///
/// Dropping the handle also stops the monitor after its current pass.
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal shutdown and wait for the monitor to exit
    pub async fn stop(self) {
        // The receiver is gone only if the task already exited
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Lock monitor task failed: {}", e);
        }
    }
}
