//! Periodic license health sweeps.
//!
//! Every interval the scheduler re-checks each plugin whose license is
//! currently valid. Checks run in [`FailureMode::PreserveStatus`](crate::FailureMode::PreserveStatus), so a
//! single failed request never flips a plugin off; instead the failure
//! counter is compared to the plugin's tolerance and the plugin is
//! deactivated once it is exceeded. Invalid plugins are left alone until a
//! user validates them again.
//!
//! At most one sweep runs at a time. Ticks that fall due while a sweep is
//! still running are dropped, not queued.

use crate::config::KeeperConfig;
use crate::record::PluginRecord;
use crate::registry::LicenseRegistry;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Buffered events per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 64;

/// Something a sweep wants collaborators to know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LicenseEvent {
    /// Emitted after every check of a plugin with a tolerance, failed or not.
    FailureReported {
        plugin_id: String,
        consecutive_failures: u32,
        record: PluginRecord,
    },
    /// The plugin went past its tolerance and was deactivated.
    Deactivated {
        plugin_id: String,
        consecutive_failures: u32,
    },
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Valid plugins that were re-checked.
    pub checked: usize,
    /// Checks that did not succeed.
    pub failed: usize,
    /// Plugins deactivated for exceeding their tolerance.
    pub deactivated: usize,
    /// Plugins skipped because they were not valid.
    pub skipped: usize,
}

/// Runs license health sweeps over a registry.
pub struct RevalidationScheduler {
    registry: Arc<LicenseRegistry>,
    interval: Duration,
    events: broadcast::Sender<LicenseEvent>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a sweep ends, however it ends.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RevalidationScheduler {
    /// Creates a scheduler that sweeps every `interval`.
    pub fn new(registry: Arc<LicenseRegistry>, interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry,
            interval: interval.max(Duration::from_millis(1)),
            events,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn from_config(registry: Arc<LicenseRegistry>, config: &KeeperConfig) -> Self {
        Self::new(registry, config.sweep_interval())
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Subscribes to sweep events.
    pub fn subscribe(&self) -> broadcast::Receiver<LicenseEvent> {
        self.events.subscribe()
    }

    /// Returns true while a sweep is running.
    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Runs one sweep now, or returns `None` if one is already running.
    pub async fn try_sweep(&self) -> Option<SweepReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sweep already in flight");
            return None;
        }
        let _guard = SweepGuard(&self.in_flight);
        Some(self.sweep().await)
    }

    async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for record in self.registry.list() {
            let id = record.id();
            let check = match self.registry.health_check(id).await {
                Ok(Some(check)) => check,
                Ok(None) => {
                    debug!(plugin_id = %id, "Skipping invalid license");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(plugin_id = %id, error = %e, "Health check could not be recorded");
                    report.checked += 1;
                    report.failed += 1;
                    continue;
                }
            };

            report.checked += 1;
            if !check.passed {
                report.failed += 1;
            }
            if !record.tolerance_enabled() {
                continue;
            }

            let failures = check.consecutive_failures;
            let _ = self.events.send(LicenseEvent::FailureReported {
                plugin_id: id.to_string(),
                consecutive_failures: failures,
                record: record.clone(),
            });

            if !record.exceeds_tolerance(failures) {
                continue;
            }
            match self.registry.deactivate_over_tolerance(id).await {
                Ok(true) => {
                    report.deactivated += 1;
                    warn!(
                        plugin_id = %id,
                        failed = failures,
                        tolerance = record.failure_tolerance(),
                        "License exceeded failure tolerance"
                    );
                    let _ = self.events.send(LicenseEvent::Deactivated {
                        plugin_id: id.to_string(),
                        consecutive_failures: failures,
                    });
                }
                Ok(false) => {}
                Err(e) => warn!(plugin_id = %id, error = %e, "Deactivation failed"),
            }
        }

        info!(
            checked = report.checked,
            failed = report.failed,
            deactivated = report.deactivated,
            skipped = report.skipped,
            "License sweep finished"
        );
        report
    }

    /// Starts sweeping on a timer. The first sweep runs immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let scheduler = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = scheduler.interval.as_secs(), "Revalidation scheduler started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        // A started sweep always runs to completion.
                        if scheduler.try_sweep().await.is_none() {
                            debug!("Previous sweep still running, tick dropped");
                        }
                    }
                }
            }
            info!("Revalidation scheduler stopped");
        });

        SchedulerHandle { cancel, task }
    }
}

/// Handle to a running scheduler task.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops the timer and waits for any running sweep to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Scheduler task ended abnormally");
        }
    }
}
