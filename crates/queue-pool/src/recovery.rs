//! Cancellable periodic background job.
//!
//! The pool runs its recovery loop on a [`PeriodicJob`]: a unit of work
//! executed on a fixed timer until the job's stop signal fires or the work
//! itself asks to stop.
//!
//! # Behavior
//!
//! - The first run happens one full period after the job is spawned
//! - Missed ticks are skipped, so a slow run never causes a burst of catch-up runs
//! - The stop signal also interrupts a run in progress; the run is dropped
//!   at its current await point

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;

/// Handle to a spawned periodic job.
///
/// Dropping the handle stops the job.
pub struct PeriodicJob {
    name: &'static str,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PeriodicJob {
    /// Spawn `work` to run every `period` until `cancel` fires.
    ///
    /// `work` returning [`ControlFlow::Break`] also ends the job.
    pub fn spawn<F, Fut>(
        name: &'static str,
        period: Duration,
        cancel: CancellationToken,
        mut work: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let job_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(job = name, period_secs = period.as_secs_f64(), "Periodic job started");

            loop {
                tokio::select! {
                    _ = job_cancel.cancelled() => {
                        info!(job = name, "Periodic job shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        debug!(job = name, "Periodic job tick");
                        let flow = tokio::select! {
                            biased;
                            _ = job_cancel.cancelled() => {
                                info!(job = name, "Periodic job stopped during a run");
                                break;
                            }
                            flow = work() => flow,
                        };
                        if flow.is_break() {
                            info!(job = name, "Periodic job finished");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            name,
            cancel,
            task: Some(task),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the job to stop, interrupting any run in progress
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the job and wait for it to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(job = self.name, error = %e, "Periodic job task ended abnormally");
            }
        }
    }
}

impl Drop for PeriodicJob {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
