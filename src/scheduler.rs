//! Periodic job scheduling
//!
//! Each job gets its own task driven by a tokio interval. A run is awaited
//! before the next tick is taken, so a job never overlaps itself; ticks
//! missed while a run was in progress are skipped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::KarmaError;
use crate::services::{AccrualEngine, ReminderNotifier};

/// A job the scheduler fires on a fixed cadence
#[async_trait]
pub trait PeriodicJob: Send + Sync {
    fn name(&self) -> &str;

    async fn tick(&self) -> Result<(), KarmaError>;
}

#[async_trait]
impl PeriodicJob for AccrualEngine {
    fn name(&self) -> &str {
        "accrual"
    }

    async fn tick(&self) -> Result<(), KarmaError> {
        self.run().await.map(|_| ())
    }
}

#[async_trait]
impl PeriodicJob for ReminderNotifier {
    fn name(&self) -> &str {
        "reminders"
    }

    async fn tick(&self) -> Result<(), KarmaError> {
        self.run().await.map(|_| ())
    }
}

/// Fire `job` every `period` until `shutdown` receives (or closes)
///
/// The first run happens immediately.
pub fn spawn_periodic(
    job: Arc<dyn PeriodicJob>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    info!(job = job.name(), interval = ?period, "Starting periodic job");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match job.tick().await {
                        Ok(()) => {}
                        // Rolled back; next tick retries the whole batch
                        Err(e) if e.is_store_error() => {
                            warn!(job = job.name(), error = %e, "Store error, retrying next tick");
                        }
                        Err(e) => {
                            error!(job = job.name(), error = %e, "Periodic job failed");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!(job = job.name(), "Periodic job stopped");
                    break;
                }
            }
        }
    })
}
