//! Daily trigger for the orchestrator using tokio-cron-scheduler.

use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::orchestrator::{Orchestrator, RunOutcome};

/// Midnight at UTC+9, expressed in UTC (sec min hour dom mon dow).
pub const DEFAULT_SCHEDULE: &str = "0 0 15 * * *";

/// Register the daily run and start the scheduler.
pub async fn start_scheduler(orchestrator: Arc<Orchestrator>, schedule: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let daily = Job::new_async(schedule, move |_uuid, _lock| {
        let orchestrator = orchestrator.clone();
        Box::pin(async move {
            run_once(&orchestrator).await;
        })
    })?;

    scheduler.add(daily).await?;
    scheduler.start().await?;

    tracing::info!("Daily collection scheduled ({})", schedule);
    Ok(scheduler)
}

/// One scheduled firing: dispatch, then wait for this shard's aggregation.
async fn run_once(orchestrator: &Orchestrator) {
    tracing::info!("Running daily collection");

    let outcome = match orchestrator.run_daily(false).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Daily collection failed to start: {}", e);
            return;
        }
    };

    match outcome {
        RunOutcome::Dispatched { summary, handle } => {
            tracing::info!(
                "Dispatched {}/{} keywords for job {}",
                summary.my_keywords,
                summary.total_keywords,
                summary.job_id
            );
            match handle.wait().await {
                Ok(done) => tracing::info!("Daily collection finished: {}", done.label()),
                Err(e) => tracing::error!("Daily collection aggregation failed: {}", e),
            }
        }
        other => tracing::info!("Daily collection skipped: {}", other.label()),
    }
}
