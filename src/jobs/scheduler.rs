//! Cron timers for scheduled jobs.
//!
//! Every scheduled job gets its own timer task: compute the next trigger
//! time, sleep until it, call the worker's `on_schedule` hook, repeat. The
//! task is cancelled through the runtime's `CancellationToken`, so stopping
//! a job never races a firing timer.

use std::sync::{Arc, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cron::CronExpression;
use crate::error::{EngineError, EngineResult};
use crate::jobs::engine::{JobEngine, JobRuntime};
use crate::jobs::models::JobStatus;

/// Start the schedule timer for a job, replacing any previous one.
///
/// No-op for on-demand jobs, inactive jobs, or while the engine is stopped.
pub(crate) fn start(engine: &JobEngine, runtime: &Arc<JobRuntime>) -> EngineResult<()> {
    if !engine.is_running() {
        return Ok(());
    }
    let job = runtime.snapshot();
    if !job.job_type.is_scheduled() || job.status != JobStatus::Active {
        return Ok(());
    }
    let schedule = job
        .schedule
        .as_deref()
        .ok_or_else(|| EngineError::MissingSchedule {
            job: job.name.clone(),
        })?;
    let expression = CronExpression::parse(schedule)?;

    let token = CancellationToken::new();
    {
        let mut slot = runtime
            .schedule_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        *slot = Some(token.clone());
    }

    info!(job = %job.name, schedule = %expression, "schedule timer started");
    tokio::spawn(timer_loop(engine.clone(), runtime.clone(), expression, token));
    Ok(())
}

/// Cancel the job's schedule timer if one is running.
pub(crate) fn stop(runtime: &Arc<JobRuntime>) {
    let mut slot = runtime
        .schedule_timer
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(token) = slot.take() {
        token.cancel();
    }
}

async fn timer_loop(
    engine: JobEngine,
    runtime: Arc<JobRuntime>,
    expression: CronExpression,
    token: CancellationToken,
) {
    loop {
        let now = engine.now();
        let Some(next) = expression.next_time_after(now) else {
            warn!(schedule = %expression, "schedule has no future trigger time, timer ends");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = token.cancelled() => {
                debug!(schedule = %expression, "schedule timer cancelled");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        let job = runtime.snapshot();
        if job.status != JobStatus::Active {
            return;
        }
        debug!(job = %job.name, "schedule triggered");
        match engine.resolve_worker(&job) {
            Ok(worker) => {
                if let Err(err) = worker.on_schedule(&engine, &job).await {
                    error!(job = %job.name, error = %err, "schedule trigger failed");
                }
            }
            Err(err) => {
                warn!(job = %job.name, error = %err, "schedule trigger has no worker");
            }
        }
    }
}
