//! Dispatch and execution of queued work.
//!
//! `dispatch` fills a job's free worker slots from its ready queue; each
//! dispatched execution runs as its own tokio task. Starting an execution
//! goes through the store's compare-and-set claim, so a candidate another
//! process already started is simply skipped.

use std::sync::Arc;

use chrono::NaiveDateTime;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::error::EngineResult;
use crate::jobs::engine::{JobEngine, JobRuntime};
use crate::jobs::models::{ExecutionStatus, Job, JobExecution, JobStatus, NewExecution};
use crate::jobs::types::{JobContext, JobWorker};

/// Fill free worker slots from the ready queue.
///
/// Stops when the job is inactive, no slot is free, the throttle window is
/// full, or the queue is empty.
pub(crate) async fn dispatch(engine: &JobEngine, runtime: &Arc<JobRuntime>) {
    loop {
        let job = runtime.snapshot();
        if job.status != JobStatus::Active {
            return;
        }
        let Ok(worker) = engine.resolve_worker(&job) else {
            warn!(
                job = %job.name,
                worker = %job.worker_name,
                "no worker registered, queued executions stay put"
            );
            return;
        };
        let Ok(permit) = runtime.slots.clone().try_acquire_owned() else {
            return;
        };
        let now = engine.now();
        if !runtime.try_reserve_start(&job, now) {
            debug!(job = %job.name, "dispatch throttled");
            return;
        }
        let Some(execution) = runtime.lock_queue().pop() else {
            runtime.release_start(&job, now);
            return;
        };

        match engine.store().claim_started(execution.id, now).await {
            Ok(true) => {
                runtime.mark_running(execution.id);
                let mut execution = execution;
                execution.status = ExecutionStatus::Running;
                execution.started_at = Some(now);
                debug!(execution = execution.id, job = %job.name, "execution dispatched");
                tokio::spawn(run(
                    engine.clone(),
                    runtime.clone(),
                    job,
                    worker,
                    execution,
                    permit,
                ));
            }
            Ok(false) => {
                // someone else started it first
                debug!(execution = execution.id, "lost the start claim, skipping");
                runtime.release_start(&job, now);
                drop(permit);
            }
            Err(err) => {
                error!(execution = execution.id, error = %err, "start claim failed");
                runtime.release_start(&job, now);
                runtime.lock_queue().push(execution);
                return;
            }
        }
    }
}

/// Run one claimed execution to completion and record the outcome.
async fn run(
    engine: JobEngine,
    runtime: Arc<JobRuntime>,
    job: Job,
    worker: Arc<dyn JobWorker>,
    execution: JobExecution,
    permit: tokio::sync::OwnedSemaphorePermit,
) {
    let ctx = JobContext {
        job_id: job.id,
        job_name: job.name.clone(),
        execution: execution.clone(),
    };
    // a panicking worker fails its execution, never the engine
    let outcome = std::panic::AssertUnwindSafe(worker.do_work(ctx))
        .catch_unwind()
        .await;
    let ended_at = engine.now();

    let result = match outcome {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!("worker panicked: {}", panic_message(&panic))),
    };

    let recorded = match result {
        Ok(()) => finish(&engine, &execution, ended_at).await,
        Err(err) => {
            warn!(
                execution = execution.id,
                job = %job.name,
                error = %err,
                "job execution failed"
            );
            handle_failure(
                &engine,
                &execution,
                &job,
                ended_at,
                &err.to_string(),
                Some(format!("{err:?}")),
            )
            .await
        }
    };
    if let Err(err) = recorded {
        error!(execution = execution.id, error = %err, "failed to record execution outcome");
    }

    runtime.mark_done(execution.id);
    drop(permit);
    tokio::spawn(redispatch(engine, runtime));
}

/// Boxed follow-up dispatch so the run/dispatch cycle stays representable.
fn redispatch(engine: JobEngine, runtime: Arc<JobRuntime>) -> BoxFuture<'static, ()> {
    async move { dispatch(&engine, &runtime).await }.boxed()
}

async fn finish(
    engine: &JobEngine,
    execution: &JobExecution,
    ended_at: NaiveDateTime,
) -> EngineResult<()> {
    let duration = execution
        .started_at
        .map(|started| (ended_at - started).num_milliseconds());
    engine
        .store()
        .update_ended(execution.id, ExecutionStatus::Finished, ended_at, duration)
        .await?;
    debug!(execution = execution.id, "execution finished");

    if let Some(chain_id) = execution.chain_id {
        promote_next_in_chain(engine, chain_id, execution.id).await?;
    }
    Ok(())
}

/// Unlock the chain link waiting on `previous_id`.
///
/// Clearing its predecessor reference turns the link into an ordinary
/// candidate, subject to the usual maturity and ordering rules; if it is
/// already mature it goes straight into the ready queue.
async fn promote_next_in_chain(
    engine: &JobEngine,
    chain_id: i64,
    previous_id: i64,
) -> EngineResult<()> {
    let Some(next) = engine
        .store()
        .find_next_in_chain(chain_id, previous_id)
        .await?
    else {
        return Ok(());
    };
    engine
        .store()
        .update_group(next.id, next.batch_id, next.chain_id, None)
        .await?;
    debug!(chain = chain_id, execution = next.id, "chain link unlocked");

    let now = engine.now();
    if next.maturity.is_none_or(|m| m <= now) {
        if let Some(runtime) = engine.runtime_opt(next.job_id) {
            let mut unlocked = next;
            unlocked.chain_previous_execution_id = None;
            runtime.lock_queue().push(unlocked);
        }
    }
    Ok(())
}

/// Record a failed execution and apply the job's retry policy.
///
/// With retries left a fresh Queued record is spawned, maturing after the
/// job's retry delay; a chained execution's successor is rewired to wait on
/// the retry. Once retries are exhausted the failure is terminal and any
/// queued remainder of the chain is aborted.
pub(crate) async fn handle_failure(
    engine: &JobEngine,
    execution: &JobExecution,
    job: &Job,
    ended_at: NaiveDateTime,
    message: &str,
    stacktrace: Option<String>,
) -> EngineResult<()> {
    let duration = execution
        .started_at
        .map(|started| (ended_at - started).num_milliseconds());
    engine
        .store()
        .update_ended(execution.id, ExecutionStatus::Failed, ended_at, duration)
        .await?;

    if execution.fail_retry < job.fail_retries {
        let maturity = ended_at + chrono::Duration::seconds(job.retry_delay_seconds);
        // the retry's own predecessor is already terminal, so it starts
        // unlocked even inside a chain
        let retry = engine
            .store()
            .insert(NewExecution {
                job_id: execution.job_id,
                parameters: execution.parameters.clone(),
                parameters_hash: execution.parameters_hash,
                priority: execution.priority,
                maturity: Some(maturity),
                batch_id: execution.batch_id,
                chain_id: execution.chain_id,
                chain_previous_execution_id: None,
                fail_retry: execution.fail_retry + 1,
                created_at: ended_at,
            })
            .await?;
        engine
            .store()
            .update_failure(
                execution.id,
                Some(message.to_string()),
                stacktrace,
                Some(retry.id),
            )
            .await?;

        if let Some(chain_id) = execution.chain_id {
            if let Some(next) = engine
                .store()
                .find_next_in_chain(chain_id, execution.id)
                .await?
            {
                engine
                    .store()
                    .update_group(next.id, next.batch_id, next.chain_id, Some(retry.id))
                    .await?;
            }
        }
        info!(
            execution = execution.id,
            retry = retry.id,
            attempt = retry.fail_retry,
            "spawned retry execution"
        );
    } else {
        engine
            .store()
            .update_failure(execution.id, Some(message.to_string()), stacktrace, None)
            .await?;
        if let Some(chain_id) = execution.chain_id {
            let aborted = engine.store().abort_queued_in_chain(chain_id).await?;
            if let Some(runtime) = engine.runtime_opt(execution.job_id) {
                runtime.lock_queue().remove_chain(chain_id);
            }
            if aborted > 0 {
                info!(chain = chain_id, aborted, "aborted remaining chain executions");
            }
        }
    }
    Ok(())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
