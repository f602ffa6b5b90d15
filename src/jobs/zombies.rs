//! Reconciliation of executions stuck in Running.
//!
//! An execution is a zombie when the store says Running but no live worker
//! slot in this process owns it, for instance after a crash or an unclean
//! restart. Zombies go through the regular failure path, so the job's retry
//! policy and chain abort rules apply unchanged.

use tracing::{info, warn};

use crate::error::EngineResult;
use crate::jobs::engine::JobEngine;
use crate::jobs::executor;
use crate::jobs::models::ExecutionStatus;

const ZOMBIE_MESSAGE: &str = "worker lost: no live worker owns this running execution";

pub(crate) async fn hunt(engine: &JobEngine) -> EngineResult<usize> {
    let running = engine
        .store()
        .find_all_by_status(ExecutionStatus::Running)
        .await?;

    let mut reconciled = 0;
    for execution in running {
        let runtime = engine.runtime_opt(execution.job_id);
        if runtime.as_ref().is_some_and(|rt| rt.owns(execution.id)) {
            continue;
        }
        warn!(
            execution = execution.id,
            job_id = execution.job_id,
            "found zombie execution"
        );
        let ended_at = engine.now();
        match runtime {
            Some(runtime) => {
                let job = runtime.snapshot();
                executor::handle_failure(engine, &execution, &job, ended_at, ZOMBIE_MESSAGE, None)
                    .await?;
            }
            // job no longer registered: fail terminally, no retry policy left
            None => {
                let duration = execution
                    .started_at
                    .map(|started| (ended_at - started).num_milliseconds());
                engine
                    .store()
                    .update_ended(execution.id, ExecutionStatus::Failed, ended_at, duration)
                    .await?;
                engine
                    .store()
                    .update_failure(execution.id, Some(ZOMBIE_MESSAGE.to_string()), None, None)
                    .await?;
                if let Some(chain_id) = execution.chain_id {
                    engine.store().abort_queued_in_chain(chain_id).await?;
                }
            }
        }
        reconciled += 1;
    }
    if reconciled > 0 {
        info!(reconciled, "reconciled zombie executions");
    }
    Ok(reconciled)
}
