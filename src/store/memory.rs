//! In-memory execution store.
//!
//! Reference backend for embedding and tests. A single mutex over the id map
//! makes every operation atomic, including the Queued → Running claim.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::jobs::models::{ExecutionStatus, JobExecution, NewExecution};
use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::ExecutionStore;

#[derive(Default)]
pub struct MemoryExecutionStore {
    executions: Mutex<HashMap<i64, JobExecution>>,
    next_id: AtomicI64,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self {
            executions: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<i64, JobExecution>>> {
        self.executions
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

/// `priority DESC, created_at ASC`, ties broken by id.
fn candidate_order(a: &JobExecution, b: &JobExecution) -> std::cmp::Ordering {
    b.priority
        .cmp(&a.priority)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

fn creation_order(a: &JobExecution, b: &JobExecution) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn insert(&self, new: NewExecution) -> StoreResult<JobExecution> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let execution = JobExecution {
            id,
            job_id: new.job_id,
            status: ExecutionStatus::Queued,
            parameters: new.parameters,
            parameters_hash: new.parameters_hash,
            priority: new.priority,
            maturity: new.maturity,
            batch_id: new.batch_id,
            chain_id: new.chain_id,
            chain_previous_execution_id: new.chain_previous_execution_id,
            fail_retry: new.fail_retry,
            fail_retry_execution_id: None,
            fail_message: None,
            fail_stacktrace: None,
            started_at: None,
            ended_at: None,
            duration_ms: None,
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        self.lock()?.insert(id, execution.clone());
        Ok(execution)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<JobExecution>> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn delete_all_by_job_id(&self, job_id: i64) -> StoreResult<usize> {
        let mut executions = self.lock()?;
        let before = executions.len();
        executions.retain(|_, e| e.job_id != job_id);
        Ok(before - executions.len())
    }

    async fn find_candidates(
        &self,
        job_id: i64,
        now: NaiveDateTime,
        limit: usize,
    ) -> StoreResult<Vec<JobExecution>> {
        let executions = self.lock()?;
        let mut candidates: Vec<JobExecution> = executions
            .values()
            .filter(|e| {
                e.job_id == job_id
                    && e.status == ExecutionStatus::Queued
                    && e.maturity.is_none_or(|m| m <= now)
                    && e.chain_previous_execution_id.is_none()
            })
            .cloned()
            .collect();
        candidates.sort_by(candidate_order);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn find_all_by_status(&self, status: ExecutionStatus) -> StoreResult<Vec<JobExecution>> {
        let executions = self.lock()?;
        let mut found: Vec<JobExecution> = executions
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect();
        found.sort_by(creation_order);
        Ok(found)
    }

    async fn count_by_job_id_and_status(
        &self,
        job_id: i64,
        status: ExecutionStatus,
    ) -> StoreResult<u64> {
        let executions = self.lock()?;
        Ok(executions
            .values()
            .filter(|e| e.job_id == job_id && e.status == status)
            .count() as u64)
    }

    async fn update_status(
        &self,
        id: i64,
        status: ExecutionStatus,
        updated_at: NaiveDateTime,
    ) -> StoreResult<()> {
        let mut executions = self.lock()?;
        let execution = executions.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        execution.status = status;
        execution.updated_at = updated_at;
        Ok(())
    }

    async fn claim_started(&self, id: i64, started_at: NaiveDateTime) -> StoreResult<bool> {
        let mut executions = self.lock()?;
        let execution = executions.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if execution.status != ExecutionStatus::Queued {
            return Ok(false);
        }
        execution.status = ExecutionStatus::Running;
        execution.started_at = Some(started_at);
        execution.updated_at = started_at;
        Ok(true)
    }

    async fn abort_queued(&self, id: i64, updated_at: NaiveDateTime) -> StoreResult<bool> {
        let mut executions = self.lock()?;
        let execution = executions.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if execution.status != ExecutionStatus::Queued {
            return Ok(false);
        }
        execution.status = ExecutionStatus::Aborted;
        execution.updated_at = updated_at;
        Ok(true)
    }

    async fn update_ended(
        &self,
        id: i64,
        status: ExecutionStatus,
        ended_at: NaiveDateTime,
        duration_ms: Option<i64>,
    ) -> StoreResult<()> {
        let mut executions = self.lock()?;
        let execution = executions.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        execution.status = status;
        execution.ended_at = Some(ended_at);
        execution.duration_ms = duration_ms;
        execution.updated_at = ended_at;
        Ok(())
    }

    async fn update_failure(
        &self,
        id: i64,
        fail_message: Option<String>,
        fail_stacktrace: Option<String>,
        fail_retry_execution_id: Option<i64>,
    ) -> StoreResult<()> {
        let mut executions = self.lock()?;
        let execution = executions.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        execution.fail_message = fail_message;
        execution.fail_stacktrace = fail_stacktrace;
        execution.fail_retry_execution_id = fail_retry_execution_id;
        Ok(())
    }

    async fn update_group(
        &self,
        id: i64,
        batch_id: Option<i64>,
        chain_id: Option<i64>,
        chain_previous_execution_id: Option<i64>,
    ) -> StoreResult<()> {
        let mut executions = self.lock()?;
        let execution = executions.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        execution.batch_id = batch_id;
        execution.chain_id = chain_id;
        execution.chain_previous_execution_id = chain_previous_execution_id;
        Ok(())
    }

    async fn find_by_chain_id(&self, chain_id: i64) -> StoreResult<Vec<JobExecution>> {
        let executions = self.lock()?;
        let mut members: Vec<JobExecution> = executions
            .values()
            .filter(|e| e.chain_id == Some(chain_id))
            .cloned()
            .collect();
        members.sort_by(creation_order);
        Ok(members)
    }

    async fn find_next_in_chain(
        &self,
        chain_id: i64,
        previous_execution_id: i64,
    ) -> StoreResult<Option<JobExecution>> {
        let executions = self.lock()?;
        Ok(executions
            .values()
            .find(|e| {
                e.chain_id == Some(chain_id)
                    && e.chain_previous_execution_id == Some(previous_execution_id)
            })
            .cloned())
    }

    async fn abort_queued_in_chain(&self, chain_id: i64) -> StoreResult<usize> {
        let mut executions = self.lock()?;
        let mut aborted = 0;
        for execution in executions.values_mut() {
            if execution.chain_id == Some(chain_id) && execution.status == ExecutionStatus::Queued {
                execution.status = ExecutionStatus::Aborted;
                aborted += 1;
            }
        }
        Ok(aborted)
    }

    async fn find_by_batch_id(&self, batch_id: i64) -> StoreResult<Vec<JobExecution>> {
        let executions = self.lock()?;
        let mut members: Vec<JobExecution> = executions
            .values()
            .filter(|e| e.batch_id == Some(batch_id))
            .cloned()
            .collect();
        members.sort_by(creation_order);
        Ok(members)
    }

    async fn count_by_batch_id_and_status(
        &self,
        batch_id: i64,
        status: ExecutionStatus,
    ) -> StoreResult<u64> {
        let executions = self.lock()?;
        Ok(executions
            .values()
            .filter(|e| e.batch_id == Some(batch_id) && e.status == status)
            .count() as u64)
    }

    async fn find_first_queued_by_parameters_hash(
        &self,
        job_id: i64,
        parameters_hash: Option<i64>,
    ) -> StoreResult<Option<JobExecution>> {
        let executions = self.lock()?;
        let mut matches: Vec<&JobExecution> = executions
            .values()
            .filter(|e| {
                e.job_id == job_id
                    && e.status == ExecutionStatus::Queued
                    && e.parameters_hash == parameters_hash
            })
            .collect();
        matches.sort_by(|a, b| creation_order(a, b));
        Ok(matches.first().map(|e| (*e).clone()))
    }

    async fn delete_older_than(&self, job_id: i64, cutoff: NaiveDateTime) -> StoreResult<usize> {
        let mut executions = self.lock()?;
        let before = executions.len();
        executions.retain(|_, e| e.job_id != job_id || e.created_at >= cutoff);
        Ok(before - executions.len())
    }
}
