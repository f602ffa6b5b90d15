//! ExecutionStore trait definition.
//!
//! The durable store is the single source of truth for execution state and
//! is the only cross-process synchronization point: the conditional
//! [`ExecutionStore::claim_started`] update guarantees that an execution is
//! claimed by exactly one worker even when several engine instances share
//! one store. In-memory ready queues are a cache over this contract and must
//! be rebuildable from it at any time.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::jobs::models::{ExecutionStatus, JobExecution, NewExecution};
use crate::store::error::StoreResult;

/// Durable table of job executions.
///
/// Every mutation is a single atomic write.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Persist a new execution in status Queued and assign its id.
    async fn insert(&self, new: NewExecution) -> StoreResult<JobExecution>;

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<JobExecution>>;

    async fn delete_all_by_job_id(&self, job_id: i64) -> StoreResult<usize>;

    /// Eligible dispatch candidates for one job: Queued, mature (maturity
    /// null or `<= now`), not a blocked chain link, ordered by priority
    /// descending then creation ascending, at most `limit` rows.
    async fn find_candidates(
        &self,
        job_id: i64,
        now: NaiveDateTime,
        limit: usize,
    ) -> StoreResult<Vec<JobExecution>>;

    async fn find_all_by_status(&self, status: ExecutionStatus) -> StoreResult<Vec<JobExecution>>;

    async fn count_by_job_id_and_status(
        &self,
        job_id: i64,
        status: ExecutionStatus,
    ) -> StoreResult<u64>;

    async fn update_status(
        &self,
        id: i64,
        status: ExecutionStatus,
        updated_at: NaiveDateTime,
    ) -> StoreResult<()>;

    /// Atomically transition Queued → Running and record `started_at`.
    ///
    /// Returns `false` when the execution is no longer Queued (another
    /// worker won the claim) — a benign conflict, not an error.
    async fn claim_started(&self, id: i64, started_at: NaiveDateTime) -> StoreResult<bool>;

    /// Atomically transition Queued → Aborted.
    ///
    /// Returns `false` when the execution is no longer Queued: a dispatch
    /// that won the start claim first must not be overwritten.
    async fn abort_queued(&self, id: i64, updated_at: NaiveDateTime) -> StoreResult<bool>;

    /// Terminal transition: writes status, `ended_at` and the duration in
    /// one update.
    async fn update_ended(
        &self,
        id: i64,
        status: ExecutionStatus,
        ended_at: NaiveDateTime,
        duration_ms: Option<i64>,
    ) -> StoreResult<()>;

    /// Record failure diagnostics and the forward link to a spawned retry.
    async fn update_failure(
        &self,
        id: i64,
        fail_message: Option<String>,
        fail_stacktrace: Option<String>,
        fail_retry_execution_id: Option<i64>,
    ) -> StoreResult<()>;

    /// Rewrite the grouping fields of one execution. Used to correct the
    /// provisional sentinel of a freshly built chain or batch head, to
    /// unlock a chain link once its predecessor terminated, and to rewire a
    /// chain successor onto a retry record.
    async fn update_group(
        &self,
        id: i64,
        batch_id: Option<i64>,
        chain_id: Option<i64>,
        chain_previous_execution_id: Option<i64>,
    ) -> StoreResult<()>;

    /// All members of a chain, ordered by creation then id.
    async fn find_by_chain_id(&self, chain_id: i64) -> StoreResult<Vec<JobExecution>>;

    async fn find_next_in_chain(
        &self,
        chain_id: i64,
        previous_execution_id: i64,
    ) -> StoreResult<Option<JobExecution>>;

    /// Abort every still-queued member of a chain; returns how many.
    async fn abort_queued_in_chain(&self, chain_id: i64) -> StoreResult<usize>;

    async fn find_by_batch_id(&self, batch_id: i64) -> StoreResult<Vec<JobExecution>>;

    async fn count_by_batch_id_and_status(
        &self,
        batch_id: i64,
        status: ExecutionStatus,
    ) -> StoreResult<u64>;

    /// Oldest queued execution of a job with the given parameters hash, for
    /// unique-in-queue dedup.
    async fn find_first_queued_by_parameters_hash(
        &self,
        job_id: i64,
        parameters_hash: Option<i64>,
    ) -> StoreResult<Option<JobExecution>>;

    /// Retention cleanup; returns how many executions were deleted.
    async fn delete_older_than(&self, job_id: i64, cutoff: NaiveDateTime) -> StoreResult<usize>;
}
