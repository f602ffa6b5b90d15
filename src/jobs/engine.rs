//! Engine facade and per-job runtime state.
//!
//! The engine owns one [`JobRuntime`] per registered job: the job snapshot,
//! the in-memory ready queue, the set of running execution ids, the worker
//! slot semaphore, the throttle window and the cron timer handle. All
//! components are explicitly constructed and wired here; lifecycle is plain
//! `start`/`stop`.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{Duration, NaiveDateTime};
use chrono_tz::Tz;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Settings;
use crate::cron::CronExpression;
use crate::error::{EngineError, EngineResult};
use crate::jobs::models::{
    ExecutionStatus, GroupInfo, Job, JobExecution, JobStatus, NewExecution, parameters_hash,
};
use crate::jobs::poller::PollerDriver;
use crate::jobs::queue::ReadyQueue;
use crate::jobs::registry::WorkerRegistry;
use crate::jobs::types::{JobWorker, TypedJobWorker};
use crate::jobs::{executor, scheduler, zombies};
use crate::store::ExecutionStore;

/// Provisional group id written while a chain or batch is under
/// construction, so the synchronizer never sees a half-built group.
const GROUP_SENTINEL: i64 = -1;

/// In-memory state of one registered job.
pub(crate) struct JobRuntime {
    job: RwLock<Job>,
    pub(crate) queue: Mutex<ReadyQueue>,
    running: Mutex<HashSet<i64>>,
    pub(crate) slots: Arc<Semaphore>,
    starts: Mutex<VecDeque<NaiveDateTime>>,
    pub(crate) schedule_timer: Mutex<Option<CancellationToken>>,
}

impl JobRuntime {
    fn new(job: Job) -> Self {
        let slots = Arc::new(Semaphore::new(job.threads.max(1)));
        Self {
            job: RwLock::new(job),
            queue: Mutex::new(ReadyQueue::new()),
            running: Mutex::new(HashSet::new()),
            slots,
            starts: Mutex::new(VecDeque::new()),
            schedule_timer: Mutex::new(None),
        }
    }

    pub(crate) fn snapshot(&self) -> Job {
        self.job
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_status(&self, status: JobStatus) {
        self.job
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .status = status;
    }

    pub(crate) fn lock_queue(&self) -> std::sync::MutexGuard<'_, ReadyQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn owns(&self, execution_id: i64) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&execution_id)
    }

    pub(crate) fn mark_running(&self, execution_id: i64) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(execution_id);
    }

    pub(crate) fn mark_done(&self, execution_id: i64) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&execution_id);
    }

    fn clear_queue(&self) {
        self.lock_queue().clear();
    }

    /// Reserve one dispatch in the rolling 60 second window against
    /// `max_per_minute`. Check and reservation happen under one lock, so
    /// concurrent dispatchers cannot share the last window slot.
    pub(crate) fn try_reserve_start(&self, job: &Job, now: NaiveDateTime) -> bool {
        let Some(max) = job.max_per_minute else {
            return true;
        };
        let mut starts = self.starts.lock().unwrap_or_else(PoisonError::into_inner);
        let cutoff = now - Duration::seconds(60);
        while starts.front().is_some_and(|t| *t <= cutoff) {
            starts.pop_front();
        }
        if (starts.len() as u32) < max {
            starts.push_back(now);
            true
        } else {
            false
        }
    }

    /// Give back a reservation whose dispatch did not happen (empty queue or
    /// lost start claim).
    pub(crate) fn release_start(&self, job: &Job, now: NaiveDateTime) {
        if job.max_per_minute.is_none() {
            return;
        }
        let mut starts = self.starts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = starts.iter().rposition(|t| *t == now) {
            starts.remove(index);
        }
    }
}

pub(crate) struct EngineInner {
    settings: Settings,
    time_zone: Tz,
    store: Arc<dyn ExecutionStore>,
    registry: WorkerRegistry,
    runtimes: DashMap<i64, Arc<JobRuntime>>,
    poller: PollerDriver,
}

/// The job engine.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct JobEngine {
    inner: Arc<EngineInner>,
}

impl JobEngine {
    pub fn new(settings: Settings, store: Arc<dyn ExecutionStore>) -> EngineResult<Self> {
        settings.validate()?;
        let time_zone = settings.parsed_time_zone()?;
        Ok(Self {
            inner: Arc::new(EngineInner {
                settings,
                time_zone,
                store,
                registry: WorkerRegistry::new(),
                runtimes: DashMap::new(),
                poller: PollerDriver::new(),
            }),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &dyn ExecutionStore {
        self.inner.store.as_ref()
    }

    /// Current time in the configured engine time zone.
    pub(crate) fn now(&self) -> NaiveDateTime {
        chrono::Utc::now()
            .with_timezone(&self.inner.time_zone)
            .naive_local()
    }

    pub(crate) fn runtime_opt(&self, job_id: i64) -> Option<Arc<JobRuntime>> {
        self.inner.runtimes.get(&job_id).map(|rt| rt.value().clone())
    }

    fn runtime(&self, job_id: i64) -> EngineResult<Arc<JobRuntime>> {
        self.runtime_opt(job_id)
            .ok_or(EngineError::JobNotFound(job_id))
    }

    pub(crate) fn resolve_worker(&self, job: &Job) -> EngineResult<Arc<dyn JobWorker>> {
        self.inner
            .registry
            .resolve(&job.worker_name)
            .ok_or_else(|| EngineError::WorkerNotRegistered(job.worker_name.clone()))
    }

    // ========================================================================
    // Job registration and lifecycle
    // ========================================================================

    /// Register a job together with its worker.
    ///
    /// A scheduled or system job must carry a valid cron schedule; a bad one
    /// is rejected here, before any timer exists.
    pub fn register_job(&self, job: Job, worker: Arc<dyn JobWorker>) -> EngineResult<()> {
        self.inner.registry.register(job.worker_name.clone(), worker);
        self.add_job(job)
    }

    /// Register a job whose worker takes typed parameters.
    pub fn register_typed_job<W>(&self, job: Job, worker: W) -> EngineResult<()>
    where
        W: TypedJobWorker + 'static,
    {
        self.inner
            .registry
            .register_typed(job.worker_name.clone(), worker);
        self.add_job(job)
    }

    fn add_job(&self, job: Job) -> EngineResult<()> {
        if job.job_type.is_scheduled() {
            let schedule = job
                .schedule
                .as_deref()
                .ok_or_else(|| EngineError::MissingSchedule {
                    job: job.name.clone(),
                })?;
            CronExpression::parse(schedule)?;
        }
        let job_id = job.id;
        let name = job.name.clone();
        let runtime = Arc::new(JobRuntime::new(job));
        self.inner.runtimes.insert(job_id, runtime.clone());
        debug!(job = %name, job_id, "job registered");
        if self.is_running() {
            scheduler::start(self, &runtime)?;
        }
        Ok(())
    }

    pub fn job(&self, job_id: i64) -> EngineResult<Job> {
        Ok(self.runtime(job_id)?.snapshot())
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.inner
            .runtimes
            .iter()
            .map(|rt| rt.value().snapshot())
            .collect()
    }

    /// Activate a job and start its schedule timer if it has one.
    pub fn activate_job(&self, job_id: i64) -> EngineResult<()> {
        let runtime = self.runtime(job_id)?;
        runtime.set_status(JobStatus::Active);
        let job = runtime.snapshot();
        info!(job = %job.name, "job activated");
        scheduler::start(self, &runtime)
    }

    /// Deactivate a job: cancels its schedule timer and discards the ready
    /// queue. In-flight executions run to completion.
    pub fn deactivate_job(&self, job_id: i64) -> EngineResult<()> {
        let runtime = self.runtime(job_id)?;
        runtime.set_status(JobStatus::Inactive);
        let job = runtime.snapshot();
        info!(job = %job.name, "job deactivated");
        scheduler::stop(&runtime);
        runtime.clear_queue();
        Ok(())
    }

    /// Start the poller and the schedule timers of all active scheduled jobs.
    pub fn start(&self) -> EngineResult<()> {
        info!("starting job engine");
        self.inner.poller.start(self.clone());
        let runtimes: Vec<Arc<JobRuntime>> = self
            .inner
            .runtimes
            .iter()
            .map(|rt| rt.value().clone())
            .collect();
        for runtime in runtimes {
            scheduler::start(self, &runtime)?;
        }
        Ok(())
    }

    /// Stop the poller and all schedule timers, discarding ready queues.
    pub fn stop(&self) {
        info!("stopping job engine");
        self.inner.poller.stop();
        for entry in self.inner.runtimes.iter() {
            scheduler::stop(entry.value());
            entry.value().clear_queue();
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.poller.is_running()
    }

    /// Discard a job's in-memory ready queue.
    pub fn clear_queue(&self, job_id: i64) -> EngineResult<()> {
        self.runtime(job_id)?.clear_queue();
        Ok(())
    }

    /// Number of executions currently waiting in a job's ready queue.
    pub fn ready_queue_len(&self, job_id: i64) -> EngineResult<usize> {
        Ok(self.runtime(job_id)?.lock_queue().len())
    }

    // ========================================================================
    // Queue synchronizer
    // ========================================================================

    /// Load eligible candidates for every active job into its ready queue
    /// and fill free worker slots.
    ///
    /// Idempotent: with no newly eligible rows a second pass changes nothing.
    pub async fn sync(&self) -> EngineResult<()> {
        let runtimes: Vec<Arc<JobRuntime>> = self
            .inner
            .runtimes
            .iter()
            .map(|rt| rt.value().clone())
            .collect();

        for runtime in runtimes {
            let job = runtime.snapshot();
            if job.status != JobStatus::Active {
                continue;
            }
            let now = self.now();
            let candidates = self
                .inner
                .store
                .find_candidates(job.id, now, self.inner.settings.queue_limit)
                .await?;

            let mut added = 0;
            {
                let mut queue = runtime.lock_queue();
                for candidate in candidates {
                    if !runtime.owns(candidate.id) && !queue.contains(candidate.id) {
                        queue.push(candidate);
                        added += 1;
                    }
                }
            }
            if added > 0 {
                debug!(job = %job.name, added, "loaded candidates into ready queue");
            }
            executor::dispatch(self, &runtime).await;
        }
        Ok(())
    }

    /// Reconcile executions stuck in Running with no live worker.
    pub async fn hunt_zombies(&self) -> EngineResult<usize> {
        zombies::hunt(self).await
    }

    // ========================================================================
    // Execution creation
    // ========================================================================

    /// Create a single execution in status Queued.
    ///
    /// For a job with `unique_in_queue`, an already queued execution with an
    /// equal parameters hash is returned instead of inserting a new row.
    pub async fn create_execution(
        &self,
        job_id: i64,
        parameters: Option<JsonValue>,
        priority: bool,
        maturity: Option<NaiveDateTime>,
        batch_id: Option<i64>,
        chain_id: Option<i64>,
        chain_previous_execution_id: Option<i64>,
    ) -> EngineResult<JobExecution> {
        let job = self.job(job_id)?;
        let parameters = parameters.map(|p| p.to_string());
        let hash = parameters.as_deref().map(parameters_hash);

        if job.unique_in_queue && chain_id.is_none() {
            if let Some(existing) = self
                .inner
                .store
                .find_first_queued_by_parameters_hash(job_id, hash)
                .await?
            {
                debug!(
                    execution = existing.id,
                    job = %job.name,
                    "returning equal queued execution instead of creating a new one"
                );
                return Ok(existing);
            }
        }

        self.insert_execution(
            &job,
            parameters,
            hash,
            priority,
            maturity,
            batch_id,
            chain_id,
            chain_previous_execution_id,
        )
        .await
    }

    /// Create an execution that matures after the given delay.
    pub async fn create_delayed_execution(
        &self,
        job_id: i64,
        parameters: Option<JsonValue>,
        priority: bool,
        delay: Duration,
    ) -> EngineResult<JobExecution> {
        let maturity = self.now() + delay;
        self.create_execution(job_id, parameters, priority, Some(maturity), None, None, None)
            .await
    }

    /// Create a chain of executions from an ordered parameter list.
    ///
    /// The chain id equals the first execution's id. The head is written
    /// with a provisional sentinel and corrected once the chain is complete,
    /// so the synchronizer never dispatches a partially built chain.
    pub async fn create_chained_executions(
        &self,
        job_id: i64,
        parameters_list: Vec<JsonValue>,
        priority: bool,
        maturity: Option<NaiveDateTime>,
    ) -> EngineResult<i64> {
        let job = self.job(job_id)?;
        let mut head_id: Option<i64> = None;
        let mut previous: Option<i64> = None;

        for parameters in parameters_list {
            let parameters = Some(parameters.to_string());
            let hash = parameters.as_deref().map(parameters_hash);
            let (chain, prev) = match head_id {
                None => (Some(GROUP_SENTINEL), Some(GROUP_SENTINEL)),
                Some(head) => (Some(head), previous),
            };
            let execution = self
                .insert_execution(&job, parameters, hash, priority, maturity, None, chain, prev)
                .await?;
            if head_id.is_none() {
                head_id = Some(execution.id);
            }
            previous = Some(execution.id);
        }

        // the head keeps its sentinel until every link exists; a sync pass
        // running mid-construction must not dispatch a partial chain
        let chain_id = head_id.ok_or(EngineError::EmptyGroup)?;
        self.inner
            .store
            .update_group(chain_id, None, Some(chain_id), None)
            .await?;
        info!(chain = chain_id, job = %job.name, "created chained executions");
        Ok(chain_id)
    }

    /// Create a flat batch of executions; the batch id equals the first
    /// execution's id.
    pub async fn create_batch_executions(
        &self,
        job_id: i64,
        parameters_list: Vec<JsonValue>,
        priority: bool,
        maturity: Option<NaiveDateTime>,
    ) -> EngineResult<i64> {
        let job = self.job(job_id)?;
        let mut batch_id: Option<i64> = None;

        for parameters in parameters_list {
            let parameters = Some(parameters.to_string());
            let hash = parameters.as_deref().map(parameters_hash);
            let batch = batch_id.unwrap_or(GROUP_SENTINEL);
            let execution = self
                .insert_execution(
                    &job,
                    parameters,
                    hash,
                    priority,
                    maturity,
                    Some(batch),
                    None,
                    None,
                )
                .await?;
            if batch_id.is_none() {
                batch_id = Some(execution.id);
            }
        }

        let batch_id = batch_id.ok_or(EngineError::EmptyGroup)?;
        self.inner
            .store
            .update_group(batch_id, Some(batch_id), None, None)
            .await?;
        info!(batch = batch_id, job = %job.name, "created batch executions");
        Ok(batch_id)
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_execution(
        &self,
        job: &Job,
        parameters: Option<String>,
        parameters_hash: Option<i64>,
        priority: bool,
        maturity: Option<NaiveDateTime>,
        batch_id: Option<i64>,
        chain_id: Option<i64>,
        chain_previous_execution_id: Option<i64>,
    ) -> EngineResult<JobExecution> {
        let execution = self
            .inner
            .store
            .insert(NewExecution {
                job_id: job.id,
                parameters,
                parameters_hash,
                priority,
                maturity,
                batch_id,
                chain_id,
                chain_previous_execution_id,
                fail_retry: 0,
                created_at: self.now(),
            })
            .await?;
        debug!(execution = execution.id, job = %job.name, "job execution created");
        Ok(execution)
    }

    // ========================================================================
    // Execution queries
    // ========================================================================

    pub async fn execution(&self, execution_id: i64) -> EngineResult<JobExecution> {
        self.inner
            .store
            .find_by_id(execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(execution_id))
    }

    /// Abort a queued execution.
    ///
    /// The store write is conditional on the execution still being Queued,
    /// so a dispatch that wins the start claim first cannot be overwritten;
    /// the abort then fails with [`EngineError::ExecutionNotQueued`].
    pub async fn abort_execution(&self, execution_id: i64) -> EngineResult<()> {
        let execution = self.execution(execution_id).await?;
        if !self.inner.store.abort_queued(execution_id, self.now()).await? {
            return Err(EngineError::ExecutionNotQueued(execution_id));
        }
        if let Some(runtime) = self.runtime_opt(execution.job_id) {
            runtime.lock_queue().remove(execution_id);
        }
        info!(execution = execution_id, "execution aborted");
        Ok(())
    }

    pub async fn count_executions(
        &self,
        job_id: i64,
        status: ExecutionStatus,
    ) -> EngineResult<u64> {
        Ok(self
            .inner
            .store
            .count_by_job_id_and_status(job_id, status)
            .await?)
    }

    pub async fn batch_executions(&self, batch_id: i64) -> EngineResult<Vec<JobExecution>> {
        Ok(self.inner.store.find_by_batch_id(batch_id).await?)
    }

    pub async fn chain_executions(&self, chain_id: i64) -> EngineResult<Vec<JobExecution>> {
        Ok(self.inner.store.find_by_chain_id(chain_id).await?)
    }

    /// Count-by-status snapshot of a batch, computed on demand.
    pub async fn batch_info(&self, batch_id: i64) -> EngineResult<GroupInfo> {
        let executions = self.inner.store.find_by_batch_id(batch_id).await?;
        Ok(GroupInfo::new(batch_id, &executions))
    }

    /// Count-by-status snapshot of a chain, computed on demand.
    pub async fn chain_info(&self, chain_id: i64) -> EngineResult<GroupInfo> {
        let executions = self.inner.store.find_by_chain_id(chain_id).await?;
        Ok(GroupInfo::new(chain_id, &executions))
    }

    /// A batch is finished when no member is queued or running.
    pub async fn is_batch_finished(&self, batch_id: i64) -> EngineResult<bool> {
        let queued = self
            .inner
            .store
            .count_by_batch_id_and_status(batch_id, ExecutionStatus::Queued)
            .await?;
        if queued > 0 {
            return Ok(false);
        }
        let running = self
            .inner
            .store
            .count_by_batch_id_and_status(batch_id, ExecutionStatus::Running)
            .await?;
        Ok(running == 0)
    }

    // ========================================================================
    // Schedule previews
    // ========================================================================

    /// The next `times` trigger times of a schedule, starting after
    /// `start_time` (or now). Read-only.
    pub fn next_scheduled_times(
        &self,
        schedule: &str,
        times: usize,
        start_time: Option<NaiveDateTime>,
    ) -> EngineResult<Vec<NaiveDateTime>> {
        let expression = CronExpression::parse(schedule)?;
        let mut t = start_time.unwrap_or_else(|| self.now());
        let mut scheduled = Vec::with_capacity(times);
        for _ in 0..times {
            match expression.next_time_after(t) {
                Some(next) => {
                    scheduled.push(next);
                    t = next;
                }
                None => break,
            }
        }
        Ok(scheduled)
    }

    /// All trigger times of a schedule between `start_time` (or now) and
    /// `end_time` (or one day later). Read-only.
    pub fn scheduled_times(
        &self,
        schedule: &str,
        start_time: Option<NaiveDateTime>,
        end_time: Option<NaiveDateTime>,
    ) -> EngineResult<Vec<NaiveDateTime>> {
        let expression = CronExpression::parse(schedule)?;
        let start = start_time.unwrap_or_else(|| self.now());
        let end = end_time.unwrap_or(start + Duration::days(1));
        let mut scheduled = Vec::new();
        let mut t = start;
        while let Some(next) = expression.next_time_after(t) {
            if next >= end {
                break;
            }
            scheduled.push(next);
            t = next;
        }
        Ok(scheduled)
    }

    // ========================================================================
    // Retention
    // ========================================================================

    /// Delete executions of a job created before `cutoff`.
    pub async fn delete_older_executions(
        &self,
        job_id: i64,
        cutoff: NaiveDateTime,
    ) -> EngineResult<usize> {
        let deleted = self.inner.store.delete_older_than(job_id, cutoff).await?;
        if deleted > 0 {
            info!(job_id, deleted, "deleted old executions");
        }
        Ok(deleted)
    }

    /// Delete executions older than the job's `days_until_clean_up`.
    pub async fn cleanup_executions(&self, job_id: i64) -> EngineResult<usize> {
        let job = self.job(job_id)?;
        let cutoff = self.now() - Duration::days(i64::from(job.days_until_clean_up));
        self.delete_older_executions(job_id, cutoff).await
    }

    pub async fn delete_all_executions(&self, job_id: i64) -> EngineResult<usize> {
        Ok(self.inner.store.delete_all_by_job_id(job_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::jobs::models::JobType;
    use crate::jobs::types::JobContext;
    use crate::store::MemoryExecutionStore;

    fn init_tracing() {
        static INIT: std::sync::Once = std::sync::Once::new();
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }

    fn test_engine() -> (JobEngine, Arc<MemoryExecutionStore>) {
        init_tracing();
        let store = Arc::new(MemoryExecutionStore::new());
        let engine = JobEngine::new(Settings::default(), store.clone()).unwrap();
        (engine, store)
    }

    /// Store wrapper that parks one insert on a gate, so a test can run sync
    /// passes while a chain is half built.
    struct StallingStore {
        inner: MemoryExecutionStore,
        inserts_before_stall: std::sync::atomic::AtomicI32,
        gate: tokio::sync::Semaphore,
    }

    impl StallingStore {
        fn new(inserts_before_stall: i32) -> Self {
            Self {
                inner: MemoryExecutionStore::new(),
                inserts_before_stall: std::sync::atomic::AtomicI32::new(inserts_before_stall),
                gate: tokio::sync::Semaphore::new(0),
            }
        }

        fn release(&self) {
            self.gate.add_permits(1);
        }
    }

    #[async_trait]
    impl ExecutionStore for StallingStore {
        async fn insert(
            &self,
            new: crate::jobs::models::NewExecution,
        ) -> crate::store::StoreResult<JobExecution> {
            if self.inserts_before_stall.fetch_sub(1, Ordering::SeqCst) == 0 {
                let permit = self
                    .gate
                    .acquire()
                    .await
                    .map_err(|e| crate::store::StoreError::Backend(e.to_string()))?;
                permit.forget();
            }
            self.inner.insert(new).await
        }

        async fn find_by_id(
            &self,
            id: i64,
        ) -> crate::store::StoreResult<Option<JobExecution>> {
            self.inner.find_by_id(id).await
        }

        async fn delete_all_by_job_id(&self, job_id: i64) -> crate::store::StoreResult<usize> {
            self.inner.delete_all_by_job_id(job_id).await
        }

        async fn find_candidates(
            &self,
            job_id: i64,
            now: NaiveDateTime,
            limit: usize,
        ) -> crate::store::StoreResult<Vec<JobExecution>> {
            self.inner.find_candidates(job_id, now, limit).await
        }

        async fn find_all_by_status(
            &self,
            status: ExecutionStatus,
        ) -> crate::store::StoreResult<Vec<JobExecution>> {
            self.inner.find_all_by_status(status).await
        }

        async fn count_by_job_id_and_status(
            &self,
            job_id: i64,
            status: ExecutionStatus,
        ) -> crate::store::StoreResult<u64> {
            self.inner.count_by_job_id_and_status(job_id, status).await
        }

        async fn update_status(
            &self,
            id: i64,
            status: ExecutionStatus,
            updated_at: NaiveDateTime,
        ) -> crate::store::StoreResult<()> {
            self.inner.update_status(id, status, updated_at).await
        }

        async fn claim_started(
            &self,
            id: i64,
            started_at: NaiveDateTime,
        ) -> crate::store::StoreResult<bool> {
            self.inner.claim_started(id, started_at).await
        }

        async fn abort_queued(
            &self,
            id: i64,
            updated_at: NaiveDateTime,
        ) -> crate::store::StoreResult<bool> {
            self.inner.abort_queued(id, updated_at).await
        }

        async fn update_ended(
            &self,
            id: i64,
            status: ExecutionStatus,
            ended_at: NaiveDateTime,
            duration_ms: Option<i64>,
        ) -> crate::store::StoreResult<()> {
            self.inner.update_ended(id, status, ended_at, duration_ms).await
        }

        async fn update_failure(
            &self,
            id: i64,
            fail_message: Option<String>,
            fail_stacktrace: Option<String>,
            fail_retry_execution_id: Option<i64>,
        ) -> crate::store::StoreResult<()> {
            self.inner
                .update_failure(id, fail_message, fail_stacktrace, fail_retry_execution_id)
                .await
        }

        async fn update_group(
            &self,
            id: i64,
            batch_id: Option<i64>,
            chain_id: Option<i64>,
            chain_previous_execution_id: Option<i64>,
        ) -> crate::store::StoreResult<()> {
            self.inner
                .update_group(id, batch_id, chain_id, chain_previous_execution_id)
                .await
        }

        async fn find_by_chain_id(
            &self,
            chain_id: i64,
        ) -> crate::store::StoreResult<Vec<JobExecution>> {
            self.inner.find_by_chain_id(chain_id).await
        }

        async fn find_next_in_chain(
            &self,
            chain_id: i64,
            previous_execution_id: i64,
        ) -> crate::store::StoreResult<Option<JobExecution>> {
            self.inner
                .find_next_in_chain(chain_id, previous_execution_id)
                .await
        }

        async fn abort_queued_in_chain(
            &self,
            chain_id: i64,
        ) -> crate::store::StoreResult<usize> {
            self.inner.abort_queued_in_chain(chain_id).await
        }

        async fn find_by_batch_id(
            &self,
            batch_id: i64,
        ) -> crate::store::StoreResult<Vec<JobExecution>> {
            self.inner.find_by_batch_id(batch_id).await
        }

        async fn count_by_batch_id_and_status(
            &self,
            batch_id: i64,
            status: ExecutionStatus,
        ) -> crate::store::StoreResult<u64> {
            self.inner.count_by_batch_id_and_status(batch_id, status).await
        }

        async fn find_first_queued_by_parameters_hash(
            &self,
            job_id: i64,
            parameters_hash: Option<i64>,
        ) -> crate::store::StoreResult<Option<JobExecution>> {
            self.inner
                .find_first_queued_by_parameters_hash(job_id, parameters_hash)
                .await
        }

        async fn delete_older_than(
            &self,
            job_id: i64,
            cutoff: NaiveDateTime,
        ) -> crate::store::StoreResult<usize> {
            self.inner.delete_older_than(job_id, cutoff).await
        }
    }

    struct Noop;

    #[async_trait]
    impl crate::jobs::types::JobWorker for Noop {
        async fn do_work(&self, _ctx: JobContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// Records the raw parameter payload of every execution it runs.
    struct Recorder {
        seen: StdMutex<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: StdMutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl crate::jobs::types::JobWorker for Recorder {
        async fn do_work(&self, ctx: JobContext) -> anyhow::Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push(ctx.execution.parameters.clone().unwrap_or_default());
            Ok(())
        }
    }

    /// Fails its first `fail_first` calls, then succeeds.
    struct Flaky {
        fail_first: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl crate::jobs::types::JobWorker for Flaky {
        async fn do_work(&self, _ctx: JobContext) -> anyhow::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                anyhow::bail!("transient failure {call}");
            }
            Ok(())
        }
    }

    /// Fails every execution whose payload contains the needle.
    struct FailOn {
        needle: &'static str,
    }

    #[async_trait]
    impl crate::jobs::types::JobWorker for FailOn {
        async fn do_work(&self, ctx: JobContext) -> anyhow::Result<()> {
            let payload = ctx.execution.parameters.clone().unwrap_or_default();
            if payload.contains(self.needle) {
                anyhow::bail!("refusing {payload}");
            }
            Ok(())
        }
    }

    /// Never completes; holds its worker slot for the rest of the test.
    struct Stuck;

    #[async_trait]
    impl crate::jobs::types::JobWorker for Stuck {
        async fn do_work(&self, _ctx: JobContext) -> anyhow::Result<()> {
            futures::future::pending::<()>().await;
            Ok(())
        }
    }

    /// Drive sync until the job has at least `expected` executions in
    /// `status`, or give up.
    async fn drive_until_count(
        engine: &JobEngine,
        job_id: i64,
        status: ExecutionStatus,
        expected: u64,
    ) -> bool {
        for _ in 0..300 {
            engine.sync().await.unwrap();
            if engine.count_executions(job_id, status).await.unwrap() >= expected {
                return true;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        false
    }

    /// Drive sync until nothing is queued or running for the job.
    async fn drive_until_idle(engine: &JobEngine, job_id: i64) -> bool {
        for _ in 0..300 {
            engine.sync().await.unwrap();
            let queued = engine
                .count_executions(job_id, ExecutionStatus::Queued)
                .await
                .unwrap();
            let running = engine
                .count_executions(job_id, ExecutionStatus::Running)
                .await
                .unwrap();
            if queued == 0 && running == 0 {
                return true;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn create_execution_deduplicates_while_queued() {
        let (engine, _store) = test_engine();
        engine
            .register_job(Job::new(1, "mailer", "mailer", JobType::OnDemand), Arc::new(Noop))
            .unwrap();

        let first = engine
            .create_execution(1, Some(json!({"to": "ada"})), false, None, None, None, None)
            .await
            .unwrap();
        let second = engine
            .create_execution(1, Some(json!({"to": "ada"})), false, None, None, None, None)
            .await
            .unwrap();
        let other = engine
            .create_execution(1, Some(json!({"to": "bob"})), false, None, None, None, None)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_ne!(first.id, other.id);
        assert_eq!(
            engine
                .count_executions(1, ExecutionStatus::Queued)
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn sync_is_idempotent_and_pool_is_bounded() {
        let (engine, _store) = test_engine();
        let mut job = Job::new(1, "slow", "slow", JobType::OnDemand);
        job.threads = 1;
        job.unique_in_queue = false;
        engine.register_job(job, Arc::new(Stuck)).unwrap();

        for _ in 0..3 {
            engine
                .create_execution(1, None, false, None, None, None, None)
                .await
                .unwrap();
        }
        engine.sync().await.unwrap();
        assert_eq!(
            engine
                .count_executions(1, ExecutionStatus::Running)
                .await
                .unwrap(),
            1
        );
        assert_eq!(engine.ready_queue_len(1).unwrap(), 2);

        engine.sync().await.unwrap();
        assert_eq!(
            engine
                .count_executions(1, ExecutionStatus::Running)
                .await
                .unwrap(),
            1
        );
        assert_eq!(engine.ready_queue_len(1).unwrap(), 2);
    }

    #[tokio::test]
    async fn priority_execution_runs_first() {
        let (engine, _store) = test_engine();
        let recorder = Recorder::new();
        let mut job = Job::new(1, "ordered", "ordered", JobType::OnDemand);
        job.threads = 1;
        engine.register_job(job, recorder.clone()).unwrap();

        engine
            .create_execution(1, Some(json!("routine")), false, None, None, None, None)
            .await
            .unwrap();
        engine
            .create_execution(1, Some(json!("urgent")), true, None, None, None, None)
            .await
            .unwrap();

        assert!(drive_until_count(&engine, 1, ExecutionStatus::Finished, 2).await);
        assert_eq!(recorder.seen(), vec!["\"urgent\"", "\"routine\""]);
    }

    #[tokio::test]
    async fn failed_execution_retries_until_success() {
        let (engine, store) = test_engine();
        let mut job = Job::new(1, "flaky", "flaky", JobType::OnDemand);
        job.fail_retries = 3;
        job.retry_delay_seconds = 0;
        engine
            .register_job(
                job,
                Arc::new(Flaky {
                    fail_first: 2,
                    calls: AtomicU32::new(0),
                }),
            )
            .unwrap();

        let original = engine
            .create_execution(1, None, false, None, None, None, None)
            .await
            .unwrap();

        assert!(drive_until_count(&engine, 1, ExecutionStatus::Finished, 1).await);
        assert_eq!(
            engine
                .count_executions(1, ExecutionStatus::Failed)
                .await
                .unwrap(),
            2
        );

        // each failed attempt links forward to its retry
        let first = store.find_by_id(original.id).await.unwrap().unwrap();
        assert_eq!(first.status, ExecutionStatus::Failed);
        let second_id = first.fail_retry_execution_id.unwrap();
        let second = store.find_by_id(second_id).await.unwrap().unwrap();
        assert_eq!(second.fail_retry, 1);
        let third = store
            .find_by_id(second.fail_retry_execution_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(third.status, ExecutionStatus::Finished);
        assert_eq!(third.fail_retry, 2);
    }

    #[tokio::test]
    async fn exhausted_retries_end_terminally() {
        let (engine, store) = test_engine();
        let mut job = Job::new(1, "doomed", "doomed", JobType::OnDemand);
        job.fail_retries = 1;
        job.retry_delay_seconds = 0;
        engine
            .register_job(
                job,
                Arc::new(Flaky {
                    fail_first: u32::MAX,
                    calls: AtomicU32::new(0),
                }),
            )
            .unwrap();

        let original = engine
            .create_execution(1, None, false, None, None, None, None)
            .await
            .unwrap();

        assert!(drive_until_idle(&engine, 1).await);
        assert_eq!(
            engine
                .count_executions(1, ExecutionStatus::Failed)
                .await
                .unwrap(),
            2
        );
        let retry_id = store
            .find_by_id(original.id)
            .await
            .unwrap()
            .unwrap()
            .fail_retry_execution_id
            .unwrap();
        let last = store.find_by_id(retry_id).await.unwrap().unwrap();
        assert_eq!(last.fail_retry_execution_id, None);
        assert!(last.fail_message.is_some());
    }

    #[tokio::test]
    async fn chain_runs_strictly_in_order() {
        let (engine, _store) = test_engine();
        let recorder = Recorder::new();
        let mut job = Job::new(1, "steps", "steps", JobType::OnDemand);
        job.threads = 4;
        engine.register_job(job, recorder.clone()).unwrap();

        let chain_id = engine
            .create_chained_executions(
                1,
                vec![json!("extract"), json!("transform"), json!("load")],
                false,
                None,
            )
            .await
            .unwrap();

        assert!(drive_until_count(&engine, 1, ExecutionStatus::Finished, 3).await);
        assert_eq!(
            recorder.seen(),
            vec!["\"extract\"", "\"transform\"", "\"load\""]
        );
        assert!(engine.chain_info(chain_id).await.unwrap().is_finished());
    }

    #[tokio::test]
    async fn terminal_chain_failure_aborts_the_rest() {
        let (engine, _store) = test_engine();
        let job = Job::new(1, "steps", "steps", JobType::OnDemand);
        engine
            .register_job(job, Arc::new(FailOn { needle: "transform" }))
            .unwrap();

        let chain_id = engine
            .create_chained_executions(
                1,
                vec![json!("extract"), json!("transform"), json!("load")],
                false,
                None,
            )
            .await
            .unwrap();

        assert!(drive_until_idle(&engine, 1).await);
        let members = engine.chain_executions(chain_id).await.unwrap();
        let statuses: Vec<ExecutionStatus> = members.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                ExecutionStatus::Finished,
                ExecutionStatus::Failed,
                ExecutionStatus::Aborted,
            ]
        );
    }

    #[tokio::test]
    async fn chain_head_stays_locked_until_fully_built() {
        init_tracing();
        // let the head insert through, park construction before the successor
        let store = Arc::new(StallingStore::new(1));
        let engine = JobEngine::new(Settings::default(), store.clone() as Arc<dyn ExecutionStore>)
            .unwrap();
        engine
            .register_job(Job::new(1, "steps", "steps", JobType::OnDemand), Arc::new(Noop))
            .unwrap();

        let builder = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .create_chained_executions(1, vec![json!("a"), json!("b")], false, None)
                    .await
            })
        };

        let mut head = None;
        for _ in 0..300 {
            head = store.find_by_id(1).await.unwrap();
            if head.is_some() {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        let head = head.expect("head row was never inserted");

        // mid-construction the head is not a dispatch candidate
        for _ in 0..10 {
            engine.sync().await.unwrap();
        }
        assert_eq!(engine.ready_queue_len(1).unwrap(), 0);
        assert_eq!(
            store.find_by_id(head.id).await.unwrap().unwrap().status,
            ExecutionStatus::Queued
        );

        store.release();
        let chain_id = builder.await.unwrap().unwrap();
        assert!(drive_until_count(&engine, 1, ExecutionStatus::Finished, 2).await);
        let members = engine.chain_executions(chain_id).await.unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|m| m.status == ExecutionStatus::Finished));
    }

    #[tokio::test]
    async fn abort_cannot_overwrite_a_running_execution() {
        let (engine, store) = test_engine();
        engine
            .register_job(Job::new(1, "mailer", "mailer", JobType::OnDemand), Arc::new(Noop))
            .unwrap();
        let execution = engine
            .create_execution(1, None, false, None, None, None, None)
            .await
            .unwrap();

        // a dispatch wins the start claim just before the abort's write
        let started = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(store.claim_started(execution.id, started).await.unwrap());

        assert!(matches!(
            engine.abort_execution(execution.id).await,
            Err(EngineError::ExecutionNotQueued(_))
        ));
        let untouched = store.find_by_id(execution.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, ExecutionStatus::Running);
        assert_eq!(untouched.started_at, Some(started));
    }

    #[tokio::test]
    async fn throttle_window_slots_are_reserved_atomically() {
        let (engine, _store) = test_engine();
        let mut job = Job::new(1, "metered", "metered", JobType::OnDemand);
        job.max_per_minute = Some(2);
        engine.register_job(job.clone(), Arc::new(Noop)).unwrap();
        let runtime = engine.runtime_opt(1).unwrap();
        let now = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();

        assert!(runtime.try_reserve_start(&job, now));
        assert!(runtime.try_reserve_start(&job, now));
        assert!(!runtime.try_reserve_start(&job, now));

        // a lost claim gives its window slot back
        runtime.release_start(&job, now);
        assert!(runtime.try_reserve_start(&job, now));
        assert!(!runtime.try_reserve_start(&job, now));

        // the window drains after sixty seconds
        assert!(runtime.try_reserve_start(&job, now + Duration::seconds(61)));
    }

    #[tokio::test]
    async fn empty_chain_is_rejected() {
        let (engine, _store) = test_engine();
        engine
            .register_job(Job::new(1, "steps", "steps", JobType::OnDemand), Arc::new(Noop))
            .unwrap();

        let result = engine.create_chained_executions(1, vec![], false, None).await;
        assert!(matches!(result, Err(EngineError::EmptyGroup)));
    }

    #[tokio::test]
    async fn batch_members_share_the_head_id() {
        let (engine, _store) = test_engine();
        engine
            .register_job(Job::new(1, "bulk", "bulk", JobType::OnDemand), Arc::new(Noop))
            .unwrap();

        let batch_id = engine
            .create_batch_executions(1, vec![json!(1), json!(2), json!(3)], false, None)
            .await
            .unwrap();
        assert!(!engine.is_batch_finished(batch_id).await.unwrap());

        assert!(drive_until_count(&engine, 1, ExecutionStatus::Finished, 3).await);
        assert!(engine.is_batch_finished(batch_id).await.unwrap());

        let info = engine.batch_info(batch_id).await.unwrap();
        assert_eq!(info.count(ExecutionStatus::Finished), 3);
        for member in engine.batch_executions(batch_id).await.unwrap() {
            assert_eq!(member.batch_id, Some(batch_id));
        }
    }

    #[tokio::test]
    async fn zombie_goes_through_the_retry_policy() {
        let (engine, store) = test_engine();
        let mut job = Job::new(1, "fragile", "fragile", JobType::OnDemand);
        job.fail_retries = 1;
        engine.register_job(job, Arc::new(Noop)).unwrap();

        // simulate an execution started by a process that died
        let orphan = engine
            .create_execution(1, None, false, None, None, None, None)
            .await
            .unwrap();
        let started = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(store.claim_started(orphan.id, started).await.unwrap());

        assert_eq!(engine.hunt_zombies().await.unwrap(), 1);

        let failed = store.find_by_id(orphan.id).await.unwrap().unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert!(failed.fail_message.unwrap().contains("worker lost"));
        let retry = store
            .find_by_id(failed.fail_retry_execution_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retry.status, ExecutionStatus::Queued);
        assert_eq!(retry.fail_retry, 1);

        // a second hunt finds nothing
        assert_eq!(engine.hunt_zombies().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn throttle_caps_dispatches_per_minute() {
        let (engine, _store) = test_engine();
        let mut job = Job::new(1, "metered", "metered", JobType::OnDemand);
        job.threads = 4;
        job.max_per_minute = Some(2);
        job.unique_in_queue = false;
        engine.register_job(job, Arc::new(Noop)).unwrap();

        for _ in 0..5 {
            engine
                .create_execution(1, None, false, None, None, None, None)
                .await
                .unwrap();
        }
        assert!(drive_until_count(&engine, 1, ExecutionStatus::Finished, 2).await);

        // window still open: the remainder stays queued
        engine.sync().await.unwrap();
        assert_eq!(
            engine
                .count_executions(1, ExecutionStatus::Finished)
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            engine
                .count_executions(1, ExecutionStatus::Queued)
                .await
                .unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn deactivation_discards_the_ready_queue() {
        let (engine, _store) = test_engine();
        let mut job = Job::new(1, "slow", "slow", JobType::OnDemand);
        job.threads = 1;
        job.unique_in_queue = false;
        engine.register_job(job, Arc::new(Stuck)).unwrap();

        for _ in 0..3 {
            engine
                .create_execution(1, None, false, None, None, None, None)
                .await
                .unwrap();
        }
        engine.sync().await.unwrap();
        assert_eq!(engine.ready_queue_len(1).unwrap(), 2);

        engine.deactivate_job(1).unwrap();
        assert_eq!(engine.ready_queue_len(1).unwrap(), 0);
        assert_eq!(engine.job(1).unwrap().status, JobStatus::Inactive);

        // an inactive job is skipped by sync
        engine.sync().await.unwrap();
        assert_eq!(engine.ready_queue_len(1).unwrap(), 0);
    }

    #[tokio::test]
    async fn only_queued_executions_can_be_aborted() {
        let (engine, _store) = test_engine();
        engine
            .register_job(Job::new(1, "mailer", "mailer", JobType::OnDemand), Arc::new(Noop))
            .unwrap();

        let queued = engine
            .create_execution(1, None, false, None, None, None, None)
            .await
            .unwrap();
        engine.abort_execution(queued.id).await.unwrap();
        assert_eq!(
            engine.execution(queued.id).await.unwrap().status,
            ExecutionStatus::Aborted
        );

        assert!(matches!(
            engine.abort_execution(queued.id).await,
            Err(EngineError::ExecutionNotQueued(_))
        ));
        assert!(matches!(
            engine.abort_execution(999).await,
            Err(EngineError::ExecutionNotFound(999))
        ));

        // an aborted execution is never picked up again
        engine.sync().await.unwrap();
        assert_eq!(engine.ready_queue_len(1).unwrap(), 0);
    }

    #[tokio::test]
    async fn delayed_execution_waits_for_maturity() {
        let (engine, _store) = test_engine();
        engine
            .register_job(Job::new(1, "later", "later", JobType::OnDemand), Arc::new(Noop))
            .unwrap();

        let execution = engine
            .create_delayed_execution(1, None, false, Duration::hours(1))
            .await
            .unwrap();
        assert!(execution.maturity.is_some());

        engine.sync().await.unwrap();
        assert_eq!(engine.ready_queue_len(1).unwrap(), 0);
        assert_eq!(
            engine
                .count_executions(1, ExecutionStatus::Queued)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn schedule_previews_report_trigger_times() {
        let (engine, _store) = test_engine();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();

        let next = engine
            .next_scheduled_times("0 0 * * *", 2, Some(start))
            .unwrap();
        assert_eq!(
            next,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 2)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 3)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            ]
        );

        let end = NaiveDate::from_ymd_opt(2024, 1, 3)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let within = engine
            .scheduled_times("0 0 * * *", Some(start), Some(end))
            .unwrap();
        assert_eq!(within.len(), 1);
        assert_eq!(within[0], next[0]);
    }

    #[tokio::test]
    async fn scheduled_job_requires_a_valid_schedule() {
        let (engine, _store) = test_engine();

        let missing = Job::new(1, "nightly", "nightly", JobType::Scheduled);
        assert!(matches!(
            engine.register_job(missing, Arc::new(Noop)),
            Err(EngineError::MissingSchedule { .. })
        ));

        let mut bad = Job::new(2, "nightly", "nightly", JobType::Scheduled);
        bad.schedule = Some("61 * * * *".to_string());
        assert!(matches!(
            engine.register_job(bad, Arc::new(Noop)),
            Err(EngineError::InvalidSchedule(_))
        ));
    }

    #[tokio::test]
    async fn started_engine_triggers_scheduled_jobs() {
        let (engine, _store) = test_engine();
        let mut job = Job::new(1, "ticker", "ticker", JobType::Scheduled);
        job.schedule = Some("* * * * * *".to_string());
        engine.register_job(job, Arc::new(Noop)).unwrap();

        assert!(!engine.is_running());
        engine.start().unwrap();
        assert!(engine.is_running());

        let mut created = false;
        for _ in 0..300 {
            let queued = engine
                .count_executions(1, ExecutionStatus::Queued)
                .await
                .unwrap();
            let finished = engine
                .count_executions(1, ExecutionStatus::Finished)
                .await
                .unwrap();
            if queued + finished > 0 {
                created = true;
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        engine.stop();
        assert!(created);
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn retention_deletes_old_executions() {
        let (engine, store) = test_engine();
        engine
            .register_job(Job::new(1, "mailer", "mailer", JobType::OnDemand), Arc::new(Noop))
            .unwrap();

        let old = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        store
            .insert(NewExecution {
                job_id: 1,
                parameters: None,
                parameters_hash: None,
                priority: false,
                maturity: None,
                batch_id: None,
                chain_id: None,
                chain_previous_execution_id: None,
                fail_retry: 0,
                created_at: old,
            })
            .await
            .unwrap();
        engine
            .create_execution(1, Some(json!("fresh")), false, None, None, None, None)
            .await
            .unwrap();

        let cutoff = engine.now() - Duration::days(30);
        assert_eq!(engine.delete_older_executions(1, cutoff).await.unwrap(), 1);
        assert_eq!(engine.delete_all_executions(1).await.unwrap(), 1);
    }

    #[test]
    fn engine_rejects_unknown_time_zone() {
        let settings = Settings {
            time_zone: "Mars/Olympus".to_string(),
            ..Settings::default()
        };
        let store: Arc<dyn ExecutionStore> = Arc::new(MemoryExecutionStore::new());
        assert!(JobEngine::new(settings, store).is_err());
    }
}
