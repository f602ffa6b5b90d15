use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ============================================================================
// Job
// ============================================================================

/// How a job's executions come into being.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Executions are created by callers on demand
    OnDemand,
    /// Executions are created by the job's cron schedule
    Scheduled,
    /// Engine-internal job driven by a cron schedule
    System,
}

impl JobType {
    pub fn is_scheduled(self) -> bool {
        matches!(self, JobType::Scheduled | JobType::System)
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobType::OnDemand => write!(f, "on_demand"),
            JobType::Scheduled => write!(f, "scheduled"),
            JobType::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Active => write!(f, "active"),
            JobStatus::Inactive => write!(f, "inactive"),
        }
    }
}

/// A registered work definition with scheduling and concurrency policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Registry key under which the job's worker is resolved
    pub worker_name: String,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Cron schedule, required for scheduled and system jobs
    pub schedule: Option<String>,
    /// Worker pool size
    pub threads: usize,
    /// Dispatch throttle per rolling 60 second window
    pub max_per_minute: Option<u32>,
    /// Retries after a failed execution
    pub fail_retries: u32,
    /// Delay in seconds before a retry execution matures
    pub retry_delay_seconds: i64,
    /// Collapse executions with equal parameters while queued
    pub unique_in_queue: bool,
    /// Execution retention used by cleanup
    pub days_until_clean_up: u32,
}

impl Job {
    /// A job with the original engine's defaults; adjust fields as needed.
    pub fn new(
        id: i64,
        name: impl Into<String>,
        worker_name: impl Into<String>,
        job_type: JobType,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            worker_name: worker_name.into(),
            job_type,
            status: JobStatus::Active,
            schedule: None,
            threads: 1,
            max_per_minute: None,
            fail_retries: 0,
            retry_delay_seconds: 4,
            unique_in_queue: true,
            days_until_clean_up: 30,
        }
    }
}

// ============================================================================
// JobExecution
// ============================================================================

/// Job execution lifecycle state.
///
/// `Queued → Running → {Finished | Failed}`; `Queued → Aborted` on chain
/// short-circuit or external cancel. A failed execution with retries left
/// spawns a fresh record rather than reopening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Finished,
    Failed,
    Aborted,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Finished | ExecutionStatus::Failed | ExecutionStatus::Aborted
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Queued => write!(f, "queued"),
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Finished => write!(f, "finished"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// One unit of work, as persisted in the execution store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: i64,
    pub job_id: i64,
    pub status: ExecutionStatus,
    /// Opaque parameter payload (JSON text)
    pub parameters: Option<String>,
    /// Hash of the payload, used for unique-in-queue dedup
    pub parameters_hash: Option<i64>,
    /// Priority executions precede all non-priority ones
    pub priority: bool,
    /// Not-before timestamp
    pub maturity: Option<NaiveDateTime>,
    pub batch_id: Option<i64>,
    pub chain_id: Option<i64>,
    pub chain_previous_execution_id: Option<i64>,
    /// Attempt counter, zero for the first attempt
    pub fail_retry: u32,
    /// Forward link to the retry record this failed execution spawned
    pub fail_retry_execution_id: Option<i64>,
    pub fail_message: Option<String>,
    pub fail_stacktrace: Option<String>,
    pub started_at: Option<NaiveDateTime>,
    pub ended_at: Option<NaiveDateTime>,
    pub duration_ms: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Fields of a not-yet-persisted execution; the store assigns the id and
/// stamps `created_at`/`updated_at` from `created_at`. Status starts Queued.
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub job_id: i64,
    pub parameters: Option<String>,
    pub parameters_hash: Option<i64>,
    pub priority: bool,
    pub maturity: Option<NaiveDateTime>,
    pub batch_id: Option<i64>,
    pub chain_id: Option<i64>,
    pub chain_previous_execution_id: Option<i64>,
    pub fail_retry: u32,
    pub created_at: NaiveDateTime,
}

// ============================================================================
// Group snapshots
// ============================================================================

/// Per-execution slice of a group snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionInfo {
    pub id: i64,
    pub status: ExecutionStatus,
    pub started_at: Option<NaiveDateTime>,
    pub ended_at: Option<NaiveDateTime>,
    pub duration_ms: Option<i64>,
    pub fail_retry_execution_id: Option<i64>,
}

/// Computed snapshot of a batch or chain, not maintained incrementally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    pub id: i64,
    pub executions: Vec<ExecutionInfo>,
}

impl GroupInfo {
    pub fn new(id: i64, executions: &[JobExecution]) -> Self {
        Self {
            id,
            executions: executions
                .iter()
                .map(|e| ExecutionInfo {
                    id: e.id,
                    status: e.status,
                    started_at: e.started_at,
                    ended_at: e.ended_at,
                    duration_ms: e.duration_ms,
                    fail_retry_execution_id: e.fail_retry_execution_id,
                })
                .collect(),
        }
    }

    pub fn count(&self, status: ExecutionStatus) -> usize {
        self.executions
            .iter()
            .filter(|e| e.status == status)
            .count()
    }

    /// A group is finished when no member is queued or running.
    pub fn is_finished(&self) -> bool {
        self.executions.iter().all(|e| e.status.is_terminal())
    }
}

/// Hash used for unique-in-queue parameter dedup.
pub(crate) fn parameters_hash(parameters: &str) -> i64 {
    use std::hash::{DefaultHasher, Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    parameters.hash(&mut hasher);
    hasher.finish() as i64
}
