//! Engine-wide error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::cron::CronError;
use crate::store::StoreError;

/// Errors surfaced by the engine's public API.
///
/// Per-execution failures never show up here: a failing work function is
/// recovered locally through the retry policy, and a lost queued-to-running
/// claim is treated as a benign conflict inside dispatch.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed cron schedule, surfaced at job registration/activation time.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(#[from] CronError),

    /// A scheduled or system job was registered without a schedule.
    #[error("job '{job}' requires a schedule")]
    MissingSchedule { job: String },

    #[error("job not found: {0}")]
    JobNotFound(i64),

    #[error("job execution not found: {0}")]
    ExecutionNotFound(i64),

    /// Abort was requested for an execution that is no longer queued.
    #[error("job execution {0} is not queued")]
    ExecutionNotQueued(i64),

    /// No worker is registered under the job's worker name.
    #[error("no worker registered under '{0}'")]
    WorkerNotRegistered(String),

    /// Chain or batch creation was called with an empty parameter list.
    #[error("cannot create an execution group from an empty parameter list")]
    EmptyGroup,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

/// Type alias for Result with EngineError to simplify function signatures.
pub type EngineResult<T> = Result<T, EngineError>;
