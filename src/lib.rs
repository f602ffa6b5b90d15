//! Foreman — a durable job execution engine.
//!
//! Jobs are registered work definitions; job executions are single units of
//! work persisted in an [`store::ExecutionStore`]. A poller-driven queue
//! synchronizer pulls eligible executions into per-job in-memory ready queues,
//! a bounded worker pool dispatches them under an optional per-minute
//! throttle, and completion applies retry, chain and batch follow-up. A
//! zombie hunter reconciles executions left running by a crashed process, and
//! a cron scheduler drives recurring execution creation for scheduled jobs.

pub mod config;
pub mod cron;
pub mod error;
pub mod jobs;
pub mod store;

pub use config::Settings;
pub use cron::{CronError, CronExpression};
pub use error::{EngineError, EngineResult};
pub use jobs::{
    ExecutionStatus, GroupInfo, Job, JobContext, JobEngine, JobExecution, JobStatus, JobType,
    JobWorker, TypedJobWorker, WorkerRegistry,
};
pub use store::{ExecutionStore, MemoryExecutionStore, StoreError};
