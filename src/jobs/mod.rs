//! Job engine: registration, queueing, dispatch, scheduling and recovery.

pub mod engine;
pub mod models;
pub mod registry;
pub mod types;

mod executor;
mod poller;
mod queue;
mod scheduler;
mod zombies;

pub use engine::JobEngine;
pub use models::{
    ExecutionInfo, ExecutionStatus, GroupInfo, Job, JobExecution, JobStatus, JobType, NewExecution,
};
pub use registry::WorkerRegistry;
pub use types::{JobContext, JobWorker, TypedJobWorker};
