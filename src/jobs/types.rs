use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::jobs::engine::JobEngine;
use crate::jobs::models::{Job, JobExecution};

/// Context passed to a worker for one execution.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: i64,
    pub job_name: String,
    /// Snapshot of the execution being worked on
    pub execution: JobExecution,
}

impl JobContext {
    pub fn execution_id(&self) -> i64 {
        self.execution.id
    }

    pub fn retry_attempt(&self) -> u32 {
        self.execution.fail_retry
    }

    /// Decode the execution's parameter payload.
    pub fn parameters<T: DeserializeOwned>(&self) -> anyhow::Result<Option<T>> {
        match self.execution.parameters.as_deref() {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }
}

/// A user-supplied work function plus its scheduling hook.
#[async_trait]
pub trait JobWorker: Send + Sync {
    /// Perform one unit of work. Any error is recorded on the execution and
    /// recovered through the job's retry policy.
    async fn do_work(&self, ctx: JobContext) -> anyhow::Result<()>;

    /// Called by the cron scheduler on each trigger of a scheduled job.
    /// The default creates one parameterless execution.
    async fn on_schedule(&self, engine: &JobEngine, job: &Job) -> anyhow::Result<()> {
        engine
            .create_execution(job.id, None, false, None, None, None, None)
            .await?;
        Ok(())
    }
}

/// A worker with typed parameters.
///
/// Decoding happens in the registry adapter created at registration time;
/// the engine itself never inspects payloads.
#[async_trait]
pub trait TypedJobWorker: Send + Sync {
    type Parameters: DeserializeOwned + Send;

    async fn do_work(&self, ctx: JobContext, parameters: Self::Parameters) -> anyhow::Result<()>;

    async fn on_schedule(&self, engine: &JobEngine, job: &Job) -> anyhow::Result<()> {
        engine
            .create_execution(job.id, None, false, None, None, None, None)
            .await?;
        Ok(())
    }
}
