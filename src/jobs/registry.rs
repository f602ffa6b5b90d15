//! Registry mapping a job's worker name to its implementation.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;

use crate::jobs::engine::JobEngine;
use crate::jobs::models::Job;
use crate::jobs::types::{JobContext, JobWorker, TypedJobWorker};

/// Registry for resolving workers by name.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: DashMap<String, Arc<dyn JobWorker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker under a name; replaces any previous registration.
    pub fn register(&self, name: impl Into<String>, worker: Arc<dyn JobWorker>) {
        self.workers.insert(name.into(), worker);
    }

    /// Register a typed-parameter worker; payload decoding is wrapped here
    /// so resolution stays uniform.
    pub fn register_typed<W>(&self, name: impl Into<String>, worker: W)
    where
        W: TypedJobWorker + 'static,
    {
        self.register(name, Arc::new(Typed(worker)));
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn JobWorker>> {
        self.workers.get(name).map(|w| w.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workers.contains_key(name)
    }
}

/// Adapter that decodes the parameter payload before delegating.
struct Typed<W>(W);

#[async_trait]
impl<W> JobWorker for Typed<W>
where
    W: TypedJobWorker + 'static,
{
    async fn do_work(&self, ctx: JobContext) -> anyhow::Result<()> {
        let parameters: W::Parameters = ctx
            .parameters()?
            .context("execution has no parameters but the worker requires them")?;
        self.0.do_work(ctx, parameters).await
    }

    async fn on_schedule(&self, engine: &JobEngine, job: &Job) -> anyhow::Result<()> {
        self.0.on_schedule(engine, job).await
    }
}
