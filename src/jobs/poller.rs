//! Periodic engine driver.
//!
//! One task that runs the queue synchronizer on every tick and the zombie
//! hunt on every nth tick. The task is its own timer; stopping the engine
//! cancels it through a `CancellationToken`.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::jobs::engine::JobEngine;

pub(crate) struct PollerDriver {
    token: Mutex<Option<CancellationToken>>,
}

impl PollerDriver {
    pub(crate) fn new() -> Self {
        Self {
            token: Mutex::new(None),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn start(&self, engine: JobEngine) {
        let token = CancellationToken::new();
        {
            let mut slot = self.token.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = slot.take() {
                previous.cancel();
            }
            *slot = Some(token.clone());
        }
        let interval = engine.settings().poll_interval_seconds.max(1);
        let hunt_every = engine.settings().zombie_hunt_multiplier.max(1);
        info!(interval, "queue poller started");
        tokio::spawn(poll_loop(engine, token, interval, hunt_every));
    }

    pub(crate) fn stop(&self) {
        let token = self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            token.cancel();
            info!("queue poller stopped");
        }
    }
}

async fn poll_loop(engine: JobEngine, token: CancellationToken, interval: u64, hunt_every: u64) {
    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("queue poller cancelled");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
        }

        if let Err(err) = engine.sync().await {
            error!(error = %err, "queue sync failed");
        }
        ticks += 1;
        if ticks % hunt_every == 0 {
            if let Err(err) = engine.hunt_zombies().await {
                error!(error = %err, "zombie hunt failed");
            }
        }
    }
}
