//! Per-job in-memory ready queue.
//!
//! Holds eligible executions between sync and dispatch, ordered by priority
//! descending then creation ascending. The queue is a cache over the store:
//! losing it costs latency, never correctness.

use std::collections::{HashSet, VecDeque};

use crate::jobs::models::JobExecution;

#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    entries: VecDeque<JobExecution>,
    ids: HashSet<i64>,
}

/// Sort key: priority executions first, then FIFO by creation, ties by id.
fn sort_key(execution: &JobExecution) -> (bool, chrono::NaiveDateTime, i64) {
    (!execution.priority, execution.created_at, execution.id)
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    /// Insert in dispatch order; a duplicate id is ignored.
    pub(crate) fn push(&mut self, execution: JobExecution) {
        if !self.ids.insert(execution.id) {
            return;
        }
        let key = sort_key(&execution);
        let index = self.entries.partition_point(|e| sort_key(e) <= key);
        self.entries.insert(index, execution);
    }

    pub(crate) fn pop(&mut self) -> Option<JobExecution> {
        let execution = self.entries.pop_front()?;
        self.ids.remove(&execution.id);
        Some(execution)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.ids.clear();
    }

    /// Drop one entry by id (after an external abort).
    pub(crate) fn remove(&mut self, id: i64) -> bool {
        if !self.ids.remove(&id) {
            return false;
        }
        self.entries.retain(|e| e.id != id);
        true
    }

    /// Drop all queued members of a chain (after a chain abort).
    pub(crate) fn remove_chain(&mut self, chain_id: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.chain_id != Some(chain_id));
        self.ids.clear();
        self.ids.extend(self.entries.iter().map(|e| e.id));
        before - self.entries.len()
    }
}
