//! Worker entity: a supervised child process running one MCP server.

use crate::ids::{TaskId, WorkerId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Starting,
    Idle,
    Busy,
    Error,
    Stopping,
    Terminated,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Terminated)
    }
}

/// Rolling performance counters for a worker, updated on every terminal
/// task outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerMetrics {
    pub tasks_completed: u64,
    pub tasks_errored: u64,
    pub avg_latency_ms: f64,
    pub tokens_used: u64,
}

impl WorkerMetrics {
    /// Fold in one more terminal task's latency using the rolling-mean
    /// formula `avg' = (avg*(n-1) + latency) / n`.
    pub fn record_latency(&mut self, latency_ms: u64, errored: bool) {
        if errored {
            self.tasks_errored += 1;
        } else {
            self.tasks_completed += 1;
        }
        let n = self.tasks_completed + self.tasks_errored;
        self.avg_latency_ms = (self.avg_latency_ms * (n.saturating_sub(1)) as f64
            + latency_ms as f64)
            / n as f64;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub id: WorkerId,
    pub server_id: String,
    pub server_name: String,
    pub state: WorkerState,
    pub pid: Option<u32>,
    #[serde(rename = "spawnedAt")]
    pub spawned_at_ms: u64,
    #[serde(rename = "lastActivityAt")]
    pub last_activity_at_ms: u64,
    /// Present iff `state == Busy`.
    pub current_task_id: Option<TaskId>,
    /// FIFO of task ids assigned to this worker but not yet running.
    #[serde(skip)]
    pub backlog: VecDeque<TaskId>,
    pub metrics: WorkerMetrics,
}

impl Worker {
    pub fn new(id: WorkerId, server_id: String, server_name: String, now_ms: u64) -> Self {
        Self {
            id,
            server_id,
            server_name,
            state: WorkerState::Starting,
            pid: None,
            spawned_at_ms: now_ms,
            last_activity_at_ms: now_ms,
            current_task_id: None,
            backlog: VecDeque::new(),
            metrics: WorkerMetrics::default(),
        }
    }

    pub fn is_schedulable(&self) -> bool {
        !matches!(self.state, WorkerState::Stopping | WorkerState::Error | WorkerState::Terminated)
    }
}
