//! Events emitted from the supervisor to control clients.

use fleet_core::{LogEntry, Task, Worker, WorkerMetrics, WorkerState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Partial patch carried by `worker:updated`. At least one of `status` /
/// `last_activity_at_ms` or `metrics` is populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkerState>,
    #[serde(default, rename = "lastActivityAt", skip_serializing_if = "Option::is_none")]
    pub last_activity_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<WorkerMetrics>,
}

impl WorkerChanges {
    pub fn status(status: WorkerState, last_activity_at_ms: u64) -> Self {
        Self { status: Some(status), last_activity_at_ms: Some(last_activity_at_ms), metrics: None }
    }

    pub fn metrics(metrics: WorkerMetrics) -> Self {
        Self { status: None, last_activity_at_ms: None, metrics: Some(metrics) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "worker:started")]
    WorkerStarted { worker: Worker },

    #[serde(rename = "worker:updated")]
    WorkerUpdated {
        #[serde(rename = "workerId")]
        worker_id: String,
        changes: WorkerChanges,
    },

    #[serde(rename = "worker:stopped")]
    WorkerStopped {
        #[serde(rename = "workerId")]
        worker_id: String,
    },

    #[serde(rename = "task:queued")]
    TaskQueued { task: Task },

    #[serde(rename = "task:started")]
    TaskStarted {
        #[serde(rename = "taskId")]
        task_id: String,
        #[serde(rename = "workerId")]
        worker_id: String,
    },

    #[serde(rename = "task:progress")]
    TaskProgress {
        #[serde(rename = "taskId")]
        task_id: String,
        progress: u8,
    },

    #[serde(rename = "task:completed")]
    TaskCompleted {
        #[serde(rename = "taskId")]
        task_id: String,
        result: Value,
    },

    #[serde(rename = "task:failed")]
    TaskFailed {
        #[serde(rename = "taskId")]
        task_id: String,
        error: String,
    },

    #[serde(rename = "log:entry")]
    LogEntry { entry: LogEntry },
}

impl Event {
    /// The worker id this event is about, for fan-out routing and per-worker
    /// ordering. `None` for events that are not worker-scoped (task events
    /// reference a task, not a worker, for routing purposes — they always
    /// broadcast).
    pub fn worker_id(&self) -> Option<&str> {
        match self {
            Event::WorkerStarted { worker } => Some(worker.id.as_str()),
            Event::WorkerUpdated { worker_id, .. } | Event::WorkerStopped { worker_id } => {
                Some(worker_id.as_str())
            }
            Event::LogEntry { entry } => Some(entry.worker_id.as_str()),
            _ => None,
        }
    }

    /// `true` for `log:entry`, the only event routed to subscribers rather
    /// than broadcast.
    pub fn is_log_entry(&self) -> bool {
        matches!(self, Event::LogEntry { .. })
    }

    /// Synthetic `task:failed` event used for command-handling errors that
    /// should be reported back to the originating client only.
    pub fn command_error(message: impl Into<String>) -> Self {
        Event::TaskFailed { task_id: "command-error".into(), error: message.into() }
    }
}
