//! Task entity: a single tool invocation submitted for execution.

use crate::ids::{TaskId, WorkerId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Task lifecycle state. Forms a DAG: `Queued -> Running -> {Completed,
/// Failed}`, with `Cancelled` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub worker_id: Option<WorkerId>,
    pub tool: String,
    pub params: Value,
    pub state: TaskState,
    /// Meaningful only while `state == Running`.
    pub progress: Option<u8>,
    #[serde(rename = "createdAt")]
    pub created_at_ms: u64,
    #[serde(rename = "startedAt")]
    pub started_at_ms: Option<u64>,
    #[serde(rename = "completedAt")]
    pub completed_at_ms: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl Task {
    pub fn new(id: TaskId, tool: String, params: Value, now_ms: u64) -> Self {
        Self {
            id,
            worker_id: None,
            tool,
            params,
            state: TaskState::Queued,
            progress: None,
            created_at_ms: now_ms,
            started_at_ms: None,
            completed_at_ms: None,
            result: None,
            error: None,
        }
    }

    /// Latency in ms between start and completion, if both are known.
    pub fn latency_ms(&self) -> Option<u64> {
        match (self.started_at_ms, self.completed_at_ms) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        }
    }
}
