//! SPDX-License-Identifier: MIT
//!
//! Client-side read-only mirror of supervisor state, updated incrementally
//! from inbound `fleet_wire::Event`s per the upsert/delete rules of the
//! client connection manager.

use std::collections::{HashMap, VecDeque};

use fleet_core::{LogEntry, Task, TaskId, TaskState, Worker, WorkerId};
use fleet_wire::Event;
use serde_json::Value;

/// Logs are capped per worker; oldest entries drop once the cap is reached.
const LOG_CAP: usize = 500;

#[derive(Debug, Default)]
pub struct Mirror {
    workers: HashMap<WorkerId, Worker>,
    tasks: HashMap<TaskId, Task>,
    logs: HashMap<WorkerId, VecDeque<LogEntry>>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn worker(&self, id: &WorkerId) -> Option<&Worker> {
        self.workers.get(id)
    }

    pub fn workers(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn logs(&self, worker_id: &WorkerId) -> impl Iterator<Item = &LogEntry> {
        self.logs.get(worker_id).into_iter().flatten()
    }

    /// Apply one inbound event to the mirror.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::WorkerStarted { worker } => {
                self.logs.insert(worker.id.clone(), VecDeque::new());
                self.workers.insert(worker.id.clone(), worker.clone());
            }
            Event::WorkerUpdated { worker_id, changes } => {
                if let Some(worker) = self.workers.get_mut(&WorkerId::new(worker_id.as_str())) {
                    if let Some(status) = changes.status {
                        worker.state = status;
                    }
                    if let Some(last_activity_at_ms) = changes.last_activity_at_ms {
                        worker.last_activity_at_ms = last_activity_at_ms;
                    }
                    if let Some(metrics) = changes.metrics {
                        worker.metrics = metrics;
                    }
                }
            }
            Event::WorkerStopped { worker_id } => {
                let id = WorkerId::new(worker_id.as_str());
                self.workers.remove(&id);
                self.logs.remove(&id);
            }
            Event::TaskQueued { task } => {
                self.tasks.insert(task.id.clone(), task.clone());
            }
            Event::TaskStarted { task_id, worker_id } => {
                let task = self.upsert_task(task_id);
                task.state = TaskState::Running;
                task.worker_id = Some(WorkerId::new(worker_id.as_str()));
            }
            Event::TaskProgress { task_id, progress } => {
                self.upsert_task(task_id).progress = Some(*progress);
            }
            Event::TaskCompleted { task_id, result } => {
                let task = self.upsert_task(task_id);
                task.state = TaskState::Completed;
                task.result = Some(result.clone());
                task.progress = None;
            }
            Event::TaskFailed { task_id, error } => {
                let task = self.upsert_task(task_id);
                task.state = TaskState::Failed;
                task.error = Some(error.clone());
                task.progress = None;
            }
            Event::LogEntry { entry } => {
                let buffer = self.logs.entry(entry.worker_id.clone()).or_default();
                buffer.push_back(entry.clone());
                while buffer.len() > LOG_CAP {
                    buffer.pop_front();
                }
            }
        }
    }

    /// Get-or-create a task placeholder. Used when a `task:started` /
    /// `:progress` / `:completed` / `:failed` event arrives for a task the
    /// mirror never saw queued (e.g. the client connected after submission).
    fn upsert_task(&mut self, task_id: &str) -> &mut Task {
        self.tasks
            .entry(TaskId::new(task_id))
            .or_insert_with(|| Task::new(TaskId::new(task_id), String::new(), Value::Null, 0))
    }
}
