//! SPDX-License-Identifier: MIT
//!
//! The task registry is the single mutator of worker- and task-state
//! fields. Every method here commits its state change while holding the
//! lock and only then builds the event(s) describing it, so a reader
//! observing the committed state and a reader observing the emitted event
//! can never disagree.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use fleet_core::{Clock, Task, TaskId, TaskState, Worker, WorkerId, WorkerState};
use fleet_wire::{Event, WorkerChanges};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::RegistryError;

struct State {
    workers: HashMap<WorkerId, Worker>,
    tasks: HashMap<TaskId, Task>,
    /// Task ids that are `Queued` and not yet assigned (running or
    /// backlogged) to any worker, oldest first.
    unassigned: VecDeque<TaskId>,
}

pub struct TaskRegistry {
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl TaskRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(State {
                workers: HashMap::new(),
                tasks: HashMap::new(),
                unassigned: VecDeque::new(),
            }),
        }
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    // --- Worker lifecycle -------------------------------------------------

    pub fn create_worker(&self, id: WorkerId, server_id: String, server_name: String) -> Event {
        let now = self.now();
        let mut state = self.state.lock();
        let worker = Worker::new(id, server_id, server_name, now);
        let event = Event::WorkerStarted { worker: worker.clone() };
        state.workers.insert(worker.id.clone(), worker);
        event
    }

    pub fn worker_pid_known(&self, id: &WorkerId, pid: u32) {
        let mut state = self.state.lock();
        if let Some(worker) = state.workers.get_mut(id) {
            worker.pid = Some(pid);
        }
    }

    /// Starting -> Idle, on the worker's `Spawned` signal.
    pub fn worker_ready(&self, id: &WorkerId) -> Result<Event, RegistryError> {
        let now = self.now();
        let mut state = self.state.lock();
        let worker = state.workers.get_mut(id).ok_or_else(|| RegistryError::UnknownWorker(id.clone()))?;
        worker.state = WorkerState::Idle;
        worker.last_activity_at_ms = now;
        Ok(Event::WorkerUpdated {
            worker_id: id.to_string(),
            changes: WorkerChanges::status(WorkerState::Idle, now),
        })
    }

    /// A worker process failed before becoming usable (e.g. failed to
    /// spawn) or crashed in a way that warrants surfacing `Error` before
    /// the worker is torn down entirely.
    pub fn worker_errored(&self, id: &WorkerId) -> Result<Event, RegistryError> {
        let now = self.now();
        let mut state = self.state.lock();
        let worker = state.workers.get_mut(id).ok_or_else(|| RegistryError::UnknownWorker(id.clone()))?;
        worker.state = WorkerState::Error;
        worker.last_activity_at_ms = now;
        Ok(Event::WorkerUpdated {
            worker_id: id.to_string(),
            changes: WorkerChanges::status(WorkerState::Error, now),
        })
    }

    pub fn worker_stopping(&self, id: &WorkerId) -> Result<Event, RegistryError> {
        let now = self.now();
        let mut state = self.state.lock();
        let worker = state.workers.get_mut(id).ok_or_else(|| RegistryError::UnknownWorker(id.clone()))?;
        worker.state = WorkerState::Stopping;
        worker.last_activity_at_ms = now;
        Ok(Event::WorkerUpdated {
            worker_id: id.to_string(),
            changes: WorkerChanges::status(WorkerState::Stopping, now),
        })
    }

    /// The worker's process has fully terminated (spawn failure, graceful
    /// stop, or crash). Fails the current task and every backlogged task
    /// with `error`, drops the worker from the registry, and returns the
    /// full set of events to fan out.
    pub fn worker_terminated(&self, id: &WorkerId, error: &str) -> Vec<Event> {
        let now = self.now();
        let mut state = self.state.lock();
        let Some(mut worker) = state.workers.remove(id) else {
            return Vec::new();
        };
        worker.state = WorkerState::Terminated;

        let mut events = Vec::new();
        let stranded: Vec<TaskId> =
            worker.current_task_id.take().into_iter().chain(worker.backlog.drain(..)).collect();
        for task_id in stranded {
            if let Some(task) = state.tasks.get_mut(&task_id) {
                if !task.state.is_terminal() {
                    task.state = TaskState::Failed;
                    task.error = Some(error.to_string());
                    task.completed_at_ms = Some(now);
                    events.push(Event::TaskFailed { task_id: task_id.to_string(), error: error.to_string() });
                }
            }
        }
        events.push(Event::WorkerStopped { worker_id: id.to_string() });
        events
    }

    // --- Task submission and assignment ------------------------------------

    /// Record a new task as `Queued` but not yet assigned to any worker.
    pub fn submit(&self, id: TaskId, tool: String, params: Value) -> Event {
        let now = self.now();
        let mut state = self.state.lock();
        let task = Task::new(id.clone(), tool, params, now);
        let event = Event::TaskQueued { task: task.clone() };
        state.tasks.insert(id.clone(), task);
        state.unassigned.push_back(id);
        event
    }

    /// A schedulable snapshot of worker id, state, and backlog length, used
    /// by the scheduling policy without exposing the whole registry.
    pub fn worker_snapshot(&self) -> Vec<(WorkerId, WorkerState, usize)> {
        let state = self.state.lock();
        state.workers.values().map(|w| (w.id.clone(), w.state, w.backlog.len())).collect()
    }

    pub fn next_unassigned(&self) -> Option<TaskId> {
        self.state.lock().unassigned.front().cloned()
    }

    /// Assign `task_id` to `worker_id`. If the worker is currently `Idle`,
    /// the task starts running immediately and a `task:started` event is
    /// returned. Otherwise the task is appended to the worker's backlog and
    /// no event fires (it already fired `task:queued` at submission).
    pub fn assign_to_worker(
        &self,
        worker_id: &WorkerId,
        task_id: &TaskId,
    ) -> Result<Option<Event>, RegistryError> {
        let now = self.now();
        let mut state = self.state.lock();
        {
            let worker = state
                .workers
                .get(worker_id)
                .ok_or_else(|| RegistryError::UnknownWorker(worker_id.clone()))?;
            if !worker.is_schedulable() {
                return Err(RegistryError::WorkerNotSchedulable(worker_id.clone()));
            }
        }
        state.unassigned.retain(|t| t != task_id);

        let should_start = state.workers.get(worker_id).map(|w| w.state == WorkerState::Idle).unwrap_or(false);
        if should_start {
            if let Some(worker) = state.workers.get_mut(worker_id) {
                worker.state = WorkerState::Busy;
                worker.current_task_id = Some(task_id.clone());
                worker.last_activity_at_ms = now;
            }
            if let Some(task) = state.tasks.get_mut(task_id) {
                task.state = TaskState::Running;
                task.worker_id = Some(worker_id.clone());
                task.started_at_ms = Some(now);
            }
            Ok(Some(Event::TaskStarted { task_id: task_id.to_string(), worker_id: worker_id.to_string() }))
        } else {
            if let Some(worker) = state.workers.get_mut(worker_id) {
                worker.backlog.push_back(task_id.clone());
            }
            if let Some(task) = state.tasks.get_mut(task_id) {
                task.worker_id = Some(worker_id.clone());
            }
            Ok(None)
        }
    }

    pub fn worker_backlog_pop(&self, worker_id: &WorkerId) -> Option<TaskId> {
        self.state.lock().workers.get_mut(worker_id).and_then(|w| w.backlog.pop_front())
    }

    // --- Task progress and terminal outcomes -------------------------------

    pub fn task_progress(&self, task_id: &TaskId, progress: u8) -> Result<Event, RegistryError> {
        let mut state = self.state.lock();
        let task = state.tasks.get_mut(task_id).ok_or_else(|| RegistryError::UnknownTask(task_id.clone()))?;
        if task.state != TaskState::Running {
            return Err(RegistryError::TaskNotRunning(task_id.clone()));
        }
        task.progress = Some(progress);
        Ok(Event::TaskProgress { task_id: task_id.to_string(), progress })
    }

    /// Mark a running task complete or failed, updating its worker's
    /// metrics and freeing the worker back to `Idle`. Returns both the
    /// terminal task event and the worker's `worker:updated` event.
    pub fn finish_task(
        &self,
        task_id: &TaskId,
        outcome: Result<Value, String>,
    ) -> Result<Vec<Event>, RegistryError> {
        let now = self.now();
        let mut state = self.state.lock();
        let task = state.tasks.get_mut(task_id).ok_or_else(|| RegistryError::UnknownTask(task_id.clone()))?;
        if task.state != TaskState::Running {
            return Err(RegistryError::TaskNotRunning(task_id.clone()));
        }

        let latency_ms = task.started_at_ms.map(|start| now.saturating_sub(start)).unwrap_or(0);
        let worker_id = task.worker_id.clone();

        let mut events = Vec::new();
        let terminal_event = match &outcome {
            Ok(result) => {
                task.state = TaskState::Completed;
                task.result = Some(result.clone());
                Event::TaskCompleted { task_id: task_id.to_string(), result: result.clone() }
            }
            Err(error) => {
                task.state = TaskState::Failed;
                task.error = Some(error.clone());
                Event::TaskFailed { task_id: task_id.to_string(), error: error.clone() }
            }
        };
        task.completed_at_ms = Some(now);
        events.push(terminal_event);

        if let Some(worker_id) = worker_id {
            if let Some(worker) = state.workers.get_mut(&worker_id) {
                worker.current_task_id = None;
                worker.last_activity_at_ms = now;
                worker.metrics.record_latency(latency_ms, outcome.is_err());
                if worker.state == WorkerState::Busy {
                    worker.state = WorkerState::Idle;
                }
                events.push(Event::WorkerUpdated {
                    worker_id: worker_id.to_string(),
                    changes: WorkerChanges { status: Some(worker.state), last_activity_at_ms: Some(now), metrics: Some(worker.metrics) },
                });
            }
        }
        Ok(events)
    }

    /// Cancel a task. Returns no events if the task is unknown or already
    /// terminal (no duplicate event). The wire schema has no dedicated
    /// cancel event, so cancellation surfaces as `task:failed` with a fixed
    /// message; the task's own state still records `Cancelled`. If the task
    /// was running, its worker is freed back to `Idle` immediately and a
    /// `worker:updated` event is returned alongside (the worker's eventual
    /// response for this task is then dropped with no further event, since
    /// the task is no longer `Running` by the time it arrives).
    pub fn cancel(&self, task_id: &TaskId) -> Vec<Event> {
        let now = self.now();
        let mut state = self.state.lock();
        let Some(task) = state.tasks.get_mut(task_id) else {
            return Vec::new();
        };
        if task.state.is_terminal() {
            return Vec::new();
        }
        let was_running = task.state == TaskState::Running;
        let worker_id = task.worker_id.clone();
        task.state = TaskState::Cancelled;
        task.completed_at_ms = Some(now);
        task.error = Some("Task cancelled".to_string());

        let mut events =
            vec![Event::TaskFailed { task_id: task_id.to_string(), error: "Task cancelled".to_string() }];

        state.unassigned.retain(|t| t != task_id);
        if let Some(worker) = worker_id.as_ref().and_then(|id| state.workers.get_mut(id)) {
            worker.backlog.retain(|t| t != task_id);
            if was_running && worker.current_task_id.as_ref() == Some(task_id) {
                worker.current_task_id = None;
                worker.last_activity_at_ms = now;
                if worker.state == WorkerState::Busy {
                    worker.state = WorkerState::Idle;
                }
                events.push(Event::WorkerUpdated {
                    worker_id: worker.id.to_string(),
                    changes: WorkerChanges::status(worker.state, now),
                });
            }
        }

        events
    }

    pub fn task(&self, task_id: &TaskId) -> Option<Task> {
        self.state.lock().tasks.get(task_id).cloned()
    }

    pub fn worker(&self, worker_id: &WorkerId) -> Option<Worker> {
        self.state.lock().workers.get(worker_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::FakeClock;

    fn registry() -> (TaskRegistry, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::default());
        (TaskRegistry::new(clock.clone()), clock)
    }

    #[test]
    fn create_worker_emits_worker_started() {
        let (reg, _clock) = registry();
        let event = reg.create_worker(WorkerId::new("w1"), "s".into(), "demo".into());
        assert!(matches!(event, Event::WorkerStarted { .. }));
    }

    #[test]
    fn submit_then_assign_starts_task_on_idle_worker() {
        let (reg, _clock) = registry();
        reg.create_worker(WorkerId::new("w1"), "s".into(), "demo".into());
        reg.worker_ready(&WorkerId::new("w1")).unwrap();
        reg.submit(TaskId::new("t1"), "echo".into(), Value::Null);

        let event = reg.assign_to_worker(&WorkerId::new("w1"), &TaskId::new("t1")).unwrap();
        assert!(matches!(event, Some(Event::TaskStarted { .. })));
        assert_eq!(reg.worker(&WorkerId::new("w1")).unwrap().state, WorkerState::Busy);
    }

    #[test]
    fn assign_to_busy_worker_backlogs_without_event() {
        let (reg, _clock) = registry();
        reg.create_worker(WorkerId::new("w1"), "s".into(), "demo".into());
        reg.worker_ready(&WorkerId::new("w1")).unwrap();
        reg.submit(TaskId::new("t1"), "echo".into(), Value::Null);
        reg.assign_to_worker(&WorkerId::new("w1"), &TaskId::new("t1")).unwrap();

        reg.submit(TaskId::new("t2"), "echo".into(), Value::Null);
        let event = reg.assign_to_worker(&WorkerId::new("w1"), &TaskId::new("t2")).unwrap();
        assert!(event.is_none());
        assert_eq!(reg.worker(&WorkerId::new("w1")).unwrap().backlog.len(), 1);
    }

    #[test]
    fn finish_task_frees_worker_and_updates_metrics() {
        let (reg, clock) = registry();
        reg.create_worker(WorkerId::new("w1"), "s".into(), "demo".into());
        reg.worker_ready(&WorkerId::new("w1")).unwrap();
        reg.submit(TaskId::new("t1"), "echo".into(), Value::Null);
        reg.assign_to_worker(&WorkerId::new("w1"), &TaskId::new("t1")).unwrap();
        clock.advance_ms(50);

        let events = reg.finish_task(&TaskId::new("t1"), Ok(Value::Null)).unwrap();
        assert!(events.iter().any(|e| matches!(e, Event::TaskCompleted { .. })));
        let worker = reg.worker(&WorkerId::new("w1")).unwrap();
        assert_eq!(worker.state, WorkerState::Idle);
        assert_eq!(worker.metrics.tasks_completed, 1);
    }

    #[test]
    fn finish_task_on_non_running_task_errors() {
        let (reg, _clock) = registry();
        reg.submit(TaskId::new("t1"), "echo".into(), Value::Null);
        let err = reg.finish_task(&TaskId::new("t1"), Ok(Value::Null)).unwrap_err();
        assert_eq!(err, RegistryError::TaskNotRunning(TaskId::new("t1")));
    }

    #[test]
    fn cancel_queued_task_emits_task_failed() {
        let (reg, _clock) = registry();
        reg.submit(TaskId::new("t1"), "echo".into(), Value::Null);
        let events = reg.cancel(&TaskId::new("t1"));
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::TaskFailed { error, .. } => assert_eq!(error, "Task cancelled"),
            other => panic!("expected TaskFailed, got {other:?}"),
        }
    }

    #[test]
    fn cancel_running_task_also_frees_worker() {
        let (reg, _clock) = registry();
        reg.create_worker(WorkerId::new("w1"), "s".into(), "demo".into());
        reg.worker_ready(&WorkerId::new("w1")).unwrap();
        reg.submit(TaskId::new("t1"), "echo".into(), Value::Null);
        reg.assign_to_worker(&WorkerId::new("w1"), &TaskId::new("t1")).unwrap();

        let events = reg.cancel(&TaskId::new("t1"));
        assert!(events.iter().any(|e| matches!(e, Event::TaskFailed { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            Event::WorkerUpdated { changes, .. } if changes.status == Some(WorkerState::Idle)
        )));
        assert_eq!(reg.worker(&WorkerId::new("w1")).unwrap().state, WorkerState::Idle);
    }

    #[test]
    fn cancel_unknown_task_returns_none() {
        let (reg, _clock) = registry();
        assert!(reg.cancel(&TaskId::new("ghost")).is_empty());
    }

    #[test]
    fn cancel_already_terminal_task_returns_none() {
        let (reg, _clock) = registry();
        reg.submit(TaskId::new("t1"), "echo".into(), Value::Null);
        reg.cancel(&TaskId::new("t1"));
        assert!(reg.cancel(&TaskId::new("t1")).is_empty());
    }

    #[test]
    fn worker_terminated_fails_current_and_backlogged_tasks() {
        let (reg, _clock) = registry();
        reg.create_worker(WorkerId::new("w1"), "s".into(), "demo".into());
        reg.worker_ready(&WorkerId::new("w1")).unwrap();
        reg.submit(TaskId::new("t1"), "echo".into(), Value::Null);
        reg.assign_to_worker(&WorkerId::new("w1"), &TaskId::new("t1")).unwrap();
        reg.submit(TaskId::new("t2"), "echo".into(), Value::Null);
        reg.assign_to_worker(&WorkerId::new("w1"), &TaskId::new("t2")).unwrap();

        let events = reg.worker_terminated(&WorkerId::new("w1"), "worker process exited unexpectedly");
        let failed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::TaskFailed { task_id, .. } => Some(task_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(failed.len(), 2);
        assert!(matches!(events.last(), Some(Event::WorkerStopped { .. })));
        assert!(reg.worker(&WorkerId::new("w1")).is_none());
    }
}
