//! SPDX-License-Identifier: MIT
//!
//! Worker-pull scheduling as free functions over a `TaskRegistry`: take the
//! shared state, decide, mutate, return events.

use fleet_core::{TaskId, WorkerId, WorkerState};
use fleet_wire::Event;
use serde_json::Value;

use crate::registry::TaskRegistry;

/// Pick the best worker for a new task: any `Idle` worker first
/// (lexicographically smallest id on ties), else the schedulable
/// (non-stopping/non-error) worker with the shortest backlog, again
/// tie-broken lexicographically.
fn pick_target_worker(workers: &[(WorkerId, WorkerState, usize)]) -> Option<WorkerId> {
    let mut idle: Vec<&WorkerId> =
        workers.iter().filter(|(_, state, _)| *state == WorkerState::Idle).map(|(id, ..)| id).collect();
    if !idle.is_empty() {
        idle.sort();
        return idle.into_iter().next().cloned();
    }

    workers
        .iter()
        .filter(|(_, state, _)| !matches!(state, WorkerState::Stopping | WorkerState::Error | WorkerState::Terminated))
        .min_by(|(id_a, _, backlog_a), (id_b, _, backlog_b)| backlog_a.cmp(backlog_b).then_with(|| id_a.cmp(id_b)))
        .map(|(id, ..)| id.clone())
}

/// Submit a new task and, if a worker is available, assign it immediately.
/// Returns every event produced, in order: `task:queued`, then either
/// `task:started` (assigned to an idle worker) or nothing further (no
/// schedulable worker, or the task was added to a busy worker's backlog).
pub fn submit_task(registry: &TaskRegistry, task_id: TaskId, tool: String, params: Value) -> Vec<Event> {
    let mut events = vec![registry.submit(task_id.clone(), tool, params)];

    let snapshot = registry.worker_snapshot();
    if let Some(worker_id) = pick_target_worker(&snapshot) {
        match registry.assign_to_worker(&worker_id, &task_id) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "scheduler failed to assign freshly submitted task"),
        }
    }
    events
}

/// Called once a worker transitions to `Idle` (after spawn, or after
/// finishing a task). Drains that worker's own backlog first; if it is
/// empty, pulls the oldest globally unassigned task. Emits nothing if no
/// task is available (the worker simply stays idle).
pub fn dispatch_to_idle_worker(registry: &TaskRegistry, worker_id: &WorkerId) -> Vec<Event> {
    let mut events = Vec::new();

    if let Some(task_id) = registry.worker_backlog_pop(worker_id) {
        if let Ok(Some(event)) = registry.assign_to_worker(worker_id, &task_id) {
            events.push(event);
        }
        return events;
    }

    if let Some(task_id) = registry.next_unassigned() {
        if let Ok(Some(event)) = registry.assign_to_worker(worker_id, &task_id) {
            events.push(event);
        }
    }
    events
}
