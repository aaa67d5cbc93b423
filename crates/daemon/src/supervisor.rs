//! SPDX-License-Identifier: MIT
//!
//! The composition root: wires the task registry, worker runtimes, and
//! fan-out hub together and translates between them. One long-lived struct
//! holding `Arc<Mutex<..>>` shared state plus adapter handles, the same
//! shape used for runtime composition roots elsewhere in this workspace.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fleet_core::{Clock, LogEntry, SystemClock, TaskId, WorkerId};
use fleet_hub::Hub;
use fleet_registry::TaskRegistry;
use fleet_wire::{Command, Event};
use fleet_worker::{TaskOutcome, WorkerEvent, WorkerHandle};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::FleetConfig;

pub struct Supervisor {
    config: FleetConfig,
    clock: Arc<dyn Clock>,
    registry: Arc<TaskRegistry>,
    hub: Arc<Hub>,
    workers: Mutex<HashMap<WorkerId, WorkerHandle>>,
    next_worker_seq: AtomicU64,
    next_task_seq: AtomicU64,
    next_log_seq: AtomicU64,
}

impl Supervisor {
    pub fn new(config: FleetConfig) -> Arc<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Arc::new(Self {
            registry: Arc::new(TaskRegistry::new(clock.clone())),
            hub: Arc::new(Hub::new()),
            clock,
            config,
            workers: Mutex::new(HashMap::new()),
            next_worker_seq: AtomicU64::new(1),
            next_task_seq: AtomicU64::new(1),
            next_log_seq: AtomicU64::new(1),
        })
    }

    /// Run the supervisor until `shutdown()` is called from another task or
    /// the process receives a termination signal. Binds the fan-out hub
    /// and processes inbound client commands until the command channel
    /// closes.
    pub async fn run(self: &Arc<Self>) -> Result<(), fleet_hub::HubError> {
        let (command_tx, mut command_rx) = mpsc::channel(256);
        let addr = ([0, 0, 0, 0], self.config.port).into();
        let hub = self.hub.clone();
        let heartbeat_interval = self.config.heartbeat_interval;
        tracing::info!(port = self.config.port, path = %self.config.path, "fleet supervisor starting");

        let serve = tokio::spawn(fleet_hub::serve(addr, hub, command_tx, heartbeat_interval));

        while let Some((client_id, command)) = command_rx.recv().await {
            let me = self.clone();
            tokio::spawn(async move {
                me.handle_command(client_id, command).await;
            });
        }

        match serve.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "hub accept loop task panicked");
                Ok(())
            }
        }
    }

    async fn handle_command(self: &Arc<Self>, client_id: fleet_core::ClientId, command: Command) {
        match command {
            Command::Spawn { server_id, server_name, command, argv } => {
                self.handle_spawn(client_id, server_id, server_name, command, argv).await;
            }
            Command::Kill { worker_id } => {
                self.handle_kill(&WorkerId::new(worker_id));
            }
            Command::Submit { tool, params } => {
                let task_id = self.next_task_id();
                let events = fleet_registry::submit_task(&self.registry, task_id, tool, params);
                for event in &events {
                    self.hub.broadcast(event);
                }
            }
            Command::Cancel { task_id } => {
                let task_id = TaskId::new(task_id);
                let freed_worker = self.registry.task(&task_id).and_then(|t| t.worker_id);
                for event in self.registry.cancel(&task_id) {
                    self.hub.broadcast(&event);
                }
                if let Some(worker_id) = freed_worker {
                    if matches!(self.registry.worker(&worker_id).map(|w| w.state), Some(fleet_core::WorkerState::Idle)) {
                        for event in fleet_registry::dispatch_to_idle_worker(&self.registry, &worker_id) {
                            self.hub.broadcast(&event);
                        }
                    }
                }
            }
            Command::SubscribeLogs { .. } | Command::UnsubscribeLogs { .. } => {
                tracing::debug!("subscription commands are handled by the hub directly");
            }
        }
    }

    async fn handle_spawn(
        self: &Arc<Self>,
        client_id: fleet_core::ClientId,
        server_id: String,
        server_name: Option<String>,
        command_override: Option<String>,
        argv_override: Vec<String>,
    ) {
        let resolved = match command_override {
            Some(command) => Some((server_name.unwrap_or_else(|| server_id.clone()), command, argv_override)),
            None => match &self.config.server_registry {
                Some(registry) => registry
                    .resolve(&server_id)
                    .await
                    .map(|spec| (spec.name, spec.command, spec.argv)),
                None => None,
            },
        };

        let Some((name, command, argv)) = resolved else {
            self.hub.send_to(
                &client_id,
                &Event::command_error(format!("no config found for serverId={server_id}")),
            );
            return;
        };

        let worker_id = self.next_worker_id();
        let started_event = self.registry.create_worker(worker_id.clone(), server_id, name);
        self.hub.broadcast(&started_event);

        match fleet_worker::spawn(&command, &argv, &[]).await {
            Ok((handle, events)) => {
                self.registry.worker_pid_known(&worker_id, handle.pid());
                self.workers.lock().insert(worker_id.clone(), handle);
                let me = self.clone();
                tokio::spawn(async move {
                    me.run_worker_event_loop(worker_id, events).await;
                });
            }
            Err(e) => {
                if let Ok(event) = self.registry.worker_errored(&worker_id) {
                    self.hub.broadcast(&event);
                }
                for event in self.registry.worker_terminated(&worker_id, &e.to_string()) {
                    self.hub.broadcast(&event);
                }
            }
        }
    }

    fn handle_kill(&self, worker_id: &WorkerId) {
        let handle = self.workers.lock().get(worker_id).cloned();
        match handle {
            Some(handle) => {
                if let Ok(event) = self.registry.worker_stopping(worker_id) {
                    self.hub.broadcast(&event);
                }
                handle.request_stop(self.config.kill_timeout);
            }
            None => tracing::debug!(%worker_id, "kill requested for unknown worker"),
        }
    }

    async fn run_worker_event_loop(
        self: Arc<Self>,
        worker_id: WorkerId,
        mut events: mpsc::Receiver<WorkerEvent>,
    ) {
        while let Some(event) = events.recv().await {
            self.handle_worker_event(&worker_id, event).await;
        }
    }

    async fn handle_worker_event(&self, worker_id: &WorkerId, event: WorkerEvent) {
        match event {
            WorkerEvent::Spawned => {
                if let Ok(event) = self.registry.worker_ready(worker_id) {
                    self.hub.broadcast(&event);
                }
                for event in fleet_registry::dispatch_to_idle_worker(&self.registry, worker_id) {
                    self.hub.broadcast(&event);
                }
            }
            WorkerEvent::TaskProgress { task_id, progress } => {
                match self.registry.task_progress(&task_id, progress) {
                    Ok(event) => self.hub.broadcast(&event),
                    Err(_) => tracing::debug!(%task_id, "dropping progress for a task no longer running"),
                }
            }
            WorkerEvent::TaskResponse { task_id, outcome } => {
                let outcome = match outcome {
                    TaskOutcome::Success(value) => Ok(value),
                    TaskOutcome::Failure(message) => Err(message),
                };
                match self.registry.finish_task(&task_id, outcome) {
                    Ok(events) => {
                        for event in events {
                            self.hub.broadcast(&event);
                        }
                        for event in fleet_registry::dispatch_to_idle_worker(&self.registry, worker_id) {
                            self.hub.broadcast(&event);
                        }
                    }
                    Err(_) => {
                        tracing::debug!(%task_id, "dropping response for a task no longer running (likely cancelled)");
                    }
                }
            }
            WorkerEvent::MalformedStdout { raw } => {
                tracing::warn!(%worker_id, raw, "worker emitted a line that could not be attributed");
            }
            WorkerEvent::LogLine { level, message } => {
                let entry = LogEntry {
                    id: self.next_log_seq.fetch_add(1, Ordering::Relaxed),
                    worker_id: worker_id.clone(),
                    timestamp_ms: self.clock.now_ms(),
                    level,
                    message,
                    metadata: None,
                };
                self.hub.dispatch(&Event::LogEntry { entry });
            }
            WorkerEvent::Terminated { expected, exit_detail } => {
                let reason = if expected {
                    "worker stopped".to_string()
                } else {
                    format!("worker process exited unexpectedly: {exit_detail}")
                };
                for event in self.registry.worker_terminated(worker_id, &reason) {
                    self.hub.broadcast(&event);
                }
                self.workers.lock().remove(worker_id);
            }
        }
    }

    fn next_worker_id(&self) -> WorkerId {
        WorkerId::new(format!("worker-{}", self.next_worker_seq.fetch_add(1, Ordering::Relaxed)))
    }

    fn next_task_id(&self) -> TaskId {
        TaskId::new(format!("task-{}", self.next_task_seq.fetch_add(1, Ordering::Relaxed)))
    }

    /// Request every live worker stop, wait up to `shutdown_timeout` for
    /// them to report `terminated`, then close the hub with code 1001.
    pub async fn shutdown(&self) {
        let handles: Vec<WorkerHandle> = self.workers.lock().values().cloned().collect();
        for handle in &handles {
            handle.request_stop(self.config.kill_timeout);
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        while !self.workers.lock().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        if !self.workers.lock().is_empty() {
            tracing::warn!("shutdown timeout elapsed with workers still unterminated");
        }

        self.hub.close_all(1001, "Server shutting down");
    }
}
