//! SPDX-License-Identifier: MIT
//!
//! Process supervision for a single worker child. A `WorkerRuntime` owns
//! nothing but the child process, its stdin sink, and the background tasks
//! reading its output: it holds no worker- or task-state fields of its own,
//! those belong exclusively to the task registry. It reports what it
//! observes as `WorkerEvent`s and leaves interpreting them as lifecycle
//! transitions to its owner.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fleet_core::{LogLevel, TaskId};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::error::WorkerRuntimeError;
use crate::event::{TaskOutcome, WorkerEvent};
use crate::rpc::{as_progress, extract_outcome, RpcRequest};

const READ_CHUNK_SIZE: usize = 4096;

/// Handle to a running worker child. Cloning shares the same process.
#[derive(Clone)]
pub struct WorkerHandle {
    pid: u32,
    stdin: Arc<AsyncMutex<ChildStdin>>,
    current_task: Arc<Mutex<Option<TaskId>>>,
    stopping: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
}

impl WorkerHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Send a task request to the child's stdin as one JSON-RPC line.
    /// `task_id` becomes both the RPC `id` and the implicit owner of any
    /// progress frames the child emits before its terminal response,
    /// since a worker runs at most one task at a time.
    pub async fn send(
        &self,
        task_id: &TaskId,
        tool: &str,
        params: &Value,
    ) -> Result<(), WorkerRuntimeError> {
        *self.current_task.lock() = Some(task_id.clone());
        let request = RpcRequest::new(task_id.as_str(), tool, params);
        let line = request.to_line();

        let mut guard = self.stdin.lock().await;
        let write_result = guard.write_all(line.as_bytes()).await;
        drop(guard);
        if let Err(e) = write_result {
            *self.current_task.lock() = None;
            return Err(WorkerRuntimeError::StdinWrite(e));
        }
        Ok(())
    }

    /// Request the worker stop: send SIGTERM immediately, then SIGKILL if
    /// the process has not exited within `kill_timeout`. Idempotent: a
    /// second call is a no-op.
    pub fn request_stop(&self, kill_timeout: Duration) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        send_signal(self.pid, Signal::SIGTERM);

        let exited = self.exited.clone();
        let pid = self.pid;
        tokio::spawn(async move {
            tokio::time::sleep(kill_timeout).await;
            if !exited.load(Ordering::SeqCst) {
                send_signal(pid, Signal::SIGKILL);
            }
        });
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

fn send_signal(pid: u32, sig: Signal) {
    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), sig) {
        tracing::warn!(pid, signal = ?sig, error = %e, "failed to signal worker process");
    }
}

/// Spawn a worker child with the given command and argv, wiring up piped
/// stdio. Returns a handle for sending tasks / requesting stop, and a
/// receiver for the runtime's event stream. The receiver yields
/// `WorkerEvent::Spawned` first, then progress/response/log events as they
/// arrive, then exactly one `WorkerEvent::Terminated` before closing.
pub async fn spawn(
    command: &str,
    argv: &[String],
    env: &[(String, String)],
) -> Result<(WorkerHandle, mpsc::Receiver<WorkerEvent>), WorkerRuntimeError> {
    let mut cmd = Command::new(command);
    cmd.args(argv)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(WorkerRuntimeError::Spawn)?;
    let pid = child.id().unwrap_or_default();

    let stdin = child.stdin.take().ok_or(WorkerRuntimeError::MissingStdin)?;
    let stdout = child.stdout.take().ok_or(WorkerRuntimeError::MissingStdout)?;
    let stderr = child.stderr.take().ok_or(WorkerRuntimeError::MissingStderr)?;

    let (event_tx, event_rx) = mpsc::channel(256);
    let current_task = Arc::new(Mutex::new(None));
    let stopping = Arc::new(AtomicBool::new(false));
    let exited = Arc::new(AtomicBool::new(false));

    let handle = WorkerHandle {
        pid,
        stdin: Arc::new(AsyncMutex::new(stdin)),
        current_task: current_task.clone(),
        stopping: stopping.clone(),
        exited: exited.clone(),
    };

    let _ = event_tx.send(WorkerEvent::Spawned).await;

    let (stdout_done_tx, stdout_done_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(read_stdout(stdout, event_tx.clone(), current_task.clone(), stdout_done_tx));

    let (stderr_done_tx, stderr_done_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(read_stderr(stderr, event_tx.clone(), stderr_done_tx));

    tokio::spawn(async move {
        let wait_result = child.wait().await;
        exited.store(true, Ordering::SeqCst);

        let _ = stdout_done_rx.await;
        let _ = stderr_done_rx.await;

        let exit_detail = match wait_result {
            Ok(status) => status.to_string(),
            Err(e) => format!("failed to wait on worker process: {e}"),
        };
        let _ = event_tx
            .send(WorkerEvent::Terminated { expected: stopping.load(Ordering::SeqCst), exit_detail })
            .await;
    });

    Ok((handle, event_rx))
}

async fn read_stdout(
    mut stdout: tokio::process::ChildStdout,
    event_tx: mpsc::Sender<WorkerEvent>,
    current_task: Arc<Mutex<Option<TaskId>>>,
    done: tokio::sync::oneshot::Sender<()>,
) {
    let mut framer = fleet_wire::LineFramer::new();
    let mut buf = [0u8; READ_CHUNK_SIZE];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in framer.feed(&buf[..n]) {
                    handle_stdout_line(&line, &event_tx, &current_task).await;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "error reading worker stdout");
                break;
            }
        }
    }
    if let Some(line) = framer.finish() {
        handle_stdout_line(&line, &event_tx, &current_task).await;
    }
    let _ = done.send(());
}

async fn handle_stdout_line(
    line: &str,
    event_tx: &mpsc::Sender<WorkerEvent>,
    current_task: &Arc<Mutex<Option<TaskId>>>,
) {
    let parsed: Result<Value, _> = serde_json::from_str(line);
    let value = match parsed {
        Ok(v) => v,
        Err(_) => {
            let _ = event_tx.send(WorkerEvent::MalformedStdout { raw: line.to_string() }).await;
            return;
        }
    };

    if let Some(progress) = as_progress(&value) {
        let task_id = current_task.lock().clone();
        match task_id {
            Some(task_id) => {
                let _ = event_tx.send(WorkerEvent::TaskProgress { task_id, progress }).await;
            }
            None => {
                let _ = event_tx.send(WorkerEvent::MalformedStdout { raw: line.to_string() }).await;
            }
        }
        return;
    }

    let task_id = current_task.lock().take();
    match task_id {
        Some(task_id) => {
            let outcome = extract_outcome(&value);
            let _ = event_tx.send(WorkerEvent::TaskResponse { task_id, outcome }).await;
        }
        None => {
            let _ = event_tx.send(WorkerEvent::MalformedStdout { raw: line.to_string() }).await;
        }
    }
}

async fn read_stderr(
    mut stderr: tokio::process::ChildStderr,
    event_tx: mpsc::Sender<WorkerEvent>,
    done: tokio::sync::oneshot::Sender<()>,
) {
    let mut framer = fleet_wire::LineFramer::new();
    let mut buf = [0u8; READ_CHUNK_SIZE];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in framer.feed(&buf[..n]) {
                    emit_log_line(&line, &event_tx).await;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "error reading worker stderr");
                break;
            }
        }
    }
    if let Some(line) = framer.finish() {
        emit_log_line(&line, &event_tx).await;
    }
    let _ = done.send(());
}

async fn emit_log_line(line: &str, event_tx: &mpsc::Sender<WorkerEvent>) {
    let level = LogLevel::classify(line);
    let _ = event_tx.send(WorkerEvent::LogLine { level, message: line.to_string() }).await;
}
