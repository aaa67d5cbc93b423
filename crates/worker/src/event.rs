//! SPDX-License-Identifier: MIT
//!
//! Internal signals a `WorkerRuntime` reports to its owner. Deliberately
//! decoupled from `fleet_wire::Event`: the runtime knows nothing about
//! clients, registries, or fan-out, only about one child process.

use fleet_core::{LogLevel, TaskId};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(Value),
    Failure(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// The child process was spawned successfully by the OS.
    Spawned,

    TaskProgress { task_id: TaskId, progress: u8 },

    TaskResponse { task_id: TaskId, outcome: TaskOutcome },

    /// A stdout line did not parse as JSON, or parsed but could not be
    /// attributed to an in-flight task.
    MalformedStdout { raw: String },

    LogLine { level: LogLevel, message: String },

    /// The child process has exited and both of its stdout and stderr
    /// streams have been observed closed. `expected` is `true` iff
    /// `request_stop` was called before the exit was observed.
    Terminated { expected: bool, exit_detail: String },
}
