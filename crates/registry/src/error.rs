//! SPDX-License-Identifier: MIT

use fleet_core::{TaskId, WorkerId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown worker: {0}")]
    UnknownWorker(WorkerId),

    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("worker {0} is not schedulable")]
    WorkerNotSchedulable(WorkerId),

    #[error("task {0} is not running")]
    TaskNotRunning(TaskId),
}
