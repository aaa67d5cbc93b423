//! SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerRuntimeError {
    #[error("failed to spawn worker process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("child process exposed no stdin pipe")]
    MissingStdin,

    #[error("child process exposed no stdout pipe")]
    MissingStdout,

    #[error("child process exposed no stderr pipe")]
    MissingStderr,

    #[error("write to worker stdin failed: {0}")]
    StdinWrite(#[source] std::io::Error),
}
