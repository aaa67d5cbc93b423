// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fleet-core: shared domain types for the fleet supervisor.
//!
//! Ids, entity state, and the clock abstraction live here so that
//! `fleet-wire`, `fleet-worker`, `fleet-registry`, `fleet-hub`,
//! `fleet-daemon` and `fleet-client` all agree on one vocabulary.

pub mod clock;
pub mod ids;
pub mod log_entry;
pub mod task;
pub mod worker;

pub use clock::{Clock, FakeClock, SystemClock};
pub use ids::{ClientId, TaskId, WorkerId};
pub use log_entry::{LogEntry, LogLevel};
pub use task::{Task, TaskState};
pub use worker::{Worker, WorkerMetrics, WorkerState};
