// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fleet-daemon: the `fleetd` composition root binding the task registry,
//! worker runtimes, and fan-out hub together.

mod config;
mod env;
mod server_registry;
mod supervisor;

pub use config::FleetConfig;
pub use server_registry::{ServerRegistry, ServerSpec, StaticServerRegistry};
pub use supervisor::Supervisor;
