// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fleet-hub: the fan-out of events to control clients over WebSocket.

mod error;
mod hub;
mod transport;

pub use error::HubError;
pub use hub::Hub;
pub use transport::{serve, DEFAULT_HEARTBEAT_INTERVAL};
