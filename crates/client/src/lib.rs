// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fleet-client: the control-side connection manager — reconnect with
//! exponential backoff, in-order command emission, and a local read-only
//! mirror of supervisor state.

mod connection;
mod error;
mod mirror;

pub use connection::{Connection, ConnectionState};
pub use error::ClientError;
pub use mirror::Mirror;
