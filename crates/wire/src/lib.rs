// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fleet-wire: the tagged-union wire schema and line framing used between
//! the supervisor, its child workers, and control clients.

mod command;
mod decode;
mod event;
mod framer;

pub use command::Command;
pub use decode::decode_command;
pub use event::{Event, WorkerChanges};
pub use framer::LineFramer;
