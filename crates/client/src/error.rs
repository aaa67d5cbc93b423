//! SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectAttemptsExhausted { attempts: u32 },
}
