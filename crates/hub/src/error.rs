//! SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("failed to bind fan-out listener on {addr}: {source}")]
    Bind { addr: std::net::SocketAddr, #[source] source: std::io::Error },

    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] tokio_tungstenite::tungstenite::Error),
}
