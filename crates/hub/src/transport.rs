//! SPDX-License-Identifier: MIT
//!
//! WebSocket accept loop for the fan-out hub: one task per accepted
//! connection, raced against client disconnect, built on
//! `tokio_tungstenite::accept_async` over a `TcpListener` with a liveness
//! ping/pong tick as the only path that removes a stale client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fleet_core::ClientId;
use fleet_wire::Command;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::HubError;
use crate::hub::Hub;

/// Default interval between liveness pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// A client that hasn't ponged since the previous ping is considered gone:
/// one missed reply is enough, no extra grace interval.
fn is_stale(elapsed_since_pong: Duration, heartbeat_interval: Duration) -> bool {
    elapsed_since_pong > heartbeat_interval
}

/// Accept WebSocket connections on `addr` until the process is told to
/// stop. Commands decoded from clients (other than subscribe/unsubscribe,
/// which the hub handles internally) are forwarded on `command_tx` tagged
/// with their originating client.
pub async fn serve(
    addr: SocketAddr,
    hub: Arc<Hub>,
    command_tx: mpsc::Sender<(ClientId, Command)>,
    heartbeat_interval: Duration,
) -> Result<(), HubError> {
    let listener =
        TcpListener::bind(addr).await.map_err(|source| HubError::Bind { addr, source })?;
    tracing::info!(%addr, "fan-out hub listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "hub accept error");
                continue;
            }
        };
        let hub = hub.clone();
        let command_tx = command_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, peer, hub, command_tx, heartbeat_interval).await {
                tracing::debug!(error = %e, %peer, "hub client connection ended");
            }
        });
    }
}

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    hub: Arc<Hub>,
    command_tx: mpsc::Sender<(ClientId, Command)>,
    heartbeat_interval: Duration,
) -> Result<(), HubError> {
    let ws = tokio_tungstenite::accept_async(stream).await.map_err(HubError::Handshake)?;
    let client_id = ClientId::new(uuid::Uuid::new_v4().to_string());
    tracing::info!(%peer, client_id = %client_id, "client connected");

    let (mut write, mut read) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    hub.register(client_id.clone(), outbound_tx);

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if write.send(msg).await.is_err() {
                break;
            }
        }
    });

    let last_pong = Mutex::new(Instant::now());
    let mut ticker = tokio::time::interval(heartbeat_interval);
    ticker.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if is_stale(last_pong.lock().elapsed(), heartbeat_interval) {
                    tracing::info!(client_id = %client_id, "client missed its liveness pong, closing");
                    break;
                }
                hub.send_ping(&client_id);
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(command) = hub.on_client_message(&client_id, &text) {
                            let _ = command_tx.send((client_id.clone(), command)).await;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        *last_pong.lock() = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(client_id = %client_id, error = %e, "client read error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    hub.remove(&client_id);
    writer.abort();
    Ok(())
}
