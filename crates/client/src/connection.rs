//! SPDX-License-Identifier: MIT
//!
//! Control-side connection manager: reconnect with exponential backoff,
//! in-order command emission, and event dispatch into the local mirror.
//! Built on the same `connect` + `tokio::select!` read-loop shape used for
//! the worker-side adapters elsewhere in this workspace, adapted from a
//! Unix-socket client to a TCP/`ws://` one, with a capped
//! exponential-backoff reconnect loop layered on top.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fleet_core::WorkerId;
use fleet_wire::{Command, Event};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ClientError;
use crate::mirror::Mirror;

const BASE_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Delay before the `attempt`-th reconnect try (0-indexed), per
/// `min(base*2^attempt, 30s)`.
fn backoff_delay(attempt: u32) -> Duration {
    let scaled = BASE_BACKOFF.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    scaled.min(MAX_BACKOFF)
}

pub struct Connection {
    url: String,
    max_attempts: u32,
    state: Mutex<ConnectionState>,
    mirror: Arc<Mutex<Mirror>>,
    subscribed: Mutex<HashSet<WorkerId>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    stopped: AtomicBool,
}

impl Connection {
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        Self::with_max_attempts(url, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(url: impl Into<String>, max_attempts: u32) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            max_attempts,
            state: Mutex::new(ConnectionState::Disconnected),
            mirror: Arc::new(Mutex::new(Mirror::new())),
            subscribed: Mutex::new(HashSet::new()),
            outbound: Mutex::new(None),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn mirror(&self) -> Arc<Mutex<Mirror>> {
        self.mirror.clone()
    }

    pub fn is_subscribed(&self, worker_id: &WorkerId) -> bool {
        self.subscribed.lock().contains(worker_id)
    }

    /// Drive the connect/read/reconnect loop until a clean `close()` or the
    /// reconnect attempt cap is exhausted.
    pub async fn run(self: &Arc<Self>) -> Result<(), ClientError> {
        let mut attempt = 0u32;
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Ok(());
            }
            *self.state.lock() = ConnectionState::Connecting;

            match tokio_tungstenite::connect_async(&self.url).await {
                Ok((stream, _response)) => {
                    attempt = 0;
                    *self.state.lock() = ConnectionState::Connected;
                    tracing::info!(url = %self.url, "connected");
                    self.run_session(stream).await;
                    if self.stopped.load(Ordering::SeqCst) {
                        *self.state.lock() = ConnectionState::Disconnected;
                        return Ok(());
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "connect failed");
                }
            }

            *self.state.lock() = ConnectionState::Disconnected;
            if attempt >= self.max_attempts {
                tracing::error!(attempts = attempt, "reconnect attempts exhausted");
                return Err(ClientError::ReconnectAttemptsExhausted { attempts: attempt });
            }
            let delay = backoff_delay(attempt);
            attempt += 1;
            tokio::time::sleep(delay).await;
        }
    }

    async fn run_session(
        self: &Arc<Self>,
        stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) {
        let (mut write, mut read) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(outbound_tx);

        loop {
            tokio::select! {
                outgoing = outbound_rx.recv() => {
                    match outgoing {
                        Some(msg) => {
                            if write.send(msg).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => self.on_text(&text),
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "read error");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        *self.outbound.lock() = None;
    }

    fn on_text(&self, text: &str) {
        let Ok(event) = serde_json::from_str::<Event>(text) else {
            tracing::debug!("failed to decode inbound event, ignoring");
            return;
        };
        if let Event::WorkerStopped { worker_id } = &event {
            self.subscribed.lock().remove(&WorkerId::new(worker_id.as_str()));
        }
        self.mirror.lock().apply(&event);
    }

    /// Send a command. Silently dropped unless currently connected; the
    /// caller is responsible for observing `state()`.
    pub fn send(&self, command: Command) {
        if let Command::SubscribeLogs { worker_id } = &command {
            self.subscribed.lock().insert(WorkerId::new(worker_id.as_str()));
        }
        if let Command::UnsubscribeLogs { worker_id } = &command {
            self.subscribed.lock().remove(&WorkerId::new(worker_id.as_str()));
        }

        let Ok(text) = serde_json::to_string(&command) else {
            return;
        };
        if let Some(outbound) = self.outbound.lock().as_ref() {
            let _ = outbound.send(Message::Text(text.into()));
        }
    }

    /// Initiate a clean, caller-requested close. `run()` will not reconnect
    /// after this.
    pub fn close(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(outbound) = self.outbound.lock().as_ref() {
            let _ = outbound.send(Message::Close(None));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        first = { 0, Duration::from_secs(1) },
        second = { 1, Duration::from_secs(2) },
        third = { 2, Duration::from_secs(4) },
        caps_at_30s = { 10, Duration::from_secs(30) },
    )]
    fn backoff_matches_capped_exponential_formula(attempt: u32, expected: Duration) {
        assert_eq!(backoff_delay(attempt), expected);
    }

    #[test]
    fn new_connection_starts_disconnected() {
        let conn = Connection::new("ws://127.0.0.1:1/fleet");
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn subscribe_updates_local_set_even_while_disconnected() {
        let conn = Connection::new("ws://127.0.0.1:1/fleet");
        conn.send(Command::SubscribeLogs { worker_id: "w1".into() });
        assert!(conn.is_subscribed(&WorkerId::new("w1")));
        conn.send(Command::UnsubscribeLogs { worker_id: "w1".into() });
        assert!(!conn.is_subscribed(&WorkerId::new("w1")));
    }

    #[test]
    fn worker_stopped_clears_its_subscription() {
        let conn = Connection::new("ws://127.0.0.1:1/fleet");
        conn.send(Command::SubscribeLogs { worker_id: "w1".into() });
        assert!(conn.is_subscribed(&WorkerId::new("w1")));
        conn.on_text(&serde_json::to_string(&Event::WorkerStopped { worker_id: "w1".into() }).unwrap());
        assert!(!conn.is_subscribed(&WorkerId::new("w1")));
    }
}
