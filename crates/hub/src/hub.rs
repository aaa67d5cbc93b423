//! SPDX-License-Identifier: MIT
//!
//! Fan-out of `fleet_wire::Event`s to connected control clients. Uses the
//! same accept-loop-per-connection shape as elsewhere in this workspace,
//! built on a `tokio-tungstenite` WebSocket server rather than raw
//! Unix/TCP sockets.

use std::collections::{HashMap, HashSet};

use fleet_core::{ClientId, WorkerId};
use fleet_wire::{Command, Event};
use parking_lot::Mutex;
use tokio_tungstenite::tungstenite::Message;

struct Session {
    outbound: tokio::sync::mpsc::UnboundedSender<Message>,
    subscriptions: HashSet<WorkerId>,
}

/// Registry of connected control clients and the event fan-out rule
/// between them: every event broadcasts to all clients except `log:entry`,
/// which only reaches clients subscribed to that worker's logs.
#[derive(Default)]
pub struct Hub {
    sessions: Mutex<HashMap<ClientId, Session>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, id: ClientId, outbound: tokio::sync::mpsc::UnboundedSender<Message>) {
        self.sessions.lock().insert(id, Session { outbound, subscriptions: HashSet::new() });
    }

    pub(crate) fn remove(&self, id: &ClientId) {
        self.sessions.lock().remove(id);
    }

    pub fn client_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Route one event to the clients that should see it.
    pub fn dispatch(&self, event: &Event) {
        if event.is_log_entry() {
            if let Some(worker_id) = event.worker_id() {
                self.send_to_log_subscribers(event, worker_id);
            }
            return;
        }
        self.broadcast(event);
    }

    pub fn broadcast(&self, event: &Event) {
        let Ok(text) = serde_json::to_string(event) else {
            tracing::error!("failed to serialize event for broadcast");
            return;
        };
        let sessions = self.sessions.lock();
        for session in sessions.values() {
            let _ = session.outbound.send(Message::Text(text.clone().into()));
        }
    }

    fn send_to_log_subscribers(&self, event: &Event, worker_id: &str) {
        let Ok(text) = serde_json::to_string(event) else {
            tracing::error!("failed to serialize log event");
            return;
        };
        let target = WorkerId::new(worker_id);
        let sessions = self.sessions.lock();
        for session in sessions.values() {
            if session.subscriptions.contains(&target) {
                let _ = session.outbound.send(Message::Text(text.clone().into()));
            }
        }
    }

    /// Send a single event to one client only (e.g. a command-error
    /// response scoped to the originating client).
    pub fn send_to(&self, client_id: &ClientId, event: &Event) {
        let Ok(text) = serde_json::to_string(event) else {
            return;
        };
        if let Some(session) = self.sessions.lock().get(client_id) {
            let _ = session.outbound.send(Message::Text(text.into()));
        }
    }

    /// Send a close frame to every connected client (code 1001 is used on
    /// supervisor shutdown).
    pub fn close_all(&self, code: u16, reason: &str) {
        use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
        use tokio_tungstenite::tungstenite::protocol::CloseFrame;

        let frame = CloseFrame { code: CloseCode::from(code), reason: reason.to_string().into() };
        let sessions = self.sessions.lock();
        for session in sessions.values() {
            let _ = session.outbound.send(Message::Close(Some(frame.clone())));
        }
    }

    pub(crate) fn send_ping(&self, client_id: &ClientId) {
        if let Some(session) = self.sessions.lock().get(client_id) {
            let _ = session.outbound.send(Message::Ping(Vec::new().into()));
        }
    }

    /// Decode an inbound client text frame. Subscribe/unsubscribe commands
    /// are fully handled here and return `None`; every other command is
    /// returned for the supervisor to act on.
    pub fn on_client_message(&self, client_id: &ClientId, raw: &str) -> Option<Command> {
        let command = fleet_wire::decode_command(raw)?;
        match command {
            Command::SubscribeLogs { worker_id } => {
                if let Some(session) = self.sessions.lock().get_mut(client_id) {
                    session.subscriptions.insert(WorkerId::new(worker_id));
                }
                None
            }
            Command::UnsubscribeLogs { worker_id } => {
                if let Some(session) = self.sessions.lock().get_mut(client_id) {
                    session.subscriptions.remove(&WorkerId::new(worker_id));
                }
                None
            }
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{LogEntry, LogLevel};
    use serde_json::json;

    fn register(hub: &Hub, id: &str) -> tokio::sync::mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        hub.register(ClientId::new(id), tx);
        rx
    }

    #[test]
    fn broadcast_reaches_all_clients() {
        let hub = Hub::new();
        let mut a = register(&hub, "a");
        let mut b = register(&hub, "b");

        hub.dispatch(&Event::WorkerStopped { worker_id: "w1".into() });

        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
    }

    #[test]
    fn log_entry_only_reaches_subscribers() {
        let hub = Hub::new();
        let mut subscribed = register(&hub, "sub");
        let mut not_subscribed = register(&hub, "nosub");

        hub.on_client_message(&ClientId::new("sub"), r#"{"type":"subscribe:logs","workerId":"w1"}"#);

        let entry = LogEntry {
            id: 1,
            worker_id: fleet_core::WorkerId::new("w1"),
            timestamp_ms: 0,
            level: LogLevel::Info,
            message: "hello".into(),
            metadata: None,
        };
        hub.dispatch(&Event::LogEntry { entry });

        assert!(subscribed.try_recv().is_ok());
        assert!(not_subscribed.try_recv().is_err());
    }

    #[test]
    fn subscribe_command_is_fully_handled_and_not_returned() {
        let hub = Hub::new();
        register(&hub, "a");
        let result =
            hub.on_client_message(&ClientId::new("a"), r#"{"type":"subscribe:logs","workerId":"w1"}"#);
        assert!(result.is_none());
    }

    #[test]
    fn other_commands_pass_through_to_caller() {
        let hub = Hub::new();
        register(&hub, "a");
        let result = hub.on_client_message(
            &ClientId::new("a"),
            &json!({"type": "submit", "tool": "echo", "params": {}}).to_string(),
        );
        assert!(matches!(result, Some(Command::Submit { .. })));
    }
}
