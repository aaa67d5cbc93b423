//! Commands sent from control clients to the supervisor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "spawn")]
    Spawn {
        #[serde(rename = "serverId")]
        server_id: String,
        #[serde(default, rename = "serverName")]
        server_name: Option<String>,
        #[serde(default)]
        command: Option<String>,
        #[serde(default)]
        argv: Vec<String>,
    },

    #[serde(rename = "kill")]
    Kill {
        #[serde(rename = "workerId")]
        worker_id: String,
    },

    #[serde(rename = "submit")]
    Submit { tool: String, params: Value },

    #[serde(rename = "cancel")]
    Cancel {
        #[serde(rename = "taskId")]
        task_id: String,
    },

    #[serde(rename = "subscribe:logs")]
    SubscribeLogs {
        #[serde(rename = "workerId")]
        worker_id: String,
    },

    #[serde(rename = "unsubscribe:logs")]
    UnsubscribeLogs {
        #[serde(rename = "workerId")]
        worker_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_round_trips_through_json() {
        let cmd = Command::Spawn {
            server_id: "S".into(),
            server_name: Some("demo".into()),
            command: Some("/bin/echo-srv".into()),
            argv: vec!["--flag".into()],
        };
        let json = serde_json::to_string(&cmd).expect("serialize");
        assert!(json.contains("\"type\":\"spawn\""));
        let back: Command = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(cmd, back);
    }

    #[test]
    fn subscribe_logs_tag_uses_colon_form() {
        let cmd = Command::SubscribeLogs { worker_id: "w1".into() };
        let json = serde_json::to_string(&cmd).expect("serialize");
        assert!(json.contains("\"type\":\"subscribe:logs\""));
    }

    #[test]
    fn spawn_without_command_resolves_via_registry() {
        let json = r#"{"type":"spawn","serverId":"S"}"#;
        let cmd: Command = serde_json::from_str(json).expect("deserialize");
        assert_eq!(cmd, Command::Spawn {
            server_id: "S".into(),
            server_name: None,
            command: None,
            argv: Vec::new(),
        });
    }
}
