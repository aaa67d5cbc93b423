// SPDX-License-Identifier: MIT
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! End-to-end scenarios run against a real `fleetd` supervisor over a real
//! TCP/WebSocket loopback connection, one test per named scenario.

use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::time::Duration;

use fleet_core::{TaskId, TaskState, WorkerId, WorkerState};
use fleet_daemon::{FleetConfig, ServerSpec, StaticServerRegistry, Supervisor};
use fleet_wire::Command;
use serde_json::json;

fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

fn config_with_server(port: u16, command: &str, argv: &[&str]) -> FleetConfig {
    let registry = StaticServerRegistry::new([(
        "S".to_string(),
        ServerSpec {
            name: "demo".into(),
            command: command.into(),
            argv: argv.iter().map(|s| s.to_string()).collect(),
        },
    )]);
    FleetConfig {
        port,
        path: "/fleet".into(),
        heartbeat_interval: Duration::from_secs(30),
        kill_timeout: Duration::from_secs(5),
        shutdown_timeout: Duration::from_secs(10),
        server_registry: Some(Arc::new(registry)),
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F, max: Duration) {
    tokio::time::timeout(max, async {
        loop {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition was not met within the timeout")
}

async fn connected_client(port: u16) -> Arc<fleet_client::Connection> {
    let conn = fleet_client::Connection::new(format!("ws://127.0.0.1:{port}/fleet"));
    let handle = conn.clone();
    tokio::spawn(async move {
        let _ = handle.run().await;
    });
    wait_for(
        || conn.state() == fleet_client::ConnectionState::Connected,
        Duration::from_secs(5),
    )
    .await;
    conn
}

#[tokio::test]
async fn happy_path_spawn_submit_complete() {
    let port = free_port();
    let supervisor = Supervisor::new(config_with_server(
        port,
        "sh",
        &["-c", "read line; printf '{\"result\":\"pong\"}\\n'"],
    ));
    let sup = supervisor.clone();
    tokio::spawn(async move {
        let _ = sup.run().await;
    });

    let client = connected_client(port).await;
    client.send(Command::Spawn {
        server_id: "S".into(),
        server_name: None,
        command: None,
        argv: vec![],
    });

    let worker_id = WorkerId::new("worker-1");
    wait_for(
        || {
            let mirror = client.mirror();
            let mirror = mirror.lock();
            mirror.worker(&worker_id).map(|w| w.state) == Some(WorkerState::Idle)
        },
        Duration::from_secs(5),
    )
    .await;

    client.send(Command::Submit { tool: "ping".into(), params: json!({}) });

    let task_id = TaskId::new("task-1");
    wait_for(
        || {
            let mirror = client.mirror();
            let mirror = mirror.lock();
            mirror.task(&task_id).map(|t| t.state) == Some(TaskState::Completed)
        },
        Duration::from_secs(5),
    )
    .await;

    let mirror = client.mirror();
    let mirror = mirror.lock();
    let task = mirror.task(&task_id).expect("task mirrored");
    assert_eq!(task.result, Some(json!("pong")));
    let worker = mirror.worker(&worker_id).expect("worker mirrored");
    assert_eq!(worker.state, WorkerState::Idle);
    assert_eq!(worker.metrics.tasks_completed, 1);
}

#[tokio::test]
async fn progress_then_cancel_suppresses_the_late_response() {
    let port = free_port();
    let supervisor = Supervisor::new(config_with_server(
        port,
        "sh",
        &["-c", "printf '{\"progress\":30}\\n'; sleep 0.2; read line; printf '{\"result\":\"done\"}\\n'"],
    ));
    let sup = supervisor.clone();
    tokio::spawn(async move {
        let _ = sup.run().await;
    });

    let client = connected_client(port).await;
    client.send(Command::Spawn {
        server_id: "S".into(),
        server_name: None,
        command: None,
        argv: vec![],
    });

    let worker_id = WorkerId::new("worker-1");
    wait_for(
        || {
            let mirror = client.mirror();
            let mirror = mirror.lock();
            mirror.worker(&worker_id).map(|w| w.state) == Some(WorkerState::Idle)
        },
        Duration::from_secs(5),
    )
    .await;

    client.send(Command::Submit { tool: "echo".into(), params: json!({}) });
    let task_id = TaskId::new("task-1");

    wait_for(
        || {
            let mirror = client.mirror();
            let mirror = mirror.lock();
            mirror.task(&task_id).and_then(|t| t.progress) == Some(30)
        },
        Duration::from_secs(5),
    )
    .await;

    client.send(Command::Cancel { task_id: "task-1".into() });

    wait_for(
        || {
            let mirror = client.mirror();
            let mirror = mirror.lock();
            mirror.task(&task_id).map(|t| t.state) == Some(TaskState::Failed)
                && mirror.worker(&worker_id).map(|w| w.state) == Some(WorkerState::Idle)
        },
        Duration::from_secs(5),
    )
    .await;

    // The child's eventual `{"result":"done"}` line must not resurrect the
    // cancelled task or disturb the worker's state.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let mirror = client.mirror();
    let mirror = mirror.lock();
    let task = mirror.task(&task_id).expect("task mirrored");
    assert_eq!(task.state, TaskState::Failed);
    assert_eq!(task.error.as_deref(), Some("Task cancelled"));
    assert_eq!(mirror.worker(&worker_id).expect("worker mirrored").state, WorkerState::Idle);
}

#[tokio::test]
async fn crash_with_backlog_fails_stranded_tasks_and_spares_other_workers() {
    let port = free_port();
    // The busy worker reads its one task's request line then kills itself,
    // simulating an external SIGKILL crash mid-task.
    let supervisor =
        Supervisor::new(config_with_server(port, "sh", &["-c", "read line; kill -9 $$"]));
    let sup = supervisor.clone();
    tokio::spawn(async move {
        let _ = sup.run().await;
    });

    let client = connected_client(port).await;

    client.send(Command::Spawn {
        server_id: "S".into(),
        server_name: None,
        command: None,
        argv: vec![],
    });
    let busy_worker = WorkerId::new("worker-1");
    wait_for(
        || {
            let mirror = client.mirror();
            let mirror = mirror.lock();
            mirror.worker(&busy_worker).map(|w| w.state) == Some(WorkerState::Idle)
        },
        Duration::from_secs(5),
    )
    .await;

    client.send(Command::Submit { tool: "t1".into(), params: json!({}) });
    wait_for(
        || {
            let mirror = client.mirror();
            let mirror = mirror.lock();
            mirror.worker(&busy_worker).map(|w| w.state) == Some(WorkerState::Busy)
        },
        Duration::from_secs(5),
    )
    .await;
    client.send(Command::Submit { tool: "t2".into(), params: json!({}) });
    client.send(Command::Submit { tool: "t3".into(), params: json!({}) });

    // A second, untouched worker — must remain idle throughout the crash.
    client.send(Command::Spawn {
        server_id: "S".into(),
        server_name: None,
        command: None,
        argv: vec!["--extra".into()],
    });
    let spare_worker = WorkerId::new("worker-2");
    wait_for(
        || {
            let mirror = client.mirror();
            let mirror = mirror.lock();
            mirror.worker(&spare_worker).map(|w| w.state) == Some(WorkerState::Idle)
        },
        Duration::from_secs(5),
    )
    .await;

    wait_for(
        || {
            let mirror = client.mirror();
            let mirror = mirror.lock();
            mirror.worker(&busy_worker).is_none()
        },
        Duration::from_secs(5),
    )
    .await;

    let mirror = client.mirror();
    let mirror = mirror.lock();
    for task_id in ["task-1", "task-2", "task-3"] {
        let task = mirror.task(&TaskId::new(task_id)).expect("task mirrored");
        assert_eq!(task.state, TaskState::Failed);
    }
    assert_eq!(mirror.worker(&spare_worker).expect("spare worker mirrored").state, WorkerState::Idle);
}

#[tokio::test]
async fn log_entries_reach_only_subscribed_clients() {
    let port = free_port();
    let supervisor = Supervisor::new(config_with_server(
        port,
        "sh",
        &["-c", "echo 'ERROR: boom' 1>&2; sleep 0.5"],
    ));
    let sup = supervisor.clone();
    tokio::spawn(async move {
        let _ = sup.run().await;
    });

    let subscriber = connected_client(port).await;
    let bystander = connected_client(port).await;

    subscriber.send(Command::SubscribeLogs { worker_id: "worker-1".into() });

    subscriber.send(Command::Spawn {
        server_id: "S".into(),
        server_name: None,
        command: None,
        argv: vec![],
    });
    let worker_id = WorkerId::new("worker-1");

    wait_for(
        || {
            let mirror = subscriber.mirror();
            let mirror = mirror.lock();
            mirror.logs(&worker_id).any(|entry| entry.message.contains("boom"))
        },
        Duration::from_secs(5),
    )
    .await;

    // Give the bystander every chance to have (wrongly) received the line too.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let bystander_mirror = bystander.mirror();
    let bystander_mirror = bystander_mirror.lock();
    assert_eq!(bystander_mirror.logs(&worker_id).count(), 0);
}

#[tokio::test]
async fn unresolvable_spawn_reports_command_error_to_the_caller_only() {
    let port = free_port();
    let config = FleetConfig {
        port,
        path: "/fleet".into(),
        heartbeat_interval: Duration::from_secs(30),
        kill_timeout: Duration::from_secs(5),
        shutdown_timeout: Duration::from_secs(10),
        server_registry: None,
    };
    let supervisor = Supervisor::new(config);
    let sup = supervisor.clone();
    tokio::spawn(async move {
        let _ = sup.run().await;
    });

    let caller = connected_client(port).await;
    let bystander = connected_client(port).await;

    caller.send(Command::Spawn {
        server_id: "unknown".into(),
        server_name: None,
        command: None,
        argv: vec![],
    });

    let command_error_task = TaskId::new("command-error");
    wait_for(
        || {
            let mirror = caller.mirror();
            let mirror = mirror.lock();
            mirror.task(&command_error_task).is_some()
        },
        Duration::from_secs(5),
    )
    .await;

    let caller_mirror = caller.mirror();
    let caller_mirror = caller_mirror.lock();
    let task = caller_mirror.task(&command_error_task).expect("command error mirrored");
    assert!(task.error.as_deref().unwrap_or_default().contains("no config found"));
    assert_eq!(caller_mirror.workers().count(), 0);

    let bystander_mirror = bystander.mirror();
    let bystander_mirror = bystander_mirror.lock();
    assert!(bystander_mirror.task(&command_error_task).is_none());
}
