// SPDX-License-Identifier: MIT

//! fleetd: the fleet supervisor daemon. Binds the WebSocket control plane
//! and supervises worker child processes until told to stop.

use std::sync::Arc;

use fleet_daemon::{FleetConfig, Supervisor};
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logging();

    let config = FleetConfig::from_env();
    let port = config.port;
    let supervisor = Supervisor::new(config);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let run_handle = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run().await })
    };

    tracing::info!(port, "fleetd ready");

    tokio::select! {
        result = run_handle => {
            match result {
                Ok(Ok(())) => tracing::info!("hub accept loop exited"),
                Ok(Err(e)) => tracing::error!(error = %e, "hub accept loop failed"),
                Err(e) => tracing::error!(error = %e, "hub accept loop task panicked"),
            }
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            tracing::info!("received SIGINT, shutting down");
        }
    }

    supervisor.shutdown().await;
    tracing::info!("fleetd stopped");
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}
