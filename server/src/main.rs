mod console;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use pickbot_shared::control;
use pickbot_shared::controller::{ControlConfig, PickPlaceController};
use session::{RobotSession, SessionManager};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Control backend for pick-and-place robots
#[derive(Debug, Parser)]
#[command(name = "pickbot-server")]
struct Args {
    /// Address to listen on for robot connections
    #[arg(long, default_value = "0.0.0.0:1234")]
    listen: SocketAddr,

    /// Apparent size below which a target is approached at normal speed
    #[arg(long, default_value_t = control::DEFAULT_MIN_SIZE)]
    min_size: u32,

    /// Apparent size at which the robot has arrived at its target
    #[arg(long, default_value_t = control::DEFAULT_MAX_SIZE)]
    max_size: u32,

    /// Drop sessions that stay quiet longer than this many seconds
    #[arg(long)]
    read_timeout_secs: Option<u64>,

    /// Delay between control cycles, in milliseconds
    #[arg(long, default_value_t = control::PACING_DELAY_MS)]
    pacing_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let config = ControlConfig {
        min_size: args.min_size,
        max_size: args.max_size,
        ..ControlConfig::default()
    };
    // Configuration gaps are fatal here, never mid-session
    config.validate().context("invalid control configuration")?;

    let controller = Arc::new(PickPlaceController::new(config));
    let manager = Arc::new(SessionManager::new());
    let shutdown = CancellationToken::new();
    let read_timeout = args.read_timeout_secs.map(Duration::from_secs);
    let pacing = Duration::from_millis(args.pacing_ms);

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(
        listen = %args.listen,
        min_size = args.min_size,
        max_size = args.max_size,
        "control server listening"
    );

    tokio::spawn(console::run_console(manager.clone(), shutdown.clone()));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                shutdown.cancel();
            }
        });
    }

    let sessions = TaskTracker::new();

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                info!(robot = %addr, "robot connected");
                let session = RobotSession::new(stream, addr, read_timeout);
                sessions.spawn(session::run_session(
                    session,
                    controller.clone(),
                    manager.clone(),
                    shutdown.clone(),
                    pacing,
                ));
            }
            Err(e) => {
                // One failed accept must not take the listener down
                error!(error = %e, "accept failed");
            }
        }
    }

    drop(listener);
    info!(live = manager.count().await, "listener closed, draining sessions");
    sessions.close();
    sessions.wait().await;
    info!("shutdown complete");

    Ok(())
}
