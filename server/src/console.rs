//! Operator console
//!
//! Interactive stdin loop for manual override and introspection: broadcast
//! raw motion commands to every live robot (bypassing the controller),
//! override wheel speeds, list sessions, and shut the process down.

use crate::session::SessionManager;
use pickbot_shared::{codec, Command};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const HELP: &str = "\
console commands:
  forward | left | right | stop | grab | release
                broadcast the command to all connected robots
  speed <0-255> broadcast a wheel speed override (both sides)
  sessions      list connected robots
  help          show this help
  quit          shut the server down";

/// Run the console until shutdown or stdin closes
pub async fn run_console(manager: Arc<SessionManager>, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                // stdin closed or unreadable: the console just stops,
                // the server keeps running
                Ok(None) | Err(_) => break,
            },
        };

        if !handle_input(line.trim(), &manager, &shutdown).await {
            break;
        }
    }
}

/// Process one console line; returns false when the console should stop
async fn handle_input(
    input: &str,
    manager: &SessionManager,
    shutdown: &CancellationToken,
) -> bool {
    let mut parts = input.split_whitespace();
    let Some(word) = parts.next() else {
        return true;
    };

    match word {
        "quit" | "exit" => {
            info!("console requested shutdown");
            shutdown.cancel();
            return false;
        }
        "help" => println!("{HELP}"),
        "sessions" | "robots" => {
            let sessions = manager.snapshot().await;
            println!("{} robot(s) connected", sessions.len());
            for session in sessions {
                println!(
                    "  {} phase={} held={} moves={}",
                    session.session_id,
                    session.phase.name(),
                    session.held_object.map_or("-", |held| held.label()),
                    session.move_count,
                );
            }
        }
        "speed" => match parts.next().and_then(|value| value.parse::<u8>().ok()) {
            Some(speed) => {
                manager
                    .broadcast_line(&format!("SET_SPEED_RIGHT {speed}\n"))
                    .await;
                let delivered = manager
                    .broadcast_line(&format!("SET_SPEED_LEFT {speed}\n"))
                    .await;
                info!(speed, delivered, "speed override broadcast");
            }
            None => warn!("usage: speed <0-255>"),
        },
        other => match manual_command(other) {
            Some(command) => {
                let delivered = manager.broadcast_line(&codec::encode_command(command)).await;
                info!(command = %command, delivered, "manual override broadcast");
            }
            None => warn!(input = other, "unknown console command, try 'help'"),
        },
    }

    true
}

fn manual_command(word: &str) -> Option<Command> {
    match word {
        "forward" => Some(Command::Forward),
        "left" => Some(Command::TurnLeft),
        "right" => Some(Command::TurnRight),
        "stop" => Some(Command::Stop),
        "grab" => Some(Command::Grab),
        "release" => Some(Command::Release),
        _ => None,
    }
}
