//! Session handling for connected robots
//!
//! This module handles:
//! - Tracking all live robot sessions
//! - The per-connection control loop (read, decide, respond)
//! - Manual-override broadcast to every live robot

mod connection;
mod manager;

pub use connection::{RobotSession, SessionHandle};
pub use manager::{SessionInfo, SessionManager};

use pickbot_shared::controller::{PickPlaceController, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drive one robot connection end-to-end.
///
/// Loop: wait for the next report, step the controller, write the response,
/// publish the session snapshot, pace, repeat. Exits on peer close, I/O
/// error, or shutdown; always deregisters. All controller state lives here,
/// owned by this task alone.
pub async fn run_session(
    mut session: RobotSession,
    controller: Arc<PickPlaceController>,
    manager: Arc<SessionManager>,
    shutdown: CancellationToken,
    pacing: Duration,
) {
    let session_id = session.session_id().to_string();
    let handle = session.handle();
    let mut state = SessionState::new();

    manager.register(handle.clone()).await;
    info!(session = %session_id, "control session started");

    loop {
        let report = tokio::select! {
            _ = shutdown.cancelled() => break,
            report = session.recv() => match report {
                Some(report) => report,
                None => break,
            },
        };

        let output = controller.step(&mut state, &report);
        debug!(
            session = %session_id,
            label = %report.label,
            size = report.size,
            phase = state.phase.name(),
            command = %output.command,
            "control cycle"
        );
        if let Some((key, profile)) = output.profile_change {
            debug!(
                session = %session_id,
                profile = %key,
                left = profile.left,
                right = profile.right,
                "velocity profile change"
            );
        }

        let profile = output.profile_change.map(|(_, profile)| profile);
        if let Err(e) = handle.send_command(output.command, profile).await {
            warn!(session = %session_id, error = %e, "write failed, dropping session");
            break;
        }

        manager.publish_state(&session_id, &state).await;

        // Rate limiting for slow physical links, not a correctness mechanism
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(pacing) => {}
        }
    }

    manager.unregister(&session_id).await;
    info!(session = %session_id, moves = state.move_count, "control session ended");
}
