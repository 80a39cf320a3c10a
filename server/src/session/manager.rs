//! Session registry for all connected robots

use super::connection::SessionHandle;
use pickbot_shared::controller::{Phase, SessionState};
use pickbot_shared::ObjectClass;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::warn;

/// Read-only snapshot of one session, refreshed by its control loop after
/// every cycle
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub phase: Phase,
    pub held_object: Option<ObjectClass>,
    pub move_count: u64,
    pub connected_at: Instant,
}

impl SessionInfo {
    fn new(session_id: String, connected_at: Instant) -> Self {
        Self {
            session_id,
            phase: Phase::SearchObject,
            held_object: None,
            move_count: 0,
            connected_at,
        }
    }
}

struct SessionEntry {
    handle: SessionHandle,
    info: SessionInfo,
}

/// Tracks all live robot sessions.
///
/// Sessions register on accept and deregister on teardown; presence in the
/// map is liveness. The registry never mutates a session's controller state,
/// it only stores identity, a write handle, and the published snapshot.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a new robot session
    pub async fn register(&self, handle: SessionHandle) {
        let info = SessionInfo::new(handle.session_id.clone(), handle.connected_at);
        let entry = SessionEntry {
            info,
            handle,
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(entry.handle.session_id.clone(), entry);
    }

    /// Remove a session at teardown
    pub async fn unregister(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
    }

    /// Refresh the published snapshot for a session
    pub async fn publish_state(&self, session_id: &str, state: &SessionState) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.info.phase = state.phase;
            entry.info.held_object = state.held_object;
            entry.info.move_count = state.move_count;
        }
    }

    /// Broadcast one raw line to every live session (manual-override path).
    ///
    /// A failed send is logged and skipped; it does not stop the broadcast.
    /// Returns how many sessions the line was delivered to.
    pub async fn broadcast_line(&self, line: &str) -> usize {
        let sessions = self.sessions.read().await;
        let mut delivered = 0;
        for (session_id, entry) in sessions.iter() {
            match entry.handle.send_line(line).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(session = %session_id, error = %e, "broadcast send failed");
                }
            }
        }
        delivered
    }

    /// Snapshot of all live sessions, for introspection
    pub async fn snapshot(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions.values().map(|entry| entry.info.clone()).collect()
    }

    /// Identities of all live sessions
    pub async fn session_ids(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        sessions.keys().cloned().collect()
    }

    /// Number of live sessions
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
