use super::state::{BridgeState, SessionStatus};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Session Manager - tracks every live editor session of the proxy
///
/// Each session owns its own bridge and dump store; the manager only holds
/// their status handles so it can report on them and end them all at
/// shutdown.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, SessionStatus>>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a session and return its id.
    pub async fn register(&self, status: SessionStatus) -> String {
        let session_id = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.clone(), status);
        session_id
    }

    pub async fn get_session(&self, session_id: &str) -> Result<SessionStatus> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    pub async fn get_session_state(&self, session_id: &str) -> Result<BridgeState> {
        Ok(self.get_session(session_id).await?.state())
    }

    pub async fn list_sessions(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        sessions.keys().cloned().collect()
    }

    pub async fn remove_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        Ok(())
    }

    /// End every registered session. Their serving loops observe the
    /// transition, run cleanup and remove themselves.
    pub async fn end_all(&self) -> usize {
        let sessions = self.sessions.read().await;
        let ended = sessions.values().filter(|status| status.end()).count();
        if ended > 0 {
            info!("🛑 Ended {} live session(s)", ended);
        }
        ended
    }
}
