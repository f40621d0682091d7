use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle of one bridged debug session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeState {
    Idle,
    Active,
    Ended,
}

/// Shared handle on a session's [`BridgeState`].
///
/// Cloned into the strategy (to discard kernel results that arrive after the
/// session ended) and into the session manager (to end sessions on shutdown).
#[derive(Debug, Clone)]
pub struct SessionStatus {
    tx: Arc<watch::Sender<BridgeState>>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStatus {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BridgeState::Idle);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> BridgeState {
        *self.tx.borrow()
    }

    pub fn is_ended(&self) -> bool {
        self.state() == BridgeState::Ended
    }

    /// `Idle -> Active`. Activating an active session is a no-op.
    pub fn activate(&self) -> Result<()> {
        let mut ended = false;
        self.tx.send_if_modified(|state| match state {
            BridgeState::Idle => {
                *state = BridgeState::Active;
                true
            }
            BridgeState::Active => false,
            BridgeState::Ended => {
                ended = true;
                false
            }
        });

        if ended {
            Err(Error::SessionEnded)
        } else {
            Ok(())
        }
    }

    /// Move to `Ended`. Returns false if the session had already ended.
    pub fn end(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == BridgeState::Ended {
                false
            } else {
                *state = BridgeState::Ended;
                true
            }
        })
    }

    pub fn ensure_live(&self) -> Result<()> {
        if self.is_ended() {
            Err(Error::SessionEnded)
        } else {
            Ok(())
        }
    }

    /// Resolves once the session has ended.
    pub async fn ended(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|state| *state == BridgeState::Ended).await;
    }
}
