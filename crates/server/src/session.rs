//! Active-session tracking and the idle sweeper.
//!
//! Each admitted device session has a last-seen timestamp, refreshed on
//! every command. The sweeper wakes on a fixed interval, evicts entries
//! idle beyond the threshold, and reflects them as offline in the
//! device catalog. Session timestamps are never persisted.

use crate::state::AppState;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::info;

/// In-memory session timestamps, keyed by device full-id.
#[derive(Default)]
pub struct SessionTracker {
    sessions: Mutex<HashMap<String, Instant>>,
}

impl SessionTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record activity for a session.
    pub fn touch(&self, full_id: &str) {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .insert(full_id.to_string(), Instant::now());
    }

    /// Drop a session entry.
    pub fn remove(&self, full_id: &str) {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .remove(full_id);
    }

    /// Remove and return every session idle longer than `timeout`.
    pub fn evict_idle(&self, timeout: Duration) -> Vec<String> {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, last_seen)| last_seen.elapsed() > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        expired
    }
}

/// Spawn the background sweeper. The only periodic activity in the
/// server.
pub fn spawn_sweeper(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = state.config.session.sweep_interval();
        let timeout = state.config.session.idle_timeout();
        loop {
            tokio::time::sleep(interval).await;
            for full_id in state.sessions.evict_idle(timeout) {
                if let Ok((user_id, device_id)) = corral_core::ident::split_full_id(&full_id) {
                    state.fleet.disconnect_device(user_id, device_id).await;
                    info!(device = %full_id, "idle session evicted");
                }
            }
        }
    })
}
