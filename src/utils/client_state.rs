//! In-process client-state tracker. Not persisted; lost on restart.
//!
//! Mutating methods take `&mut self`. Share across threads through
//! [`SharedClientStates`].

use crate::shared::config::{DEFAULT_HEARTBEAT_TIMEOUT_SECS, DEFAULT_INACTIVE_TIMEOUT_SECS};
use crate::utils::time::current_time;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub type SharedClientStates = Arc<Mutex<ClientStateTracker>>;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    /// Never recorded.
    #[default]
    Unknown,
    Connected,
    Idle,
    Disconnected,
    ShuttingDown,
}

impl ClientState {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientState::Unknown => "unknown",
            ClientState::Connected => "connected",
            ClientState::Idle => "idle",
            ClientState::Disconnected => "disconnected",
            ClientState::ShuttingDown => "shutting_down",
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    state: ClientState,
    last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ClientStateTracker {
    entries: HashMap<String, Entry>,
    heartbeat_timeout: Duration,
    inactive_timeout: Duration,
}

/// Seconds as a chrono duration, capped well inside its range.
fn window(secs: u64) -> Duration {
    Duration::seconds(secs.min(u64::from(u32::MAX)) as i64)
}

impl Default for ClientStateTracker {
    fn default() -> Self {
        Self::with_timeouts(DEFAULT_HEARTBEAT_TIMEOUT_SECS, DEFAULT_INACTIVE_TIMEOUT_SECS)
    }
}

impl ClientStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeouts(heartbeat_secs: u64, inactive_secs: u64) -> Self {
        Self {
            entries: HashMap::new(),
            heartbeat_timeout: window(heartbeat_secs),
            inactive_timeout: window(inactive_secs),
        }
    }

    pub fn into_shared(self) -> SharedClientStates {
        Arc::new(Mutex::new(self))
    }

    /// Set the state of `client_id`, seen now. Returns the previous state.
    pub fn record(&mut self, client_id: &str, state: ClientState) -> ClientState {
        self.record_at(client_id, state, current_time())
    }

    /// Like [`ClientStateTracker::record`] with an explicit last-seen time.
    pub fn record_at(
        &mut self,
        client_id: &str,
        state: ClientState,
        last_seen: DateTime<Utc>,
    ) -> ClientState {
        let previous = self
            .entries
            .insert(client_id.to_string(), Entry { state, last_seen })
            .map(|e| e.state)
            .unwrap_or_default();
        if previous != state {
            debug!(client_id, from = %previous, to = %state, "client state change");
        }
        previous
    }

    /// Unrecorded clients are `Unknown`.
    pub fn lookup(&self, client_id: &str) -> ClientState {
        self.entries
            .get(client_id)
            .map(|e| e.state)
            .unwrap_or_default()
    }

    pub fn last_seen(&self, client_id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(client_id).map(|e| e.last_seen)
    }

    pub fn heartbeat(&mut self, client_id: &str) {
        self.record(client_id, ClientState::Connected);
    }

    /// No heartbeat within the heartbeat window. Unrecorded clients are stale.
    pub fn is_stale(&self, client_id: &str) -> bool {
        match self.entries.get(client_id) {
            Some(entry) => current_time() - entry.last_seen > self.heartbeat_timeout,
            None => true,
        }
    }

    /// Mark clients unseen for the inactivity window as disconnected. Returns their ids, sorted.
    pub fn expire_inactive(&mut self) -> Vec<String> {
        let now = current_time();
        let mut expired = Vec::new();
        for (client_id, entry) in &mut self.entries {
            if entry.state != ClientState::Disconnected
                && now - entry.last_seen > self.inactive_timeout
            {
                entry.state = ClientState::Disconnected;
                expired.push(client_id.clone());
            }
        }
        expired.sort();
        if !expired.is_empty() {
            info!(count = expired.len(), clients = ?expired, "inactive clients disconnected");
        }
        expired
    }

    /// Remove a client. Returns its last state.
    pub fn forget(&mut self, client_id: &str) -> Option<ClientState> {
        self.entries.remove(client_id).map(|e| e.state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of every tracked client and its state, sorted by id.
    pub fn snapshot(&self) -> Vec<(String, ClientState)> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|(id, e)| (id.clone(), e.state))
            .collect();
        all.sort();
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_recorded_state() {
        let mut tracker = ClientStateTracker::new();
        assert_eq!(tracker.record("c1", ClientState::Idle), ClientState::Unknown);
        assert_eq!(tracker.lookup("c1"), ClientState::Idle);
        assert_eq!(tracker.record("c1", ClientState::Connected), ClientState::Idle);
        assert_eq!(tracker.lookup("c1"), ClientState::Connected);
    }

    #[test]
    fn unrecorded_client_is_unknown() {
        let tracker = ClientStateTracker::new();
        assert_eq!(tracker.lookup("nobody"), ClientState::Unknown);
        assert!(tracker.last_seen("nobody").is_none());
        assert!(tracker.is_stale("nobody"));
    }

    #[test]
    fn staleness_follows_heartbeat_window() {
        let mut tracker = ClientStateTracker::new();
        tracker.record_at("old", ClientState::Connected, current_time() - Duration::seconds(700));
        tracker.heartbeat("fresh");
        assert!(tracker.is_stale("old"));
        assert!(!tracker.is_stale("fresh"));
        assert_eq!(tracker.lookup("fresh"), ClientState::Connected);
    }

    #[test]
    fn expire_marks_long_silent_clients() {
        let mut tracker = ClientStateTracker::new();
        let long_ago = current_time() - Duration::seconds(90_000);
        tracker.record_at("b", ClientState::Idle, long_ago);
        tracker.record_at("a", ClientState::Connected, long_ago);
        tracker.record_at("gone", ClientState::Disconnected, long_ago);
        tracker.heartbeat("c");

        assert_eq!(tracker.expire_inactive(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(tracker.lookup("a"), ClientState::Disconnected);
        assert_eq!(tracker.lookup("c"), ClientState::Connected);
        assert!(tracker.expire_inactive().is_empty());
    }

    #[test]
    fn forget_removes_entry() {
        let mut tracker = ClientStateTracker::with_timeouts(5, 10);
        tracker.record("c1", ClientState::ShuttingDown);
        assert_eq!(tracker.forget("c1"), Some(ClientState::ShuttingDown));
        assert_eq!(tracker.forget("c1"), None);
        assert!(tracker.is_empty());
    }

    #[test]
    fn shared_tracker_across_threads() {
        let shared = ClientStateTracker::new().into_shared();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    shared
                        .lock()
                        .unwrap()
                        .record(&format!("c{i}"), ClientState::Connected);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let tracker = shared.lock().unwrap();
        assert_eq!(tracker.len(), 4);
        assert_eq!(tracker.snapshot()[0], ("c0".to_string(), ClientState::Connected));
    }
}
