//! Online-user tracking driven by transport presence events.

use std::collections::HashSet;

/// Set of currently-online user ids. Append/remove only; no ordering.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    online: HashSet<String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&mut self, user_id: String) {
        self.online.insert(user_id);
    }

    pub fn set_offline(&mut self, user_id: &str) {
        self.online.remove(user_id);
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.contains(user_id)
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    /// Drop everything. Called when the transport disconnects; the server
    /// replays presence after reconnect.
    pub fn reset(&mut self) {
        self.online.clear();
    }
}
