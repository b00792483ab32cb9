//! Presence and typing coordinator
//!
//! Typing signals are a UX hint: unacknowledged, never retried, and kept
//! only until `expires_at`. Expiry is checked lazily on read, so there is
//! no background task and an expired signal is never reported.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::registry::{Registry, UserStatus};
use crate::room::ConversationKey;
use crate::types::UserId;

/// Default typing window, matching the composer's own reset timer
pub const TYPING_WINDOW: Duration = Duration::from_secs(2);

/// Live "user is typing" fact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingSignal {
    pub conversation_key: ConversationKey,
    pub user_id: UserId,
    pub expires_at: Instant,
}

/// Tracks online status (through the registry) and typing signals
#[derive(Debug)]
pub struct Presence {
    registry: Arc<Registry>,
    window: Duration,
    /// Per-conversation signals: ConversationKey -> (UserId -> expires_at)
    typing: DashMap<ConversationKey, HashMap<UserId, Instant>>,
}

impl Presence {
    pub fn new(registry: Arc<Registry>, window: Duration) -> Self {
        Self {
            registry,
            window,
            typing: DashMap::new(),
        }
    }

    /// Insert or refresh a typing signal for `user_id` in `key`
    pub fn mark_typing(&self, key: ConversationKey, user_id: UserId) -> TypingSignal {
        let expires_at = Instant::now() + self.window;
        self.typing.entry(key).or_default().insert(user_id, expires_at);
        debug!(%key, %user_id, "Typing signal refreshed");

        TypingSignal {
            conversation_key: key,
            user_id,
            expires_at,
        }
    }

    /// Remove a user's signal from one conversation
    ///
    /// Returns true if a live signal was removed.
    pub fn clear_typing(&self, key: &ConversationKey, user_id: UserId) -> bool {
        let now = Instant::now();
        let Entry::Occupied(mut slot) = self.typing.entry(*key) else {
            return false;
        };
        let removed = slot.get_mut().remove(&user_id);
        if slot.get().is_empty() {
            slot.remove();
        }
        removed.is_some_and(|expires_at| expires_at > now)
    }

    /// Live signals for a conversation, purging expired ones
    ///
    /// A conversation left with no signals is dropped from the map.
    pub fn signals(&self, key: &ConversationKey) -> Vec<TypingSignal> {
        let now = Instant::now();
        let Entry::Occupied(mut slot) = self.typing.entry(*key) else {
            return Vec::new();
        };
        slot.get_mut().retain(|_, expires_at| *expires_at > now);
        if slot.get().is_empty() {
            slot.remove();
            return Vec::new();
        }

        slot.get()
            .iter()
            .map(|(user_id, expires_at)| TypingSignal {
                conversation_key: *key,
                user_id: *user_id,
                expires_at: *expires_at,
            })
            .collect()
    }

    /// Display names of users currently typing in `key`
    pub fn typing_users(&self, key: &ConversationKey) -> BTreeSet<String> {
        self.signals(key)
            .into_iter()
            .filter_map(|signal| self.registry.display_name(signal.user_id))
            .collect()
    }

    /// Update a user's online status
    ///
    /// Going offline also drops every typing signal the user still has.
    pub fn set_online_status(&self, user_id: UserId, status: UserStatus) -> bool {
        let known = self.registry.set_status(user_id, status);
        if status == UserStatus::Offline {
            self.drop_signals(user_id);
        }
        known
    }

    /// Close one of a user's sessions
    ///
    /// When it was the last one the user goes offline and its typing
    /// signals are dropped; returns true in that case.
    pub fn release(&self, user_id: UserId) -> bool {
        let offline = self.registry.release(user_id);
        if offline {
            self.drop_signals(user_id);
        }
        offline
    }

    fn drop_signals(&self, user_id: UserId) {
        self.typing.retain(|_, signals| {
            signals.remove(&user_id);
            !signals.is_empty()
        });
    }

    /// Number of conversations holding typing signals
    pub fn tracked_conversations(&self) -> usize {
        self.typing.len()
    }

    /// Typing window in effect
    pub fn window(&self) -> Duration {
        self.window
    }
}
