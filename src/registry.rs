//! Identity registry
//!
//! Tracks every user that has logged in and their online/offline status.
//! Users are never removed while the process is alive; logging out or
//! disconnecting only flips the status.
//!
//! Several sessions may share one identity (same display name from two
//! connections). Each user counts its live sessions and only goes offline
//! when the last one is released.

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::types::UserId;

/// Base URL for generated avatars, seeded by display name
const AVATAR_BASE_URL: &str = "https://api.dicebear.com/7.x/avataaars/svg?seed=";

/// Online status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Online,
    Offline,
}

/// Known user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub avatar_ref: String,
    pub status: UserStatus,
}

impl User {
    /// Create a new online user with a generated avatar reference
    pub fn new(id: UserId, display_name: String) -> Self {
        let avatar_ref = format!("{}{}", AVATAR_BASE_URL, urlencoding::encode(&display_name));
        Self {
            id,
            display_name,
            avatar_ref,
            status: UserStatus::Online,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == UserStatus::Online
    }
}

/// Registry record: the public user plus its live session count
#[derive(Debug)]
struct Account {
    user: User,
    sessions: usize,
}

/// Concurrent user registry
///
/// Display names are unique: logging in with a name that is already known
/// re-activates that user instead of creating a second one.
#[derive(Debug, Default)]
pub struct Registry {
    /// All known users: UserId -> Account
    users: DashMap<UserId, Account>,
    /// Display name index: name -> UserId
    names: DashMap<String, UserId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new user or re-activate an existing one, marking it online
    ///
    /// Every successful login opens one session; pair it with `release`.
    pub fn login(&self, display_name: &str) -> Result<User, SessionError> {
        let name = display_name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptyName);
        }

        // The name entry is claimed atomically so two concurrent logins with
        // the same name resolve to the same id.
        let id = *self
            .names
            .entry(name.to_string())
            .or_insert_with(UserId::new);

        let mut account = self.users.entry(id).or_insert_with(|| Account {
            user: User::new(id, name.to_string()),
            sessions: 0,
        });
        account.sessions += 1;
        account.user.status = UserStatus::Online;
        let sessions = account.sessions;
        let user = account.user.clone();
        drop(account);

        info!(user_id = %id, name = %user.display_name, sessions, "User logged in");
        Ok(user)
    }

    /// Close one of a user's sessions
    ///
    /// The user goes offline when its last session closes; returns true in
    /// that case. Count and status change under the same entry guard, so a
    /// concurrent login either keeps the user online or comes after.
    pub fn release(&self, user_id: UserId) -> bool {
        let Some(mut account) = self.users.get_mut(&user_id) else {
            return false;
        };
        account.sessions = account.sessions.saturating_sub(1);
        if account.sessions > 0 {
            debug!(%user_id, sessions = account.sessions, "Session released, user still online");
            return false;
        }
        account.user.status = UserStatus::Offline;
        debug!(%user_id, "Last session released");
        true
    }

    /// Number of live sessions for a user
    pub fn sessions(&self, user_id: UserId) -> usize {
        self.users.get(&user_id).map(|a| a.sessions).unwrap_or(0)
    }

    /// Update a user's online status (last write wins)
    ///
    /// Returns false if the user is unknown.
    pub fn set_status(&self, user_id: UserId, status: UserStatus) -> bool {
        match self.users.get_mut(&user_id) {
            Some(mut account) => {
                account.user.status = status;
                debug!(%user_id, ?status, "User status changed");
                true
            }
            None => false,
        }
    }

    /// Get a copy of a user
    pub fn get(&self, user_id: UserId) -> Option<User> {
        self.users.get(&user_id).map(|a| a.user.clone())
    }

    /// Check if a user id is known
    pub fn contains(&self, user_id: UserId) -> bool {
        self.users.contains_key(&user_id)
    }

    /// Get a user's display name
    pub fn display_name(&self, user_id: UserId) -> Option<String> {
        self.users.get(&user_id).map(|a| a.user.display_name.clone())
    }

    /// All known users, sorted by display name
    pub fn list(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|a| a.user.clone()).collect();
        users.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        users
    }

    /// Case-insensitive substring search over display names
    ///
    /// The requesting user is never part of the result.
    pub fn search(&self, term: &str, exclude: UserId) -> Vec<User> {
        let needle = term.trim().to_lowercase();
        self.list()
            .into_iter()
            .filter(|u| u.id != exclude && u.display_name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Number of known users
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
