//! Conversation addressing
//!
//! Public rooms come from a fixed catalogue; direct conversations are keyed
//! by the sorted pair of their two participants.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::SessionError;
use crate::types::UserId;

/// Public room tag
///
/// The catalogue is fixed: every client sees the same three rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomTag {
    General,
    Tech,
    Random,
}

impl RoomTag {
    /// All public rooms, in sidebar order
    pub const ALL: [RoomTag; 3] = [RoomTag::General, RoomTag::Tech, RoomTag::Random];

    /// Wire/tag form (`general`, `tech`, `random`)
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomTag::General => "general",
            RoomTag::Tech => "tech",
            RoomTag::Random => "random",
        }
    }

    /// Human-readable room name
    pub fn display_name(&self) -> &'static str {
        match self {
            RoomTag::General => "General",
            RoomTag::Tech => "Tech Talk",
            RoomTag::Random => "Random",
        }
    }

    /// Look up a tag by its wire form (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        RoomTag::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for RoomTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical pair of direct-conversation participants
///
/// Fields are private so the only way to build one is [`DirectPair::new`],
/// which sorts the ids. Both participants therefore always compute the
/// identical pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DirectPair {
    low: UserId,
    high: UserId,
}

impl DirectPair {
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// Both participants, lowest id first
    pub fn participants(&self) -> (UserId, UserId) {
        (self.low, self.high)
    }

    /// Check if a user is one of the two participants
    pub fn contains(&self, user_id: UserId) -> bool {
        self.low == user_id || self.high == user_id
    }

    /// Get the other participant for a given user
    ///
    /// Returns None if the user is not part of this pair.
    pub fn partner(&self, user_id: UserId) -> Option<UserId> {
        if self.low == user_id {
            Some(self.high)
        } else if self.high == user_id {
            Some(self.low)
        } else {
            None
        }
    }
}

/// Canonical conversation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationKey {
    /// A public room, readable by everyone
    Public { room: RoomTag },
    /// A two-participant direct conversation
    Direct { pair: DirectPair },
}

impl ConversationKey {
    pub fn public(room: RoomTag) -> Self {
        ConversationKey::Public { room }
    }

    pub fn direct(a: UserId, b: UserId) -> Self {
        ConversationKey::Direct {
            pair: DirectPair::new(a, b),
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, ConversationKey::Public { .. })
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, ConversationKey::Direct { .. })
    }

    /// Participant pair for a direct conversation
    pub fn pair(&self) -> Option<DirectPair> {
        match self {
            ConversationKey::Direct { pair } => Some(*pair),
            ConversationKey::Public { .. } => None,
        }
    }

    /// Whether a user may read and write this conversation
    pub fn admits(&self, user_id: UserId) -> bool {
        match self {
            ConversationKey::Public { .. } => true,
            ConversationKey::Direct { pair } => pair.contains(user_id),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationKey::Public { room } => write!(f, "#{}", room),
            ConversationKey::Direct { pair } => {
                let (low, high) = pair.participants();
                write!(f, "dm:{}:{}", low, high)
            }
        }
    }
}

/// Addressing target chosen by a client: a public room or another user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Room(RoomTag),
    User(UserId),
}

impl FromStr for Target {
    type Err = SessionError;

    /// Room tags win; anything else must be a user id
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(tag) = RoomTag::parse(s) {
            return Ok(Target::Room(tag));
        }
        UserId::parse(s.trim())
            .map(Target::User)
            .ok_or_else(|| SessionError::UnknownTarget(s.to_string()))
    }
}
