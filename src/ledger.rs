//! Message ledger
//!
//! Append-only, per-conversation ordered message log. Each conversation's
//! log sits behind its own `DashMap` entry, so an append holds the write
//! guard for that key only: the full message becomes visible at once and
//! appends to other conversations proceed in parallel.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::SessionError;
use crate::room::ConversationKey;
use crate::types::{MessageId, UserId};

/// Message content kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
}

/// Message as submitted for appending
///
/// `id` and `sent_at` are assigned by the ledger when absent.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub id: Option<MessageId>,
    pub sender_id: UserId,
    pub sender_display_name: String,
    pub body: String,
    pub kind: MessageKind,
    pub attachment_ref: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl MessageDraft {
    /// Plain text draft
    pub fn text(sender_id: UserId, sender_display_name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: None,
            sender_id,
            sender_display_name: sender_display_name.into(),
            body: body.into(),
            kind: MessageKind::Text,
            attachment_ref: None,
            sent_at: None,
        }
    }
}

/// Committed message (immutable once appended)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_key: ConversationKey,
    pub sender_id: UserId,
    /// Sender's name at send time
    pub sender_display_name: String,
    pub body: String,
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_ref: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Concurrent per-conversation message store
#[derive(Debug, Default)]
pub struct Ledger {
    logs: DashMap<ConversationKey, Vec<Message>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to a conversation and return the stored copy
    ///
    /// Assigned timestamps never precede the previous message. An explicit
    /// timestamp that does is refused with `OutOfOrder`, leaving the log
    /// untouched.
    pub fn append(&self, key: ConversationKey, draft: MessageDraft) -> Result<Message, SessionError> {
        let mut log = self.logs.entry(key).or_default();
        let last = log.last().map(|m| m.sent_at);

        let sent_at = match (draft.sent_at, last) {
            (Some(requested), Some(last)) if requested < last => {
                error!(%key, %requested, %last, "Refusing out-of-order append");
                return Err(SessionError::OutOfOrder(key.to_string()));
            }
            (Some(requested), _) => requested,
            (None, Some(last)) => Utc::now().max(last),
            (None, None) => Utc::now(),
        };

        let message = Message {
            id: draft.id.unwrap_or_default(),
            conversation_key: key,
            sender_id: draft.sender_id,
            sender_display_name: draft.sender_display_name,
            body: draft.body,
            kind: draft.kind,
            attachment_ref: draft.attachment_ref,
            sent_at,
        };
        log.push(message.clone());

        debug!(%key, message_id = %message.id, total = log.len(), "Message appended");
        Ok(message)
    }

    /// Ordered snapshot of a conversation
    ///
    /// The returned vector is a copy; mutating it does not affect the ledger.
    pub fn read(&self, key: &ConversationKey) -> Vec<Message> {
        self.logs
            .get(key)
            .map(|log| log.value().clone())
            .unwrap_or_default()
    }

    /// Number of messages in a conversation
    pub fn len(&self, key: &ConversationKey) -> usize {
        self.logs.get(key).map(|log| log.len()).unwrap_or(0)
    }
}
