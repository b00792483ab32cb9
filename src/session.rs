//! Session facade
//!
//! `ChatCore` owns every shared store: registry, ledger, typing coordinator
//! and call board. Each client connection holds its own `Session` over the
//! same core; the session remembers who is logged in and which
//! conversation is active, and is the only way clients touch the core.
//! Reads go out as `StateSnapshot` copies; nothing mutable escapes.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::call::{CallBoard, CallSession, CallState};
use crate::config::Config;
use crate::error::SessionError;
use crate::ledger::{Ledger, Message, MessageDraft, MessageKind};
use crate::presence::Presence;
use crate::registry::{Registry, User};
use crate::room::{ConversationKey, RoomTag, Target};
use crate::router;
use crate::types::UserId;

/// Change notification published by the core
///
/// Carries only what changed; subscribers pull a fresh snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// A user logged in, logged out or changed status
    UserChanged { user_id: UserId },
    /// A message was appended to a conversation
    MessageAppended { key: ConversationKey },
    /// Someone started or stopped typing in a conversation
    TypingChanged { key: ConversationKey },
    /// A conversation's call changed state
    CallChanged { key: ConversationKey, state: CallState },
}

/// Shared session core
#[derive(Debug)]
pub struct ChatCore {
    registry: Arc<Registry>,
    ledger: Ledger,
    presence: Presence,
    calls: CallBoard,
    default_room: Option<RoomTag>,
    events: broadcast::Sender<CoreEvent>,
}

impl ChatCore {
    pub fn new(config: &Config) -> Self {
        let registry = Arc::new(Registry::new());
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            presence: Presence::new(registry.clone(), config.typing_window),
            registry,
            ledger: Ledger::new(),
            calls: CallBoard::new(),
            default_room: config.default_room,
            events,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn calls(&self) -> &CallBoard {
        &self.calls
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: CoreEvent) {
        // No subscribers is fine: nobody needs re-rendering
        let _ = self.events.send(event);
    }
}

impl Default for ChatCore {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

/// Public room entry for the room list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub tag: RoomTag,
    pub name: String,
}

/// Active conversation as shown in the chat header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationInfo {
    pub key: ConversationKey,
    /// Room name, or the peer's display name for a direct conversation
    pub title: String,
    /// Peer of a direct conversation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<User>,
}

/// Read-only view handed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub current_user: Option<User>,
    pub users: Vec<User>,
    pub rooms: Vec<RoomInfo>,
    pub active_conversation: Option<ConversationInfo>,
    pub messages: Vec<Message>,
    /// Names of *other* users typing in the active conversation
    pub typing_users: Vec<String>,
    pub call_state: CallState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<CallSession>,
    /// A call ringing for the current user in any conversation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incoming_call: Option<CallSession>,
}

/// Per-client session over a shared core
#[derive(Debug)]
pub struct Session {
    core: Arc<ChatCore>,
    /// Logged-in user (None before login)
    user_id: Option<UserId>,
    /// Active conversation pointer
    active: Option<ConversationKey>,
}

impl Session {
    pub fn new(core: Arc<ChatCore>) -> Self {
        Self {
            core,
            user_id: None,
            active: None,
        }
    }

    /// Log in with a display name
    ///
    /// Registers the name or re-activates the user who already owns it.
    /// A session that was already logged in releases its previous identity.
    pub fn login(&mut self, display_name: &str) -> Result<User, SessionError> {
        let user = self.core.registry.login(display_name)?;

        if let Some(previous) = self.user_id {
            self.depart(previous);
        }

        self.user_id = Some(user.id);
        self.active = self.core.default_room.map(ConversationKey::public);
        self.core.publish(CoreEvent::UserChanged { user_id: user.id });
        Ok(user)
    }

    /// Log out of this session
    ///
    /// When no other session shares the identity, the user goes offline and
    /// their typing signals and live calls end. The user record stays in the
    /// registry.
    pub fn logout(&mut self) {
        if let Some(user_id) = self.user_id.take() {
            self.depart(user_id);
            info!(%user_id, "User logged out");
        }
        self.active = None;
    }

    fn depart(&self, user_id: UserId) {
        if self.core.presence.release(user_id) {
            for call in self.core.calls.end_calls_for(user_id) {
                self.publish_call(&call);
            }
        }
        self.core.publish(CoreEvent::UserChanged { user_id });
    }

    /// Select the active conversation
    pub fn change_room(&mut self, target: Target) -> Result<ConversationKey, SessionError> {
        let user_id = self.user_id()?;
        let key = router::resolve(&self.core.registry, target, user_id)?;
        self.active = Some(key);
        debug!(%user_id, %key, "Active conversation changed");
        Ok(key)
    }

    /// Post a message to the active conversation
    ///
    /// Clears the sender's typing signal there.
    pub fn send_message(
        &self,
        text: &str,
        kind: MessageKind,
        attachment_ref: Option<String>,
    ) -> Result<Message, SessionError> {
        let user_id = self.user_id()?;
        if text.trim().is_empty() {
            return Err(SessionError::EmptyBody);
        }
        let key = self.active_key()?;
        let display_name = self
            .core
            .registry
            .display_name(user_id)
            .ok_or(SessionError::NotLoggedIn)?;

        let draft = MessageDraft {
            kind,
            attachment_ref,
            ..MessageDraft::text(user_id, display_name, text)
        };
        let message = self.core.ledger.append(key, draft)?;
        info!(%key, %user_id, message_id = %message.id, "Message sent");

        if self.core.presence.clear_typing(&key, user_id) {
            self.core.publish(CoreEvent::TypingChanged { key });
        }
        self.core.publish(CoreEvent::MessageAppended { key });
        Ok(message)
    }

    /// Signal that the user is typing in the active conversation
    ///
    /// Fire-and-forget: silently ignored without a user or conversation.
    pub fn send_typing(&self) {
        let (Some(user_id), Some(key)) = (self.user_id, self.active) else {
            return;
        };
        self.core.presence.mark_typing(key, user_id);
        self.core.publish(CoreEvent::TypingChanged { key });
    }

    /// Ring the peer of the active direct conversation
    pub fn start_call(&self, is_video: bool) -> Result<CallSession, SessionError> {
        let user_id = self.user_id()?;
        let key = self.active_key()?;
        let call = self.core.calls.start_call(key, user_id, is_video)?;
        self.publish_call(&call);
        Ok(call)
    }

    /// Accept or decline the ringing call in the active conversation
    pub fn respond_to_call(&self, accept: bool) -> Result<CallSession, SessionError> {
        let user_id = self.user_id()?;
        let key = self.active_key()?;
        let call = if accept {
            self.core.calls.accept_call(key, user_id)?
        } else {
            self.core.calls.reject_call(key, user_id)?
        };
        self.publish_call(&call);
        Ok(call)
    }

    /// End the call in the active conversation
    ///
    /// A call that is still ringing is cancelled; a connected one is hung up.
    pub fn hang_up(&self) -> Result<CallSession, SessionError> {
        let user_id = self.user_id()?;
        let key = self.active_key()?;
        let call = self.core.calls.end_call(key, user_id)?;
        self.publish_call(&call);
        Ok(call)
    }

    fn publish_call(&self, call: &CallSession) {
        self.core.publish(CoreEvent::CallChanged {
            key: call.conversation_key,
            state: call.state,
        });
    }

    /// Users whose display name contains `term`, excluding the caller
    pub fn search_users(&self, term: &str) -> Result<Vec<User>, SessionError> {
        let user_id = self.user_id()?;
        Ok(self.core.registry.search(term, user_id))
    }

    /// Build a fresh snapshot of everything the client renders
    pub fn get_state(&self) -> StateSnapshot {
        let current_user = self.user_id.and_then(|id| self.core.registry.get(id));
        let rooms = RoomTag::ALL
            .into_iter()
            .map(|tag| RoomInfo {
                tag,
                name: tag.display_name().to_string(),
            })
            .collect();

        let mut snapshot = StateSnapshot {
            current_user,
            users: self.core.registry.list(),
            rooms,
            active_conversation: None,
            messages: Vec::new(),
            typing_users: Vec::new(),
            call_state: CallState::Idle,
            call: None,
            incoming_call: self.user_id.and_then(|id| self.core.calls.incoming_for(id)),
        };

        let (Some(user_id), Some(key)) = (self.user_id, self.active) else {
            return snapshot;
        };
        if !key.admits(user_id) {
            return snapshot;
        }

        snapshot.active_conversation = Some(self.describe(key, user_id));
        snapshot.messages = self.core.ledger.read(&key);
        snapshot.typing_users = self
            .core
            .presence
            .signals(&key)
            .into_iter()
            .filter(|signal| signal.user_id != user_id)
            .filter_map(|signal| self.core.registry.display_name(signal.user_id))
            .collect();
        snapshot.typing_users.sort();
        snapshot.call = self.core.calls.current(&key);
        snapshot.call_state = snapshot
            .call
            .as_ref()
            .map(|call| call.state)
            .unwrap_or(CallState::Idle);
        snapshot
    }

    fn describe(&self, key: ConversationKey, user_id: UserId) -> ConversationInfo {
        match key {
            ConversationKey::Public { room } => ConversationInfo {
                key,
                title: room.display_name().to_string(),
                peer: None,
            },
            ConversationKey::Direct { pair } => {
                let peer = pair
                    .partner(user_id)
                    .and_then(|peer_id| self.core.registry.get(peer_id));
                ConversationInfo {
                    key,
                    title: peer
                        .as_ref()
                        .map(|p| p.display_name.clone())
                        .unwrap_or_default(),
                    peer,
                }
            }
        }
    }

    /// Subscribe to core change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.core.subscribe()
    }

    /// Whether an event changes what this session's snapshot shows
    pub fn is_affected_by(&self, event: &CoreEvent) -> bool {
        match event {
            CoreEvent::UserChanged { .. } => true,
            CoreEvent::MessageAppended { key } | CoreEvent::TypingChanged { key } => {
                self.active == Some(*key)
            }
            CoreEvent::CallChanged { key, .. } => {
                self.active == Some(*key) || self.user_id.is_some_and(|id| key.admits(id))
            }
        }
    }

    pub fn current_user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn active_conversation(&self) -> Option<ConversationKey> {
        self.active
    }

    fn user_id(&self) -> Result<UserId, SessionError> {
        self.user_id.ok_or(SessionError::NotLoggedIn)
    }

    fn active_key(&self) -> Result<ConversationKey, SessionError> {
        self.active.ok_or(SessionError::NoActiveConversation)
    }
}
