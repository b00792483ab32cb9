//! Call signaling state machine
//!
//! One machine per direct conversation, created on demand:
//!
//! ```text
//! Idle --start--> Ringing --accept--> Connected --hang_up--> Ended
//!                    |                                         ^
//!                    +-----------------reject------------------+
//! ```
//!
//! Only call *state* lives here; media transport is someone else's job.
//! Each conversation's machine sits behind its own `DashMap` entry, so two
//! racing transitions are serialized: the first one admitted wins and the
//! other sees the new state and fails with a conflict error.

use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::room::ConversationKey;
use crate::types::{CallId, UserId};

/// Call lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Idle,
    Ringing,
    Connected,
    Ended,
}

impl CallState {
    /// Ringing or connected
    pub fn is_live(&self) -> bool {
        matches!(self, CallState::Ringing | CallState::Connected)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::Idle => "idle",
            CallState::Ringing => "ringing",
            CallState::Connected => "connected",
            CallState::Ended => "ended",
        };
        f.write_str(s)
    }
}

/// One call attempt within a direct conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSession {
    pub id: CallId,
    pub conversation_key: ConversationKey,
    pub initiator_id: UserId,
    pub callee_id: UserId,
    pub is_video: bool,
    pub state: CallState,
}

impl CallSession {
    pub fn involves(&self, user_id: UserId) -> bool {
        self.initiator_id == user_id || self.callee_id == user_id
    }
}

/// Per-conversation call machines
///
/// Holds the latest session for each direct conversation. An `Ended`
/// session stays as a tombstone so late transitions report
/// `CallAlreadyEnded`; the next `start_call` replaces it with a fresh one.
#[derive(Debug, Default)]
pub struct CallBoard {
    calls: DashMap<ConversationKey, CallSession>,
}

impl CallBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a call; the other participant becomes the callee
    pub fn start_call(
        &self,
        key: ConversationKey,
        initiator_id: UserId,
        is_video: bool,
    ) -> Result<CallSession, SessionError> {
        let pair = key.pair().ok_or(SessionError::CallNotSupported)?;
        let callee_id = pair.partner(initiator_id).ok_or(SessionError::NotAuthorized)?;

        let session = CallSession {
            id: CallId::new(),
            conversation_key: key,
            initiator_id,
            callee_id,
            is_video,
            state: CallState::Ringing,
        };

        match self.calls.entry(key) {
            Entry::Occupied(mut slot) => {
                if slot.get().state.is_live() {
                    return Err(SessionError::CallInProgress);
                }
                slot.insert(session.clone());
            }
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
            }
        }

        info!(
            call_id = %session.id,
            %key,
            initiator = %initiator_id,
            callee = %callee_id,
            is_video,
            "Call ringing"
        );
        Ok(session)
    }

    /// Callee accepts a ringing call
    pub fn accept_call(&self, key: ConversationKey, user_id: UserId) -> Result<CallSession, SessionError> {
        self.transition(key, user_id, |session| match session.state {
            CallState::Ringing if session.callee_id == user_id => Ok(CallState::Connected),
            CallState::Ringing => Err(SessionError::NotAuthorized),
            other => Err(SessionError::InvalidCallTransition(other)),
        })
    }

    /// Either participant declines (or cancels) a ringing call
    pub fn reject_call(&self, key: ConversationKey, user_id: UserId) -> Result<CallSession, SessionError> {
        self.transition(key, user_id, |session| match session.state {
            CallState::Ringing => Ok(CallState::Ended),
            other => Err(SessionError::InvalidCallTransition(other)),
        })
    }

    /// Either participant hangs up a connected call
    pub fn hang_up(&self, key: ConversationKey, user_id: UserId) -> Result<CallSession, SessionError> {
        self.transition(key, user_id, |session| match session.state {
            CallState::Connected => Ok(CallState::Ended),
            other => Err(SessionError::InvalidCallTransition(other)),
        })
    }

    /// Either participant ends a live call: cancels it while ringing,
    /// hangs it up once connected
    pub fn end_call(&self, key: ConversationKey, user_id: UserId) -> Result<CallSession, SessionError> {
        self.transition(key, user_id, |session| match session.state {
            CallState::Ringing | CallState::Connected => Ok(CallState::Ended),
            other => Err(SessionError::InvalidCallTransition(other)),
        })
    }

    /// Current state of a conversation's call (`Idle` if none was started)
    pub fn state(&self, key: &ConversationKey) -> CallState {
        self.calls
            .get(key)
            .map(|session| session.state)
            .unwrap_or(CallState::Idle)
    }

    /// Latest call session of a conversation, if any
    pub fn current(&self, key: &ConversationKey) -> Option<CallSession> {
        self.calls.get(key).map(|session| session.value().clone())
    }

    /// Ringing call waiting for this user to answer, in any conversation
    pub fn incoming_for(&self, user_id: UserId) -> Option<CallSession> {
        self.calls
            .iter()
            .find(|session| session.callee_id == user_id && session.state == CallState::Ringing)
            .map(|session| session.value().clone())
    }

    /// End every live call a user takes part in
    ///
    /// Used when the user goes away. Returns the ended sessions.
    pub fn end_calls_for(&self, user_id: UserId) -> Vec<CallSession> {
        let mut ended = Vec::new();
        for mut session in self.calls.iter_mut() {
            if session.involves(user_id) && session.state.is_live() {
                session.state = CallState::Ended;
                info!(call_id = %session.id, %user_id, "Call ended on departure");
                ended.push(session.value().clone());
            }
        }
        ended
    }

    /// Apply a transition under the conversation's entry guard
    fn transition<F>(&self, key: ConversationKey, user_id: UserId, next: F) -> Result<CallSession, SessionError>
    where
        F: FnOnce(&CallSession) -> Result<CallState, SessionError>,
    {
        if key.is_public() {
            return Err(SessionError::CallNotSupported);
        }
        if !key.admits(user_id) {
            return Err(SessionError::NotAuthorized);
        }

        let mut session = self.calls.get_mut(&key).ok_or(SessionError::NoActiveCall)?;
        if session.state == CallState::Ended {
            return Err(SessionError::CallAlreadyEnded);
        }

        let from = session.state;
        let to = next(&session)?;
        session.state = to;

        debug!(call_id = %session.id, %key, %user_id, %from, %to, "Call transition");
        Ok(session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::RoomTag;

    fn direct() -> (UserId, UserId, ConversationKey) {
        let a = UserId::new();
        let b = UserId::new();
        (a, b, ConversationKey::direct(a, b))
    }

    #[test]
    fn test_public_room_not_supported() {
        let board = CallBoard::new();
        let key = ConversationKey::public(RoomTag::General);
        assert_eq!(
            board.start_call(key, UserId::new(), false),
            Err(SessionError::CallNotSupported)
        );
        assert_eq!(board.state(&key), CallState::Idle);
    }

    #[test]
    fn test_start_records_callee() {
        let board = CallBoard::new();
        let (a, b, key) = direct();

        let call = board.start_call(key, a, true).unwrap();
        assert_eq!(call.state, CallState::Ringing);
        assert_eq!(call.initiator_id, a);
        assert_eq!(call.callee_id, b);
        assert!(call.is_video);
    }

    #[test]
    fn test_second_start_in_progress() {
        let board = CallBoard::new();
        let (a, b, key) = direct();

        board.start_call(key, a, false).unwrap();
        assert_eq!(board.start_call(key, b, false), Err(SessionError::CallInProgress));

        board.accept_call(key, b).unwrap();
        assert_eq!(board.start_call(key, a, false), Err(SessionError::CallInProgress));
    }

    #[test]
    fn test_accept_by_initiator_not_authorized() {
        let board = CallBoard::new();
        let (a, _b, key) = direct();

        board.start_call(key, a, false).unwrap();
        assert_eq!(board.accept_call(key, a), Err(SessionError::NotAuthorized));
        assert_eq!(board.state(&key), CallState::Ringing);
    }

    #[test]
    fn test_outsider_not_authorized() {
        let board = CallBoard::new();
        let (a, _b, key) = direct();
        let outsider = UserId::new();

        assert_eq!(board.start_call(key, outsider, false), Err(SessionError::NotAuthorized));
        board.start_call(key, a, false).unwrap();
        assert_eq!(board.accept_call(key, outsider), Err(SessionError::NotAuthorized));
        assert_eq!(board.reject_call(key, outsider), Err(SessionError::NotAuthorized));
    }

    #[test]
    fn test_full_lifecycle_then_fresh_session() {
        let board = CallBoard::new();
        let (a, b, key) = direct();

        let first = board.start_call(key, a, false).unwrap();
        assert_eq!(board.accept_call(key, b).unwrap().state, CallState::Connected);
        assert_eq!(board.hang_up(key, a).unwrap().state, CallState::Ended);
        assert_eq!(board.state(&key), CallState::Ended);

        let second = board.start_call(key, b, true).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.state, CallState::Ringing);
        assert_eq!(second.callee_id, a);
    }

    #[test]
    fn test_transitions_after_end() {
        let board = CallBoard::new();
        let (a, b, key) = direct();

        board.start_call(key, a, false).unwrap();
        board.reject_call(key, b).unwrap();

        assert_eq!(board.accept_call(key, b), Err(SessionError::CallAlreadyEnded));
        assert_eq!(board.reject_call(key, a), Err(SessionError::CallAlreadyEnded));
        assert_eq!(board.hang_up(key, a), Err(SessionError::CallAlreadyEnded));
    }

    #[test]
    fn test_state_conflicts() {
        let board = CallBoard::new();
        let (a, b, key) = direct();

        assert_eq!(board.accept_call(key, b), Err(SessionError::NoActiveCall));

        board.start_call(key, a, false).unwrap();
        assert_eq!(
            board.hang_up(key, a),
            Err(SessionError::InvalidCallTransition(CallState::Ringing))
        );

        board.accept_call(key, b).unwrap();
        assert_eq!(
            board.reject_call(key, a),
            Err(SessionError::InvalidCallTransition(CallState::Connected))
        );
    }

    #[test]
    fn test_end_call_from_either_live_state() {
        let board = CallBoard::new();
        let (a, b, key) = direct();

        assert_eq!(board.end_call(key, a), Err(SessionError::NoActiveCall));

        board.start_call(key, a, false).unwrap();
        assert_eq!(board.end_call(key, a).unwrap().state, CallState::Ended);
        assert_eq!(board.end_call(key, b), Err(SessionError::CallAlreadyEnded));

        board.start_call(key, b, false).unwrap();
        board.accept_call(key, a).unwrap();
        assert_eq!(board.end_call(key, b).unwrap().state, CallState::Ended);
        assert_eq!(board.end_call(key, UserId::new()), Err(SessionError::NotAuthorized));
    }

    #[test]
    fn test_end_calls_for_user() {
        let board = CallBoard::new();
        let (a, b, key) = direct();
        let (c, d, other) = direct();

        board.start_call(key, a, false).unwrap();
        board.start_call(other, c, false).unwrap();

        assert_eq!(board.incoming_for(b).unwrap().conversation_key, key);
        assert!(board.incoming_for(a).is_none());

        let ended = board.end_calls_for(b);
        assert_eq!(ended.len(), 1);
        assert_eq!(board.state(&key), CallState::Ended);
        assert_eq!(board.state(&other), CallState::Ringing);
        assert!(board.current(&other).unwrap().involves(d));
    }
}
