//! WebSocket message protocol
//!
//! JSON-based bidirectional protocol using Serde's tagged enum
//! for type-safe serialization/deserialization.

use serde::{Deserialize, Serialize};

use crate::call::CallSession;
use crate::error::{AppError, SessionError};
use crate::ledger::{Message, MessageKind};
use crate::registry::User;
use crate::session::StateSnapshot;

/// Client → Server message
///
/// All messages from client to server. Uses tagged enum with snake_case naming.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Log in with a display name (required before everything else)
    Login { display_name: String },
    /// Log out, keeping the connection open
    Logout,
    /// Switch to a room tag or a user id
    ChangeRoom { target: String },
    /// Post to the active conversation
    SendMessage {
        text: String,
        #[serde(default)]
        kind: MessageKind,
        #[serde(default)]
        attachment_ref: Option<String>,
    },
    /// Composer activity in the active conversation
    Typing,
    /// Call the peer of the active direct conversation
    StartCall {
        #[serde(default)]
        is_video: bool,
    },
    /// Accept or decline a ringing call
    RespondToCall { accept: bool },
    /// End or cancel the active call
    HangUp,
    /// Ask for a fresh state snapshot
    GetState,
    /// Search other users by display name
    SearchUsers { term: String },
}

/// Server → Client message
///
/// All messages from server to client. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established
    Connected { connection_id: String },
    /// Login succeeded
    LoggedIn { user: User },
    /// Message committed to the ledger
    MessageSent { message: Message },
    /// Call changed state as a result of this client's command
    CallUpdated { call: CallSession },
    /// User search results
    SearchResults { users: Vec<User> },
    /// Full state snapshot for re-rendering
    State { state: Box<StateSnapshot> },
    /// Error occurred
    Error { code: ErrorCode, message: String },
}

/// Error codes for ServerMessage::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    EmptyName,
    EmptyBody,
    NotLoggedIn,
    NoActiveConversation,
    SelfConversation,
    UnknownTarget,
    CallNotSupported,
    CallInProgress,
    CallAlreadyEnded,
    NoActiveCall,
    NotAuthorized,
    InvalidCallTransition,
    /// Invalid message format
    InvalidMessage,
    /// Server-side failure; details are logged, not sent
    Internal,
}

impl From<&SessionError> for ErrorCode {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::EmptyName => ErrorCode::EmptyName,
            SessionError::EmptyBody => ErrorCode::EmptyBody,
            SessionError::NotLoggedIn => ErrorCode::NotLoggedIn,
            SessionError::NoActiveConversation => ErrorCode::NoActiveConversation,
            SessionError::SelfConversation => ErrorCode::SelfConversation,
            SessionError::UnknownTarget(_) => ErrorCode::UnknownTarget,
            SessionError::CallNotSupported => ErrorCode::CallNotSupported,
            SessionError::CallInProgress => ErrorCode::CallInProgress,
            SessionError::CallAlreadyEnded => ErrorCode::CallAlreadyEnded,
            SessionError::NoActiveCall => ErrorCode::NoActiveCall,
            SessionError::NotAuthorized => ErrorCode::NotAuthorized,
            SessionError::InvalidCallTransition(_) => ErrorCode::InvalidCallTransition,
            SessionError::OutOfOrder(_) => ErrorCode::Internal,
        }
    }
}

/// Convert SessionError to ServerMessage for client notification
impl From<SessionError> for ServerMessage {
    fn from(err: SessionError) -> Self {
        let code = ErrorCode::from(&err);
        let message = match code {
            ErrorCode::Internal => "Internal error".to_string(),
            _ => err.to_string(),
        };
        ServerMessage::Error { code, message }
    }
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Session(e) => e.into(),
            AppError::Json(e) => ServerMessage::Error {
                code: ErrorCode::InvalidMessage,
                message: format!("Invalid message format: {}", e),
            },
            // Fatal errors are not typically converted (connection closes)
            _ => ServerMessage::Error {
                code: ErrorCode::Internal,
                message: "Internal error".to_string(),
            },
        }
    }
}
