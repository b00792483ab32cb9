//! Error types for the session core
//!
//! `SessionError` covers everything a session operation can report back to
//! its caller. `AppError` adds the transport failures of the WebSocket
//! binding. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::call::CallState;

/// Broad error category
///
/// Lets a binding decide how to present an error without matching on every
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, the user can retry with different input
    Validation,
    /// Referenced entity does not exist
    NotFound,
    /// Operation conflicts with current state
    Conflict,
    /// Internal invariant violated; the operation was aborted
    Internal,
}

/// Session-level errors
///
/// Always returned as values. A failure in one conversation never touches
/// state belonging to another.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Display name was empty after trimming
    #[error("Display name must not be empty")]
    EmptyName,

    /// Message body was empty after trimming
    #[error("Message body must not be empty")]
    EmptyBody,

    /// Operation requires a logged-in user
    #[error("Not logged in")]
    NotLoggedIn,

    /// No conversation selected
    #[error("No active conversation")]
    NoActiveConversation,

    /// A user tried to open a direct conversation with themselves
    #[error("Cannot open a direct conversation with yourself")]
    SelfConversation,

    /// Target is neither a room tag nor a known user
    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    /// Calls are only available in direct conversations
    #[error("Calls are not available in public rooms")]
    CallNotSupported,

    /// A call is already ringing or connected in this conversation
    #[error("A call is already in progress")]
    CallInProgress,

    /// The call has already ended
    #[error("The call has already ended")]
    CallAlreadyEnded,

    /// No call has been started in this conversation
    #[error("No active call")]
    NoActiveCall,

    /// User is not allowed to perform this call transition
    #[error("Not authorized for this call")]
    NotAuthorized,

    /// Transition is not valid from the current call state
    #[error("Call transition not allowed while {0}")]
    InvalidCallTransition(CallState),

    /// Ledger ordering invariant would be broken
    #[error("Out-of-order append to {0}")]
    OutOfOrder(String),
}

impl SessionError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::EmptyName
            | SessionError::EmptyBody
            | SessionError::NotLoggedIn
            | SessionError::NoActiveConversation
            | SessionError::SelfConversation => ErrorKind::Validation,
            SessionError::UnknownTarget(_) | SessionError::NoActiveCall => ErrorKind::NotFound,
            SessionError::CallNotSupported
            | SessionError::CallInProgress
            | SessionError::CallAlreadyEnded
            | SessionError::NotAuthorized
            | SessionError::InvalidCallTransition(_) => ErrorKind::Conflict,
            SessionError::OutOfOrder(_) => ErrorKind::Internal,
        }
    }
}

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// session errors (sent back to the client as an error message).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Session operation failed (recoverable)
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(SessionError::EmptyName.kind(), ErrorKind::Validation);
        assert_eq!(
            SessionError::UnknownTarget("x".to_string()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(SessionError::CallInProgress.kind(), ErrorKind::Conflict);
        assert_eq!(
            SessionError::OutOfOrder("#general".to_string()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_session_error_wraps_transparently() {
        let err: AppError = SessionError::CallNotSupported.into();
        assert_eq!(err.to_string(), "Calls are not available in public rooms");
    }
}
