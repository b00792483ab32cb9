//! Chat Session Core Library
//!
//! The session layer of a chat product: conversation routing, message
//! ordering, typing presence and call signaling, with a WebSocket binding
//! built on tokio-tungstenite.
//!
//! # Features
//! - Login by display name, online/offline presence
//! - Public rooms (`general`, `tech`, `random`) and direct conversations
//! - Ordered, append-only message history per conversation
//! - Typing indicators that expire on their own
//! - Call signaling (ringing, connected, ended) for direct conversations
//! - State snapshots pushed to clients on every relevant change
//!
//! # Architecture
//! - `ChatCore` owns the shared stores (registry, ledger, presence, calls)
//! - Each connection holds a `Session` over the core
//! - Stores are `DashMap`-backed: mutations on one conversation are
//!   serialized, different conversations never block each other
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use chat_session::{ChatCore, Config, MessageKind, Session, Target, RoomTag};
//!
//! let core = Arc::new(ChatCore::new(&Config::default()));
//! let mut session = Session::new(core);
//! session.login("Alice")?;
//! session.change_room(Target::Room(RoomTag::Tech))?;
//! session.send_message("hello", MessageKind::Text, None)?;
//! ```

pub mod call;
pub mod config;
pub mod error;
pub mod handler;
pub mod ledger;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod router;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use call::{CallBoard, CallSession, CallState};
pub use config::Config;
pub use error::{AppError, ErrorKind, SessionError};
pub use handler::handle_connection;
pub use ledger::{Ledger, Message, MessageDraft, MessageKind};
pub use presence::{Presence, TypingSignal, TYPING_WINDOW};
pub use protocol::{ClientMessage, ErrorCode, ServerMessage};
pub use registry::{Registry, User, UserStatus};
pub use room::{ConversationKey, DirectPair, RoomTag, Target};
pub use server::ChatServer;
pub use session::{ChatCore, CoreEvent, Session, StateSnapshot};
pub use types::{CallId, MessageId, UserId};
