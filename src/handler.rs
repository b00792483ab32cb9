//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake,
//! message parsing, and bidirectional communication with the session core.
//! Each connection owns one `Session`; core events that touch it trigger a
//! fresh state push.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, ErrorKind, SessionError};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::room::Target;
use crate::session::{ChatCore, Session};

/// Outbound queue size per connection
const OUTBOUND_BUFFER: usize = 32;

/// How often state is re-pushed while typing indicators are showing
const TYPING_REFRESH: Duration = Duration::from_millis(500);

/// How long a closing connection may take to flush queued replies
const WRITE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle a new TCP connection
///
/// Performs WebSocket handshake, sets up bidirectional communication,
/// and manages the connection lifecycle.
pub async fn handle_connection(stream: TcpStream, core: Arc<ChatCore>) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = Uuid::new_v4();
    info!(%connection_id, %peer_addr, "Connection established");

    // Send connection success message
    let connected_msg = ServerMessage::Connected {
        connection_id: connection_id.to_string(),
    };
    let json = serde_json::to_string(&connected_msg)?;
    ws_sender.send(Message::Text(json.into())).await?;

    // Channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);

    // Spawn write task (ServerMessage -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for client");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    let mut session = Session::new(core);
    let mut events = session.subscribe();
    let mut refresh = tokio::time::interval(TYPING_REFRESH);
    let mut typing_shown = false;
    let mut write_done = false;

    let result = loop {
        let step = tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let reply = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => handle_client_message(&mut session, client_msg)
                            .unwrap_or_else(|e| {
                                if e.kind() == ErrorKind::Internal {
                                    error!(%connection_id, error = %e, "Command failed");
                                } else {
                                    debug!(%connection_id, error = %e, "Command rejected");
                                }
                                Some(e.into())
                            }),
                        Err(e) => {
                            warn!("Invalid JSON from {}: {}", connection_id, e);
                            Some(AppError::from(e).into())
                        }
                    };
                    let sent = match reply {
                        Some(msg) => send(&msg_tx, msg).await,
                        None => Ok(()),
                    };
                    sent.map(|()| true)
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Client {} closed the connection", connection_id);
                    break Ok(());
                }
                Some(Ok(_)) => {
                    // Binary, ping and pong frames - nothing to do
                    Ok(false)
                }
                Some(Err(e)) => {
                    error!("WebSocket error for {}: {}", connection_id, e);
                    break Err(AppError::from(e));
                }
            },
            event = events.recv() => match event {
                Ok(event) => Ok(session.is_affected_by(&event)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(%connection_id, skipped, "Event stream lagged, resyncing");
                    Ok(true)
                }
                Err(broadcast::error::RecvError::Closed) => break Ok(()),
            },
            _ = refresh.tick() => Ok(typing_shown),
            _ = &mut write_task => {
                debug!("Write task completed for {}", connection_id);
                write_done = true;
                break Ok(());
            }
        };

        let push = match step {
            Ok(push) => push,
            Err(e) => break Err(e),
        };
        if push {
            let state = session.get_state();
            typing_shown = !state.typing_users.is_empty();
            let msg = ServerMessage::State {
                state: Box::new(state),
            };
            if let Err(e) = send(&msg_tx, msg).await {
                break Err(e);
            }
        }
    };

    // Disconnect: release the session's identity
    session.logout();

    // Closing the queue lets the write task flush what is left and send
    // the close frame
    drop(msg_tx);
    if !write_done && tokio::time::timeout(WRITE_DRAIN_TIMEOUT, &mut write_task).await.is_err() {
        warn!(%connection_id, "Write task did not drain in time, aborting");
        write_task.abort();
    }

    info!(%connection_id, "Connection closed");
    result
}

/// Queue a message for the write task
async fn send(tx: &mpsc::Sender<ServerMessage>, msg: ServerMessage) -> Result<(), AppError> {
    tx.send(msg).await.map_err(|_| AppError::ChannelSend)
}

/// Apply a client command to the session
///
/// Returns the direct reply, if the command has one.
fn handle_client_message(
    session: &mut Session,
    msg: ClientMessage,
) -> Result<Option<ServerMessage>, SessionError> {
    let reply = match msg {
        ClientMessage::Login { display_name } => Some(ServerMessage::LoggedIn {
            user: session.login(&display_name)?,
        }),
        ClientMessage::Logout => {
            session.logout();
            None
        }
        ClientMessage::ChangeRoom { target } => {
            session.change_room(target.parse::<Target>()?)?;
            None
        }
        ClientMessage::SendMessage {
            text,
            kind,
            attachment_ref,
        } => Some(ServerMessage::MessageSent {
            message: session.send_message(&text, kind, attachment_ref)?,
        }),
        ClientMessage::Typing => {
            session.send_typing();
            None
        }
        ClientMessage::StartCall { is_video } => Some(ServerMessage::CallUpdated {
            call: session.start_call(is_video)?,
        }),
        ClientMessage::RespondToCall { accept } => Some(ServerMessage::CallUpdated {
            call: session.respond_to_call(accept)?,
        }),
        ClientMessage::HangUp => Some(ServerMessage::CallUpdated {
            call: session.hang_up()?,
        }),
        ClientMessage::GetState => None,
        ClientMessage::SearchUsers { term } => Some(ServerMessage::SearchResults {
            users: session.search_users(&term)?,
        }),
    };
    Ok(reply)
}
