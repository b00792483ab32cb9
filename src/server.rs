//! ChatServer: accept loop over a shared session core
//!
//! Every accepted connection gets its own handler task and `Session`; all
//! of them share one `ChatCore`, whose stores serialize mutations per
//! conversation instead of funnelling everything through one task.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::handler::handle_connection;
use crate::session::ChatCore;

/// The WebSocket chat server
pub struct ChatServer {
    core: Arc<ChatCore>,
}

impl ChatServer {
    /// Create a server with a fresh core built from `config`
    pub fn new(config: &Config) -> Self {
        Self {
            core: Arc::new(ChatCore::new(config)),
        }
    }

    /// Shared core, e.g. for in-process sessions next to the socket ones
    pub fn core(&self) -> Arc<ChatCore> {
        self.core.clone()
    }

    /// Run the accept loop
    ///
    /// Accept errors are logged and the loop keeps going.
    pub async fn run(self, listener: TcpListener) {
        info!("ChatServer started");

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let core = self.core.clone();

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, core).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
