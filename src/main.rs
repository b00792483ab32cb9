//! Chat session server - Entry Point
//!
//! Loads configuration, starts the TCP listener and serves WebSocket clients.

use std::env;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_session::{ChatServer, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level, CHAT_LOG as fallback
    // e.g., RUST_LOG=debug or RUST_LOG=chat_session=trace
    let log_filter = env::var("CHAT_LOG").unwrap_or_else(|_| Config::default().log_filter);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter)),
        )
        .init();

    // Logging is up, so invalid settings get reported
    let mut config = Config::from_env();

    // Bind address from command line overrides the environment
    if let Some(addr) = env::args().nth(1) {
        config.addr = addr;
    }

    // Start TCP listener
    let listener = TcpListener::bind(&config.addr).await?;
    info!("WebSocket chat server listening on {}", config.addr);
    info!(
        typing_window_ms = config.typing_window.as_millis() as u64,
        default_room = ?config.default_room,
        "Session core configured"
    );

    ChatServer::new(&config).run(listener).await;
    Ok(())
}
