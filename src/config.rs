//! Configuration loaded from environment variables.
//!
//! Every setting has a default so the server starts with zero
//! configuration for local development.

use std::time::Duration;

use crate::presence::TYPING_WINDOW;
use crate::room::RoomTag;

/// Default server address
const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default broadcast buffer for core events
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default log filter when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "chat_session=info";

/// Server and session-core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the WebSocket listener binds to.
    /// Env: `CHAT_ADDR` (the first CLI argument overrides it)
    /// Default: `127.0.0.1:8080`
    pub addr: String,

    /// How long a typing signal stays live without a refresh.
    /// Env: `CHAT_TYPING_WINDOW_MS`
    /// Default: `2000`
    pub typing_window: Duration,

    /// Room a user lands in after logging in; `None` means no active
    /// conversation until the client picks one.
    /// Env: `CHAT_DEFAULT_ROOM` (`general`, `tech`, `random` or `none`)
    /// Default: `general`
    pub default_room: Option<RoomTag>,

    /// Capacity of the core event broadcast channel.
    /// Env: `CHAT_EVENT_CAPACITY`
    /// Default: `256`
    pub event_capacity: usize,

    /// Log filter used when `RUST_LOG` is not set.
    /// Env: `CHAT_LOG`
    /// Default: `chat_session=info`
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            typing_window: TYPING_WINDOW,
            default_room: Some(RoomTag::General),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("CHAT_ADDR") {
            config.addr = addr;
        }

        if let Some(value) = lookup("CHAT_TYPING_WINDOW_MS") {
            match value.parse::<u64>() {
                Ok(ms) if ms > 0 => config.typing_window = Duration::from_millis(ms),
                _ => {
                    tracing::warn!(%value, "Invalid CHAT_TYPING_WINDOW_MS, using default");
                }
            }
        }

        if let Some(value) = lookup("CHAT_DEFAULT_ROOM") {
            if value.trim().eq_ignore_ascii_case("none") {
                config.default_room = None;
            } else if let Some(room) = RoomTag::parse(&value) {
                config.default_room = Some(room);
            } else {
                tracing::warn!(%value, "Invalid CHAT_DEFAULT_ROOM, using default");
            }
        }

        if let Some(value) = lookup("CHAT_EVENT_CAPACITY") {
            match value.parse::<usize>() {
                Ok(capacity) if capacity > 0 => config.event_capacity = capacity,
                _ => {
                    tracing::warn!(%value, "Invalid CHAT_EVENT_CAPACITY, using default");
                }
            }
        }

        if let Some(filter) = lookup("CHAT_LOG") {
            config.log_filter = filter;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.addr, "127.0.0.1:8080");
        assert_eq!(config.typing_window, Duration::from_secs(2));
        assert_eq!(config.default_room, Some(RoomTag::General));
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("CHAT_ADDR", "0.0.0.0:9000"),
            ("CHAT_TYPING_WINDOW_MS", "500"),
            ("CHAT_DEFAULT_ROOM", "none"),
            ("CHAT_EVENT_CAPACITY", "16"),
        ]));
        assert_eq!(config.addr, "0.0.0.0:9000");
        assert_eq!(config.typing_window, Duration::from_millis(500));
        assert_eq!(config.default_room, None);
        assert_eq!(config.event_capacity, 16);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("CHAT_TYPING_WINDOW_MS", "soon"),
            ("CHAT_DEFAULT_ROOM", "lobby"),
            ("CHAT_EVENT_CAPACITY", "0"),
        ]));
        assert_eq!(config.typing_window, TYPING_WINDOW);
        assert_eq!(config.default_room, Some(RoomTag::General));
        assert_eq!(config.event_capacity, 256);
    }
}
