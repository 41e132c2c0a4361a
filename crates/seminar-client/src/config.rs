//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client can start with zero
//! configuration against a local backend.

use std::time::Duration;

use seminar_shared::constants::{
    HEARTBEAT_INTERVAL_SECS, MESSAGE_PAGE_SIZE, RECONNECT_DELAY_SECS, TYPING_WINDOW_SECS,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend HTTP API.
    /// Env: `SEMINAR_API_URL`
    /// Default: `http://localhost:8080`
    pub api_url: String,

    /// Bearer token presented to the API, when the identity carries one.
    /// Env: `SEMINAR_API_TOKEN`
    /// Default: none.
    pub api_token: Option<String>,

    /// Interval between presence heartbeats.
    /// Env: `SEMINAR_HEARTBEAT_SECS`
    pub heartbeat_interval: Duration,

    /// Trailing window for the typing indicator.
    /// Env: `SEMINAR_TYPING_WINDOW_SECS`
    pub typing_window: Duration,

    /// Fixed delay between realtime reconnect attempts.
    /// Env: `SEMINAR_RECONNECT_SECS`
    pub reconnect_delay: Duration,

    /// Page size requested from the message read endpoint.
    pub page_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            api_token: None,
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            typing_window: Duration::from_secs(TYPING_WINDOW_SECS),
            reconnect_delay: Duration::from_secs(RECONNECT_DELAY_SECS),
            page_size: MESSAGE_PAGE_SIZE,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("SEMINAR_API_URL") {
            config.api_url = url;
        }

        if let Ok(token) = std::env::var("SEMINAR_API_TOKEN") {
            if !token.is_empty() {
                config.api_token = Some(token);
            }
        }

        if let Ok(val) = std::env::var("SEMINAR_HEARTBEAT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.heartbeat_interval = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid SEMINAR_HEARTBEAT_SECS, using default"),
            }
        }

        if let Ok(val) = std::env::var("SEMINAR_TYPING_WINDOW_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.typing_window = Duration::from_secs(secs),
                _ => {
                    tracing::warn!(value = %val, "Invalid SEMINAR_TYPING_WINDOW_SECS, using default")
                }
            }
        }

        if let Ok(val) = std::env::var("SEMINAR_RECONNECT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.reconnect_delay = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid SEMINAR_RECONNECT_SECS, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}
