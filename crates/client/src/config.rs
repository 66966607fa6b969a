//! Client configuration from environment variables.

use std::time::Duration;

use crate::ws::ReconnectConfig;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_WS_URL: &str = "ws://localhost:9000";
const DEFAULT_HEARTBEAT_SECS: u64 = 30;
const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Options for a [`crate::Client`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL of the REST API.
    pub api_url: String,
    /// URL of the event stream.
    pub ws_url: String,
    /// Session token used for REST requests and stream authentication.
    pub token: Option<String>,
    /// Synthesize placeholder entities in `get_or_partial`.
    pub partials: bool,
    /// Interval between heartbeat pings on the event stream.
    pub heartbeat: Duration,
    /// Capacity of the domain event broadcast channel.
    pub event_buffer: usize,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            token: None,
            partials: false,
            heartbeat: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            event_buffer: DEFAULT_EVENT_BUFFER,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientOptions {
    /// Read options from environment variables.
    ///
    /// Environment variables:
    /// - `CHATSYNC_API_URL`: REST base URL (default: "http://localhost:8000")
    /// - `CHATSYNC_WS_URL`: event stream URL (default: "ws://localhost:9000")
    /// - `CHATSYNC_TOKEN`: session token (default: unset)
    /// - `CHATSYNC_PARTIALS`: "1" | "true" | "yes" to enable partial entities
    /// - `CHATSYNC_HEARTBEAT_SECS`: heartbeat interval (default: 30)
    /// - `CHATSYNC_EVENT_BUFFER`: domain event buffer size (default: 1024)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api_url: std::env::var("CHATSYNC_API_URL").unwrap_or(defaults.api_url),
            ws_url: std::env::var("CHATSYNC_WS_URL").unwrap_or(defaults.ws_url),
            token: std::env::var("CHATSYNC_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty()),
            partials: std::env::var("CHATSYNC_PARTIALS")
                .map(|value| parse_bool(&value))
                .unwrap_or(defaults.partials),
            heartbeat: std::env::var("CHATSYNC_HEARTBEAT_SECS")
                .ok()
                .and_then(|value| value.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat),
            event_buffer: std::env::var("CHATSYNC_EVENT_BUFFER")
                .ok()
                .and_then(|value| value.trim().parse().ok())
                .filter(|size: &usize| *size > 0)
                .unwrap_or(defaults.event_buffer),
            reconnect: defaults.reconnect,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_partials(mut self, partials: bool) -> Self {
        self.partials = partials;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.api_url, "http://localhost:8000");
        assert_eq!(options.ws_url, "ws://localhost:9000");
        assert!(options.token.is_none());
        assert!(!options.partials);
        assert_eq!(options.heartbeat, Duration::from_secs(30));
        assert_eq!(options.event_buffer, 1024);
    }

    #[test]
    fn builder_overrides() {
        let options = ClientOptions::default()
            .with_token("t0k")
            .with_partials(true)
            .with_api_url("https://api.example");
        assert_eq!(options.token.as_deref(), Some("t0k"));
        assert!(options.partials);
        assert_eq!(options.api_url, "https://api.example");
    }

    #[test]
    fn bool_parsing() {
        assert!(parse_bool("1"));
        assert!(parse_bool(" TRUE "));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("nope"));
    }
}
