//! WebSocket collaborator: the duplex event channel the sync engine consumes.
//!
//! ```text
//!   WsConnection (tokio task, reconnects)
//!        │ TransportEvent
//!        ▼
//!   Client::handle ──► Collections ──► broadcast<ClientEvent>
//! ```
//!
//! The connection authenticates on every (re)connect and keeps the stream
//! alive with heartbeat pings. It never touches the cache itself.

use chatsync_shared::{ClientCommand, ServerEvent};
use futures_channel::mpsc::UnboundedSender;

use crate::error::ClientError;

mod connection;

pub use connection::WsConnection;

/// Connection state for the event stream
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }

    /// Whether `attempt` failed connects exhaust the budget.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// What the connection task reports to its owner, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    StateChange(ConnectionState),
    Event(ServerEvent),
}

/// Handle for sending commands through the connection
#[derive(Debug, Clone)]
pub struct WsHandle {
    sender: UnboundedSender<ClientCommand>,
    pub url: String,
}

impl WsHandle {
    pub(crate) fn new(sender: UnboundedSender<ClientCommand>, url: String) -> Self {
        Self { sender, url }
    }

    /// Queue a command for the current connection.
    pub fn send(&self, cmd: ClientCommand) -> Result<(), ClientError> {
        tracing::debug!(url = %self.url, ?cmd, "queue command");
        self.sender
            .unbounded_send(cmd)
            .map_err(|e| ClientError::transport(format!("failed to send: {e}")))
    }

    pub fn ping(&self, data: u64) -> Result<(), ClientError> {
        self.send(ClientCommand::Ping { data })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_channel::mpsc::unbounded;
    use futures_util::StreamExt;

    #[test]
    fn backoff_grows_and_caps() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(0), 1000);
        assert_eq!(config.delay_for_attempt(1), 1500);
        assert_eq!(config.delay_for_attempt(20), 30000);
    }

    #[test]
    fn zero_attempts_never_exhausts() {
        let config = ReconnectConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(!config.exhausted(1_000));
        assert!(ReconnectConfig::default().exhausted(10));
        assert!(!ReconnectConfig::default().exhausted(9));
    }

    #[test]
    fn connecting_states() {
        assert!(ConnectionState::Reconnecting { attempt: 2 }.is_connecting());
        assert!(ConnectionState::Connecting.is_connecting());
        assert!(!ConnectionState::Connected.is_connecting());
        assert!(ConnectionState::Connected.is_connected());
    }

    #[tokio::test]
    async fn handle_queues_commands() {
        let (tx, mut rx) = unbounded();
        let handle = WsHandle::new(tx, "ws://localhost:9000".into());

        handle.ping(7).unwrap();

        assert_eq!(rx.next().await, Some(ClientCommand::Ping { data: 7 }));
    }

    #[test]
    fn send_after_close_is_transport_error() {
        let (tx, rx) = unbounded();
        let handle = WsHandle::new(tx, "ws://localhost:9000".into());
        drop(rx);

        let err = handle.ping(1).unwrap_err();
        assert!(err.is_fatal());
        assert!(handle.is_closed());
    }
}
