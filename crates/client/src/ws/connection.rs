//! Event stream connection using tokio-tungstenite.

use std::time::Duration;

use chatsync_shared::{ClientCommand, ServerEvent};
use chrono::Utc;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::connect_async;

use super::{ConnectionState, ReconnectConfig, TransportEvent, WsHandle};

const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

/// A managed connection to the event stream.
///
/// The background task reconnects according to its [`ReconnectConfig`] and
/// stops when the connection is dropped or the owner stops listening.
pub struct WsConnection {
    pub url: String,
    sender: UnboundedSender<ClientCommand>,
    task: JoinHandle<()>,
}

impl WsConnection {
    /// Start connecting to `url`, authenticating with `token` on every connect.
    pub fn connect(
        url: impl Into<String>,
        token: impl Into<String>,
        reconnect: ReconnectConfig,
        heartbeat: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let url = url.into();
        let (sender, commands) = unbounded();
        let (events, receiver) = mpsc::unbounded_channel();

        let task = tokio::spawn(connection_loop(
            url.clone(),
            token.into(),
            commands,
            events,
            reconnect,
            heartbeat.max(MIN_HEARTBEAT),
        ));

        (Self { url, sender, task }, receiver)
    }

    /// Get a handle for sending commands
    pub fn handle(&self) -> WsHandle {
        WsHandle::new(self.sender.clone(), self.url.clone())
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum SessionEnd {
    /// The socket went away; reconnect.
    Closed,
    /// Nobody is listening any more; stop for good.
    Shutdown,
}

async fn connection_loop(
    url: String,
    token: String,
    mut commands: UnboundedReceiver<ClientCommand>,
    events: mpsc::UnboundedSender<TransportEvent>,
    reconnect: ReconnectConfig,
    heartbeat: Duration,
) {
    let report = |state: ConnectionState| events.send(TransportEvent::StateChange(state)).is_ok();
    let mut attempt = 0u32;

    loop {
        let state = if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting { attempt }
        };
        if !report(state) {
            return;
        }

        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                attempt = 0;
                tracing::info!(%url, "event stream connected");
                if !report(ConnectionState::Connected) {
                    return;
                }

                let end = run_session(stream, &token, &mut commands, &events, heartbeat).await;
                tracing::info!(%url, "event stream closed");
                if matches!(end, SessionEnd::Shutdown) || !report(ConnectionState::Disconnected) {
                    return;
                }

                let delay = reconnect.delay_for_attempt(0);
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, attempt, "event stream connect failed");

                if reconnect.exhausted(attempt) {
                    report(ConnectionState::Failed {
                        reason: format!(
                            "max reconnect attempts ({}) exceeded",
                            reconnect.max_attempts
                        ),
                    });
                    return;
                }

                let delay = reconnect.delay_for_attempt(attempt);
                tracing::info!(%url, delay_ms = delay, attempt = attempt + 1, "reconnecting");
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
                attempt += 1;
            }
        }
    }
}

/// Drive one connected socket: authenticate, then multiplex inbound frames,
/// queued commands and heartbeats until either side goes away.
async fn run_session<S>(
    stream: S,
    token: &str,
    commands: &mut UnboundedReceiver<ClientCommand>,
    events: &mpsc::UnboundedSender<TransportEvent>,
    heartbeat: Duration,
) -> SessionEnd
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    let (mut write, mut read) = stream.split();

    let auth = ClientCommand::Authenticate {
        token: token.to_string(),
    };
    if let Err(e) = send_command(&mut write, &auth).await {
        tracing::warn!(error = %e, "failed to authenticate");
        return SessionEnd::Closed;
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerEvent>(text.as_str()) {
                        Ok(event) => {
                            if events.send(TransportEvent::Event(event)).is_err() {
                                return SessionEnd::Shutdown;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "dropping malformed frame"),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "received close frame");
                    return SessionEnd::Closed;
                }
                // Pong replies to protocol pings are handled by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "event stream read error");
                    return SessionEnd::Closed;
                }
                None => return SessionEnd::Closed,
            },
            cmd = commands.next() => match cmd {
                Some(cmd) => {
                    if let Err(e) = send_command(&mut write, &cmd).await {
                        tracing::warn!(error = %e, "send failed");
                        return SessionEnd::Closed;
                    }
                }
                None => {
                    let _ = write.close().await;
                    return SessionEnd::Shutdown;
                }
            },
            _ = ticker.tick() => {
                let ping = ClientCommand::Ping {
                    data: Utc::now().timestamp_millis().max(0) as u64,
                };
                if let Err(e) = send_command(&mut write, &ping).await {
                    tracing::warn!(error = %e, "heartbeat failed");
                    return SessionEnd::Closed;
                }
            }
        }
    }
}

async fn send_command<W>(write: &mut W, cmd: &ClientCommand) -> Result<(), String>
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    let json = serde_json::to_string(cmd).map_err(|e| format!("serialize failed: {e}"))?;
    tracing::trace!(%json, "sending");
    write
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| e.to_string())
}
