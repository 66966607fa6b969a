//! Chatsync - connects to a chat service and keeps a live in-memory cache.
//!
//! Configuration comes from `CHATSYNC_*` environment variables; every domain
//! event is logged as it is applied.

use std::sync::Arc;

use anyhow::Context;
use chatsync_client::{Client, ClientEvent, ClientOptions};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chatsync=info,chatsync_client=info")),
        )
        .init();

    let options = ClientOptions::from_env();
    tracing::info!(api = %options.api_url, ws = %options.ws_url, partials = options.partials, "starting");

    let client = Arc::new(Client::new(options));
    let mut events = client.subscribe();

    let logger = Arc::clone(&client);
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&logger, &event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    client.run().await.context("event stream ended")
}

fn log_event(client: &Client, event: &ClientEvent) {
    match event {
        ClientEvent::Ready => {
            let me = client
                .current_user()
                .map(|user| user.read().username.clone())
                .unwrap_or_default();
            tracing::info!(
                user = %me,
                servers = client.servers().len(),
                channels = client.channels().len(),
                "cache ready"
            );
        }
        ClientEvent::MessageCreate(message) => {
            let message = message.read();
            tracing::info!(channel = %message.channel, author = %message.author, "new message");
        }
        ClientEvent::ServerUpdate { server, changes } => {
            tracing::info!(server = %server.read().id, changes = ?changes.fields(), "server updated");
        }
        other => tracing::info!(event = other.name(), "event"),
    }
}
