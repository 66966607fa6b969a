//! Chatsync client - in-memory cache and real-time sync engine
//!
//! This crate keeps an identity-preserving object graph of users, servers,
//! channels, members, emojis and messages consistent with a chat service:
//! a bulk `Ready` snapshot first, then incremental events over a WebSocket.

pub mod api_client;
pub mod client;
pub mod collection;
pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod ws;

#[cfg(test)]
pub(crate) mod testing;

pub use api_client::{ApiClient, RequestHandler};
pub use client::{Client, SyncState};
pub use collection::Collection;
pub use config::ClientOptions;
pub use entity::{Changes, Channel, Emoji, Entity, Handle, Member, Message, Server, User};
pub use error::ClientError;
pub use events::ClientEvent;
pub use ws::{ConnectionState, ReconnectConfig, TransportEvent, WsConnection, WsHandle};
