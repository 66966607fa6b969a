//! The top-level sync engine.
//!
//! [`Client`] owns one [`Collection`] per entity kind, runs the bootstrap
//! state machine when the `Ready` snapshot arrives, and turns each live
//! `Create`/`Update`/`Delete` into a cache mutation followed by a domain
//! event. Events are applied one at a time in arrival order.

use std::sync::Arc;

use chatsync_shared::{
    CreateServerRequest, CreateServerResponse, EntityKind, ReadyPayload, ServerEvent,
};
use parking_lot::{Mutex, RwLock};
use reqwest::Method;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::api_client::{ApiClient, RequestHandler};
use crate::collection::Collection;
use crate::config::ClientOptions;
use crate::entity::{
    segment, Changes, Channel, Emoji, Entity, Handle, Member, Message, Server, User,
};
use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::ws::{ConnectionState, TransportEvent, WsConnection, WsHandle};

/// Bootstrap state. `Ready` is entered only after a complete snapshot load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Disconnected,
    Connecting,
    Ready,
}

pub struct Client {
    options: ClientOptions,
    api: Arc<dyn RequestHandler>,

    users: Collection<User>,
    servers: Collection<Server>,
    channels: Collection<Channel>,
    members: Collection<Member>,
    emojis: Collection<Emoji>,
    messages: Collection<Message>,

    state: RwLock<SyncState>,
    ready: watch::Sender<bool>,
    current_user: RwLock<Option<Handle<User>>>,
    events: broadcast::Sender<ClientEvent>,
    connection: Mutex<Option<WsHandle>>,
}

impl Client {
    /// Client backed by the HTTP API at `options.api_url`.
    pub fn new(options: ClientOptions) -> Self {
        let api = ApiClient::new()
            .with_base_url(options.api_url.clone())
            .with_token(options.token.clone());
        Self::with_api(options, Arc::new(api))
    }

    /// Client backed by a custom request handler.
    pub fn with_api(options: ClientOptions, api: Arc<dyn RequestHandler>) -> Self {
        let (events, _) = broadcast::channel(options.event_buffer.max(1));
        let (ready, _) = watch::channel(false);
        let partials = options.partials;

        Self {
            users: Collection::new(Arc::clone(&api), events.clone(), partials),
            servers: Collection::new(Arc::clone(&api), events.clone(), partials),
            channels: Collection::new(Arc::clone(&api), events.clone(), partials),
            members: Collection::new(Arc::clone(&api), events.clone(), partials),
            emojis: Collection::new(Arc::clone(&api), events.clone(), partials),
            messages: Collection::new(Arc::clone(&api), events.clone(), partials),
            options,
            api,
            state: RwLock::new(SyncState::Disconnected),
            ready,
            current_user: RwLock::new(None),
            events,
            connection: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn users(&self) -> &Collection<User> {
        &self.users
    }

    pub fn servers(&self) -> &Collection<Server> {
        &self.servers
    }

    pub fn channels(&self) -> &Collection<Channel> {
        &self.channels
    }

    pub fn members(&self) -> &Collection<Member> {
        &self.members
    }

    pub fn emojis(&self) -> &Collection<Emoji> {
        &self.emojis
    }

    pub fn messages(&self) -> &Collection<Message> {
        &self.messages
    }

    /// Domain events, starting from the next one emitted.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Observable ready flag.
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// The session's own account, bound during bootstrap.
    pub fn current_user(&self) -> Option<Handle<User>> {
        self.current_user.read().clone()
    }

    /// Handle to the live event stream while [`Client::run`] is connected.
    pub fn connection(&self) -> Option<WsHandle> {
        self.connection.lock().clone()
    }

    /// Cached members of `server`.
    pub fn members_of(&self, server: &str) -> Vec<Handle<Member>> {
        self.members
            .values()
            .into_iter()
            .filter(|member| member.read().id.server == server)
            .collect()
    }

    /// Connect the event stream and apply events until the transport gives up.
    ///
    /// Malformed events are logged and skipped. Returns the transport error
    /// that ended the stream.
    pub async fn run(&self) -> Result<(), ClientError> {
        let token = self
            .options
            .token
            .clone()
            .ok_or(ClientError::Unauthenticated)?;

        let (connection, mut transport) = WsConnection::connect(
            self.options.ws_url.clone(),
            token,
            self.options.reconnect.clone(),
            self.options.heartbeat,
        );
        *self.connection.lock() = Some(connection.handle());

        let result = loop {
            let Some(event) = transport.recv().await else {
                break Err(ClientError::transport("event stream closed"));
            };

            match self.handle(event) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => break Err(e),
                Err(e) => tracing::warn!(error = %e, "skipping event"),
            }
        };

        *self.connection.lock() = None;
        self.disconnect();
        drop(connection);
        result
    }

    /// Apply one transport notification.
    pub fn handle(&self, event: TransportEvent) -> Result<(), ClientError> {
        match event {
            TransportEvent::StateChange(state) => self.on_state_change(state),
            TransportEvent::Event(event) => self.handle_event(event),
        }
    }

    /// Apply one inbound event to the cache.
    ///
    /// A malformed event leaves the cache untouched and returns
    /// [`ClientError::MalformedPayload`]; the stream stays usable.
    pub fn handle_event(&self, event: ServerEvent) -> Result<(), ClientError> {
        match event {
            ServerEvent::Authenticated => {
                tracing::debug!("authenticated");
                Ok(())
            }
            ServerEvent::Ready(ready) => {
                self.bootstrap(ready);
                Ok(())
            }
            ServerEvent::Create { kind, data } => {
                tracing::debug!(%kind, "create");
                self.on_create(kind, data)
            }
            ServerEvent::Update {
                kind,
                id,
                data,
                clear,
            } => {
                tracing::debug!(%kind, %id, "update");
                self.on_update(kind, id, data, &clear)
            }
            ServerEvent::Delete { kind, id } => {
                tracing::debug!(%kind, %id, "delete");
                self.on_delete(kind, id)
            }
            ServerEvent::Pong { data } => {
                tracing::trace!(data, "pong");
                Ok(())
            }
            ServerEvent::Error { error } => {
                tracing::warn!(%error, "server reported error");
                Ok(())
            }
            ServerEvent::Unknown => {
                tracing::debug!("ignoring unknown event");
                Ok(())
            }
        }
    }

    /// Create a server through the API and cache it with its channels.
    pub async fn create_server(
        &self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<Handle<Server>, ClientError> {
        let request = CreateServerRequest {
            name: name.into(),
            description,
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| ClientError::malformed(EntityKind::Server, e))?;

        let raw = self
            .api
            .request(Method::POST, "/servers/create", Some(body))
            .await?;
        let response: CreateServerResponse =
            serde_json::from_value(raw).map_err(|e| ClientError::malformed(EntityKind::Server, e))?;

        let server = self
            .servers
            .upsert(response.server.id, response.server.data, true);
        for raw in response.channels {
            let channel = self.channels.upsert(raw.id, raw.data, true);
            self.link_channel(&channel, true);
        }

        tracing::info!(server = %server.read().id, "created server");
        Ok(server)
    }

    /// Leave (or delete, when owned) a server, then drop it from the cache
    /// together with its channels and members.
    pub async fn leave_server(&self, id: &str) -> Result<(), ClientError> {
        self.api
            .request(Method::DELETE, &format!("/servers/{}", segment(id)), None)
            .await?;
        self.remove_server(id);
        tracing::info!(server = %id, "left server");
        Ok(())
    }

    fn on_state_change(&self, state: ConnectionState) -> Result<(), ClientError> {
        match state {
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => {
                if self.state() == SyncState::Ready {
                    self.disconnect();
                }
                self.set_state(SyncState::Connecting);
                Ok(())
            }
            // Authenticated at the transport level; still waiting on Ready.
            ConnectionState::Connected => Ok(()),
            ConnectionState::Disconnected => {
                self.disconnect();
                Ok(())
            }
            ConnectionState::Failed { reason } => {
                self.disconnect();
                Err(ClientError::transport(reason))
            }
        }
    }

    fn set_state(&self, next: SyncState) {
        let previous = std::mem::replace(&mut *self.state.write(), next);
        if previous != next {
            tracing::info!(from = ?previous, to = ?next, "sync state");
        }
    }

    /// Drop back to `Disconnected`. The cache is kept but no longer live;
    /// listeners hear about it only when it was ready.
    fn disconnect(&self) {
        let previous = std::mem::replace(&mut *self.state.write(), SyncState::Disconnected);
        self.ready.send_if_modified(|ready| std::mem::replace(ready, false));

        if previous != SyncState::Disconnected {
            tracing::info!(from = ?previous, "sync state disconnected");
        }
        if previous == SyncState::Ready {
            self.emit(ClientEvent::Disconnected);
        }
    }

    /// Load the snapshot silently in dependency order, then flip ready.
    fn bootstrap(&self, ready: ReadyPayload) {
        let users = load(&self.users, ready.users);
        load(&self.servers, ready.servers);
        load(&self.members, ready.members);
        for channel in load(&self.channels, ready.channels) {
            self.link_channel(&channel, false);
        }
        load(&self.emojis, ready.emojis);

        let me = users.into_iter().find(|user| user.read().is_self());
        match &me {
            Some(user) => tracing::debug!(user = %user.read().id, "bound current user"),
            None => tracing::warn!("snapshot did not include the session user"),
        }
        *self.current_user.write() = me;

        self.set_state(SyncState::Ready);
        let edge = self.ready.send_if_modified(|ready| !std::mem::replace(ready, true));
        if edge {
            tracing::info!(
                users = self.users.len(),
                servers = self.servers.len(),
                channels = self.channels.len(),
                "ready"
            );
            self.emit(ClientEvent::Ready);
        }
    }

    fn on_create(&self, kind: EntityKind, data: Value) -> Result<(), ClientError> {
        match kind {
            EntityKind::User => {
                self.users.insert_raw(data, true)?;
            }
            EntityKind::Server => {
                self.servers.insert_raw(data, true)?;
            }
            EntityKind::Channel => {
                let channel = self.channels.insert_raw(data, true)?;
                self.link_channel(&channel, true);
            }
            EntityKind::Member => {
                self.members.insert_raw(data, true)?;
            }
            EntityKind::Emoji => {
                self.emojis.insert_raw(data, true)?;
            }
            EntityKind::Message => {
                let message = self.messages.insert_raw(data, true)?;
                self.touch_last_message(&message);
            }
            EntityKind::Unknown => tracing::debug!("ignoring create of unknown kind"),
        }
        Ok(())
    }

    fn on_update(
        &self,
        kind: EntityKind,
        id: Value,
        data: Value,
        clear: &[String],
    ) -> Result<(), ClientError> {
        match kind {
            EntityKind::User => patch(&self.users, id, data, clear).map(drop),
            EntityKind::Server => patch(&self.servers, id, data, clear).map(drop),
            EntityKind::Channel => {
                let previous = self
                    .channels
                    .get(&parse_id::<Channel>(id.clone())?)
                    .and_then(|channel| channel.read().server.clone());
                let (channel, _) = patch(&self.channels, id, data, clear)?;

                let (channel_id, current) = {
                    let channel = channel.read();
                    (channel.id.clone(), channel.server.clone())
                };
                // Moved between servers.
                if previous.is_some() && previous != current {
                    self.unlink_channel(&channel_id);
                }
                self.link_channel(&channel, true);
                Ok(())
            }
            EntityKind::Member => patch(&self.members, id, data, clear).map(drop),
            EntityKind::Emoji => patch(&self.emojis, id, data, clear).map(drop),
            EntityKind::Message => {
                let (message, created) = patch(&self.messages, id, data, clear)?;
                if created {
                    self.touch_last_message(&message);
                }
                Ok(())
            }
            EntityKind::Unknown => {
                tracing::debug!("ignoring update of unknown kind");
                Ok(())
            }
        }
    }

    fn on_delete(&self, kind: EntityKind, id: Value) -> Result<(), ClientError> {
        match kind {
            EntityKind::User => remove(&self.users, id).map(drop),
            EntityKind::Server => remove(&self.servers, id).map(drop),
            EntityKind::Channel => {
                let (id, _) = remove(&self.channels, id)?;
                self.unlink_channel(&id);
                Ok(())
            }
            EntityKind::Member => remove(&self.members, id).map(drop),
            EntityKind::Emoji => remove(&self.emojis, id).map(drop),
            EntityKind::Message => remove(&self.messages, id).map(drop),
            EntityKind::Unknown => {
                tracing::debug!("ignoring delete of unknown kind");
                Ok(())
            }
        }
    }

    /// Add a server channel to its server's channel list.
    fn link_channel(&self, channel: &Handle<Channel>, notify: bool) {
        let (id, server_id) = {
            let channel = channel.read();
            match &channel.server {
                Some(server) => (channel.id.clone(), server.clone()),
                None => return,
            }
        };
        let Some(server) = self.servers.get(&server_id) else {
            return;
        };

        let added = server.write().add_channel(&id);
        if added && notify {
            let mut changes = Changes::default();
            changes.mark("channels");
            self.emit(Server::updated(server, changes));
        }
    }

    fn unlink_channel(&self, channel: &str) {
        for server in self.servers.values() {
            if server.write().remove_channel(channel) {
                let mut changes = Changes::default();
                changes.mark("channels");
                self.emit(Server::updated(server, changes));
            }
        }
    }

    fn touch_last_message(&self, message: &Handle<Message>) {
        let (id, channel_id) = {
            let message = message.read();
            (message.id.clone(), message.channel.clone())
        };
        let Some(channel) = self.channels.get(&channel_id) else {
            return;
        };

        let mut changes = Changes::default();
        changes.set_some(
            "last_message_id",
            &mut channel.write().last_message_id,
            Some(id),
        );
        if !changes.is_empty() {
            self.emit(Channel::updated(channel, changes));
        }
    }

    fn remove_server(&self, id: &str) {
        let channels = self
            .channels
            .retain(|channel| channel.server.as_deref() != Some(id));
        announce_removed(&self.channels, channels);

        let members = self.members.retain(|member| member.id.server != id);
        announce_removed(&self.members, members);

        let server = self.servers.delete(&id.to_string());
        self.emit(Server::deleted(id.to_string(), server));
    }

    fn emit(&self, event: ClientEvent) {
        tracing::trace!(event = event.name(), "emit");
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("users", &self.users.len())
            .field("servers", &self.servers.len())
            .field("channels", &self.channels.len())
            .finish_non_exhaustive()
    }
}

/// Silently upsert every well-formed record; malformed ones are skipped.
fn load<E: Entity>(collection: &Collection<E>, records: Vec<Value>) -> Vec<Handle<E>> {
    let mut loaded = Vec::with_capacity(records.len());
    for raw in records {
        match collection.insert_raw(raw, false) {
            Ok(handle) => loaded.push(handle),
            Err(e) => tracing::warn!(kind = %E::KIND, error = %e, "skipping snapshot record"),
        }
    }
    loaded
}

fn parse_id<E: Entity>(id: Value) -> Result<E::Id, ClientError> {
    serde_json::from_value(id).map_err(|e| ClientError::malformed(E::KIND, e))
}

/// Apply a live patch. The flag reports whether it announced a new entity.
fn patch<E: Entity>(
    collection: &Collection<E>,
    id: Value,
    data: Value,
    clear: &[String],
) -> Result<(Handle<E>, bool), ClientError> {
    let id = parse_id::<E>(id)?;
    // A patch that only clears fields may arrive without data.
    let data: E::Data = if data.is_null() {
        E::Data::default()
    } else {
        serde_json::from_value(data).map_err(|e| ClientError::malformed(E::KIND, e))?
    };
    Ok(collection.update(id, data, clear))
}

fn remove<E: Entity>(
    collection: &Collection<E>,
    id: Value,
) -> Result<(E::Id, Option<Handle<E>>), ClientError> {
    let id: E::Id = parse_id::<E>(id)?;
    let removed = collection.delete(&id);
    collection.emit(E::deleted(id.clone(), removed.clone()));
    Ok((id, removed))
}

/// Emit a delete event for each entity already taken out of `collection`.
fn announce_removed<E: Entity>(collection: &Collection<E>, removed: Vec<Handle<E>>) {
    for handle in removed {
        let id = handle.read().id().clone();
        collection.emit(E::deleted(id, Some(handle)));
    }
}
