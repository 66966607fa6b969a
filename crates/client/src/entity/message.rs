use chatsync_shared::{EntityKind, MessageData};
use chrono::{DateTime, Utc};

use super::{Changes, Channel, Entity, Handle, User};
use crate::collection::Collection;
use crate::events::ClientEvent;

/// A chat message. Messages are not fetchable by id alone; they arrive as
/// live events.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub channel: String,
    pub author: String,
    pub content: Option<String>,
    pub edited: Option<DateTime<Utc>>,
    pub mentions: Vec<String>,
    pub nonce: Option<String>,
    pub partial: bool,
}

impl Message {
    pub fn resolve_channel(&self, channels: &Collection<Channel>) -> Option<Handle<Channel>> {
        channels.get(&self.channel)
    }

    pub fn resolve_author(&self, users: &Collection<User>) -> Option<Handle<User>> {
        users.get(&self.author)
    }
}

impl Entity for Message {
    type Id = String;
    type Data = MessageData;

    const KIND: EntityKind = EntityKind::Message;

    fn id(&self) -> &String {
        &self.id
    }

    fn blank(id: String) -> Self {
        Self {
            id,
            channel: String::new(),
            author: String::new(),
            content: None,
            edited: None,
            mentions: Vec::new(),
            nonce: None,
            partial: true,
        }
    }

    fn hydrate(&mut self, data: MessageData) -> Changes {
        let mut changes = Changes::default();
        changes.set("channel", &mut self.channel, data.channel);
        changes.set("author", &mut self.author, data.author);
        changes.set_some("content", &mut self.content, data.content);
        changes.set_some("edited", &mut self.edited, data.edited);
        changes.set("mentions", &mut self.mentions, data.mentions);
        changes.set_some("nonce", &mut self.nonce, data.nonce);
        changes
    }

    fn clear(&mut self, field: &str, changes: &mut Changes) {
        if field == "content" {
            changes.clear("content", &mut self.content);
        }
    }

    fn is_partial(&self) -> bool {
        self.partial
    }

    fn set_partial(&mut self, partial: bool) {
        self.partial = partial;
    }

    fn created(entity: Handle<Self>) -> ClientEvent {
        ClientEvent::MessageCreate(entity)
    }

    fn updated(message: Handle<Self>, changes: Changes) -> ClientEvent {
        ClientEvent::MessageUpdate { message, changes }
    }

    fn deleted(id: String, message: Option<Handle<Self>>) -> ClientEvent {
        ClientEvent::MessageDelete { id, message }
    }
}
