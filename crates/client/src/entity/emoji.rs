use chatsync_shared::{EmojiData, EmojiParent, EntityKind};

use super::{segment, Changes, Entity, Handle, Server, User};
use crate::collection::Collection;
use crate::events::ClientEvent;

#[derive(Debug, Clone, PartialEq)]
pub struct Emoji {
    pub id: String,
    pub parent: EmojiParent,
    pub creator_id: String,
    pub name: String,
    pub animated: bool,
    pub nsfw: bool,
    pub partial: bool,
}

impl Emoji {
    /// Server the emoji belongs to, unless it was detached.
    pub fn server_id(&self) -> Option<&str> {
        match &self.parent {
            EmojiParent::Server { id } => Some(id.as_str()),
            EmojiParent::Detached => None,
        }
    }

    pub fn resolve_server(&self, servers: &Collection<Server>) -> Option<Handle<Server>> {
        servers.get(&self.server_id()?.to_string())
    }

    pub fn resolve_creator(&self, users: &Collection<User>) -> Option<Handle<User>> {
        users.get(&self.creator_id)
    }
}

impl Entity for Emoji {
    type Id = String;
    type Data = EmojiData;

    const KIND: EntityKind = EntityKind::Emoji;

    fn id(&self) -> &String {
        &self.id
    }

    fn blank(id: String) -> Self {
        Self {
            id,
            parent: EmojiParent::Detached,
            creator_id: String::new(),
            name: String::new(),
            animated: false,
            nsfw: false,
            partial: true,
        }
    }

    fn hydrate(&mut self, data: EmojiData) -> Changes {
        let mut changes = Changes::default();
        changes.set("parent", &mut self.parent, data.parent);
        changes.set("creator_id", &mut self.creator_id, data.creator_id);
        changes.set("name", &mut self.name, data.name);
        changes.set("animated", &mut self.animated, data.animated);
        changes.set("nsfw", &mut self.nsfw, data.nsfw);
        changes
    }

    fn clear(&mut self, _field: &str, _changes: &mut Changes) {}

    fn is_partial(&self) -> bool {
        self.partial
    }

    fn set_partial(&mut self, partial: bool) {
        self.partial = partial;
    }

    fn fetch_path(id: &String) -> Option<String> {
        Some(format!("/custom/emoji/{}", segment(id)))
    }

    fn created(entity: Handle<Self>) -> ClientEvent {
        ClientEvent::EmojiCreate(entity)
    }

    fn updated(emoji: Handle<Self>, changes: Changes) -> ClientEvent {
        ClientEvent::EmojiUpdate { emoji, changes }
    }

    fn deleted(id: String, emoji: Option<Handle<Self>>) -> ClientEvent {
        ClientEvent::EmojiDelete { id, emoji }
    }
}
