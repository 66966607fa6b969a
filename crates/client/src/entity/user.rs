use chatsync_shared::{EntityKind, RelationshipStatus, UserData, UserStatus};

use super::{segment, Changes, Entity, Handle};
use crate::collection::Collection;
use crate::events::ClientEvent;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub relationship: RelationshipStatus,
    pub online: bool,
    pub status: Option<UserStatus>,
    /// Owner of this account when it is a bot.
    pub bot_owner: Option<String>,
    pub partial: bool,
}

impl User {
    /// Whether this is the account the session is authenticated as.
    pub fn is_self(&self) -> bool {
        self.relationship == RelationshipStatus::User
    }

    pub fn resolve_bot_owner(&self, users: &Collection<User>) -> Option<Handle<User>> {
        users.get(self.bot_owner.as_ref()?)
    }
}

impl Entity for User {
    type Id = String;
    type Data = UserData;

    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> &String {
        &self.id
    }

    fn blank(id: String) -> Self {
        Self {
            id,
            username: String::new(),
            display_name: None,
            avatar: None,
            relationship: RelationshipStatus::None,
            online: false,
            status: None,
            bot_owner: None,
            partial: true,
        }
    }

    fn hydrate(&mut self, data: UserData) -> Changes {
        let mut changes = Changes::default();
        changes.set("username", &mut self.username, data.username);
        changes.set_some("display_name", &mut self.display_name, data.display_name);
        changes.set_some("avatar", &mut self.avatar, data.avatar);
        changes.set("relationship", &mut self.relationship, data.relationship);
        changes.set("online", &mut self.online, data.online);
        changes.set_some("status", &mut self.status, data.status);
        changes.set_some("bot", &mut self.bot_owner, data.bot.map(|bot| bot.owner));
        changes
    }

    fn clear(&mut self, field: &str, changes: &mut Changes) {
        match field {
            "display_name" => changes.clear("display_name", &mut self.display_name),
            "avatar" => changes.clear("avatar", &mut self.avatar),
            "status" => changes.clear("status", &mut self.status),
            _ => {}
        }
    }

    fn is_partial(&self) -> bool {
        self.partial
    }

    fn set_partial(&mut self, partial: bool) {
        self.partial = partial;
    }

    fn fetch_path(id: &String) -> Option<String> {
        Some(format!("/users/{}", segment(id)))
    }

    fn created(entity: Handle<Self>) -> ClientEvent {
        ClientEvent::UserCreate(entity)
    }

    fn updated(user: Handle<Self>, changes: Changes) -> ClientEvent {
        ClientEvent::UserUpdate { user, changes }
    }

    fn deleted(id: String, user: Option<Handle<Self>>) -> ClientEvent {
        ClientEvent::UserDelete { id, user }
    }
}
