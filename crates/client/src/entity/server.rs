use chatsync_shared::{EntityKind, ServerData};

use super::{segment, Changes, Channel, Entity, Handle, User};
use crate::collection::Collection;
use crate::events::ClientEvent;

#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub channels: Vec<String>,
    pub icon: Option<String>,
    pub default_permissions: u64,
    pub nsfw: bool,
    pub partial: bool,
}

impl Server {
    pub fn resolve_owner(&self, users: &Collection<User>) -> Option<Handle<User>> {
        users.get(&self.owner)
    }

    /// Cached channels of this server, in server order. Unloaded ids are skipped.
    pub fn resolve_channels(&self, channels: &Collection<Channel>) -> Vec<Handle<Channel>> {
        self.channels.iter().filter_map(|id| channels.get(id)).collect()
    }

    pub(crate) fn add_channel(&mut self, channel: &str) -> bool {
        if self.channels.iter().any(|id| id == channel) {
            return false;
        }
        self.channels.push(channel.to_string());
        true
    }

    pub(crate) fn remove_channel(&mut self, channel: &str) -> bool {
        let before = self.channels.len();
        self.channels.retain(|id| id != channel);
        self.channels.len() != before
    }
}

impl Entity for Server {
    type Id = String;
    type Data = ServerData;

    const KIND: EntityKind = EntityKind::Server;

    fn id(&self) -> &String {
        &self.id
    }

    fn blank(id: String) -> Self {
        Self {
            id,
            owner: String::new(),
            name: String::new(),
            description: None,
            channels: Vec::new(),
            icon: None,
            default_permissions: 0,
            nsfw: false,
            partial: true,
        }
    }

    fn hydrate(&mut self, data: ServerData) -> Changes {
        let mut changes = Changes::default();
        changes.set("owner", &mut self.owner, data.owner);
        changes.set("name", &mut self.name, data.name);
        changes.set_some("description", &mut self.description, data.description);
        changes.set("channels", &mut self.channels, data.channels);
        changes.set_some("icon", &mut self.icon, data.icon);
        changes.set(
            "default_permissions",
            &mut self.default_permissions,
            data.default_permissions,
        );
        changes.set("nsfw", &mut self.nsfw, data.nsfw);
        changes
    }

    fn clear(&mut self, field: &str, changes: &mut Changes) {
        match field {
            "description" => changes.clear("description", &mut self.description),
            "icon" => changes.clear("icon", &mut self.icon),
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
        Some(format!("/servers/{}", segment(id)))
    }

    fn created(entity: Handle<Self>) -> ClientEvent {
        ClientEvent::ServerCreate(entity)
    }

    fn updated(server: Handle<Self>, changes: Changes) -> ClientEvent {
        ClientEvent::ServerUpdate { server, changes }
    }

    fn deleted(id: String, server: Option<Handle<Self>>) -> ClientEvent {
        ClientEvent::ServerDelete { id, server }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hydrate_replaces_channel_list() {
        let mut server = Server::from_data(
            "S1".into(),
            ServerData {
                owner: Some("U1".into()),
                name: Some("Lounge".into()),
                channels: Some(vec!["C1".into()]),
                ..Default::default()
            },
        );

        let changes = server.hydrate(ServerData {
            channels: Some(vec!["C1".into(), "C2".into()]),
            ..Default::default()
        });

        assert_eq!(changes.fields(), &["channels"]);
        assert_eq!(server.channels, vec!["C1", "C2"]);
        assert_eq!(server.owner, "U1");
    }

    #[test]
    fn channel_list_helpers_dedupe() {
        let mut server = Server::blank("S1".into());
        assert!(server.add_channel("C1"));
        assert!(!server.add_channel("C1"));
        assert!(server.remove_channel("C1"));
        assert!(!server.remove_channel("C1"));
        assert!(server.channels.is_empty());
    }

    #[test]
    fn blank_is_partial_with_defaults() {
        let server = Server::blank("S9".into());
        assert!(server.partial);
        assert_eq!(server.id, "S9");
        assert!(server.name.is_empty());
        assert_eq!(server.default_permissions, 0);
    }
}
