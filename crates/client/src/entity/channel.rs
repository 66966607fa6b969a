use chatsync_shared::{ChannelData, ChannelType, EntityKind};

use super::{segment, Changes, Entity, Handle, Message, Server, User};
use crate::collection::Collection;
use crate::events::ClientEvent;

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: String,
    pub channel_type: ChannelType,
    /// Owning server, for server channels.
    pub server: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub recipients: Vec<String>,
    pub owner: Option<String>,
    pub last_message_id: Option<String>,
    pub nsfw: bool,
    pub partial: bool,
}

impl Channel {
    pub fn resolve_server(&self, servers: &Collection<Server>) -> Option<Handle<Server>> {
        servers.get(self.server.as_ref()?)
    }

    pub fn resolve_owner(&self, users: &Collection<User>) -> Option<Handle<User>> {
        users.get(self.owner.as_ref()?)
    }

    pub fn resolve_recipients(&self, users: &Collection<User>) -> Vec<Handle<User>> {
        self.recipients.iter().filter_map(|id| users.get(id)).collect()
    }

    pub fn resolve_last_message(&self, messages: &Collection<Message>) -> Option<Handle<Message>> {
        messages.get(self.last_message_id.as_ref()?)
    }
}

impl Entity for Channel {
    type Id = String;
    type Data = ChannelData;

    const KIND: EntityKind = EntityKind::Channel;

    fn id(&self) -> &String {
        &self.id
    }

    fn blank(id: String) -> Self {
        Self {
            id,
            channel_type: ChannelType::default(),
            server: None,
            name: None,
            description: None,
            recipients: Vec::new(),
            owner: None,
            last_message_id: None,
            nsfw: false,
            partial: true,
        }
    }

    fn hydrate(&mut self, data: ChannelData) -> Changes {
        let mut changes = Changes::default();
        changes.set("channel_type", &mut self.channel_type, data.channel_type);
        changes.set_some("server", &mut self.server, data.server);
        changes.set_some("name", &mut self.name, data.name);
        changes.set_some("description", &mut self.description, data.description);
        changes.set("recipients", &mut self.recipients, data.recipients);
        changes.set_some("owner", &mut self.owner, data.owner);
        changes.set_some("last_message_id", &mut self.last_message_id, data.last_message_id);
        changes.set("nsfw", &mut self.nsfw, data.nsfw);
        changes
    }

    fn clear(&mut self, field: &str, changes: &mut Changes) {
        match field {
            "description" => changes.clear("description", &mut self.description),
            "name" => changes.clear("name", &mut self.name),
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
        Some(format!("/channels/{}", segment(id)))
    }

    fn created(entity: Handle<Self>) -> ClientEvent {
        ClientEvent::ChannelCreate(entity)
    }

    fn updated(channel: Handle<Self>, changes: Changes) -> ClientEvent {
        ClientEvent::ChannelUpdate { channel, changes }
    }

    fn deleted(id: String, channel: Option<Handle<Self>>) -> ClientEvent {
        ClientEvent::ChannelDelete { id, channel }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_text_channel() {
        let channel = Channel::from_data(
            "C1".into(),
            ChannelData {
                server: Some("S1".into()),
                name: Some("general".into()),
                ..Default::default()
            },
        );
        assert_eq!(channel.channel_type, ChannelType::TextChannel);
        assert_eq!(channel.server.as_deref(), Some("S1"));
        assert!(!channel.partial);
    }

    #[test]
    fn direct_message_recipients() {
        let mut channel = Channel::blank("D1".into());
        let changes = channel.hydrate(ChannelData {
            channel_type: Some(ChannelType::DirectMessage),
            recipients: Some(vec!["U1".into(), "U2".into()]),
            ..Default::default()
        });

        assert_eq!(changes.fields(), &["channel_type", "recipients"]);
        assert_eq!(channel.recipients, vec!["U1", "U2"]);
        assert_eq!(channel.server, None);
    }
}
