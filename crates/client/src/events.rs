//! Domain events emitted by the client after each cache mutation.

use chatsync_shared::MemberId;

use crate::entity::{Changes, Channel, Emoji, Handle, Member, Message, Server, User};

/// Event dispatched to listeners subscribed through [`crate::Client::subscribe`].
///
/// Create and update events carry the live handle; delete events carry the
/// identifier and, when it was cached, the now-orphaned instance.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Bootstrap finished; the cache reflects the server snapshot.
    Ready,
    /// The event channel was lost; the cache is no longer live.
    Disconnected,

    UserCreate(Handle<User>),
    UserUpdate { user: Handle<User>, changes: Changes },
    UserDelete { id: String, user: Option<Handle<User>> },

    ServerCreate(Handle<Server>),
    ServerUpdate { server: Handle<Server>, changes: Changes },
    ServerDelete { id: String, server: Option<Handle<Server>> },

    ChannelCreate(Handle<Channel>),
    ChannelUpdate { channel: Handle<Channel>, changes: Changes },
    ChannelDelete { id: String, channel: Option<Handle<Channel>> },

    MemberCreate(Handle<Member>),
    MemberUpdate { member: Handle<Member>, changes: Changes },
    MemberDelete { id: MemberId, member: Option<Handle<Member>> },

    EmojiCreate(Handle<Emoji>),
    EmojiUpdate { emoji: Handle<Emoji>, changes: Changes },
    EmojiDelete { id: String, emoji: Option<Handle<Emoji>> },

    MessageCreate(Handle<Message>),
    MessageUpdate { message: Handle<Message>, changes: Changes },
    MessageDelete { id: String, message: Option<Handle<Message>> },
}

impl ClientEvent {
    /// Listener-facing event name, e.g. `serverCreate`.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Ready => "ready",
            ClientEvent::Disconnected => "disconnected",
            ClientEvent::UserCreate(_) => "userCreate",
            ClientEvent::UserUpdate { .. } => "userUpdate",
            ClientEvent::UserDelete { .. } => "userDelete",
            ClientEvent::ServerCreate(_) => "serverCreate",
            ClientEvent::ServerUpdate { .. } => "serverUpdate",
            ClientEvent::ServerDelete { .. } => "serverDelete",
            ClientEvent::ChannelCreate(_) => "channelCreate",
            ClientEvent::ChannelUpdate { .. } => "channelUpdate",
            ClientEvent::ChannelDelete { .. } => "channelDelete",
            ClientEvent::MemberCreate(_) => "memberCreate",
            ClientEvent::MemberUpdate { .. } => "memberUpdate",
            ClientEvent::MemberDelete { .. } => "memberDelete",
            ClientEvent::EmojiCreate(_) => "emojiCreate",
            ClientEvent::EmojiUpdate { .. } => "emojiUpdate",
            ClientEvent::EmojiDelete { .. } => "emojiDelete",
            ClientEvent::MessageCreate(_) => "messageCreate",
            ClientEvent::MessageUpdate { .. } => "messageUpdate",
            ClientEvent::MessageDelete { .. } => "messageDelete",
        }
    }
}
