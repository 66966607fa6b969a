use chatsync_shared::{EntityKind, MemberData, MemberId};
use chrono::{DateTime, Utc};

use super::{segment, Changes, Entity, Handle, Server, User};
use crate::collection::Collection;
use crate::events::ClientEvent;

/// A user's membership in a server, keyed by the (server, user) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: MemberId,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub roles: Vec<String>,
    pub joined_at: Option<DateTime<Utc>>,
    pub partial: bool,
}

impl Member {
    pub fn resolve_server(&self, servers: &Collection<Server>) -> Option<Handle<Server>> {
        servers.get(&self.id.server)
    }

    pub fn resolve_user(&self, users: &Collection<User>) -> Option<Handle<User>> {
        users.get(&self.id.user)
    }
}

impl Entity for Member {
    type Id = MemberId;
    type Data = MemberData;

    const KIND: EntityKind = EntityKind::Member;

    fn id(&self) -> &MemberId {
        &self.id
    }

    fn blank(id: MemberId) -> Self {
        Self {
            id,
            nickname: None,
            avatar: None,
            roles: Vec::new(),
            joined_at: None,
            partial: true,
        }
    }

    fn hydrate(&mut self, data: MemberData) -> Changes {
        let mut changes = Changes::default();
        changes.set_some("nickname", &mut self.nickname, data.nickname);
        changes.set_some("avatar", &mut self.avatar, data.avatar);
        changes.set("roles", &mut self.roles, data.roles);
        changes.set_some("joined_at", &mut self.joined_at, data.joined_at);
        changes
    }

    fn clear(&mut self, field: &str, changes: &mut Changes) {
        match field {
            "nickname" => changes.clear("nickname", &mut self.nickname),
            "avatar" => changes.clear("avatar", &mut self.avatar),
            _ => {}
        }
    }

    fn is_partial(&self) -> bool {
        self.partial
    }

    fn set_partial(&mut self, partial: bool) {
        self.partial = partial;
    }

    fn fetch_path(id: &MemberId) -> Option<String> {
        Some(format!(
            "/servers/{}/members/{}",
            segment(&id.server),
            segment(&id.user)
        ))
    }

    fn created(entity: Handle<Self>) -> ClientEvent {
        ClientEvent::MemberCreate(entity)
    }

    fn updated(member: Handle<Self>, changes: Changes) -> ClientEvent {
        ClientEvent::MemberUpdate { member, changes }
    }

    fn deleted(id: MemberId, member: Option<Handle<Self>>) -> ClientEvent {
        ClientEvent::MemberDelete { id, member }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_path_uses_both_halves() {
        let id = MemberId::new("S1", "U1");
        assert_eq!(
            Member::fetch_path(&id).as_deref(),
            Some("/servers/S1/members/U1")
        );
    }

    #[test]
    fn nickname_can_be_cleared() {
        let mut member = Member::from_data(
            MemberId::new("S1", "U1"),
            MemberData {
                nickname: Some("nick".into()),
                roles: Some(vec!["R1".into()]),
                ..Default::default()
            },
        );

        let mut changes = Changes::default();
        member.clear("nickname", &mut changes);

        assert_eq!(member.nickname, None);
        assert_eq!(member.roles, vec!["R1"]);
        assert!(changes.contains("nickname"));
    }
}
