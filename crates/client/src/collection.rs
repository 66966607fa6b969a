//! Identity-mapped store for one entity kind.
//!
//! At most one instance exists per identifier. Every write to a known
//! identifier hydrates that instance in place, so handles obtained earlier
//! keep observing the latest state. Locks are held for the duration of one
//! map operation and never across an await.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chatsync_shared::{ApiError, Record};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use reqwest::Method;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::api_client::RequestHandler;
use crate::entity::{Entity, Handle};
use crate::error::ClientError;
use crate::events::ClientEvent;

type PendingFetch = Shared<BoxFuture<'static, Result<Value, ApiError>>>;

pub struct Collection<E: Entity> {
    entries: RwLock<HashMap<E::Id, Handle<E>>>,
    in_flight: Mutex<HashMap<E::Id, PendingFetch>>,
    /// Placeholders inserted by `get_or_partial` that no listener has heard of.
    unannounced: Mutex<HashSet<E::Id>>,
    api: Arc<dyn RequestHandler>,
    events: broadcast::Sender<ClientEvent>,
    partials: bool,
}

impl<E: Entity> Collection<E> {
    pub(crate) fn new(
        api: Arc<dyn RequestHandler>,
        events: broadcast::Sender<ClientEvent>,
        partials: bool,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            unannounced: Mutex::new(HashSet::new()),
            api,
            events,
            partials,
        }
    }

    /// Cached entity for `id`. Never fetches.
    pub fn get(&self, id: &E::Id) -> Option<Handle<E>> {
        self.entries.read().get(id).cloned()
    }

    pub fn has(&self, id: &E::Id) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn ids(&self) -> Vec<E::Id> {
        self.entries.read().keys().cloned().collect()
    }

    /// Handles to every cached entity, in no particular order.
    pub fn values(&self) -> Vec<Handle<E>> {
        self.entries.read().values().cloned().collect()
    }

    /// Return the cached entity, or build one from `data` and insert it.
    ///
    /// An existing entity is returned unchanged. A new entity emits its
    /// creation event only when `is_new` is set; bootstrap passes `false`.
    pub fn get_or_create(&self, id: E::Id, data: E::Data, is_new: bool) -> Handle<E> {
        self.get_or_insert(id, data, is_new).0
    }

    /// Like [`Collection::get_or_create`], but hydrates an already cached
    /// entity in place so the latest write wins on the single instance.
    ///
    /// Emits an update event for in-place hydration only when `is_new` is set.
    /// A silent placeholder completed this way is announced as created.
    pub fn upsert(&self, id: E::Id, data: E::Data, is_new: bool) -> Handle<E> {
        // Creation consumes the payload, so look up first to keep `data` for the
        // in-place path.
        if let Some(existing) = self.get(&id) {
            let changes = {
                let mut entity = existing.write();
                let changes = entity.hydrate(data);
                entity.set_partial(false);
                changes
            };
            let placeholder = self.unannounced.lock().remove(&id);
            if is_new && placeholder {
                self.emit(E::created(existing.clone()));
            } else if is_new {
                self.emit(E::updated(existing.clone(), changes));
            }
            return existing;
        }

        self.get_or_insert(id, data, is_new).0
    }

    /// Decode a full wire record and upsert it.
    pub fn insert_raw(&self, raw: Value, is_new: bool) -> Result<Handle<E>, ClientError> {
        let record: Record<E::Id, E::Data> =
            serde_json::from_value(raw).map_err(|e| ClientError::malformed(E::KIND, e))?;
        Ok(self.upsert(record.id, record.data, is_new))
    }

    /// Cached entity, or a placeholder with only the identifier set when
    /// partials are enabled. Never issues a request.
    pub fn get_or_partial(&self, id: &E::Id) -> Option<Handle<E>> {
        if let Some(existing) = self.get(id) {
            return Some(existing);
        }
        if !self.partials {
            return None;
        }

        let mut entries = self.entries.write();
        let handle = entries.entry(id.clone()).or_insert_with(|| {
            self.unannounced.lock().insert(id.clone());
            Handle::new(E::blank(id.clone()))
        });
        Some(handle.clone())
    }

    /// Apply a partial patch and clear the named fields.
    ///
    /// An unknown identifier is created from the patch, flagged partial, and
    /// announced with a creation event instead of being dropped. Returns the
    /// entity and whether listeners were told it was created.
    pub fn update(&self, id: E::Id, data: E::Data, clear: &[String]) -> (Handle<E>, bool) {
        if let Some(existing) = self.get(&id) {
            let changes = {
                let mut entity = existing.write();
                let mut changes = entity.hydrate(data);
                for field in clear {
                    entity.clear(field, &mut changes);
                }
                changes
            };
            if self.unannounced.lock().remove(&id) {
                self.emit(E::created(existing.clone()));
                return (existing, true);
            }
            self.emit(E::updated(existing.clone(), changes));
            return (existing, false);
        }

        let (handle, created) = {
            let mut entries = self.entries.write();
            match entries.get(&id) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let mut entity = E::blank(id.clone());
                    entity.hydrate(data);
                    let handle = Handle::new(entity);
                    entries.insert(id.clone(), handle.clone());
                    (handle, true)
                }
            }
        };

        if created {
            tracing::debug!(kind = %E::KIND, %id, "update for unknown id, created partial");
            self.emit(E::created(handle.clone()));
        }
        (handle, created)
    }

    /// Remove the entity. A handle already held by a caller stays readable
    /// but is no longer reachable through the collection.
    pub fn delete(&self, id: &E::Id) -> Option<Handle<E>> {
        let removed = self.entries.write().remove(id);
        self.unannounced.lock().remove(id);
        removed
    }

    /// Remove every entity for which `keep` returns false; returns the removed ones.
    pub fn retain(&self, mut keep: impl FnMut(&E) -> bool) -> Vec<Handle<E>> {
        let mut entries = self.entries.write();
        let removed: Vec<E::Id> = entries
            .iter()
            .filter(|(_, handle)| !keep(&handle.read()))
            .map(|(id, _)| id.clone())
            .collect();

        let mut unannounced = self.unannounced.lock();
        removed
            .iter()
            .filter_map(|id| {
                unannounced.remove(id);
                entries.remove(id)
            })
            .collect()
    }

    /// Cached entity, or one request to the API for it.
    ///
    /// A partial entity is refreshed and hydrated in place. Concurrent calls
    /// for the same identifier share a single request.
    pub async fn fetch(&self, id: &E::Id) -> Result<Handle<E>, ClientError> {
        if let Some(existing) = self.get(id) {
            if !existing.read().is_partial() {
                return Ok(existing);
            }
        }

        let path = E::fetch_path(id).ok_or_else(|| ClientError::NotFound {
            kind: E::KIND,
            id: id.to_string(),
        })?;

        let pending = {
            let mut in_flight = self.in_flight.lock();
            in_flight
                .entry(id.clone())
                .or_insert_with(|| {
                    let api = Arc::clone(&self.api);
                    async move { api.request(Method::GET, &path, None).await }
                        .boxed()
                        .shared()
                })
                .clone()
        };

        let result = pending.clone().await;
        self.finish_fetch(id, &pending);

        let raw = result.map_err(|err| match err {
            ApiError::Http { status: 404, .. } => ClientError::NotFound {
                kind: E::KIND,
                id: id.to_string(),
            },
            other => ClientError::from(other),
        })?;

        let record: Record<E::Id, E::Data> =
            serde_json::from_value(raw).map_err(|e| ClientError::malformed(E::KIND, e))?;
        Ok(self.upsert(id.clone(), record.data, false))
    }

    /// Forget the in-flight request for `id` unless a newer one replaced it.
    fn finish_fetch(&self, id: &E::Id, pending: &PendingFetch) {
        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(id)
            .is_some_and(|current| current.ptr_eq(pending))
        {
            in_flight.remove(id);
        }
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn get_or_insert(&self, id: E::Id, data: E::Data, is_new: bool) -> (Handle<E>, bool) {
        let (handle, created) = {
            let mut entries = self.entries.write();
            match entries.get(&id) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let handle = Handle::new(E::from_data(id.clone(), data));
                    entries.insert(id, handle.clone());
                    (handle, true)
                }
            }
        };

        if created && is_new {
            self.emit(E::created(handle.clone()));
        }
        (handle, created)
    }
}

impl<E: Entity> std::fmt::Debug for Collection<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("kind", &E::KIND)
            .field("len", &self.len())
            .field("partials", &self.partials)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chatsync_shared::{ServerData, UserData};
    use serde_json::json;

    use super::*;
    use crate::entity::{Message, Server, User};
    use crate::testing::MockApi;

    fn collection<E: Entity>(
        api: Arc<MockApi>,
        partials: bool,
    ) -> (Collection<E>, broadcast::Receiver<ClientEvent>) {
        let (tx, rx) = broadcast::channel(64);
        (Collection::new(api, tx, partials), rx)
    }

    fn drain(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        names
    }

    fn named(name: &str) -> UserData {
        UserData {
            username: Some(name.into()),
            ..Default::default()
        }
    }

    #[test]
    fn get_or_create_is_silent_unless_new() {
        let (users, mut rx) = collection::<User>(Arc::default(), false);

        users.get_or_create("U1".into(), named("a"), false);
        assert!(drain(&mut rx).is_empty());

        users.get_or_create("U2".into(), named("b"), true);
        assert_eq!(drain(&mut rx), vec!["userCreate"]);
    }

    #[test]
    fn get_or_create_leaves_existing_untouched() {
        let (users, mut rx) = collection::<User>(Arc::default(), false);

        let first = users.get_or_create("U1".into(), named("a"), true);
        let second = users.get_or_create("U1".into(), named("b"), true);

        assert!(first.ptr_eq(&second));
        assert_eq!(second.read().username, "a");
        assert_eq!(users.len(), 1);
        assert_eq!(drain(&mut rx), vec!["userCreate"]);
    }

    #[test]
    fn upsert_hydrates_in_place() {
        let (users, mut rx) = collection::<User>(Arc::default(), false);

        let held = users.upsert("U1".into(), named("a"), false);
        let again = users.upsert("U1".into(), named("b"), true);

        assert!(held.ptr_eq(&again));
        assert_eq!(held.read().username, "b");
        assert_eq!(drain(&mut rx), vec!["userUpdate"]);
    }

    #[test]
    fn update_observed_through_earlier_handle() {
        let (users, mut rx) = collection::<User>(Arc::default(), false);

        let held = users.get_or_create("U1".into(), named("a"), false);
        users.update(
            "U1".into(),
            UserData {
                online: Some(true),
                ..Default::default()
            },
            &[],
        );

        assert!(held.read().online);
        assert_eq!(held.read().username, "a");
        assert_eq!(drain(&mut rx), vec!["userUpdate"]);
    }

    #[test]
    fn update_twice_is_idempotent() {
        let (servers, _rx) = collection::<Server>(Arc::default(), false);
        servers.get_or_create("S1".into(), ServerData::default(), false);

        let patch = ServerData {
            name: Some("Lounge".into()),
            description: Some("chill".into()),
            ..Default::default()
        };
        let (once, _) = servers.update("S1".into(), patch.clone(), &[]);
        let once = once.snapshot();
        let (twice, _) = servers.update("S1".into(), patch, &[]);

        assert_eq!(once, twice.snapshot());
    }

    #[test]
    fn update_unknown_id_creates_partial() {
        let (users, mut rx) = collection::<User>(Arc::default(), false);

        let (user, created) = users.update("U9".into(), named("late"), &[]);

        assert!(created);
        assert!(users.has(&"U9".to_string()));
        assert!(user.read().partial);
        assert_eq!(user.read().username, "late");
        assert_eq!(drain(&mut rx), vec!["userCreate"]);
    }

    #[test]
    fn update_clears_fields() {
        let (users, _rx) = collection::<User>(Arc::default(), false);
        users.get_or_create(
            "U1".into(),
            UserData {
                avatar: Some("file".into()),
                ..named("a")
            },
            false,
        );

        let (user, created) =
            users.update("U1".into(), UserData::default(), &["avatar".to_string()]);
        assert!(!created);
        assert_eq!(user.read().avatar, None);
    }

    #[test]
    fn placeholder_announced_by_first_live_record() {
        let (users, mut rx) = collection::<User>(Arc::default(), true);
        let placeholder = users.get_or_partial(&"U1".to_string()).unwrap();

        let user = users.upsert("U1".into(), named("alice"), true);
        users.upsert("U1".into(), named("bob"), true);

        assert!(user.ptr_eq(&placeholder));
        assert_eq!(drain(&mut rx), vec!["userCreate", "userUpdate"]);
    }

    #[test]
    fn placeholder_announced_by_first_patch() {
        let (users, mut rx) = collection::<User>(Arc::default(), true);
        users.get_or_partial(&"U1".to_string()).unwrap();

        let (_, created) = users.update("U1".into(), named("alice"), &[]);

        assert!(created);
        assert_eq!(drain(&mut rx), vec!["userCreate"]);
    }

    #[test]
    fn placeholder_completed_silently_is_not_announced_later() {
        let (users, mut rx) = collection::<User>(Arc::default(), true);
        users.get_or_partial(&"U1".to_string()).unwrap();

        users.upsert("U1".into(), named("alice"), false);
        users.upsert("U1".into(), named("bob"), true);

        assert_eq!(drain(&mut rx), vec!["userUpdate"]);
    }

    #[test]
    fn patched_partial_is_created_once() {
        let (users, mut rx) = collection::<User>(Arc::default(), true);

        users.update("U1".into(), named("alice"), &[]);
        users.upsert("U1".into(), named("alice"), true);

        assert_eq!(drain(&mut rx), vec!["userCreate", "userUpdate"]);
    }

    #[test]
    fn delete_orphans_held_handle() {
        let (users, _rx) = collection::<User>(Arc::default(), false);
        let held = users.get_or_create("U1".into(), named("a"), false);

        let removed = users.delete(&"U1".to_string());

        assert!(removed.is_some_and(|removed| removed.ptr_eq(&held)));
        assert!(users.get(&"U1".to_string()).is_none());
        assert_eq!(held.read().username, "a");
        assert!(users.delete(&"U1".to_string()).is_none());
    }

    #[test]
    fn delete_then_recreate_is_fresh() {
        let (users, _rx) = collection::<User>(Arc::default(), false);
        let old = users.get_or_create(
            "U1".into(),
            UserData {
                display_name: Some("Old".into()),
                ..named("a")
            },
            false,
        );
        users.delete(&"U1".to_string());

        let fresh = users
            .insert_raw(json!({ "_id": "U1", "username": "b" }), true)
            .unwrap();

        assert!(!fresh.ptr_eq(&old));
        assert_eq!(fresh.read().username, "b");
        assert_eq!(fresh.read().display_name, None);
    }

    #[test]
    fn insert_raw_rejects_missing_id() {
        let (users, _rx) = collection::<User>(Arc::default(), false);
        let result = users.insert_raw(json!({ "username": "nobody" }), true);
        assert!(matches!(result, Err(ClientError::MalformedPayload { .. })));
        assert!(users.is_empty());
    }

    #[test]
    fn partial_fallback_enabled() {
        let api = Arc::new(MockApi::default());
        let (users, mut rx) = collection::<User>(api.clone(), true);

        let partial = users.get_or_partial(&"U1".to_string()).unwrap();

        assert!(partial.read().partial);
        assert_eq!(partial.read().id, "U1");
        assert!(partial.read().username.is_empty());
        assert!(users.has(&"U1".to_string()));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(api.calls(), 0);
    }

    #[test]
    fn partial_fallback_disabled() {
        let api = Arc::new(MockApi::default());
        let (users, _rx) = collection::<User>(api.clone(), false);

        assert!(users.get_or_partial(&"U1".to_string()).is_none());
        assert!(users.is_empty());
        assert_eq!(api.calls(), 0);
    }

    #[test]
    fn partial_completed_by_full_record() {
        let (users, _rx) = collection::<User>(Arc::default(), true);
        let partial = users.get_or_partial(&"U1".to_string()).unwrap();

        users
            .insert_raw(json!({ "_id": "U1", "username": "alice" }), true)
            .unwrap();

        assert!(!partial.read().partial);
        assert_eq!(partial.read().username, "alice");
    }

    #[test]
    fn retain_returns_removed() {
        let (servers, _rx) = collection::<Server>(Arc::default(), false);
        servers.get_or_create("S1".into(), ServerData::default(), false);
        servers.get_or_create("S2".into(), ServerData::default(), false);

        let removed = servers.retain(|server| server.id != "S1");

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].read().id, "S1");
        assert_eq!(servers.ids(), vec!["S2".to_string()]);
    }

    #[tokio::test]
    async fn fetch_returns_cached_without_request() {
        let api = Arc::new(MockApi::default());
        let (users, _rx) = collection::<User>(api.clone(), false);
        let cached = users.get_or_create("U1".into(), named("a"), false);

        let fetched = users.fetch(&"U1".to_string()).await.unwrap();

        assert!(fetched.ptr_eq(&cached));
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn fetch_hydrates_from_response() {
        let api = MockApi::with("/users/U1", json!({ "_id": "U1", "username": "alice" }));
        let (users, mut rx) = collection::<User>(api.clone(), false);

        let user = users.fetch(&"U1".to_string()).await.unwrap();

        assert_eq!(user.read().username, "alice");
        assert!(!user.read().partial);
        assert!(users.has(&"U1".to_string()));
        assert_eq!(api.calls(), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn fetch_refreshes_partial_in_place() {
        let api = MockApi::with("/users/U1", json!({ "_id": "U1", "username": "alice" }));
        let (users, _rx) = collection::<User>(api.clone(), true);
        let partial = users.get_or_partial(&"U1".to_string()).unwrap();

        let fetched = users.fetch(&"U1".to_string()).await.unwrap();

        assert!(fetched.ptr_eq(&partial));
        assert!(!partial.read().partial);
        assert_eq!(partial.read().username, "alice");
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_fetches_share_one_request() {
        let api = MockApi::with("/users/U1", json!({ "_id": "U1", "username": "alice" }));
        let (users, _rx) = collection::<User>(api.clone(), false);
        let id = "U1".to_string();

        let (a, b) = tokio::join!(users.fetch(&id), users.fetch(&id));

        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a.ptr_eq(&b));
        assert_eq!(api.calls(), 1);
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn finished_fetch_keeps_newer_request() {
        let (users, _rx) = collection::<User>(Arc::default(), false);
        let id = "U1".to_string();
        let stale: PendingFetch = async { Ok::<Value, ApiError>(Value::Null) }
            .boxed()
            .shared();
        let newer: PendingFetch = async { Ok::<Value, ApiError>(Value::Null) }
            .boxed()
            .shared();
        users.in_flight.lock().insert(id.clone(), newer.clone());

        users.finish_fetch(&id, &stale);
        assert!(users.in_flight.lock().contains_key(&id));

        users.finish_fetch(&id, &newer);
        assert!(users.in_flight.lock().is_empty());
    }

    #[tokio::test]
    async fn fetch_clears_in_flight_entry() {
        let api = MockApi::with("/users/U1", json!({ "_id": "U1", "username": "alice" }));
        let (users, _rx) = collection::<User>(api.clone(), false);

        users.fetch(&"U1".to_string()).await.unwrap();

        assert!(users.in_flight.lock().is_empty());
    }

    #[tokio::test]
    async fn fetch_unknown_is_not_found() {
        let api = Arc::new(MockApi::default());
        let (servers, _rx) = collection::<Server>(api, false);

        let result = servers.fetch(&"S404".to_string()).await;

        assert!(matches!(result, Err(ClientError::NotFound { .. })));
        assert!(servers.is_empty());
    }

    #[tokio::test]
    async fn messages_are_not_fetchable() {
        let api = Arc::new(MockApi::default());
        let (messages, _rx) = collection::<Message>(api.clone(), false);

        let result = messages.fetch(&"M1".to_string()).await;

        assert!(matches!(result, Err(ClientError::NotFound { .. })));
        assert_eq!(api.calls(), 0);
    }
}
