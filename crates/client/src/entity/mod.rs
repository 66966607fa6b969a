//! Cached domain objects and their hydration.
//!
//! Every kind implements [`Entity`]. Hydration is the single mapping from a
//! wire `*Data` struct onto an entity: creation starts from [`Entity::blank`]
//! and hydrates the full record, updates hydrate a partial record onto the
//! live instance. Only fields present in the payload are touched.
//!
//! Entities refer to each other by identifier only. The `resolve_*` methods
//! look the identifier up in the owning collection and may return nothing.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use chatsync_shared::EntityKind;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::de::DeserializeOwned;

use crate::events::ClientEvent;

mod channel;
mod emoji;
mod member;
mod message;
mod server;
mod user;

pub use channel::Channel;
pub use emoji::Emoji;
pub use member::Member;
pub use message::Message;
pub use server::Server;
pub use user::User;

/// Shared handle to the single cached instance of an entity.
///
/// Cloning the handle never clones the entity; every clone observes
/// hydration applied through the collection.
pub struct Handle<T>(Arc<RwLock<T>>);

impl<T> Handle<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    /// Whether both handles point at the same instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> T
    where
        T: Clone,
    {
        self.0.read().clone()
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&*self.0.read()).finish()
    }
}

/// Names of the fields a hydration pass actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes(Vec<&'static str>);

impl Changes {
    /// Overwrite `field` when the payload carries a different value.
    pub(crate) fn set<T: PartialEq>(&mut self, name: &'static str, field: &mut T, value: Option<T>) {
        if let Some(value) = value {
            if *field != value {
                *field = value;
                self.0.push(name);
            }
        }
    }

    /// Like [`Changes::set`] for optional attributes.
    pub(crate) fn set_some<T: PartialEq>(
        &mut self,
        name: &'static str,
        field: &mut Option<T>,
        value: Option<T>,
    ) {
        if let Some(value) = value {
            if field.as_ref() != Some(&value) {
                *field = Some(value);
                self.0.push(name);
            }
        }
    }

    pub(crate) fn clear<T>(&mut self, name: &'static str, field: &mut Option<T>) {
        if field.take().is_some() {
            self.0.push(name);
        }
    }

    /// Record a change applied outside hydration.
    pub(crate) fn mark(&mut self, name: &'static str) {
        if !self.contains(name) {
            self.0.push(name);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|field| *field == name)
    }

    pub fn fields(&self) -> &[&'static str] {
        &self.0
    }
}

/// A cached domain object with a stable identifier.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    /// Identity within the kind. Composite for members.
    type Id: Clone + Eq + Hash + fmt::Display + fmt::Debug + DeserializeOwned + Send + Sync + 'static;

    /// Wire attributes, shared by full records and partial patches.
    type Data: DeserializeOwned + Default + Send + 'static;

    const KIND: EntityKind;

    fn id(&self) -> &Self::Id;

    /// Placeholder carrying only the identifier, flagged partial.
    fn blank(id: Self::Id) -> Self;

    /// Apply every field present in `data`.
    fn hydrate(&mut self, data: Self::Data) -> Changes;

    /// Unset an optional field by wire name. Unknown names are ignored.
    fn clear(&mut self, field: &str, changes: &mut Changes);

    fn is_partial(&self) -> bool;

    fn set_partial(&mut self, partial: bool);

    /// REST path that returns a full record for `id`, if the kind is fetchable.
    fn fetch_path(_id: &Self::Id) -> Option<String> {
        None
    }

    fn created(entity: Handle<Self>) -> ClientEvent;

    fn updated(entity: Handle<Self>, changes: Changes) -> ClientEvent;

    fn deleted(id: Self::Id, entity: Option<Handle<Self>>) -> ClientEvent;

    /// Build a complete entity from a full record.
    fn from_data(id: Self::Id, data: Self::Data) -> Self {
        let mut entity = Self::blank(id);
        entity.hydrate(data);
        entity.set_partial(false);
        entity
    }
}

/// Encode an identifier for use as a single path segment.
pub(crate) fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}
