//! Entity data contract: identity, version token, soft-delete and audit blocks.
//!
//! # Responsibility
//! - Define the persistence state every stored record carries.
//! - Define the `Entity` trait the repository is generic over.
//!
//! # Invariants
//! - `id` is assigned once, at insert, by the store's identity generator.
//! - The soft-delete block is set as a whole or not at all.
//! - `created_*` audit fields are stamped exactly once, at insert.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, Value};
use rusqlite::{Row, ToSql};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::hash::Hash;

/// Primary-key contract for persisted entities.
pub trait Key: Copy + Eq + Hash + Display + ToSql + FromSql + Send + 'static {}

impl Key for i64 {}

/// Declared persistence capabilities of an entity type.
///
/// Resolved once at mapping construction instead of probed per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub version: bool,
    pub soft_delete: bool,
    pub audit: bool,
}

impl Capabilities {
    pub const fn all() -> Self {
        Self {
            version: true,
            soft_delete: true,
            audit: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            version: false,
            soft_delete: false,
            audit: false,
        }
    }
}

/// Tombstone block. Presence means the entity is soft-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteStamp {
    pub deleted_date: DateTime<Utc>,
    pub deleted_by: String,
}

/// Audit block. `created_*` is written once; `last_updated_*` on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub created_by: String,
    pub created_date: DateTime<Utc>,
    pub last_updated_by: Option<String>,
    pub last_updated_date: Option<DateTime<Utc>>,
}

/// Persistence state carried by every entity instance.
///
/// A single composed contract: optional blocks stand in for the capability
/// an entity type declares, rather than a type hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState<K> {
    /// Store-assigned identity. `None` while the instance is transient.
    pub id: Option<K>,
    /// Optimistic-concurrency token. Incremented by the store per update.
    pub version: Option<K>,
    pub soft_delete: Option<SoftDeleteStamp>,
    pub audit: Option<AuditStamp>,
}

impl<K> Default for EntityState<K> {
    fn default() -> Self {
        Self {
            id: None,
            version: None,
            soft_delete: None,
            audit: None,
        }
    }
}

impl<K: Key> EntityState<K> {
    pub fn is_transient(&self) -> bool {
        self.id.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.soft_delete.is_some()
    }

    /// Stamps the creation audit fields. Later calls keep the original stamp.
    pub(crate) fn stamp_created(&mut self, by: &str, at: DateTime<Utc>) {
        if self.audit.is_none() {
            self.audit = Some(AuditStamp {
                created_by: by.to_string(),
                created_date: at,
                last_updated_by: None,
                last_updated_date: None,
            });
        }
    }

    /// Stamps the last-update audit fields, preserving the creation stamp.
    pub(crate) fn stamp_updated(&mut self, by: &str, at: DateTime<Utc>) {
        match self.audit.as_mut() {
            Some(audit) => {
                audit.last_updated_by = Some(by.to_string());
                audit.last_updated_date = Some(at);
            }
            None => {
                self.audit = Some(AuditStamp {
                    created_by: by.to_string(),
                    created_date: at,
                    last_updated_by: Some(by.to_string()),
                    last_updated_date: Some(at),
                });
            }
        }
    }

    /// Sets the whole soft-delete triple. The audit block is left untouched.
    pub fn mark_deleted(&mut self, by: &str, at: DateTime<Utc>) {
        self.soft_delete = Some(SoftDeleteStamp {
            deleted_date: at,
            deleted_by: by.to_string(),
        });
    }
}

/// Explicit two-state entity reference.
///
/// Replaces proxy-based lazy loading: a reference is either an identifier
/// waiting to be loaded or the fully materialized value, and loading is an
/// explicit repository operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lazy<K, T> {
    Unloaded(K),
    Loaded(T),
}

impl<K: Key, T> Lazy<K, T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            Self::Loaded(value) => Some(value),
            Self::Unloaded(_) => None,
        }
    }
}

/// Value handed to an entity during on-demand property completion.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// A directly loaded scalar column value.
    Scalar(Value),
    /// The identifier of an associated entity, to be held as an unloaded
    /// reference rather than a materialized child object.
    Reference(Value),
}

/// Contract the generic repository requires of persisted types.
pub trait Entity: Clone + Sized {
    type Key: Key;

    fn state(&self) -> &EntityState<Self::Key>;

    fn state_mut(&mut self) -> &mut EntityState<Self::Key>;

    /// Data property values, keyed by declared property name.
    fn data_values(&self) -> Vec<(&'static str, Value)>;

    /// Rebuilds the data portion from a row whose columns are aliased to
    /// declared property names. Persistence state is restored by the caller.
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error>;

    /// Names of declared properties this instance has not materialized yet.
    /// Only meaningful for instances built outside the loading path.
    fn unset_properties(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Applies a completed property value. Returns false when the instance
    /// does not recognize the property.
    fn apply_property(&mut self, _name: &str, _value: PropertyValue) -> bool {
        false
    }

    fn id(&self) -> Option<Self::Key> {
        self.state().id
    }

    fn version(&self) -> Option<Self::Key> {
        self.state().version
    }
}
