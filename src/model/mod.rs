//! Entity data contract shared by every persisted record.

pub mod entity;

pub use entity::{
    AuditStamp, Capabilities, Entity, EntityState, Key, Lazy, PropertyValue, SoftDeleteStamp,
};
