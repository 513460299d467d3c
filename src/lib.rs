//! Entity-agnostic persistence layer over an embedded relational store.
//!
//! # Responsibility
//! - Unit-of-work transaction scoping over explicit sessions.
//! - A generic repository with CRUD, paging, bulk insert, and lazy
//!   property completion for any mapped entity type.
//! - Dynamic named filters with default-condition binding.
//!
//! # Invariants
//! - Persistence state is explicit: no ambient per-thread sessions or
//!   transactions, ever.
//! - Every store failure surfaces as a typed error; none are swallowed.

pub mod db;
pub mod diag;
pub mod filter;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod repo;
pub mod session;
pub mod uow;

pub use db::{DbError, DbResult};
pub use filter::{
    enable_filter_with_default_condition, Filter, FilterDefinition, FilterParamType, FilterValue,
};
pub use mapping::{EntityMapping, MappingError, PropertyKind, PropertyMeta};
pub use model::{AuditStamp, Capabilities, Entity, EntityState, Key, Lazy, PropertyValue};
pub use repo::{
    EntityQuery, LockMode, Page, PageFilter, Query, RepoError, RepoResult, Repository,
    SqliteRepository,
};
pub use session::{CacheMode, Session, SessionFactory, SessionFactoryConfig};
pub use uow::{
    should_commit_or_rollback, TransactionHandle, TxStatus, UnitOfWork, UnitOfWorkContext,
    UowError, UowResult,
};

/// Crate version, for startup logging by embedding applications.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
