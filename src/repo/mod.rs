//! Repository layer: queries and the entity-agnostic persistence surface.

mod query;
mod repository;

pub use query::{EntityQuery, Page, PageFilter, Query, QueryParam};
pub use repository::{LockMode, RepoError, RepoResult, Repository, SqliteRepository};
