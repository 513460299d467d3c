//! Session factory: owns the database source and session-wide configuration.
//!
//! # Responsibility
//! - Open bootstrapped sessions against a file or shared in-memory database.
//! - Hold the registered filter definitions and the acting user.
//!
//! # Invariants
//! - The configured batch size is clamped to a minimum of 1.
//! - A named in-memory database stays alive for the factory's lifetime, so
//!   closed sessions can be reopened against the same data.

use crate::db::{bootstrap_connection, DbResult};
use crate::filter::FilterDefinition;
use crate::session::Session;
use log::info;
use rusqlite::{Connection, OpenFlags};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_BATCH_SIZE: usize = 20;
const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 32;

/// Where sessions connect to.
#[derive(Debug, Clone)]
enum DbSource {
    File(PathBuf),
    /// Named shared-cache in-memory database.
    Memory { name: String },
}

/// Factory-wide configuration consumed by every session it opens.
#[derive(Debug, Clone)]
pub struct SessionFactoryConfig {
    /// Insert count between bulk-insert flush cycles. Clamped to >= 1.
    pub batch_size: usize,
    /// Capacity of the per-connection prepared-statement cache.
    pub statement_cache_capacity: usize,
    /// User recorded in audit and soft-delete stamps.
    pub actor: String,
}

impl Default for SessionFactoryConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            statement_cache_capacity: DEFAULT_STATEMENT_CACHE_CAPACITY,
            actor: "system".to_string(),
        }
    }
}

/// Opens sessions and carries the shared persistence configuration.
#[derive(Debug)]
pub struct SessionFactory {
    source: DbSource,
    config: SessionFactoryConfig,
    filters: BTreeMap<String, FilterDefinition>,
    /// Keeps the named in-memory database alive between sessions.
    _anchor: Option<Connection>,
}

impl SessionFactory {
    /// Factory over a database file.
    pub fn file(path: impl Into<PathBuf>, config: SessionFactoryConfig) -> Self {
        Self {
            source: DbSource::File(path.into()),
            config,
            filters: BTreeMap::new(),
            _anchor: None,
        }
    }

    /// Factory over a private named in-memory database.
    pub fn in_memory(config: SessionFactoryConfig) -> DbResult<Self> {
        let name = format!("groundwork-{}", Uuid::new_v4());
        let source = DbSource::Memory { name };
        let anchor = connect(&source)?;
        Ok(Self {
            source,
            config,
            filters: BTreeMap::new(),
            _anchor: Some(anchor),
        })
    }

    /// Registers a named filter definition available to every session.
    pub fn register_filter(&mut self, definition: FilterDefinition) {
        self.filters.insert(definition.name().to_string(), definition);
    }

    pub fn filter_definition(&self, name: &str) -> Option<&FilterDefinition> {
        self.filters.get(name)
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size.max(1)
    }

    pub fn actor(&self) -> &str {
        &self.config.actor
    }

    /// Opens a new bootstrapped session bound to this factory.
    pub fn open_session(self: &Arc<Self>) -> DbResult<Session> {
        let conn = connect(&self.source)?;
        bootstrap_connection(&conn, self.config.statement_cache_capacity)?;
        info!(
            "event=session_open module=session status=ok mode={}",
            match self.source {
                DbSource::File(_) => "file",
                DbSource::Memory { .. } => "memory",
            }
        );
        Ok(Session::new(conn, Arc::clone(self)))
    }
}

fn connect(source: &DbSource) -> DbResult<Connection> {
    let conn = match source {
        DbSource::File(path) => Connection::open(path)?,
        DbSource::Memory { name } => Connection::open_with_flags(
            format!("file:{name}?mode=memory&cache=shared"),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?,
    };
    Ok(conn)
}
