//! Connection bootstrap and shared database error type.
//!
//! # Responsibility
//! - Configure freshly opened SQLite connections for core behavior.
//! - Define the database error shared by session and repository layers.
//!
//! # Invariants
//! - Bootstrapped connections have `foreign_keys=ON` and a busy timeout.
//! - The core never creates or migrates schema; it consumes an existing one.

use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The session's connection has been closed and no reopen has happened.
    SessionClosed,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::SessionClosed => write!(f, "session is closed"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::SessionClosed => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Applies the connection pragmas every session relies on.
pub(crate) fn bootstrap_connection(conn: &Connection, statement_cache_capacity: usize) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.set_prepared_statement_cache_capacity(statement_cache_capacity);
    Ok(())
}
