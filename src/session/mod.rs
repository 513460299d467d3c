//! Session: one connection, its tracking state, and its enabled filters.
//!
//! # Responsibility
//! - Own the live connection and expose open/close/reopen state.
//! - Track loaded instances (first-level identity registry).
//! - Gate statement caching behind the session's cache mode.
//! - Hold the named filters enabled for this session.
//!
//! # Invariants
//! - Every store access through a closed session fails with
//!   `DbError::SessionClosed`; nothing is retried implicitly.
//! - `clear()` empties the tracking registry and the statement cache;
//!   it never touches persisted rows.

mod factory;

pub use factory::{SessionFactory, SessionFactoryConfig};

use crate::db::{DbError, DbResult};
use crate::filter::{Filter, FilterDefinition, FilterError, FilterResult};
use log::{debug, info};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::cell::{Cell, Ref, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Statement-cache interaction mode, saved and restored around bulk work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Statements go through the prepared-statement cache.
    Normal,
    /// The cache is bypassed entirely.
    Ignore,
}

/// One transactional session over the store.
#[derive(Debug)]
pub struct Session {
    conn: RefCell<Option<Connection>>,
    factory: Arc<SessionFactory>,
    cache_mode: Cell<CacheMode>,
    tracked: RefCell<HashSet<(String, String)>>,
    enabled_filters: RefCell<BTreeMap<String, Filter>>,
    flushes: Cell<u64>,
    clears: Cell<u64>,
}

impl Session {
    pub(crate) fn new(conn: Connection, factory: Arc<SessionFactory>) -> Self {
        Self {
            conn: RefCell::new(Some(conn)),
            factory,
            cache_mode: Cell::new(CacheMode::Normal),
            tracked: RefCell::new(HashSet::new()),
            enabled_filters: RefCell::new(BTreeMap::new()),
            flushes: Cell::new(0),
            clears: Cell::new(0),
        }
    }

    pub fn factory(&self) -> &Arc<SessionFactory> {
        &self.factory
    }

    pub fn is_open(&self) -> bool {
        self.conn.borrow().is_some()
    }

    /// Closes the connection. The session stays usable only after its owner
    /// replaces it or reopens through the factory.
    pub fn close(&self) {
        if self.conn.borrow_mut().take().is_some() {
            info!("event=session_close module=session status=ok");
        }
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode.get()
    }

    pub fn set_cache_mode(&self, mode: CacheMode) {
        self.cache_mode.set(mode);
    }

    pub fn actor(&self) -> &str {
        self.factory.actor()
    }

    pub fn batch_size(&self) -> usize {
        self.factory.batch_size()
    }

    fn conn(&self) -> DbResult<Ref<'_, Connection>> {
        Ref::filter_map(self.conn.borrow(), Option::as_ref).map_err(|_| DbError::SessionClosed)
    }

    // ---- statement execution, gated by cache mode ----

    pub(crate) fn execute_sql(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        let conn = self.conn()?;
        let affected = match self.cache_mode.get() {
            CacheMode::Normal => {
                let mut stmt = conn.prepare_cached(sql)?;
                stmt.execute(params_from_iter(params.iter()))?
            }
            CacheMode::Ignore => {
                let mut stmt = conn.prepare(sql)?;
                stmt.execute(params_from_iter(params.iter()))?
            }
        };
        Ok(affected)
    }

    pub(crate) fn query_rows<T>(
        &self,
        sql: &str,
        params: &[Value],
        mut map_row: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> DbResult<Vec<T>> {
        let conn = self.conn()?;
        let mut collect = |stmt: &mut rusqlite::Statement<'_>| -> rusqlite::Result<Vec<T>> {
            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(map_row(row)?);
            }
            Ok(out)
        };
        let result = match self.cache_mode.get() {
            CacheMode::Normal => {
                let mut stmt = conn.prepare_cached(sql)?;
                collect(&mut stmt)?
            }
            CacheMode::Ignore => {
                let mut stmt = conn.prepare(sql)?;
                collect(&mut stmt)?
            }
        };
        Ok(result)
    }

    pub(crate) fn query_optional<T>(
        &self,
        sql: &str,
        params: &[Value],
        map_row: impl FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    ) -> DbResult<Option<T>> {
        let conn = self.conn()?;
        let mut map_row = Some(map_row);
        let mut fetch = |stmt: &mut rusqlite::Statement<'_>| -> rusqlite::Result<Option<T>> {
            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            match rows.next()? {
                Some(row) => match map_row.take() {
                    Some(f) => Ok(Some(f(row)?)),
                    None => Ok(None),
                },
                None => Ok(None),
            }
        };
        let result = match self.cache_mode.get() {
            CacheMode::Normal => {
                let mut stmt = conn.prepare_cached(sql)?;
                fetch(&mut stmt)?
            }
            CacheMode::Ignore => {
                let mut stmt = conn.prepare(sql)?;
                fetch(&mut stmt)?
            }
        };
        Ok(result)
    }

    // ---- transaction verbs (driven by the unit of work) ----

    pub(crate) fn begin_immediate(&self) -> DbResult<()> {
        self.conn()?.execute_batch("BEGIN IMMEDIATE;")?;
        Ok(())
    }

    pub(crate) fn commit_tx(&self) -> DbResult<()> {
        self.conn()?.execute_batch("COMMIT;")?;
        Ok(())
    }

    pub(crate) fn rollback_tx(&self) -> DbResult<()> {
        self.conn()?.execute_batch("ROLLBACK;")?;
        Ok(())
    }

    // ---- first-level tracking ----

    pub(crate) fn track(&self, entity: &str, key: String) {
        self.tracked.borrow_mut().insert((entity.to_string(), key));
    }

    pub(crate) fn untrack(&self, entity: &str, key: &str) {
        self.tracked
            .borrow_mut()
            .remove(&(entity.to_string(), key.to_string()));
    }

    pub fn is_tracked(&self, entity: &str, key: &str) -> bool {
        self.tracked
            .borrow()
            .contains(&(entity.to_string(), key.to_string()))
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.borrow().len()
    }

    /// Write barrier between bulk batches. Fails when the session is closed.
    pub fn flush(&self) -> DbResult<()> {
        let _ = self.conn()?;
        self.flushes.set(self.flushes.get() + 1);
        debug!(
            "event=session_flush module=session status=ok tracked={}",
            self.tracked.borrow().len()
        );
        Ok(())
    }

    /// Drops the tracking registry and the prepared-statement cache.
    pub fn clear(&self) -> DbResult<()> {
        self.conn()?.flush_prepared_statement_cache();
        self.tracked.borrow_mut().clear();
        self.clears.set(self.clears.get() + 1);
        Ok(())
    }

    pub fn flush_count(&self) -> u64 {
        self.flushes.get()
    }

    pub fn clear_count(&self) -> u64 {
        self.clears.get()
    }

    // ---- named filters ----

    /// Activates a registered filter on this session, with no values bound.
    pub fn enable_filter(&self, name: &str) -> FilterResult<()> {
        let definition = self
            .factory
            .filter_definition(name)
            .cloned()
            .ok_or_else(|| FilterError::UnknownFilter(name.to_string()))?;
        self.enabled_filters
            .borrow_mut()
            .insert(name.to_string(), Filter::new(definition));
        Ok(())
    }

    pub fn disable_filter(&self, name: &str) {
        self.enabled_filters.borrow_mut().remove(name);
    }

    pub fn enabled_filter(&self, name: &str) -> Option<Filter> {
        self.enabled_filters.borrow().get(name).cloned()
    }

    pub fn filter_definition(&self, name: &str) -> Option<FilterDefinition> {
        self.factory.filter_definition(name).cloned()
    }

    /// Runs `apply` against the live enabled filter, keeping mutations.
    pub fn with_enabled_filter<R>(
        &self,
        name: &str,
        apply: impl FnOnce(&mut Filter) -> FilterResult<R>,
    ) -> FilterResult<R> {
        let mut filters = self.enabled_filters.borrow_mut();
        let filter = filters
            .get_mut(name)
            .ok_or_else(|| FilterError::NotEnabled(name.to_string()))?;
        apply(filter)
    }

    /// Renders every enabled filter condition for query composition.
    pub(crate) fn render_enabled_filters(&self) -> FilterResult<Vec<(String, Vec<Value>)>> {
        let filters = self.enabled_filters.borrow();
        let mut rendered = Vec::with_capacity(filters.len());
        for filter in filters.values() {
            rendered.push(filter.render()?);
        }
        Ok(rendered)
    }
}
