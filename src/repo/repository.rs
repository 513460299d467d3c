//! Generic repository over mapped entities.
//!
//! # Responsibility
//! - CRUD, paging, and bulk insert for any mapped entity type.
//! - Optimistic version checks on update, soft or hard delete.
//! - Lazy-property completion and reference loading.
//! - Cooperative cancellation variants of the mutating operations.
//!
//! # Invariants
//! - Version counters are integral, start at 1 on insert, and advance by
//!   exactly 1 per successful update.
//! - A version mismatch on a row that still exists is a stale-version
//!   fault, never a not-found.
//! - Bulk insert runs one flush/clear cycle per batch, including the
//!   trailing partial batch, and always restores the session cache mode.

use crate::db::DbError;
use crate::diag;
use crate::filter::{
    enable_filter_with_default_condition, Filter, FilterDefinition, FilterError, FilterResult,
};
use crate::mapping::{EntityMapping, MappingError, PropertyKind};
use crate::model::{Entity, Key, Lazy, PropertyValue};
use crate::session::{CacheMode, Session};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::types::{ToSqlOutput, Value};
use rusqlite::ToSql;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::query::{select_list, EntityQuery, Page, PageFilter, Query};

pub type RepoResult<T> = Result<T, RepoError>;

/// Row lock intent for a keyed load inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Mapping(MappingError),
    Filter(FilterError),
    NotFound { entity: String, key: String },
    StaleVersion { entity: String, key: String },
    NotTracked { entity: String },
    TransientInstance { entity: String, operation: &'static str },
    InvalidData(String),
    UnboundParameter(String),
    InvalidPageRequest { page_number: i64, page_size: i64 },
    Cancelled,
    NotImplemented(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "store failure: {err}"),
            Self::Mapping(err) => write!(f, "mapping failure: {err}"),
            Self::Filter(err) => write!(f, "filter failure: {err}"),
            Self::NotFound { entity, key } => {
                write!(f, "no {entity} row with identifier {key}")
            }
            Self::StaleVersion { entity, key } => write!(
                f,
                "{entity} row {key} was changed by another session since it was loaded"
            ),
            Self::NotTracked { entity } => {
                write!(f, "{entity} instance is not tracked by this session")
            }
            Self::TransientInstance { entity, operation } => write!(
                f,
                "{operation} requires a persisted {entity} instance with an identifier"
            ),
            Self::InvalidData(message) => write!(f, "invalid data: {message}"),
            Self::UnboundParameter(name) => {
                write!(f, "query parameter `{name}` has no bound value")
            }
            Self::InvalidPageRequest {
                page_number,
                page_size,
            } => write!(
                f,
                "page request ({page_number}, {page_size}) is out of range; both must be >= 1"
            ),
            Self::Cancelled => write!(f, "operation cancelled before reaching the store"),
            Self::NotImplemented(operation) => {
                write!(f, "operation `{operation}` is not implemented")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Mapping(err) => Some(err),
            Self::Filter(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(err: DbError) -> Self {
        Self::Db(err)
    }
}

impl From<MappingError> for RepoError {
    fn from(err: MappingError) -> Self {
        Self::Mapping(err)
    }
}

impl From<FilterError> for RepoError {
    fn from(err: FilterError) -> Self {
        Self::Filter(err)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(err))
    }
}

fn key_value<K: Key>(key: &K) -> RepoResult<Value> {
    match key.to_sql()? {
        ToSqlOutput::Borrowed(value_ref) => Ok(Value::from(value_ref)),
        ToSqlOutput::Owned(value) => Ok(value),
        _ => Err(RepoError::InvalidData(
            "identifier does not bind to a plain value".to_string(),
        )),
    }
}

fn datetime_value(at: DateTime<Utc>) -> Value {
    Value::Text(at.to_rfc3339())
}

fn optional_text(text: Option<&String>) -> Value {
    match text {
        Some(value) => Value::Text(value.clone()),
        None => Value::Null,
    }
}

fn optional_datetime(at: Option<DateTime<Utc>>) -> Value {
    match at {
        Some(value) => datetime_value(value),
        None => Value::Null,
    }
}

/// The entity-agnostic persistence surface.
pub trait Repository<E: Entity> {
    fn get(&self, key: E::Key) -> RepoResult<Option<E>>;
    fn get_locked(&self, key: E::Key, mode: LockMode) -> RepoResult<Option<E>>;
    /// A restartable query over the full entity set; conditions, ordering,
    /// and evaluation are the caller's to compose.
    fn get_all(&self) -> EntityQuery<E>;
    fn get_all_paged(
        &self,
        filter: Option<PageFilter>,
        page_number: i64,
        page_size: i64,
    ) -> RepoResult<Page<E>>;
    fn insert(&self, entity: &mut E) -> RepoResult<()>;
    /// Inserts in batches of the store's configured batch size.
    fn bulk_insert(&self, entities: &mut [E]) -> RepoResult<usize>;
    fn update(&self, entity: &mut E) -> RepoResult<()>;
    fn delete_by_id(&self, key: E::Key, is_soft_delete: bool) -> RepoResult<bool>;
    fn delete(&self, entity: &E) -> RepoResult<()>;
    fn save_or_update(&self, entity: &mut E) -> RepoResult<()>;
    fn merge(&self, detached: &E) -> RepoResult<E>;
    fn refresh(&self, entity: &mut E) -> RepoResult<()>;
    /// Declared but deliberately unimplemented; callers get a typed fault
    /// instead of a silent pass.
    fn is_valid(&self, entity: &E) -> RepoResult<bool>;
    /// Textual query in entity terms: the entity name and its property
    /// names are rewritten to the mapped table and columns.
    fn create_query(&self, text: &str) -> Query;
    /// Textual query passed to the store untouched.
    fn create_sql_query(&self, text: &str) -> Query;
    fn execute_update(&self, query: &Query) -> RepoResult<usize>;
    fn to_sql(&self, query: &EntityQuery<E>) -> RepoResult<String>;
    fn initialize_lazy_properties(&self, entity: &mut E) -> RepoResult<()>;
    fn load_reference(&self, reference: &mut Lazy<E::Key, E>) -> RepoResult<()>;
    fn get_identifier(&self, entity: &E) -> RepoResult<E::Key>;
    fn enable_filter(&self, name: &str) -> RepoResult<()>;
    fn enable_filter_with_default_filter_condition(&self, name: &str) -> RepoResult<bool>;
    fn disable_filter(&self, name: &str);
    fn get_enabled_filter(&self, name: &str) -> Option<Filter>;
    fn get_filter_definition(&self, name: &str) -> Option<FilterDefinition>;
    /// Classifies and logs a store failure. Always returns true so callers
    /// can chain it into error paths unconditionally.
    fn log_exception(&self, err: &rusqlite::Error) -> bool;
}

/// Repository implementation over one open session.
pub struct SqliteRepository<'s, E: Entity> {
    session: &'s Session,
    mapping: Arc<EntityMapping>,
    _marker: PhantomData<E>,
}

impl<'s, E: Entity> SqliteRepository<'s, E> {
    pub fn new(session: &'s Session, mapping: Arc<EntityMapping>) -> Self {
        Self {
            session,
            mapping,
            _marker: PhantomData,
        }
    }

    pub fn session(&self) -> &Session {
        self.session
    }

    pub fn mapping(&self) -> &EntityMapping {
        &self.mapping
    }

    fn entity_name(&self) -> &str {
        self.mapping.entity_name()
    }

    fn exists(&self, key: &E::Key) -> RepoResult<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?",
            self.mapping.table(),
            self.mapping.id_column()
        );
        let found = self
            .session
            .query_optional(&sql, &[key_value(key)?], |_| Ok(()))?;
        Ok(found.is_some())
    }

    /// Columns and values for one insert. Audit stamps must already be
    /// applied; version and soft-delete columns get their initial values.
    fn insert_columns(&self, entity: &E) -> RepoResult<(Vec<String>, Vec<Value>)> {
        let capabilities = self.mapping.capabilities();
        let mut columns = Vec::new();
        let mut values = Vec::new();

        for (name, value) in entity.data_values() {
            let meta = self.mapping.require_property(name)?;
            columns.push(meta.column.to_string());
            values.push(value);
        }
        if capabilities.version {
            columns.push(self.mapping.version_column().to_string());
            values.push(Value::Integer(1));
        }
        if capabilities.soft_delete {
            columns.push(self.mapping.is_deleted_column().to_string());
            values.push(Value::Integer(0));
        }
        if capabilities.audit {
            let audit = entity.state().audit.as_ref().ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "{} has the audit capability but no audit stamp",
                    self.entity_name()
                ))
            })?;
            columns.push(self.mapping.created_by_column().to_string());
            values.push(Value::Text(audit.created_by.clone()));
            columns.push(self.mapping.created_date_column().to_string());
            values.push(datetime_value(audit.created_date));
            columns.push(self.mapping.updated_by_column().to_string());
            values.push(optional_text(audit.last_updated_by.as_ref()));
            columns.push(self.mapping.updated_date_column().to_string());
            values.push(optional_datetime(audit.last_updated_date));
        }
        Ok((columns, values))
    }

    fn insert_one(&self, entity: &mut E) -> RepoResult<()> {
        let capabilities = self.mapping.capabilities();
        if capabilities.audit {
            let actor = self.session.actor().to_string();
            entity.state_mut().stamp_created(&actor, Utc::now());
        }

        let (columns, values) = self.insert_columns(entity)?;
        let markers = vec!["?"; values.len()].join(", ");
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            self.mapping.table(),
            columns.join(", "),
            markers,
            self.mapping.id_column()
        );
        if capabilities.version {
            sql.push_str(", ");
            sql.push_str(self.mapping.version_column());
        }

        let returned = self.session.query_optional(&sql, &values, |row| {
            let id: E::Key = row.get(0)?;
            let version: Option<E::Key> = if capabilities.version {
                Some(row.get(1)?)
            } else {
                None
            };
            Ok((id, version))
        })?;
        let (id, version) = returned.ok_or_else(|| {
            RepoError::InvalidData(format!("insert into {} returned no row", self.entity_name()))
        })?;

        let state = entity.state_mut();
        state.id = Some(id);
        state.version = version;
        self.session.track(self.entity_name(), id.to_string());
        Ok(())
    }

    fn bulk_insert_batches(&self, entities: &mut [E], batch: usize) -> RepoResult<usize> {
        let total = entities.len();
        for (i, entity) in entities.iter_mut().enumerate() {
            self.insert_one(entity)?;
            if (i + 1) % batch == 0 {
                self.session.flush()?;
                self.session.clear()?;
            }
        }
        if total % batch != 0 {
            self.session.flush()?;
            self.session.clear()?;
        }
        Ok(total)
    }

    fn require_id(&self, entity: &E, operation: &'static str) -> RepoResult<E::Key> {
        entity.id().ok_or_else(|| RepoError::TransientInstance {
            entity: self.entity_name().to_string(),
            operation,
        })
    }
}

impl<E: Entity> Repository<E> for SqliteRepository<'_, E> {
    fn get(&self, key: E::Key) -> RepoResult<Option<E>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            select_list(&self.mapping),
            self.mapping.table(),
            self.mapping.id_column()
        );
        let found = self
            .session
            .query_optional(&sql, &[key_value(&key)?], |row| E::from_row(row))?;
        if found.is_some() {
            self.session.track(self.entity_name(), key.to_string());
        }
        Ok(found)
    }

    /// A write-intent load touches the row first so the surrounding
    /// transaction holds the write lock before the caller sees the data.
    fn get_locked(&self, key: E::Key, mode: LockMode) -> RepoResult<Option<E>> {
        if mode == LockMode::Write {
            let id_column = self.mapping.id_column();
            let sql = format!(
                "UPDATE {} SET {id_column} = {id_column} WHERE {id_column} = ?",
                self.mapping.table()
            );
            self.session.execute_sql(&sql, &[key_value(&key)?])?;
        }
        self.get(key)
    }

    fn get_all(&self) -> EntityQuery<E> {
        EntityQuery::new(Arc::clone(&self.mapping))
    }

    fn get_all_paged(
        &self,
        filter: Option<PageFilter>,
        page_number: i64,
        page_size: i64,
    ) -> RepoResult<Page<E>> {
        if page_number < 1 || page_size < 1 {
            return Err(RepoError::InvalidPageRequest {
                page_number,
                page_size,
            });
        }
        let mut query = self.get_all();
        if let Some(filter) = filter {
            if let Some(condition) = filter.condition {
                query = query.filter(condition, filter.values);
            }
        }
        let total = query.count(self.session)?;
        let total_pages = (total + page_size - 1) / page_size;
        let items = query
            .limit(page_size)
            .offset((page_number - 1) * page_size)
            .list(self.session)?;
        Ok(Page {
            items,
            page_number,
            page_size,
            total_pages,
        })
    }

    fn insert(&self, entity: &mut E) -> RepoResult<()> {
        self.insert_one(entity)?;
        info!(
            "event=insert module=repo status=ok entity={}",
            self.entity_name()
        );
        Ok(())
    }

    /// Inserts in batches of the session's configured batch size with the
    /// statement cache bypassed. Each batch boundary, including the trailing
    /// partial one, runs a flush plus a clear so the session's tracking set
    /// stays bounded.
    fn bulk_insert(&self, entities: &mut [E]) -> RepoResult<usize> {
        if entities.is_empty() {
            return Ok(0);
        }
        let batch = self.session.batch_size();
        let previous_mode = self.session.cache_mode();
        self.session.set_cache_mode(CacheMode::Ignore);

        let result = self.bulk_insert_batches(entities, batch);
        self.session.set_cache_mode(previous_mode);

        let inserted = result?;
        info!(
            "event=bulk_insert module=repo status=ok entity={} rows={inserted} batch={batch}",
            self.entity_name()
        );
        Ok(inserted)
    }

    fn update(&self, entity: &mut E) -> RepoResult<()> {
        let key = self.require_id(entity, "update")?;
        let capabilities = self.mapping.capabilities();

        let mut assignments = Vec::new();
        let mut values = Vec::new();
        for (name, value) in entity.data_values() {
            let meta = self.mapping.require_property(name)?;
            assignments.push(format!("{} = ?", meta.column));
            values.push(value);
        }
        // The update stamp is bound into the statement but written back to
        // the instance only after the store accepts the row.
        let mut pending_stamp = None;
        if capabilities.audit {
            let actor = self.session.actor().to_string();
            let now = Utc::now();
            assignments.push(format!("{} = ?", self.mapping.updated_by_column()));
            values.push(Value::Text(actor.clone()));
            assignments.push(format!("{} = ?", self.mapping.updated_date_column()));
            values.push(datetime_value(now));
            pending_stamp = Some((actor, now));
        }

        if capabilities.version {
            let version = entity.version().ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "update of {} requires a loaded version",
                    self.entity_name()
                ))
            })?;
            let version_column = self.mapping.version_column();
            assignments.push(format!("{version_column} = {version_column} + 1"));
            let sql = format!(
                "UPDATE {} SET {} WHERE {} = ? AND {version_column} = ? RETURNING {version_column}",
                self.mapping.table(),
                assignments.join(", "),
                self.mapping.id_column()
            );
            values.push(key_value(&key)?);
            values.push(key_value(&version)?);

            let advanced = self
                .session
                .query_optional(&sql, &values, |row| row.get::<_, E::Key>(0))?;
            match advanced {
                Some(new_version) => {
                    entity.state_mut().version = Some(new_version);
                }
                None if self.exists(&key)? => {
                    return Err(RepoError::StaleVersion {
                        entity: self.entity_name().to_string(),
                        key: key.to_string(),
                    });
                }
                None => {
                    return Err(RepoError::NotFound {
                        entity: self.entity_name().to_string(),
                        key: key.to_string(),
                    });
                }
            }
        } else {
            let sql = format!(
                "UPDATE {} SET {} WHERE {} = ?",
                self.mapping.table(),
                assignments.join(", "),
                self.mapping.id_column()
            );
            values.push(key_value(&key)?);
            let affected = self.session.execute_sql(&sql, &values)?;
            if affected == 0 {
                return Err(RepoError::NotFound {
                    entity: self.entity_name().to_string(),
                    key: key.to_string(),
                });
            }
        }

        if let Some((actor, at)) = pending_stamp {
            entity.state_mut().stamp_updated(&actor, at);
        }
        self.session.track(self.entity_name(), key.to_string());
        info!(
            "event=update module=repo status=ok entity={} key={key}",
            self.entity_name()
        );
        Ok(())
    }

    /// Soft delete writes the tombstone block and keeps the row readable;
    /// hard delete removes it. Returns whether a row was affected.
    fn delete_by_id(&self, key: E::Key, is_soft_delete: bool) -> RepoResult<bool> {
        let capabilities = self.mapping.capabilities();
        let affected = if is_soft_delete && capabilities.soft_delete {
            let actor = self.session.actor().to_string();
            let now = Utc::now();
            let sql = format!(
                "UPDATE {} SET {} = 1, {} = ?, {} = ? WHERE {} = ?",
                self.mapping.table(),
                self.mapping.is_deleted_column(),
                self.mapping.deleted_date_column(),
                self.mapping.deleted_by_column(),
                self.mapping.id_column()
            );
            self.session.execute_sql(
                &sql,
                &[
                    datetime_value(now),
                    Value::Text(actor),
                    key_value(&key)?,
                ],
            )?
        } else {
            let sql = format!(
                "DELETE FROM {} WHERE {} = ?",
                self.mapping.table(),
                self.mapping.id_column()
            );
            let affected = self.session.execute_sql(&sql, &[key_value(&key)?])?;
            self.session.untrack(self.entity_name(), &key.to_string());
            affected
        };
        info!(
            "event=delete module=repo status=ok entity={} key={key} soft={is_soft_delete}",
            self.entity_name()
        );
        Ok(affected == 1)
    }

    fn delete(&self, entity: &E) -> RepoResult<()> {
        let key = self.require_id(entity, "delete")?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            self.mapping.table(),
            self.mapping.id_column()
        );
        let affected = self.session.execute_sql(&sql, &[key_value(&key)?])?;
        self.session.untrack(self.entity_name(), &key.to_string());
        if affected == 0 {
            return Err(RepoError::NotFound {
                entity: self.entity_name().to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn save_or_update(&self, entity: &mut E) -> RepoResult<()> {
        if entity.id().is_none() {
            self.insert(entity)
        } else {
            self.update(entity)
        }
    }

    /// Reattaches a detached instance: data comes from the detached copy,
    /// the creation stamp from the persistent row, and the version check
    /// uses the detached version when it carries one. A transient input is
    /// saved as a copy; the passed-in instance is never attached.
    fn merge(&self, detached: &E) -> RepoResult<E> {
        let key = match detached.id() {
            Some(key) => key,
            None => {
                let mut saved = detached.clone();
                self.insert(&mut saved)?;
                return Ok(saved);
            }
        };
        let persistent = self.get(key)?.ok_or_else(|| RepoError::NotFound {
            entity: self.entity_name().to_string(),
            key: key.to_string(),
        })?;

        let mut merged = detached.clone();
        {
            let state = merged.state_mut();
            state.audit = persistent.state().audit.clone();
            if state.version.is_none() {
                state.version = persistent.state().version;
            }
            state.soft_delete = persistent.state().soft_delete.clone();
        }
        self.update(&mut merged)?;
        Ok(merged)
    }

    fn refresh(&self, entity: &mut E) -> RepoResult<()> {
        let key = self.require_id(entity, "refresh")?;
        let fresh = self.get(key)?.ok_or_else(|| RepoError::NotFound {
            entity: self.entity_name().to_string(),
            key: key.to_string(),
        })?;
        *entity = fresh;
        Ok(())
    }

    fn is_valid(&self, _entity: &E) -> RepoResult<bool> {
        Err(RepoError::NotImplemented("is_valid"))
    }

    fn create_query(&self, text: &str) -> Query {
        Query::new(self.mapping.rewrite_query_text(text))
    }

    fn create_sql_query(&self, text: &str) -> Query {
        Query::new(text)
    }

    fn execute_update(&self, query: &Query) -> RepoResult<usize> {
        query.execute_update(self.session)
    }

    fn to_sql(&self, query: &EntityQuery<E>) -> RepoResult<String> {
        query.to_sql(self.session)
    }

    /// Completes the properties the instance reports as unset with one
    /// projection read. Scalars arrive as values; references arrive as
    /// key-only handles the caller can load on demand, and only for
    /// mappings that declare lazy references.
    fn initialize_lazy_properties(&self, entity: &mut E) -> RepoResult<()> {
        let unset = entity.unset_properties();
        if unset.is_empty() {
            return Ok(());
        }
        let key = self.require_id(entity, "initialize_lazy_properties")?;

        let lazy_references = self.mapping.uses_lazy_references();
        let mut columns = Vec::with_capacity(unset.len());
        let mut kinds = Vec::with_capacity(unset.len());
        for name in &unset {
            let meta = self.mapping.require_property(name)?;
            if meta.is_reference() && !lazy_references {
                continue;
            }
            columns.push(format!("{} AS {}", meta.column, meta.name));
            kinds.push((meta.name, meta.kind.clone()));
        }
        if columns.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            columns.join(", "),
            self.mapping.table(),
            self.mapping.id_column()
        );

        let loaded = self
            .session
            .query_optional(&sql, &[key_value(&key)?], |row| {
                let mut values = Vec::with_capacity(kinds.len());
                for (name, kind) in &kinds {
                    let raw = Value::from(row.get_ref(*name)?);
                    let value = match kind {
                        PropertyKind::Scalar => PropertyValue::Scalar(raw),
                        PropertyKind::Reference { .. } => PropertyValue::Reference(raw),
                    };
                    values.push((*name, value));
                }
                Ok(values)
            })?;
        let values = loaded.ok_or_else(|| RepoError::NotFound {
            entity: self.entity_name().to_string(),
            key: key.to_string(),
        })?;

        for (name, value) in values {
            if !entity.apply_property(name, value) {
                return Err(RepoError::InvalidData(format!(
                    "{} refused lazily loaded property `{name}`",
                    self.entity_name()
                )));
            }
        }
        debug!(
            "event=lazy_init module=repo status=ok entity={} key={key} properties={}",
            self.entity_name(),
            kinds.len()
        );
        Ok(())
    }

    fn load_reference(&self, reference: &mut Lazy<E::Key, E>) -> RepoResult<()> {
        let key = match reference {
            Lazy::Loaded(_) => return Ok(()),
            Lazy::Unloaded(key) => *key,
        };
        let loaded = self.get(key)?.ok_or_else(|| RepoError::NotFound {
            entity: self.entity_name().to_string(),
            key: key.to_string(),
        })?;
        *reference = Lazy::Loaded(loaded);
        Ok(())
    }

    /// The identifier of a tracked instance. Untracked or transient
    /// instances have no usable identifier from this session's view.
    fn get_identifier(&self, entity: &E) -> RepoResult<E::Key> {
        let key = entity.id().ok_or_else(|| RepoError::NotTracked {
            entity: self.entity_name().to_string(),
        })?;
        if !self.session.is_tracked(self.entity_name(), &key.to_string()) {
            return Err(RepoError::NotTracked {
                entity: self.entity_name().to_string(),
            });
        }
        Ok(key)
    }

    fn enable_filter(&self, name: &str) -> RepoResult<()> {
        Ok(self.session.enable_filter(name)?)
    }

    fn enable_filter_with_default_filter_condition(&self, name: &str) -> RepoResult<bool> {
        self.session.enable_filter(name)?;
        let bound: FilterResult<bool> = self
            .session
            .with_enabled_filter(name, enable_filter_with_default_condition);
        Ok(bound?)
    }

    fn disable_filter(&self, name: &str) {
        self.session.disable_filter(name);
    }

    fn get_enabled_filter(&self, name: &str) -> Option<Filter> {
        self.session.enabled_filter(name)
    }

    fn get_filter_definition(&self, name: &str) -> Option<FilterDefinition> {
        self.session.filter_definition(name)
    }

    fn log_exception(&self, err: &rusqlite::Error) -> bool {
        diag::translate(err, self.entity_name()).log();
        true
    }
}

/// Cancellation-aware variants. Each one checks the token before touching
/// the store and fails fast with `RepoError::Cancelled`.
impl<E: Entity> SqliteRepository<'_, E> {
    pub async fn get_async(
        &self,
        key: E::Key,
        cancel: &CancellationToken,
    ) -> RepoResult<Option<E>> {
        if cancel.is_cancelled() {
            return Err(RepoError::Cancelled);
        }
        self.get(key)
    }

    pub async fn insert_async(
        &self,
        entity: &mut E,
        cancel: &CancellationToken,
    ) -> RepoResult<()> {
        if cancel.is_cancelled() {
            return Err(RepoError::Cancelled);
        }
        self.insert(entity)
    }

    pub async fn update_async(
        &self,
        entity: &mut E,
        cancel: &CancellationToken,
    ) -> RepoResult<()> {
        if cancel.is_cancelled() {
            return Err(RepoError::Cancelled);
        }
        self.update(entity)
    }

    pub async fn delete_by_id_async(
        &self,
        key: E::Key,
        is_soft_delete: bool,
        cancel: &CancellationToken,
    ) -> RepoResult<bool> {
        if cancel.is_cancelled() {
            return Err(RepoError::Cancelled);
        }
        self.delete_by_id(key, is_soft_delete)
    }

    pub async fn refresh_async(
        &self,
        entity: &mut E,
        cancel: &CancellationToken,
    ) -> RepoResult<()> {
        if cancel.is_cancelled() {
            return Err(RepoError::Cancelled);
        }
        self.refresh(entity)
    }
}
