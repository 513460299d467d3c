//! Unit of work: transaction lifecycle over one session.
//!
//! # Responsibility
//! - Begin, commit, and roll back the session transaction.
//! - Keep commit and rollback idempotent against their own terminal states.
//! - Recover a broken session when rollback itself fails.
//! - Scope at most one active unit of work per context.
//!
//! # Invariants
//! - Commit and rollback without a begun transaction fail with
//!   `UowError::NoTransaction`.
//! - A failed rollback never leaves the unit of work on a dead session:
//!   the session is closed and reopened through the factory.

use crate::db::DbError;
use crate::filter::{enable_filter_with_default_condition, FilterError, FilterResult};
use crate::session::{Session, SessionFactory};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type UowResult<T> = Result<T, UowError>;

#[derive(Debug)]
pub enum UowError {
    /// Commit or rollback was requested with no transaction begun.
    NoTransaction,
    /// A context was asked to begin while another unit of work is live.
    AlreadyActive,
    Db(DbError),
    Filter(FilterError),
}

impl Display for UowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoTransaction => write!(f, "no transaction has been begun on this unit of work"),
            Self::AlreadyActive => {
                write!(f, "a unit of work is already active in this context")
            }
            Self::Db(err) => write!(f, "store failure in unit of work: {err}"),
            Self::Filter(err) => write!(f, "filter failure in unit of work: {err}"),
        }
    }
}

impl Error for UowError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Filter(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for UowError {
    fn from(err: DbError) -> Self {
        Self::Db(err)
    }
}

impl From<FilterError> for UowError {
    fn from(err: FilterError) -> Self {
        Self::Filter(err)
    }
}

/// Lifecycle state of one begun transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Active,
    Committed,
    RolledBack,
}

/// Bookkeeping handle for the transaction begun on a unit of work.
#[derive(Debug, Clone, Copy)]
pub struct TransactionHandle {
    status: TxStatus,
}

impl TransactionHandle {
    fn new() -> Self {
        Self {
            status: TxStatus::Active,
        }
    }

    pub fn status(&self) -> TxStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == TxStatus::Active
    }

    pub fn was_committed(&self) -> bool {
        self.status == TxStatus::Committed
    }

    pub fn was_rolled_back(&self) -> bool {
        self.status == TxStatus::RolledBack
    }
}

/// True when the handle exists, is still active, and was not rolled back.
/// Callers deciding between commit and rollback at scope exit use this to
/// skip transactions that already reached a terminal state.
pub fn should_commit_or_rollback(tx: Option<&TransactionHandle>) -> bool {
    match tx {
        Some(handle) => handle.is_active() && !handle.was_rolled_back(),
        None => false,
    }
}

/// One unit of work: a session plus at most one begun transaction.
#[derive(Debug)]
pub struct UnitOfWork {
    session: Session,
    tx: Option<TransactionHandle>,
}

impl UnitOfWork {
    /// Wraps an existing session, reopening it through its factory when it
    /// arrives closed.
    pub fn new(session: Session) -> UowResult<Self> {
        let session = if session.is_open() {
            session
        } else {
            session.factory().open_session()?
        };
        Ok(Self { session, tx: None })
    }

    /// Opens a fresh session from the factory and wraps it.
    pub fn open(factory: &Arc<SessionFactory>) -> UowResult<Self> {
        Ok(Self {
            session: factory.open_session()?,
            tx: None,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transaction(&self) -> Option<&TransactionHandle> {
        self.tx.as_ref()
    }

    /// Begins a deferred-to-immediate write transaction, reopening the
    /// session first if it was closed.
    pub fn begin_transaction(&mut self) -> UowResult<()> {
        if !self.session.is_open() {
            self.session = self.session.factory().open_session()?;
        }
        self.session.begin_immediate()?;
        self.tx = Some(TransactionHandle::new());
        info!("event=tx_begin module=uow status=ok");
        Ok(())
    }

    /// Commits the begun transaction. Calling again after a successful
    /// commit is a no-op.
    pub fn commit(&mut self) -> UowResult<()> {
        let handle = self.tx.as_mut().ok_or(UowError::NoTransaction)?;
        if handle.was_committed() {
            return Ok(());
        }
        self.session.commit_tx()?;
        handle.status = TxStatus::Committed;
        info!("event=tx_commit module=uow status=ok");
        Ok(())
    }

    /// Rolls back the begun transaction. Calling again after a rollback is
    /// a no-op. When the rollback statement itself fails, the session is
    /// closed and a new one is opened so the unit of work stays usable;
    /// the transaction is still marked rolled back.
    pub fn rollback(&mut self) -> UowResult<()> {
        let handle = self.tx.as_mut().ok_or(UowError::NoTransaction)?;
        if handle.was_rolled_back() {
            return Ok(());
        }
        if let Err(err) = self.session.rollback_tx() {
            error!("event=tx_rollback module=uow status=error error={err}");
            self.close_session_and_open_new_session()?;
            if let Some(handle) = self.tx.as_mut() {
                handle.status = TxStatus::RolledBack;
            }
            warn!("event=session_recovered module=uow status=ok");
            return Ok(());
        }
        handle.status = TxStatus::RolledBack;
        info!("event=tx_rollback module=uow status=ok");
        Ok(())
    }

    /// Enables a registered filter on the session and binds its default
    /// condition. Returns whether the activation bound usable values.
    pub fn enable_filter(&self, name: &str) -> FilterResult<bool> {
        self.session.enable_filter(name)?;
        self.session
            .with_enabled_filter(name, enable_filter_with_default_condition)
    }

    fn close_session_and_open_new_session(&mut self) -> UowResult<()> {
        self.session.close();
        self.session = self.session.factory().open_session()?;
        Ok(())
    }
}

/// Explicit replacement for ambient per-thread state: at most one active
/// unit of work, owned and passed by the caller.
#[derive(Default)]
pub struct UnitOfWorkContext {
    current: Option<UnitOfWork>,
}

impl UnitOfWorkContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a unit of work in this context. Fails while another one is
    /// still held.
    pub fn begin(&mut self, factory: &Arc<SessionFactory>) -> UowResult<&mut UnitOfWork> {
        if self.current.is_some() {
            return Err(UowError::AlreadyActive);
        }
        Ok(self.current.insert(UnitOfWork::open(factory)?))
    }

    pub fn current(&self) -> Option<&UnitOfWork> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut UnitOfWork> {
        self.current.as_mut()
    }

    /// Releases the held unit of work, returning it to the caller for any
    /// final commit or rollback decision.
    pub fn release(&mut self) -> Option<UnitOfWork> {
        self.current.take()
    }
}
