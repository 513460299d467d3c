//! Store diagnostics: classify driver failures for logging.
//!
//! # Responsibility
//! - Translate raw driver errors into a small diagnostic taxonomy.
//! - Emit the structured error log line repositories rely on.

use log::error;
use rusqlite::ffi::ErrorCode;
use std::fmt::{Display, Formatter};

/// Coarse failure category, stable across driver versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCategory {
    /// Unique, foreign-key, not-null, or check constraint violations.
    ConstraintViolation,
    /// The store was busy or a table was locked.
    BusyOrLocked,
    /// The driver API was used out of sequence.
    Misuse,
    Other,
}

impl DiagnosticCategory {
    fn as_str(&self) -> &'static str {
        match self {
            Self::ConstraintViolation => "constraint_violation",
            Self::BusyOrLocked => "busy_or_locked",
            Self::Misuse => "misuse",
            Self::Other => "other",
        }
    }
}

/// A classified store failure tied to the entity being worked on.
#[derive(Debug, Clone)]
pub struct StoreDiagnostic {
    pub entity: String,
    pub category: DiagnosticCategory,
    pub code: Option<i32>,
    pub message: String,
}

impl Display for StoreDiagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} failure on {}: {}",
            self.category.as_str(),
            self.entity,
            self.message
        )?;
        if let Some(code) = self.code {
            write!(f, " (code {code})")?;
        }
        Ok(())
    }
}

impl StoreDiagnostic {
    pub fn log(&self) {
        error!(
            "event=store_error module=diag status=error entity={} category={} message={}",
            self.entity,
            self.category.as_str(),
            self.message
        );
    }
}

/// Classifies a driver error. Non-driver failures land in `Other`.
pub fn translate(err: &rusqlite::Error, entity: &str) -> StoreDiagnostic {
    let (category, code) = match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            let category = match failure.code {
                ErrorCode::ConstraintViolation => DiagnosticCategory::ConstraintViolation,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    DiagnosticCategory::BusyOrLocked
                }
                ErrorCode::ApiMisuse => DiagnosticCategory::Misuse,
                _ => DiagnosticCategory::Other,
            };
            (category, Some(failure.extended_code))
        }
        _ => (DiagnosticCategory::Other, None),
    };
    StoreDiagnostic {
        entity: entity.to_string(),
        category,
        code,
        message: err.to_string(),
    }
}
