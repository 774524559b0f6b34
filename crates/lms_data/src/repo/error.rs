//! Error taxonomy surfaced by repositories and the unit of work.
//!
//! # Invariants
//! - "Not found" is never an error; lookups return `None`.
//! - Store failures propagate unchanged as the error source.

use crate::db::DbError;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// The owning unit of work released (or dropped) its session.
    #[error("persistence session is unavailable")]
    SessionUnavailable,
    /// The session is already borrowed by an in-flight operation, e.g. a
    /// write attempted from inside an include hook.
    #[error("persistence session is busy with another operation")]
    SessionBusy,
    /// The store rejected a flush; nothing from the batch was committed.
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
    #[error("unknown column `{column}` for table `{table}`")]
    UnknownColumn {
        table: &'static str,
        column: String,
    },
}

impl RepoError {
    pub fn is_session_unavailable(&self) -> bool {
        matches!(self, Self::SessionUnavailable)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Why a flush was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    #[error("constraint violation on `{table}`: {source}")]
    Constraint {
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    /// An update or delete matched no row: the record changed underneath us.
    #[error("`{table}` row with key {key} was modified or removed concurrently")]
    RowMissing { table: &'static str, key: String },
    #[error("store rejected the change batch on `{table}`: {source}")]
    Store {
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl ConflictError {
    pub(crate) fn from_store(table: &'static str, source: rusqlite::Error) -> Self {
        let is_constraint = matches!(
            source.sqlite_error_code(),
            Some(rusqlite::ErrorCode::ConstraintViolation)
        );
        if is_constraint {
            Self::Constraint { table, source }
        } else {
            Self::Store { table, source }
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Constraint { table, .. }
            | Self::RowMissing { table, .. }
            | Self::Store { table, .. } => table,
        }
    }
}
