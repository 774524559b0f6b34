//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections backing persistence sessions.
//! - Apply caller-supplied schema migrations in deterministic order.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No session is handed out before migrations succeed.

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, ConnectionOptions};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    #[error("migration versions must be strictly increasing (found {found} after {previous})")]
    NonMonotonicMigrations { previous: u32, found: u32 },
}
