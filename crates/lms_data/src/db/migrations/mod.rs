//! SQLite migration executor for caller-owned schemas.
//!
//! The data-access layer does not define a domain schema; applications pass
//! their own ordered migration list when opening sessions.
//!
//! # Invariants
//! - `version` values must be strictly increasing.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - Pending migrations are applied in one transaction.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// One schema step identified by its target `user_version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub sql: &'static str,
}

impl Migration {
    pub const fn new(version: u32, sql: &'static str) -> Self {
        Self { version, sql }
    }
}

/// Returns the latest version in `migrations`, or `0` when empty.
pub fn latest_version(migrations: &[Migration]) -> u32 {
    migrations.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection, migrations: &[Migration]) -> DbResult<()> {
    ensure_monotonic(migrations)?;

    let current_version = current_user_version(conn)?;
    let latest = latest_version(migrations);

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in migrations {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={}",
        current_version, latest
    );
    Ok(())
}

/// Reads `PRAGMA user_version` from the connection.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn ensure_monotonic(migrations: &[Migration]) -> DbResult<()> {
    for pair in migrations.windows(2) {
        if pair[1].version <= pair[0].version {
            return Err(DbError::NonMonotonicMigrations {
                previous: pair[0].version,
                found: pair[1].version,
            });
        }
    }
    Ok(())
}
