//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by session behavior.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have migrations fully applied.
//! - `foreign_keys` is set according to the supplied options.

use super::migrations::{apply_migrations, Migration};
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Per-connection settings applied right after open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub foreign_keys: bool,
    pub busy_timeout: Duration,
    pub migrations: Vec<Migration>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            foreign_keys: true,
            busy_timeout: Duration::from_secs(5),
            migrations: Vec::new(),
        }
    }
}

impl ConnectionOptions {
    pub fn with_migrations(mut self, migrations: &[Migration]) -> Self {
        self.migrations = migrations.to_vec();
        self
    }
}

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Creates the database file when missing.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>, options: &ConnectionOptions) -> DbResult<Connection> {
    open_with(Mode::File, || Connection::open(path), options)
}

/// Opens a private in-memory SQLite database and applies all pending migrations.
pub fn open_db_in_memory(options: &ConnectionOptions) -> DbResult<Connection> {
    open_with(Mode::Memory, Connection::open_in_memory, options)
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    File,
    Memory,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

fn open_with(
    mode: Mode,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
    options: &ConnectionOptions,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start mode={}",
        mode.as_str()
    );

    let mut conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, options) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode.as_str(),
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, options: &ConnectionOptions) -> DbResult<()> {
    let pragma = if options.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {pragma};"))?;
    conn.busy_timeout(options.busy_timeout)?;
    apply_migrations(conn, &options.migrations)?;
    Ok(())
}
