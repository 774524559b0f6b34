//! Store configuration consumed by session factories.
//!
//! # Responsibility
//! - Describe where the relational store lives and how connections are tuned.
//! - Deserialize from application config files via `serde`.
//!
//! # Invariants
//! - A file location must carry a non-empty path.
//! - `busy_timeout_ms` of zero is allowed and disables waiting on locks.

use crate::db::ConnectionOptions;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Physical location of the store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreLocation {
    /// SQLite database file; created on first open.
    File { path: PathBuf },
    /// Private in-memory database, one per opened session.
    Memory,
}

/// Top-level configuration for the data-access layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub location: StoreLocation,
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: StoreLocation::Memory,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
        }
    }
}

impl StoreConfig {
    /// Config pointing at a database file with default tuning.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File { path: path.into() },
            ..Self::default()
        }
    }

    /// Checks invariants that `serde` cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if let StoreLocation::File { path } = &self.location {
            if path.as_os_str().is_empty() {
                return Err("store file path cannot be empty".to_string());
            }
        }
        Ok(())
    }

    pub(crate) fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            foreign_keys: self.foreign_keys,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            ..ConnectionOptions::default()
        }
    }
}
