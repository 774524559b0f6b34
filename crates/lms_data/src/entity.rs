//! Entity capability required by the generic repository.
//!
//! # Responsibility
//! - Describe how one record type maps onto one table.
//! - Expose the primary key used for identity tracking and key lookups.
//!
//! # Invariants
//! - `COLUMNS` excludes `KEY_COLUMN` and matches `to_values()` order.
//! - `key()` is stable for the lifetime of a record.

use rusqlite::types::{FromSql, ToSql, Value};
use rusqlite::Row;
use std::fmt::Debug;
use std::hash::Hash;

/// A domain record persisted in a single table and identified by its key.
///
/// Keys are assigned by the caller; the store never generates them.
pub trait Entity: Clone + 'static {
    type Key: ToSql + FromSql + Clone + Eq + Hash + Debug + 'static;

    /// Table holding the records.
    const TABLE: &'static str;
    /// Primary-key column.
    const KEY_COLUMN: &'static str;
    /// Non-key columns, in the order produced by [`Entity::to_values`].
    const COLUMNS: &'static [&'static str];

    fn key(&self) -> Self::Key;

    /// Non-key column values, aligned with [`Entity::COLUMNS`].
    fn to_values(&self) -> Vec<Value>;

    /// Maps a row selected with `KEY_COLUMN` followed by `COLUMNS`.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// Comma-separated select list: key column first, then `COLUMNS`.
pub(crate) fn select_list<T: Entity>() -> String {
    std::iter::once(T::KEY_COLUMN)
        .chain(T::COLUMNS.iter().copied())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Returns whether `column` belongs to the entity's table mapping.
pub(crate) fn has_column<T: Entity>(column: &str) -> bool {
    column == T::KEY_COLUMN || T::COLUMNS.contains(&column)
}
