//! Staged mutations waiting for the next flush.

use crate::entity::{select_list, Entity};
use rusqlite::types::ToSql;
use std::fmt::{Debug, Formatter};

/// Kind of mutation recorded by a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Public summary of one staged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub table: &'static str,
    pub kind: ChangeKind,
    /// Debug rendering of the primary key.
    pub key: String,
}

/// Rendered statement plus bound values, applied verbatim at flush.
pub(crate) struct StagedChange {
    pub(crate) table: &'static str,
    pub(crate) kind: ChangeKind,
    pub(crate) key: String,
    pub(crate) sql: String,
    pub(crate) params: Vec<Box<dyn ToSql>>,
}

impl StagedChange {
    pub(crate) fn insert<T: Entity>(entity: &T) -> Self {
        let slots = vec!["?"; T::COLUMNS.len() + 1].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({slots});",
            T::TABLE,
            select_list::<T>()
        );
        Self::with_values(ChangeKind::Insert, entity, sql, true)
    }

    pub(crate) fn update<T: Entity>(entity: &T) -> Self {
        let assignments = T::COLUMNS
            .iter()
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {} = ?;",
            T::TABLE,
            T::KEY_COLUMN
        );
        Self::with_values(ChangeKind::Update, entity, sql, false)
    }

    pub(crate) fn delete<T: Entity>(entity: &T) -> Self {
        let key = entity.key();
        Self {
            table: T::TABLE,
            kind: ChangeKind::Delete,
            key: format!("{key:?}"),
            sql: format!("DELETE FROM {} WHERE {} = ?;", T::TABLE, T::KEY_COLUMN),
            params: vec![Box::new(key) as Box<dyn ToSql>],
        }
    }

    /// Binds non-key values with the key either first (insert) or last (update).
    fn with_values<T: Entity>(kind: ChangeKind, entity: &T, sql: String, key_first: bool) -> Self {
        let key = entity.key();
        let key_repr = format!("{key:?}");
        let mut params: Vec<Box<dyn ToSql>> = Vec::with_capacity(T::COLUMNS.len() + 1);
        if key_first {
            params.push(Box::new(key.clone()));
        }
        params.extend(
            entity
                .to_values()
                .into_iter()
                .map(|value| Box::new(value) as Box<dyn ToSql>),
        );
        if !key_first {
            params.push(Box::new(key));
        }

        Self {
            table: T::TABLE,
            kind,
            key: key_repr,
            sql,
            params,
        }
    }

    pub(crate) fn summary(&self) -> PendingChange {
        PendingChange {
            table: self.table,
            kind: self.kind,
            key: self.key.clone(),
        }
    }
}

impl Debug for StagedChange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedChange")
            .field("table", &self.table)
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("sql", &self.sql)
            .field("params", &self.params.len())
            .finish()
    }
}
