//! Persistence session: one SQLite connection plus change tracking.
//!
//! # Responsibility
//! - Materialize repository queries against the bound connection.
//! - Keep the identity map and the ordered list of staged changes.
//! - Apply every staged change in one transaction on flush.
//!
//! # Invariants
//! - A session is owned by exactly one unit of work; repositories only hold
//!   weak references to it.
//! - Flush is all-or-nothing: a rejected change rolls back the whole batch
//!   and leaves the staged list untouched.
//! - Reads go to the store; only key lookups consult the identity map.

mod identity;
mod staged;

pub use staged::{ChangeKind, PendingChange};

use crate::config::{StoreConfig, StoreLocation};
use crate::db::migrations::Migration;
use crate::db::{open_db, open_db_in_memory, ConnectionOptions};
use crate::entity::{select_list, Entity};
use crate::query::{Filter, OrderBy, Query};
use crate::repo::error::{ConflictError, RepoError, RepoResult};
use identity::{IdentityMap, Tracked};
use log::{debug, error, info};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use staged::StagedChange;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Instant;

/// Open connection/transaction context shared by one unit of work.
pub struct Session {
    conn: Connection,
    identity: IdentityMap,
    staged: Vec<StagedChange>,
}

impl Session {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            identity: IdentityMap::default(),
            staged: Vec::new(),
        }
    }

    /// Raw connection, for schema setup and diagnostics.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn has_changes(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Staged mutations in the order they will be applied.
    pub fn pending_changes(&self) -> Vec<PendingChange> {
        self.staged.iter().map(StagedChange::summary).collect()
    }

    /// Forgets staged changes and detaches every tracked entity.
    pub fn discard_changes(&mut self) {
        if !self.staged.is_empty() {
            info!(
                "event=session_discard module=session status=ok changes={}",
                self.staged.len()
            );
        }
        self.staged.clear();
        self.identity.clear();
    }

    pub(crate) fn load<T: Entity>(
        &self,
        query: &Query<'_, T>,
        limit: Option<u32>,
    ) -> RepoResult<Vec<T>> {
        let (sql, params) = select_sql::<T>(query.filter.as_ref(), &query.order_by, limit)?;
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            entities.push(T::from_row(row).map_err(row_error::<T>)?);
        }

        if !query.includes.is_empty() {
            let loader = Loader { session: self };
            for entity in &mut entities {
                for include in &query.includes {
                    include(entity, &loader)?;
                }
            }
        }

        Ok(entities)
    }

    /// Session view of `key`: `Some(None)` when a removal is staged.
    pub(crate) fn tracked<T: Entity>(&self, key: &T::Key) -> Option<Option<T>> {
        self.identity.get::<T>(key).map(|entry| match entry {
            Tracked::Present(entity) => Some(entity.clone()),
            Tracked::Removed => None,
        })
    }

    pub(crate) fn find_in_store<T: Entity>(&self, key: &T::Key) -> RepoResult<Option<T>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1;",
            select_list::<T>(),
            T::TABLE,
            T::KEY_COLUMN
        );
        let found = self
            .conn
            .query_row(&sql, params![key], |row| T::from_row(row))
            .optional()
            .map_err(row_error::<T>)?;
        Ok(found)
    }

    pub(crate) fn exists<T: Entity>(&self, filter: Option<&Filter>) -> RepoResult<bool> {
        let (predicate, params) = where_clause::<T>(filter)?;
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {}{predicate});", T::TABLE);
        let exists: i64 = self
            .conn
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(exists == 1)
    }

    pub(crate) fn count<T: Entity>(&self, filter: Option<&Filter>) -> RepoResult<u64> {
        let (predicate, params) = where_clause::<T>(filter)?;
        let sql = format!("SELECT COUNT(*) FROM {}{predicate};", T::TABLE);
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative count {count}")))
    }

    pub(crate) fn track<T: Entity>(&mut self, entity: T) {
        self.identity.put_if_absent(entity);
    }

    pub(crate) fn stage_insert<T: Entity>(&mut self, entity: &T) {
        self.staged.push(StagedChange::insert(entity));
        self.identity.put(entity.clone());
    }

    pub(crate) fn stage_update<T: Entity>(&mut self, entity: &T) {
        self.staged.push(StagedChange::update(entity));
        self.identity.put(entity.clone());
    }

    pub(crate) fn stage_delete<T: Entity>(&mut self, entity: &T) {
        self.staged.push(StagedChange::delete(entity));
        self.identity.mark_removed::<T>(entity.key());
    }

    /// Commits all staged changes atomically and returns how many were applied.
    pub(crate) fn flush(&mut self) -> RepoResult<usize> {
        if self.staged.is_empty() {
            return Ok(0);
        }

        let started_at = Instant::now();
        match apply_staged(&mut self.conn, &self.staged) {
            Ok(applied) => {
                info!(
                    "event=session_flush module=session status=ok changes={} duration_ms={}",
                    applied,
                    started_at.elapsed().as_millis()
                );
                self.staged.clear();
                self.identity.purge_removed();
                Ok(applied)
            }
            Err(err) => {
                error!(
                    "event=session_flush module=session status=error changes={} duration_ms={} error_code=flush_rejected error={}",
                    self.staged.len(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!(
            "event=session_release module=session status=ok unsaved_changes={} tracked={}",
            self.staged.len(),
            self.identity.len()
        );
    }
}

fn apply_staged(conn: &mut Connection, staged: &[StagedChange]) -> RepoResult<usize> {
    let tx = conn.transaction()?;
    // Foreign keys are checked at COMMIT so staging order between entities is free.
    tx.pragma_update(None, "defer_foreign_keys", true)?;
    for change in staged {
        let affected = tx
            .execute(&change.sql, params_from_iter(change.params.iter()))
            .map_err(|err| ConflictError::from_store(change.table, err))?;
        if change.kind != ChangeKind::Insert && affected == 0 {
            return Err(ConflictError::RowMissing {
                table: change.table,
                key: change.key.clone(),
            }
            .into());
        }
    }
    tx.commit().map_err(|err| ConflictError::from_store("*", err))?;
    Ok(staged.len())
}

fn where_clause<T: Entity>(filter: Option<&Filter>) -> RepoResult<(String, Vec<Value>)> {
    let mut sql = String::new();
    let mut params = Vec::new();
    if let Some(filter) = filter {
        sql.push_str(" WHERE ");
        filter.render::<T>(&mut sql, &mut params)?;
    }
    Ok((sql, params))
}

fn select_sql<T: Entity>(
    filter: Option<&Filter>,
    order_by: &[OrderBy],
    limit: Option<u32>,
) -> RepoResult<(String, Vec<Value>)> {
    let (predicate, mut params) = where_clause::<T>(filter)?;
    let mut terms = order_by
        .iter()
        .map(OrderBy::render::<T>)
        .collect::<RepoResult<Vec<_>>>()?;
    if !order_by.iter().any(|term| term.column == T::KEY_COLUMN) {
        terms.push(format!("{} ASC", T::KEY_COLUMN));
    }

    let mut sql = format!(
        "SELECT {} FROM {}{predicate} ORDER BY {}",
        select_list::<T>(),
        T::TABLE,
        terms.join(", ")
    );
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        params.push(Value::Integer(i64::from(limit)));
    }
    sql.push(';');
    Ok((sql, params))
}

fn row_error<T: Entity>(err: rusqlite::Error) -> RepoError {
    match err {
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => {
            RepoError::InvalidData(format!("cannot map `{}` row: {err}", T::TABLE))
        }
        other => other.into(),
    }
}

/// Read-only session access handed to include hooks.
pub struct Loader<'s> {
    session: &'s Session,
}

impl Loader<'_> {
    /// Key lookup that honors the identity map, without tracking the result.
    pub fn find<U: Entity>(&self, key: &U::Key) -> RepoResult<Option<U>> {
        match self.session.tracked::<U>(key) {
            Some(entity) => Ok(entity),
            None => self.session.find_in_store::<U>(key),
        }
    }

    /// Runs `query` against the same session; tracking mode is ignored.
    pub fn list<U: Entity>(&self, query: &Query<'_, U>) -> RepoResult<Vec<U>> {
        self.session.load(query, None)
    }
}

pub(crate) type SessionSlot = RefCell<Option<Session>>;

/// Non-owning handle to a unit of work's session.
#[derive(Clone)]
pub(crate) struct SessionRef {
    slot: Weak<SessionSlot>,
}

impl SessionRef {
    pub(crate) fn new(slot: &Rc<SessionSlot>) -> Self {
        Self {
            slot: Rc::downgrade(slot),
        }
    }

    pub(crate) fn read<R>(&self, op: impl FnOnce(&Session) -> RepoResult<R>) -> RepoResult<R> {
        let slot = self.slot.upgrade().ok_or(RepoError::SessionUnavailable)?;
        let guard = slot.try_borrow().map_err(|_| RepoError::SessionBusy)?;
        let session = guard.as_ref().ok_or(RepoError::SessionUnavailable)?;
        op(session)
    }

    pub(crate) fn write<R>(
        &self,
        op: impl FnOnce(&mut Session) -> RepoResult<R>,
    ) -> RepoResult<R> {
        let slot = self.slot.upgrade().ok_or(RepoError::SessionUnavailable)?;
        let mut guard = slot.try_borrow_mut().map_err(|_| RepoError::SessionBusy)?;
        let session = guard.as_mut().ok_or(RepoError::SessionUnavailable)?;
        op(session)
    }
}

/// Source of fresh persistence sessions, one per unit of work.
pub trait SessionFactory {
    fn open_session(&self) -> RepoResult<Session>;
}

impl<F> SessionFactory for F
where
    F: Fn() -> RepoResult<Session>,
{
    fn open_session(&self) -> RepoResult<Session> {
        self()
    }
}

/// Opens SQLite-backed sessions from a [`StoreConfig`].
#[derive(Debug, Clone)]
pub struct SqliteSessionFactory {
    config: StoreConfig,
    options: ConnectionOptions,
}

impl SqliteSessionFactory {
    /// Validates `config` up front so misconfiguration fails at construction.
    pub fn new(config: StoreConfig, migrations: &[Migration]) -> RepoResult<Self> {
        config.validate().map_err(RepoError::InvalidConfig)?;
        let options = config.connection_options().with_migrations(migrations);
        Ok(Self { config, options })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl SessionFactory for SqliteSessionFactory {
    fn open_session(&self) -> RepoResult<Session> {
        let conn = match &self.config.location {
            StoreLocation::File { path } => open_db(path, &self.options)?,
            StoreLocation::Memory => open_db_in_memory(&self.options)?,
        };
        Ok(Session::new(conn))
    }
}
