//! Generic repository over one entity type.
//!
//! # Responsibility
//! - Compose filter, ordering, includes and tracking into one store read.
//! - Stage mutations on the bound session; flush only when asked to.
//!
//! # Invariants
//! - Bound to a single session for its whole lifetime.
//! - Every operation fails with `SessionUnavailable` once that session is
//!   released.

use crate::entity::Entity;
use crate::query::{Filter, Query, Tracking};
use crate::repo::error::RepoResult;
use crate::session::SessionRef;
use log::debug;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

/// Whether a single-entity mutation also commits the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Stage only; durable on the next `UnitOfWork::save`.
    #[default]
    Deferred,
    /// Stage, then flush every staged change of the session right away.
    Immediate,
}

/// Reads and staged writes for entity type `T` within one session.
pub struct GenericRepository<T: Entity> {
    session: SessionRef,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> GenericRepository<T> {
    pub(crate) fn new(session: SessionRef) -> Self {
        Self {
            session,
            _entity: PhantomData,
        }
    }

    /// Returns every entity matching `query`, fully materialized.
    ///
    /// Without explicit ordering rows come back in primary-key order.
    pub fn get_all(&self, query: &Query<'_, T>) -> RepoResult<Vec<T>> {
        let entities = self.session.read(|session| session.load(query, None))?;
        debug!(
            "event=repo_get_all module=repo table={} rows={} tracking={:?}",
            T::TABLE,
            entities.len(),
            query.tracking
        );
        self.track_if_requested(query.tracking, entities)
    }

    /// Returns the first entity matching `query`, or `None`.
    pub fn get_one(&self, query: &Query<'_, T>) -> RepoResult<Option<T>> {
        let loaded = self.session.read(|session| session.load(query, Some(1)))?;
        Ok(self
            .track_if_requested(query.tracking, loaded)?
            .into_iter()
            .next())
    }

    /// Primary-key lookup served from the identity map when possible.
    ///
    /// Entities with a staged delete are reported as absent; rows loaded from
    /// the store are tracked.
    pub fn get_by_id(&self, key: &T::Key) -> RepoResult<Option<T>> {
        let (entity, from_store) = self.session.read(|session| {
            match session.tracked::<T>(key) {
                Some(entity) => Ok((entity, false)),
                None => Ok((session.find_in_store::<T>(key)?, true)),
            }
        })?;

        if from_store {
            if let Some(entity) = &entity {
                let tracked = entity.clone();
                self.session.write(|session| {
                    session.track(tracked);
                    Ok(())
                })?;
            }
        }
        Ok(entity)
    }

    /// Stages `entity` for insertion.
    pub fn add(&self, entity: &T) -> RepoResult<()> {
        self.session.write(|session| {
            session.stage_insert(entity);
            Ok(())
        })
    }

    /// Stages every element of `entities` for insertion.
    pub fn add_range(&self, entities: &[T]) -> RepoResult<()> {
        self.session.write(|session| {
            for entity in entities {
                session.stage_insert(entity);
            }
            Ok(())
        })
    }

    /// Stages a full-value replacement of `entity`.
    pub fn update(&self, entity: &T, mode: WriteMode) -> RepoResult<()> {
        self.session.write(|session| {
            session.stage_update(entity);
            if mode == WriteMode::Immediate {
                session.flush()?;
            }
            Ok(())
        })
    }

    /// Stages removal of `entity` by key.
    pub fn delete(&self, entity: &T, mode: WriteMode) -> RepoResult<()> {
        self.session.write(|session| {
            session.stage_delete(entity);
            if mode == WriteMode::Immediate {
                session.flush()?;
            }
            Ok(())
        })
    }

    /// Stages removal of every element of `entities`.
    pub fn delete_range(&self, entities: &[T]) -> RepoResult<()> {
        self.session.write(|session| {
            for entity in entities {
                session.stage_delete(entity);
            }
            Ok(())
        })
    }

    /// Tests for a matching row without materializing it.
    pub fn exists(&self, filter: Option<&Filter>) -> RepoResult<bool> {
        self.session.read(|session| session.exists::<T>(filter))
    }

    /// Counts matching rows in the store.
    pub fn count(&self, filter: Option<&Filter>) -> RepoResult<u64> {
        self.session.read(|session| session.count::<T>(filter))
    }

    /// Tracked reads hand back the session's copy of rows it already tracks.
    fn track_if_requested(&self, tracking: Tracking, entities: Vec<T>) -> RepoResult<Vec<T>> {
        if tracking == Tracking::NoTracking || entities.is_empty() {
            return Ok(entities);
        }
        self.session.write(|session| {
            let resolved = entities
                .into_iter()
                .map(|entity| match session.tracked::<T>(&entity.key()) {
                    Some(Some(current)) => current,
                    _ => {
                        session.track(entity.clone());
                        entity
                    }
                })
                .collect();
            Ok(resolved)
        })
    }
}

impl<T: Entity> Debug for GenericRepository<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericRepository")
            .field("table", &T::TABLE)
            .finish()
    }
}
