//! Unit of work: one session, one repository per entity type, one commit.
//!
//! # Responsibility
//! - Own the persistence session for one logical operation.
//! - Lazily create and cache exactly one repository per entity type.
//! - Commit all staged changes of all repositories atomically on `save`.
//!
//! # Invariants
//! - Lifecycle is `Active -> Disposed`; nothing leaves `Disposed`.
//! - Disposal releases the session and is idempotent; dropping disposes.
//! - Repositories obtained earlier fail with `SessionUnavailable` afterwards.

use crate::entity::Entity;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::generic_repo::GenericRepository;
use crate::session::{PendingChange, Session, SessionFactory, SessionRef, SessionSlot};
use log::{error, info};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

/// Creates one [`UnitOfWork`] per logical operation from a session factory.
#[derive(Debug, Clone)]
pub struct UnitOfWorkFactory<F: SessionFactory> {
    sessions: F,
}

impl<F: SessionFactory> UnitOfWorkFactory<F> {
    pub fn new(sessions: F) -> Self {
        Self { sessions }
    }

    /// Opens a fresh session and wraps it in a new unit of work.
    pub fn begin(&self) -> RepoResult<UnitOfWork> {
        let session = self.sessions.open_session()?;
        Ok(UnitOfWork::new(session))
    }
}

/// Lifecycle state of a [`UnitOfWork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    Active,
    Disposed,
}

/// Persistence boundary for one logical operation.
pub struct UnitOfWork {
    session: Rc<SessionSlot>,
    repositories: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
}

impl UnitOfWork {
    pub fn new(session: Session) -> Self {
        Self {
            session: Rc::new(RefCell::new(Some(session))),
            repositories: RefCell::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> UnitOfWorkState {
        match self.session.try_borrow() {
            Ok(slot) if slot.is_none() => UnitOfWorkState::Disposed,
            _ => UnitOfWorkState::Active,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == UnitOfWorkState::Disposed
    }

    /// Returns the repository for `T`, creating it on first request.
    ///
    /// Repeated calls return the same instance (`Rc::ptr_eq`).
    pub fn repository<T: Entity>(&self) -> RepoResult<Rc<GenericRepository<T>>> {
        if self.is_disposed() {
            return Err(RepoError::SessionUnavailable);
        }

        let mut repositories = self.repositories.borrow_mut();
        let cached = repositories
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                Rc::new(GenericRepository::<T>::new(SessionRef::new(&self.session)))
                    as Rc<dyn Any>
            })
            .clone();
        match cached.downcast::<GenericRepository<T>>() {
            Ok(repository) => Ok(repository),
            Err(_) => unreachable!("repository cache is keyed by its own TypeId"),
        }
    }

    /// Commits every staged change across all repositories in one transaction.
    ///
    /// Returns the number of applied changes. On failure nothing from the
    /// batch is durable and the staged changes are kept.
    pub fn save(&self) -> RepoResult<usize> {
        let started_at = Instant::now();
        let result = SessionRef::new(&self.session).write(|session| session.flush());
        match &result {
            Ok(applied) => info!(
                "event=uow_save module=uow status=ok changes={} duration_ms={}",
                applied,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=uow_save module=uow status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    pub fn has_changes(&self) -> RepoResult<bool> {
        SessionRef::new(&self.session).read(|session| Ok(session.has_changes()))
    }

    pub fn pending_changes(&self) -> RepoResult<Vec<PendingChange>> {
        SessionRef::new(&self.session).read(|session| Ok(session.pending_changes()))
    }

    /// Drops staged changes and detaches tracked entities without saving.
    pub fn discard_changes(&self) -> RepoResult<()> {
        SessionRef::new(&self.session).write(|session| {
            session.discard_changes();
            Ok(())
        })
    }

    /// Releases the session. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        let released = self.session.borrow_mut().take();
        self.repositories.borrow_mut().clear();
        if let Some(session) = released {
            info!(
                "event=uow_dispose module=uow status=ok unsaved_changes={} repositories_released=true",
                session.pending_changes().len()
            );
        }
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("state", &self.state())
            .field("repositories", &self.repositories.borrow().len())
            .finish()
    }
}
