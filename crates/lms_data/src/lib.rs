//! Data-access layer for the library management system.
//!
//! A generic repository over any [`Entity`] plus a [`UnitOfWork`] that owns
//! one persistence session and one atomic commit point per logical operation.
//!
//! ```ignore
//! let factory = UnitOfWorkFactory::new(SqliteSessionFactory::new(config, MIGRATIONS)?);
//! let uow = factory.begin()?;
//! let books = uow.repository::<Book>()?;
//! books.add(&book)?;
//! uow.save()?;
//! ```

pub mod config;
pub mod db;
pub mod entity;
pub mod logging;
pub mod query;
pub mod repo;
pub mod session;
pub mod uow;

pub use config::{StoreConfig, StoreLocation};
pub use db::migrations::Migration;
pub use entity::Entity;
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use query::{CompareOp, Direction, Filter, Include, OrderBy, Query, Tracking};
pub use repo::error::{ConflictError, RepoError, RepoResult};
pub use repo::generic_repo::{GenericRepository, WriteMode};
pub use session::{
    ChangeKind, Loader, PendingChange, Session, SessionFactory, SqliteSessionFactory,
};
pub use uow::{UnitOfWork, UnitOfWorkFactory, UnitOfWorkState};
