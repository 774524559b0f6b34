//! Repository layer: the generic repository and its error taxonomy.
//!
//! # Responsibility
//! - Expose filter/order/include-aware reads for any [`crate::Entity`].
//! - Stage inserts, updates and deletes until the owning unit of work saves.
//!
//! # Invariants
//! - Repositories never own or release the session they are bound to.
//! - Lookups report absence as `None`, never as an error.

pub mod error;
pub mod generic_repo;
