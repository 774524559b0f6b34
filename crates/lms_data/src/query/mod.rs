//! Store-neutral query composition for generic repository reads.
//!
//! # Responsibility
//! - Model filters and orderings as data instead of raw SQL strings.
//! - Bundle filter, ordering, includes and tracking into one query shape.
//!
//! # Invariants
//! - Column names are checked against the entity mapping before rendering.
//! - Values are always bound as parameters, never interpolated.

pub mod filter;
pub mod shape;

pub use filter::{CompareOp, Direction, Filter, OrderBy};
pub use shape::{Include, Query, Tracking};
