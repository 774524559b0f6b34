//! Transient query shape passed to generic repository reads.

use super::filter::{Filter, OrderBy};
use crate::entity::Entity;
use crate::repo::error::RepoResult;
use crate::session::Loader;
use std::fmt::{Debug, Formatter};

/// Whether materialized rows are registered in the session identity map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tracking {
    /// Rows are detached copies; the session keeps no record of them.
    #[default]
    NoTracking,
    /// Rows are remembered so later key lookups are served from the session.
    Tracked,
}

/// Related-data hook run on every materialized row.
pub type Include<'q, T> = Box<dyn Fn(&mut T, &Loader<'_>) -> RepoResult<()> + 'q>;

/// Filter, ordering, includes and tracking mode for one read.
pub struct Query<'q, T: Entity> {
    pub(crate) filter: Option<Filter>,
    pub(crate) order_by: Vec<OrderBy>,
    pub(crate) includes: Vec<Include<'q, T>>,
    pub(crate) tracking: Tracking,
}

impl<'q, T: Entity> Query<'q, T> {
    /// Unfiltered, untracked query in store-default order.
    pub fn all() -> Self {
        Self {
            filter: None,
            order_by: Vec::new(),
            includes: Vec::new(),
            tracking: Tracking::NoTracking,
        }
    }

    /// Shortcut for `Query::all().filter(filter)`.
    pub fn matching(filter: Filter) -> Self {
        Self::all().filter(filter)
    }

    /// Sets the predicate; a second call combines both with `AND`.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Appends an ordering term; earlier terms take precedence.
    pub fn order_by(mut self, term: OrderBy) -> Self {
        self.order_by.push(term);
        self
    }

    /// Registers a related-data hook.
    pub fn include<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut T, &Loader<'_>) -> RepoResult<()> + 'q,
    {
        self.includes.push(Box::new(hook));
        self
    }

    pub fn tracking(mut self, tracking: Tracking) -> Self {
        self.tracking = tracking;
        self
    }

    /// Shortcut for `tracking(Tracking::Tracked)`.
    pub fn tracked(self) -> Self {
        self.tracking(Tracking::Tracked)
    }
}

impl<T: Entity> Default for Query<'_, T> {
    fn default() -> Self {
        Self::all()
    }
}

impl<T: Entity> Debug for Query<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("table", &T::TABLE)
            .field("filter", &self.filter)
            .field("order_by", &self.order_by)
            .field("includes", &self.includes.len())
            .field("tracking", &self.tracking)
            .finish()
    }
}
