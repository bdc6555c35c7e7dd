//! Closure tables for SeaORM hierarchies.
//!
//! A closure table stores one `(ancestor, descendant, depth)` row for every
//! ancestor of every node, so ancestor, descendant, root and depth-bounded
//! subtree queries are single indexed lookups. This crate keeps that table in
//! step with inserts, reparents and deletes issued through
//! [`LifecycleHooks`], and exposes the queries on [`TreeEngine`].
//!
//! PostgreSQL and SQLite are supported.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod lock;
mod query;
pub mod store;
pub mod tracker;
pub mod traits;

pub mod prelude {
    //! Convenient re-exports for consumers.
    pub use crate::config::{
        AdvisoryLockStrategy, ClosureTreeConfig, ClosureTreeOptions, DependentBehavior,
    };
    pub use crate::engine::TreeEngine;
    pub use crate::hooks::LifecycleHooks;
    pub use crate::tracker::TreeNode;
    pub use crate::traits::{ClosureTreeModel, NodeRef};
}

#[doc(hidden)]
pub mod __private {
    pub use once_cell;
}

pub use cache::ChildrenCache;
pub use closure_table_macros::ClosureTreeModel as ClosureTreeModelDerive;
#[doc(hidden)]
pub use closure_table_macros::ClosureTreeModel;
pub use config::{
    AdvisoryLockKey, AdvisoryLockStrategy, ClosureTreeConfig, ClosureTreeOptions,
    DependentBehavior,
};
pub use engine::TreeEngine;
pub use error::ClosureTreeError;
pub use hooks::LifecycleHooks;
pub use store::{ClosureFilter, ClosureOrder, ClosureRow, ClosureStore, NodeStore};
pub use tracker::{ChangeTracker, ParentChange, TreeNode};
pub use traits::{ClosureTreeModel, NodeRef};
