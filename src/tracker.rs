//! Parent-change detection.
//!
//! A node only needs a full subtree relink when an already persisted node is
//! given a different parent. [`ChangeTracker`] remembers the parent the node
//! had before its first such mutation so the after-save hook can tell a fresh
//! insert from a reparent.

use crate::error::ClosureTreeError;
use crate::traits::{ClosureTreeModel, NodeRef};

/// State of a node's parent attribute between mutation and save.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ParentChange<Id> {
    /// No previous parent captured.
    #[default]
    Unobserved,
    /// The parent changed; `previous` is the value stored before the change.
    Captured { previous: Option<Id> },
    /// The pending relink is being applied.
    Cleared,
}

#[derive(Clone, Debug, Default)]
pub struct ChangeTracker<Id> {
    state: ParentChange<Id>,
}

impl<Id: Clone + PartialEq> ChangeTracker<Id> {
    pub fn new() -> Self {
        Self {
            state: ParentChange::Unobserved,
        }
    }

    pub fn state(&self) -> &ParentChange<Id> {
        &self.state
    }

    pub fn is_captured(&self) -> bool {
        matches!(self.state, ParentChange::Captured { .. })
    }

    /// Record an assignment of `next` over `current`.
    ///
    /// Returns `true` when this call captured the previous parent. Fresh nodes,
    /// same-value assignments and nodes that already captured a value never
    /// transition.
    pub fn observe(&mut self, persisted: bool, current: &Option<Id>, next: &Option<Id>) -> bool {
        if !persisted || current == next {
            return false;
        }

        match self.state {
            ParentChange::Captured { .. } => false,
            ParentChange::Unobserved | ParentChange::Cleared => {
                self.state = ParentChange::Captured {
                    previous: current.clone(),
                };
                true
            }
        }
    }

    /// Move `Captured` to `Cleared`, yielding the captured previous parent.
    pub fn begin_apply(&mut self) -> Option<Option<Id>> {
        match std::mem::replace(&mut self.state, ParentChange::Cleared) {
            ParentChange::Captured { previous } => Some(previous),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Put a previously taken capture back after a failed relink.
    pub fn restore(&mut self, previous: Option<Id>) {
        self.state = ParentChange::Captured { previous };
    }

    pub fn reset(&mut self) {
        self.state = ParentChange::Unobserved;
    }
}

/// A node under mutation: the SeaORM active model plus its change tracker.
///
/// Reparent through [`TreeNode::set_parent`]; assigning the parent column on
/// the active model directly bypasses change detection.
#[derive(Debug)]
pub struct TreeNode<M: ClosureTreeModel> {
    active: M::ActiveModel,
    persisted: bool,
    tracker: ChangeTracker<M::Id>,
}

impl<M: ClosureTreeModel> TreeNode<M> {
    /// Wrap an active model that has never been saved.
    pub fn new(active: M::ActiveModel) -> Self {
        Self {
            active,
            persisted: false,
            tracker: ChangeTracker::new(),
        }
    }

    /// Wrap a model loaded from the database.
    pub fn from_model(model: M) -> Self {
        Self {
            active: model.into_active_model(),
            persisted: true,
            tracker: ChangeTracker::new(),
        }
    }

    /// Assign a new parent and return the previous one.
    pub fn set_parent(&mut self, parent: Option<M::Id>) -> Option<M::Id> {
        let current = self.parent_id();
        self.tracker.observe(self.persisted, &current, &parent);
        M::set_parent(&mut self.active, parent);
        current
    }

    pub fn parent_id(&self) -> Option<M::Id> {
        M::active_parent(&self.active).flatten()
    }

    /// Identity of the node, once it has been saved.
    pub fn id(&self) -> Option<M::Id> {
        if self.persisted {
            M::active_id(&self.active)
        } else {
            None
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn active(&self) -> &M::ActiveModel {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut M::ActiveModel {
        &mut self.active
    }

    pub fn into_active(self) -> M::ActiveModel {
        self.active
    }

    pub fn tracker(&self) -> &ChangeTracker<M::Id> {
        &self.tracker
    }

    pub(crate) fn tracker_mut(&mut self) -> &mut ChangeTracker<M::Id> {
        &mut self.tracker
    }

    pub(crate) fn set_level(&mut self, level: i32) {
        M::set_level(&mut self.active, level);
    }

    pub(crate) fn mark_saved(&mut self, saved: &M) {
        self.active = saved.clone().into_active_model();
        self.persisted = true;
        self.tracker.reset();
    }
}

impl<M: ClosureTreeModel> NodeRef<M> for TreeNode<M> {
    fn persisted_id(&self) -> Result<M::Id, ClosureTreeError> {
        self.id()
            .ok_or_else(|| ClosureTreeError::invalid_state("node has not been saved yet"))
    }

    fn current_parent_id(&self) -> Option<M::Id> {
        self.parent_id()
    }
}
