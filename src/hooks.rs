//! Adapter between the host's save/delete flow and the [`TreeEngine`].
//!
//! The host calls [`LifecycleHooks::on_before_save`], then persists the active
//! model, then calls [`LifecycleHooks::on_after_save`]; before deleting a row
//! it calls [`LifecycleHooks::on_before_delete`]. [`LifecycleHooks::save`] and
//! [`LifecycleHooks::delete`] run that sequence inside one transaction.

use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseTransaction, TransactionTrait};
use tracing::debug;

use crate::config::DependentBehavior;
use crate::engine::{ensure_supported, TreeEngine};
use crate::error::ClosureTreeError;
use crate::store::ClosureFilter;
use crate::tracker::TreeNode;
use crate::traits::{ClosureTreeModel, NodeRef};

#[derive(Debug)]
pub struct LifecycleHooks<M>
where
    M: ClosureTreeModel,
{
    engine: TreeEngine<M>,
}

impl<M> Default for LifecycleHooks<M>
where
    M: ClosureTreeModel,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> LifecycleHooks<M>
where
    M: ClosureTreeModel,
{
    pub fn new() -> Self {
        Self {
            engine: TreeEngine::new(),
        }
    }

    pub fn engine(&self) -> &TreeEngine<M> {
        &self.engine
    }

    /// Set the node's level from its (possibly new) parent.
    ///
    /// Fails with a reference error when the parent does not exist and with an
    /// invariant error when a persisted node would become its own ancestor.
    pub async fn on_before_save<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &mut TreeNode<M>,
    ) -> Result<(), ClosureTreeError> {
        ensure_supported(conn)?;

        let level = match node.parent_id() {
            Some(parent_id) => {
                if let Some(id) = node.id().filter(|_| node.tracker().is_captured()) {
                    self.guard_against_cycle(conn, &id, &parent_id).await?;
                }
                self.engine.nodes.level_of(conn, &parent_id).await? + 1
            }
            None => 0,
        };

        node.set_level(level);
        Ok(())
    }

    async fn guard_against_cycle<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
        parent_id: &M::Id,
    ) -> Result<(), ClosureTreeError> {
        if self.engine.descends_from(conn, parent_id, id, true).await? {
            return Err(ClosureTreeError::invariant(format!(
                "cannot move node {id:?} under its own descendant {parent_id:?}"
            )));
        }
        Ok(())
    }

    /// Relink the subtree when the parent changed, or create the first links
    /// of a freshly inserted node.
    ///
    /// `saved` is the model as returned by the insert or update. On success the
    /// node is refreshed from it and its tracker returns to unobserved. When
    /// the relink fails the captured parent is kept, so the save can be retried.
    pub async fn on_after_save<C>(
        &self,
        conn: &C,
        node: &mut TreeNode<M>,
        saved: &M,
        was_newly_created: bool,
    ) -> Result<(), ClosureTreeError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        if let Some(previous) = node.tracker_mut().begin_apply() {
            if let Err(err) = self
                .engine
                .update_links_on_reparent(conn, saved, previous.as_ref())
                .await
            {
                node.tracker_mut().restore(previous);
                return Err(err);
            }
        } else if was_newly_created {
            self.engine.create_link(conn, saved).await?;
        }

        node.mark_saved(saved);
        Ok(())
    }

    /// Remove the node's links ahead of its deletion.
    pub async fn on_before_delete<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &impl NodeRef<M>,
    ) -> Result<(), ClosureTreeError> {
        ensure_supported(conn)?;
        let id = node.persisted_id()?;

        if self.engine.config().dependent_behavior() == DependentBehavior::Restrict {
            let descendants = self
                .engine
                .closure
                .count(conn, &ClosureFilter::all().parent(id.clone()).min_depth(1))
                .await?;
            if descendants > 0 {
                return Err(ClosureTreeError::restricted(format!(
                    "node {id:?} still has {descendants} descendant(s)"
                )));
            }
        }

        self.engine.delete_link(conn, node).await?;
        Ok(())
    }

    /// Insert or update `node` with all hooks applied, atomically.
    pub async fn save<C>(&self, conn: &C, node: &mut TreeNode<M>) -> Result<M, ClosureTreeError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        ensure_supported(conn)?;
        let txn = conn.begin().await?;
        match self.save_on(&txn, node).await {
            Ok(model) => {
                txn.commit().await?;
                Ok(model)
            }
            Err(err) => {
                let _ = txn.rollback().await;
                Err(err)
            }
        }
    }

    async fn save_on(
        &self,
        txn: &DatabaseTransaction,
        node: &mut TreeNode<M>,
    ) -> Result<M, ClosureTreeError> {
        self.on_before_save(txn, node).await?;

        let created = !node.is_persisted();
        let active = node.active().clone();
        let saved = if created {
            active.insert(txn).await?
        } else {
            active.update(txn).await?
        };

        self.on_after_save(txn, node, &saved, created).await?;
        debug!(
            entity = self.engine.config().entity_name(),
            node = ?saved.id(),
            created,
            "saved tree node"
        );
        Ok(saved)
    }

    /// Delete `model` after removing its links, atomically.
    pub async fn delete<C>(&self, conn: &C, model: M) -> Result<(), ClosureTreeError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        ensure_supported(conn)?;
        let txn = conn.begin().await?;
        let result = async {
            self.on_before_delete(&txn, &model).await?;
            model.into_active_model().delete(&txn).await?;
            Ok::<(), ClosureTreeError>(())
        }
        .await;

        match result {
            Ok(()) => {
                txn.commit().await?;
                Ok(())
            }
            Err(err) => {
                let _ = txn.rollback().await;
                Err(err)
            }
        }
    }
}
