//! Closure-table maintenance.
//!
//! Every node owns one self-link `(n, n, 0)` plus one row per true ancestor.
//! Links are derived from the parent's rows, so writes must proceed top-down:
//! a node's parent has to be linked before the node itself.

use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, JoinType, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use tracing::{debug, instrument, trace};

use crate::config::ClosureTreeConfig;
use crate::error::ClosureTreeError;
use crate::lock::LockedTransaction;
use crate::store::{node_to_closure, ClosureFilter, ClosureOrder, ClosureRow, ClosureStore, NodeStore};
use crate::traits::{ClosureTreeModel, NodeRef};

/// Maintains and queries the closure table of tree `M`.
#[derive(Debug)]
pub struct TreeEngine<M>
where
    M: ClosureTreeModel,
{
    pub(crate) nodes: NodeStore<M>,
    pub(crate) closure: ClosureStore<M>,
}

impl<M> Default for TreeEngine<M>
where
    M: ClosureTreeModel,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> TreeEngine<M>
where
    M: ClosureTreeModel,
{
    pub fn new() -> Self {
        Self {
            nodes: NodeStore::new(),
            closure: ClosureStore::new(),
        }
    }

    pub(crate) fn config(&self) -> &'static ClosureTreeConfig {
        M::closure_tree_config()
    }

    pub fn nodes(&self) -> &NodeStore<M> {
        &self.nodes
    }

    pub fn closure(&self) -> &ClosureStore<M> {
        &self.closure
    }

    /// Write the self-link and one row per ancestor of the node's parent.
    ///
    /// Safe to call concurrently for the same node: rows derived from the same
    /// parent state are identical and duplicates are ignored.
    pub async fn create_link<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &impl NodeRef<M>,
    ) -> Result<u64, ClosureTreeError> {
        ensure_supported(conn)?;
        let id = node.persisted_id()?;
        self.link(conn, id, node.current_parent_id()).await
    }

    pub(crate) async fn link<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: M::Id,
        parent_id: Option<M::Id>,
    ) -> Result<u64, ClosureTreeError> {
        let mut rows = vec![ClosureRow::new(id.clone(), id.clone(), 0)];

        if let Some(parent_id) = parent_id {
            let ancestors = self
                .closure
                .select(conn, &ClosureFilter::all().child(parent_id), ClosureOrder::Depth)
                .await?;

            rows.extend(
                ancestors
                    .into_iter()
                    .map(|row| ClosureRow::new(row.parent_id, id.clone(), row.depth + 1)),
            );
        }

        let expected = rows.len();
        let inserted = self.closure.insert_ignore(conn, rows).await?;
        trace!(
            entity = self.config().entity_name(),
            node = ?id,
            expected,
            inserted,
            "created closure links"
        );
        Ok(inserted)
    }

    /// Remove the rows that name the node as child.
    ///
    /// Rows naming it as the ancestor of other nodes stay in place.
    pub async fn delete_link<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &impl NodeRef<M>,
    ) -> Result<u64, ClosureTreeError> {
        ensure_supported(conn)?;
        let id = node.persisted_id()?;
        let deleted = self.closure.delete_where_child(conn, &id).await?;
        debug!(
            entity = self.config().entity_name(),
            closure = self.config().closure_table(),
            node = ?id,
            deleted,
            "deleted closure links"
        );
        Ok(deleted)
    }

    /// Recompute the links of `node` and its whole subtree after its parent
    /// changed from `old_parent` to `node`'s current parent.
    ///
    /// Levels of the subtree shift by the same offset. The update runs in its
    /// own (locked) transaction so readers never see the subtree unlinked.
    #[instrument(
        skip_all,
        fields(entity = self.config().entity_name(), closure = self.config().closure_table())
    )]
    pub async fn update_links_on_reparent<C>(
        &self,
        conn: &C,
        node: &impl NodeRef<M>,
        old_parent: Option<&M::Id>,
    ) -> Result<(), ClosureTreeError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        ensure_supported(conn)?;
        let id = node.persisted_id()?;
        let new_parent = node.current_parent_id();

        if old_parent == new_parent.as_ref() {
            trace!(node = ?id, "parent unchanged, nothing to relink");
            return Ok(());
        }

        let guard = LockedTransaction::acquire(self.config().advisory_lock_strategy(), conn).await?;
        match self.relink_subtree(guard.connection(), id, new_parent).await {
            Ok(()) => guard.commit().await,
            Err(err) => {
                let _ = guard.rollback().await;
                Err(err)
            }
        }
    }

    async fn relink_subtree(
        &self,
        txn: &DatabaseTransaction,
        id: M::Id,
        new_parent: Option<M::Id>,
    ) -> Result<(), ClosureTreeError> {
        let old_level = self.stored_level(txn, &id).await?;
        let new_level = match &new_parent {
            Some(parent_id) => self.nodes.level_of(txn, parent_id).await? + 1,
            None => 0,
        };
        let level_delta = new_level - old_level;

        let descendants = self.subtree(txn, &id).await?;
        let descendant_ids: Vec<M::Id> = descendants.iter().map(|node| node.id()).collect();

        self.nodes.shift_levels(txn, &descendant_ids, level_delta).await?;
        self.nodes.set_level(txn, &id, new_level).await?;

        let mut subtree_with_self = Vec::with_capacity(descendant_ids.len() + 1);
        subtree_with_self.push(id.clone());
        subtree_with_self.extend(descendant_ids);
        let removed = self.closure.delete_where_child_in(txn, &subtree_with_self).await?;

        let mut inserted = self.link(txn, id.clone(), new_parent).await?;
        for descendant in &descendants {
            inserted += self
                .link(txn, descendant.id(), descendant.parent_id())
                .await?;
        }

        debug!(
            node = ?id,
            subtree = subtree_with_self.len(),
            level_delta,
            removed,
            inserted,
            "relinked subtree"
        );
        Ok(())
    }

    /// Level as recorded by the closure table: the number of true ancestors.
    async fn stored_level<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<i32, ClosureTreeError> {
        let ancestors = self
            .closure
            .count(conn, &ClosureFilter::all().child(id.clone()).min_depth(1))
            .await?;
        i32::try_from(ancestors)
            .map_err(|_| ClosureTreeError::invariant(format!("node {id:?} is nested too deeply")))
    }

    /// Strict descendants of `id`, shallowest first.
    pub(crate) async fn subtree<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M>, ClosureTreeError> {
        let rows = M::Entity::find()
            .join(
                JoinType::InnerJoin,
                node_to_closure::<M>(M::closure_child_column()),
            )
            .filter(M::closure_parent_column().eq(M::id_to_value(id)))
            .filter(M::closure_depth_column().gt(0))
            .order_by_asc(M::closure_depth_column())
            .order_by_asc(M::id_column())
            .all(conn)
            .await?;
        Ok(rows)
    }

    /// Drop every closure row of this tree type and relink all nodes from
    /// their parent pointers, shallowest first.
    ///
    /// Needs exclusive access to the tree for its whole duration.
    #[instrument(
        skip_all,
        fields(entity = self.config().entity_name(), closure = self.config().closure_table())
    )]
    pub async fn rebuild_all<C>(&self, conn: &C) -> Result<u64, ClosureTreeError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        ensure_supported(conn)?;
        let guard = LockedTransaction::acquire(self.config().advisory_lock_strategy(), conn).await?;
        match self.rebuild_on(guard.connection()).await {
            Ok(count) => {
                guard.commit().await?;
                Ok(count)
            }
            Err(err) => {
                let _ = guard.rollback().await;
                Err(err)
            }
        }
    }

    async fn rebuild_on(&self, txn: &DatabaseTransaction) -> Result<u64, ClosureTreeError> {
        let removed = self.closure.delete_all(txn).await?;

        let mut pages = self
            .nodes
            .ordered_by_level(txn, self.config().rebuild_batch_size());
        let mut linked = 0u64;
        while let Some(batch) = pages.fetch_and_next().await? {
            for node in batch {
                self.link(txn, node.id(), node.parent_id()).await?;
                linked += 1;
            }
        }

        debug!(removed, linked, "rebuilt closure table");
        Ok(linked)
    }
}

pub(crate) fn ensure_supported(conn: &impl ConnectionTrait) -> Result<(), ClosureTreeError> {
    match conn.get_database_backend() {
        sea_orm::DbBackend::Postgres | sea_orm::DbBackend::Sqlite => Ok(()),
        other => Err(ClosureTreeError::UnsupportedBackend(other)),
    }
}
