use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, JoinType, QueryFilter, QueryOrder, QuerySelect,
};

use crate::cache::ChildrenCache;
use crate::engine::{ensure_supported, TreeEngine};
use crate::error::ClosureTreeError;
use crate::store::{node_to_closure, ClosureFilter};
use crate::traits::{ClosureTreeModel, NodeRef};

impl<M> TreeEngine<M>
where
    M: ClosureTreeModel,
{
    /// Ancestors of `node`, root first.
    pub async fn ancestors<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &impl NodeRef<M>,
        include_self: bool,
        max_depth: Option<i32>,
    ) -> Result<Vec<M>, ClosureTreeError> {
        ensure_supported(conn)?;
        let id = node.persisted_id()?;

        let mut query = M::Entity::find()
            .join(
                JoinType::InnerJoin,
                node_to_closure::<M>(M::closure_parent_column()),
            )
            .filter(M::closure_child_column().eq(M::id_to_value(&id)));
        if !include_self {
            query = query.filter(M::closure_depth_column().gt(0));
        }
        if let Some(max_depth) = max_depth {
            query = query.filter(M::closure_depth_column().lte(max_depth));
        }

        let rows = query
            .order_by_asc(M::level_column())
            .order_by_desc(M::closure_depth_column())
            .all(conn)
            .await?;
        Ok(rows)
    }

    /// Descendants of `node`, nearest first.
    pub async fn descendants<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &impl NodeRef<M>,
        include_self: bool,
        max_depth: Option<i32>,
    ) -> Result<Vec<M>, ClosureTreeError> {
        ensure_supported(conn)?;
        let id = node.persisted_id()?;

        let mut query = M::Entity::find()
            .join(
                JoinType::InnerJoin,
                node_to_closure::<M>(M::closure_child_column()),
            )
            .filter(M::closure_parent_column().eq(M::id_to_value(&id)));
        if !include_self {
            query = query.filter(M::closure_depth_column().gt(0));
        }
        if let Some(max_depth) = max_depth {
            query = query.filter(M::closure_depth_column().lte(max_depth));
        }

        let rows = query
            .order_by_asc(M::closure_depth_column())
            .order_by_asc(M::id_column())
            .all(conn)
            .await?;
        Ok(rows)
    }

    /// Direct children, served from `cache` when it knows the node.
    pub async fn children<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &impl NodeRef<M>,
        cache: Option<&ChildrenCache<M::Id, M>>,
    ) -> Result<Vec<M>, ClosureTreeError> {
        let id = node.persisted_id()?;
        if let Some(children) = cache.and_then(|cache| cache.children_of(&id)) {
            return Ok(children.to_vec());
        }
        self.descendants(conn, node, false, Some(1)).await
    }

    /// Build the children cache for `node` from an already fetched descendant
    /// list, typically the result of [`TreeEngine::descendants`].
    pub fn prepopulate(
        &self,
        node: &impl NodeRef<M>,
        descendants: Vec<M>,
    ) -> Result<ChildrenCache<M::Id, M>, ClosureTreeError> {
        let id = node.persisted_id()?;
        Ok(ChildrenCache::build(
            id,
            descendants,
            |model| model.id(),
            |model| model.parent_id(),
        ))
    }

    /// The furthest ancestor of `node`, or `node` itself when it is a root.
    pub async fn root<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &impl NodeRef<M>,
    ) -> Result<M, ClosureTreeError> {
        ensure_supported(conn)?;
        let id = node.persisted_id()?;

        if node.current_parent_id().is_none() {
            return match node.as_model() {
                Some(model) => Ok(model.clone()),
                None => self.nodes.get(conn, &id).await,
            };
        }

        M::Entity::find()
            .join(
                JoinType::InnerJoin,
                node_to_closure::<M>(M::closure_parent_column()),
            )
            .filter(M::closure_child_column().eq(M::id_to_value(&id)))
            .filter(M::closure_depth_column().gt(0))
            .order_by_desc(M::closure_depth_column())
            .one(conn)
            .await?
            .ok_or_else(|| {
                ClosureTreeError::invariant(format!("node {id:?} has a parent but no ancestor links"))
            })
    }

    pub async fn parent<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &impl NodeRef<M>,
    ) -> Result<Option<M>, ClosureTreeError> {
        ensure_supported(conn)?;
        match node.current_parent_id() {
            Some(parent_id) => self.nodes.find(conn, &parent_id).await,
            None => Ok(None),
        }
    }

    pub async fn roots<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<M>, ClosureTreeError> {
        ensure_supported(conn)?;
        self.nodes.roots(conn).await
    }

    pub fn is_root(&self, node: &impl NodeRef<M>) -> bool {
        node.current_parent_id().is_none()
    }

    pub fn is_child(&self, node: &impl NodeRef<M>) -> bool {
        !self.is_root(node)
    }

    /// Whether `node` sits strictly below `other` (or is `other`, when
    /// `include_self` is set).
    pub async fn is_descendant_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &impl NodeRef<M>,
        other: &impl NodeRef<M>,
        include_self: bool,
    ) -> Result<bool, ClosureTreeError> {
        ensure_supported(conn)?;
        let id = node.persisted_id()?;
        let other_id = other.persisted_id()?;
        self.descends_from(conn, &id, &other_id, include_self).await
    }

    pub async fn is_ancestor_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &impl NodeRef<M>,
        other: &impl NodeRef<M>,
        include_self: bool,
    ) -> Result<bool, ClosureTreeError> {
        self.is_descendant_of(conn, other, node, include_self).await
    }

    pub(crate) async fn descends_from<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
        ancestor: &M::Id,
        include_self: bool,
    ) -> Result<bool, ClosureTreeError> {
        if id == ancestor {
            return Ok(include_self);
        }

        let links = self
            .closure
            .count(
                conn,
                &ClosureFilter::all()
                    .parent(ancestor.clone())
                    .child(id.clone())
                    .min_depth(1),
            )
            .await?;
        Ok(links > 0)
    }
}
