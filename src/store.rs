//! Thin SeaORM-backed persistence for the node table and its closure table.

use std::marker::PhantomData;

use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, JoinType, Paginator, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, RelationDef, SelectModel,
};
use serde::{Deserialize, Serialize};

use crate::error::ClosureTreeError;
use crate::traits::ClosureTreeModel;

/// Upper bound on bind parameters in one `IN (...)` list; SQLite rejects
/// statements with more than 32766 variables.
const MAX_IDS_PER_STATEMENT: usize = 500;

/// One `(ancestor, descendant, distance)` triple.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClosureRow<Id> {
    pub parent_id: Id,
    pub child_id: Id,
    pub depth: i32,
}

impl<Id> ClosureRow<Id> {
    pub fn new(parent_id: Id, child_id: Id, depth: i32) -> Self {
        Self {
            parent_id,
            child_id,
            depth,
        }
    }

    pub fn is_self_link(&self) -> bool
    where
        Id: PartialEq,
    {
        self.depth == 0 && self.parent_id == self.child_id
    }
}

/// Filter over closure rows; unset fields do not constrain.
#[derive(Clone, Debug)]
pub struct ClosureFilter<Id> {
    parent: Option<Id>,
    child: Option<Id>,
    min_depth: Option<i32>,
    max_depth: Option<i32>,
}

impl<Id> Default for ClosureFilter<Id> {
    fn default() -> Self {
        Self {
            parent: None,
            child: None,
            min_depth: None,
            max_depth: None,
        }
    }
}

impl<Id> ClosureFilter<Id> {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn parent(mut self, id: Id) -> Self {
        self.parent = Some(id);
        self
    }

    pub fn child(mut self, id: Id) -> Self {
        self.child = Some(id);
        self
    }

    pub fn min_depth(mut self, depth: i32) -> Self {
        self.min_depth = Some(depth);
        self
    }

    pub fn max_depth(mut self, depth: i32) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

/// Ordering for [`ClosureStore::select`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClosureOrder {
    /// Ascending depth.
    Depth,
    /// Ascending level of the node named by `parent_id`.
    ParentLevel,
    /// Ascending level of the node named by `child_id`.
    ChildLevel,
}

/// Closure-row persistence for tree `M`.
#[derive(Debug)]
pub struct ClosureStore<M>
where
    M: ClosureTreeModel,
{
    _marker: PhantomData<M>,
}

impl<M> Default for ClosureStore<M>
where
    M: ClosureTreeModel,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> ClosureStore<M>
where
    M: ClosureTreeModel,
{
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Insert rows, silently keeping any that already exist.
    ///
    /// Returns the number of rows actually written. Conflicts on the
    /// `(parent, child)` key are not errors; anything else is.
    pub async fn insert_ignore<C: ConnectionTrait>(
        &self,
        conn: &C,
        rows: Vec<ClosureRow<M::Id>>,
    ) -> Result<u64, ClosureTreeError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let models = rows
            .into_iter()
            .map(|row| M::closure_build_row(row.parent_id, row.child_id, row.depth));

        let on_conflict = OnConflict::columns([M::closure_parent_column(), M::closure_child_column()])
            .do_nothing()
            .to_owned();

        let inserted = M::ClosureEntity::insert_many(models)
            .on_conflict(on_conflict)
            .exec_without_returning(conn)
            .await?;
        Ok(inserted)
    }

    pub async fn delete_where_child_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[M::Id],
    ) -> Result<u64, ClosureTreeError> {
        let mut deleted = 0;
        for chunk in ids.chunks(MAX_IDS_PER_STATEMENT) {
            let values = chunk.iter().map(M::id_to_value).collect::<Vec<_>>();
            let result = M::ClosureEntity::delete_many()
                .filter(M::closure_child_column().is_in(values))
                .exec(conn)
                .await?;
            deleted += result.rows_affected;
        }
        Ok(deleted)
    }

    pub async fn delete_where_child<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<u64, ClosureTreeError> {
        let result = M::ClosureEntity::delete_many()
            .filter(M::closure_child_column().eq(M::id_to_value(id)))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn delete_all<C: ConnectionTrait>(&self, conn: &C) -> Result<u64, ClosureTreeError> {
        let result = M::ClosureEntity::delete_many().exec(conn).await?;
        Ok(result.rows_affected)
    }

    pub async fn select<C: ConnectionTrait>(
        &self,
        conn: &C,
        filter: &ClosureFilter<M::Id>,
        order: ClosureOrder,
    ) -> Result<Vec<ClosureRow<M::Id>>, ClosureTreeError> {
        let mut query = M::ClosureEntity::find().filter(Self::condition(filter));

        query = match order {
            ClosureOrder::Depth => query.order_by_asc(M::closure_depth_column()),
            ClosureOrder::ParentLevel => query
                .join(
                    JoinType::InnerJoin,
                    closure_to_node::<M>(M::closure_parent_column()),
                )
                .order_by_asc(M::level_column())
                .order_by_asc(M::closure_depth_column()),
            ClosureOrder::ChildLevel => query
                .join(
                    JoinType::InnerJoin,
                    closure_to_node::<M>(M::closure_child_column()),
                )
                .order_by_asc(M::level_column())
                .order_by_asc(M::closure_depth_column()),
        };

        let rows = query.all(conn).await?;
        Ok(rows
            .iter()
            .map(|model| {
                ClosureRow::new(
                    M::closure_model_parent(model),
                    M::closure_model_child(model),
                    M::closure_model_depth(model),
                )
            })
            .collect())
    }

    pub async fn count<C: ConnectionTrait>(
        &self,
        conn: &C,
        filter: &ClosureFilter<M::Id>,
    ) -> Result<u64, ClosureTreeError> {
        let count = M::ClosureEntity::find()
            .filter(Self::condition(filter))
            .count(conn)
            .await?;
        Ok(count)
    }

    fn condition(filter: &ClosureFilter<M::Id>) -> Condition {
        let mut condition = Condition::all();

        if let Some(parent) = &filter.parent {
            condition = condition.add(M::closure_parent_column().eq(M::id_to_value(parent)));
        }
        if let Some(child) = &filter.child {
            condition = condition.add(M::closure_child_column().eq(M::id_to_value(child)));
        }
        if let Some(min_depth) = filter.min_depth {
            condition = condition.add(M::closure_depth_column().gte(min_depth));
        }
        if let Some(max_depth) = filter.max_depth {
            condition = condition.add(M::closure_depth_column().lte(max_depth));
        }

        condition
    }
}

/// Join from the closure table to the node named by `column`.
fn closure_to_node<M: ClosureTreeModel>(
    column: <M::ClosureEntity as EntityTrait>::Column,
) -> RelationDef {
    M::ClosureEntity::belongs_to(M::Entity::default())
        .from(column)
        .to(M::id_column())
        .into()
}

/// Join from the node table to the closure rows whose `column` names the node.
pub(crate) fn node_to_closure<M: ClosureTreeModel>(
    column: <M::ClosureEntity as EntityTrait>::Column,
) -> RelationDef {
    M::Entity::belongs_to(M::ClosureEntity::default())
        .from(M::id_column())
        .to(column)
        .into()
}

/// Node persistence for tree `M`. The engine reads ids and parents and only
/// ever writes the level column.
#[derive(Debug)]
pub struct NodeStore<M>
where
    M: ClosureTreeModel,
{
    _marker: PhantomData<M>,
}

impl<M> Default for NodeStore<M>
where
    M: ClosureTreeModel,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> NodeStore<M>
where
    M: ClosureTreeModel,
{
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    pub async fn find<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Option<M>, ClosureTreeError> {
        let model = M::Entity::find()
            .filter(M::id_column().eq(M::id_to_value(id)))
            .one(conn)
            .await?;
        Ok(model)
    }

    /// Like [`NodeStore::find`], but a missing node is a reference error.
    pub async fn get<C: ConnectionTrait>(&self, conn: &C, id: &M::Id) -> Result<M, ClosureTreeError> {
        self.find(conn, id)
            .await?
            .ok_or_else(|| ClosureTreeError::missing_reference(id))
    }

    pub async fn level_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<i32, ClosureTreeError> {
        Ok(self.get(conn, id).await?.level())
    }

    pub async fn parent_id_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Option<M::Id>, ClosureTreeError> {
        Ok(self.get(conn, id).await?.parent_id())
    }

    pub async fn set_level<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
        level: i32,
    ) -> Result<(), ClosureTreeError> {
        let result = M::Entity::update_many()
            .col_expr(M::level_column(), Expr::value(level))
            .filter(M::id_column().eq(M::id_to_value(id)))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ClosureTreeError::missing_reference(id));
        }
        Ok(())
    }

    /// `level = level + delta` for every listed node.
    pub async fn shift_levels<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[M::Id],
        delta: i32,
    ) -> Result<u64, ClosureTreeError> {
        if delta == 0 {
            return Ok(0);
        }

        let mut shifted = 0;
        for chunk in ids.chunks(MAX_IDS_PER_STATEMENT) {
            let values = chunk.iter().map(M::id_to_value).collect::<Vec<_>>();
            let result = M::Entity::update_many()
                .col_expr(M::level_column(), Expr::col(M::level_column()).add(delta))
                .filter(M::id_column().is_in(values))
                .exec(conn)
                .await?;
            shifted += result.rows_affected;
        }
        Ok(shifted)
    }

    /// Every node, shallowest first, `batch` at a time.
    pub fn ordered_by_level<'db, C: ConnectionTrait>(
        &self,
        conn: &'db C,
        batch: u64,
    ) -> Paginator<'db, C, SelectModel<M>> {
        M::Entity::find()
            .order_by_asc(M::level_column())
            .order_by_asc(M::id_column())
            .paginate(conn, batch)
    }

    pub async fn roots<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<M>, ClosureTreeError> {
        let rows = M::Entity::find()
            .filter(M::parent_column().is_null())
            .order_by_asc(M::id_column())
            .all(conn)
            .await?;
        Ok(rows)
    }
}
