use std::fmt::Debug;
use std::hash::Hash;

use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, EntityTrait, FromQueryResult, IntoActiveModel, Value,
};

use crate::config::ClosureTreeConfig;
use crate::error::ClosureTreeError;

/// Trait implemented by SeaORM `Model` types whose hierarchy is mirrored in a
/// closure table.
///
/// Implementations are normally provided by the `#[derive(ClosureTreeModel)]` macro,
/// once per tree type. The closure entity must have a composite primary key
/// over its parent and child columns.
pub trait ClosureTreeModel:
    Clone + Send + Sync + 'static + IntoActiveModel<Self::ActiveModel> + FromQueryResult
{
    type Entity: EntityTrait<Model = Self>;
    type ActiveModel: ActiveModelTrait<Entity = Self::Entity> + ActiveModelBehavior + Send;
    type Id: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    type ClosureEntity: EntityTrait<Model = Self::ClosureModel>;
    type ClosureModel: Clone
        + Send
        + Sync
        + 'static
        + FromQueryResult
        + IntoActiveModel<Self::ClosureActiveModel>;
    type ClosureActiveModel: ActiveModelTrait<Entity = Self::ClosureEntity>
        + ActiveModelBehavior
        + Send;

    fn closure_tree_config() -> &'static ClosureTreeConfig;

    fn id(&self) -> Self::Id;
    fn parent_id(&self) -> Option<Self::Id>;
    fn level(&self) -> i32;
    fn id_to_value(id: &Self::Id) -> Value;

    /// Primary key held by an active model, if it is set.
    fn active_id(active: &Self::ActiveModel) -> Option<Self::Id>;
    /// Parent held by an active model; `None` when the column is not set at all.
    fn active_parent(active: &Self::ActiveModel) -> Option<Option<Self::Id>>;
    fn set_parent(active: &mut Self::ActiveModel, parent: Option<Self::Id>);
    fn set_level(active: &mut Self::ActiveModel, level: i32);

    fn id_column() -> <Self::Entity as EntityTrait>::Column;
    fn parent_column() -> <Self::Entity as EntityTrait>::Column;
    fn level_column() -> <Self::Entity as EntityTrait>::Column;

    fn closure_parent_column() -> <Self::ClosureEntity as EntityTrait>::Column;
    fn closure_child_column() -> <Self::ClosureEntity as EntityTrait>::Column;
    fn closure_depth_column() -> <Self::ClosureEntity as EntityTrait>::Column;

    fn closure_model_parent(model: &Self::ClosureModel) -> Self::Id;
    fn closure_model_child(model: &Self::ClosureModel) -> Self::Id;
    fn closure_model_depth(model: &Self::ClosureModel) -> i32;
    fn closure_build_row(
        parent: Self::Id,
        child: Self::Id,
        depth: i32,
    ) -> Self::ClosureActiveModel;
}

/// Anything the engine can treat as a node of tree `M`.
///
/// Implemented for the model itself and for [`crate::TreeNode`]. Only
/// persisted nodes have an identity the closure table can refer to.
pub trait NodeRef<M: ClosureTreeModel> {
    fn persisted_id(&self) -> Result<M::Id, ClosureTreeError>;

    fn current_parent_id(&self) -> Option<M::Id>;

    /// The loaded model, when the handle carries one.
    fn as_model(&self) -> Option<&M> {
        None
    }
}

impl<M: ClosureTreeModel> NodeRef<M> for M {
    fn persisted_id(&self) -> Result<M::Id, ClosureTreeError> {
        Ok(self.id())
    }

    fn current_parent_id(&self) -> Option<M::Id> {
        self.parent_id()
    }

    fn as_model(&self) -> Option<&M> {
        Some(self)
    }
}
