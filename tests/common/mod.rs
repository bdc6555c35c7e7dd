#![allow(dead_code)]

use closure_table::{ClosureFilter, ClosureOrder, ClosureRow, LifecycleHooks, TreeNode};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Set, Statement};

pub mod entity {
    pub mod node {
        use closure_table::ClosureTreeModelDerive as ClosureTreeModel;
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel, ClosureTreeModel)]
        #[sea_orm(table_name = "nodes")]
        #[closure_tree(closure_module = "crate::common::entity::node_closure")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i32,
            pub parent_id: Option<i32>,
            pub level: i32,
            pub name: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod node_closure {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
        #[sea_orm(table_name = "nodes_closure")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub parent_id: i32,
            #[sea_orm(primary_key, auto_increment = false)]
            pub child_id: i32,
            pub depth: i32,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    /// A second tree type with non-default column names and a restrictive
    /// delete policy.
    pub mod folder {
        use closure_table::ClosureTreeModelDerive as ClosureTreeModel;
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel, ClosureTreeModel)]
        #[sea_orm(table_name = "folders")]
        #[closure_tree(
            closure_module = "crate::common::entity::folder_path",
            closure_table = "folder_paths",
            parent_field = "owner_id",
            level_field = "nesting",
            closure_parent_field = "ancestor_id",
            closure_child_field = "descendant_id",
            closure_depth_field = "distance",
            dependent = "restrict",
            advisory_lock = "disabled",
            rebuild_batch_size = 2
        )]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i32,
            pub owner_id: Option<i32>,
            pub nesting: i32,
            pub title: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    /// A tree type whose table lives in an explicit schema.
    pub mod tag {
        use closure_table::ClosureTreeModelDerive as ClosureTreeModel;
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel, ClosureTreeModel)]
        #[sea_orm(schema_name = "main", table_name = "tags")]
        #[closure_tree(closure_module = "crate::common::entity::tag_closure")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub parent_id: Option<i64>,
            pub level: i32,
            pub label: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod tag_closure {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
        #[sea_orm(schema_name = "main", table_name = "tags_closure")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub parent_id: i64,
            #[sea_orm(primary_key, auto_increment = false)]
            pub child_id: i64,
            pub depth: i32,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod folder_path {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
        #[sea_orm(table_name = "folder_paths")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub ancestor_id: i32,
            #[sea_orm(primary_key, auto_increment = false)]
            pub descendant_id: i32,
            pub distance: i32,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

pub use entity::node;

const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE nodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        parent_id INTEGER REFERENCES nodes(id),
        level INTEGER NOT NULL DEFAULT 0,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE nodes_closure (
        parent_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        child_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        depth INTEGER NOT NULL,
        PRIMARY KEY (parent_id, child_id)
    )
    "#,
    "CREATE INDEX nodes_closure_child ON nodes_closure (child_id)",
    r#"
    CREATE TABLE folders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER REFERENCES folders(id),
        nesting INTEGER NOT NULL DEFAULT 0,
        title TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE folder_paths (
        ancestor_id INTEGER NOT NULL REFERENCES folders(id) ON DELETE CASCADE,
        descendant_id INTEGER NOT NULL REFERENCES folders(id) ON DELETE CASCADE,
        distance INTEGER NOT NULL,
        PRIMARY KEY (ancestor_id, descendant_id)
    )
    "#,
];

/// A fresh in-memory SQLite database with both tree schemas.
pub async fn setup_sqlite() -> Result<DatabaseConnection, sea_orm::DbErr> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    for sql in SQLITE_SCHEMA {
        db.execute(Statement::from_string(DbBackend::Sqlite, sql.to_string()))
            .await?;
    }

    Ok(db)
}

pub async fn add_node(
    db: &DatabaseConnection,
    hooks: &LifecycleHooks<node::Model>,
    name: &str,
    parent: Option<&node::Model>,
) -> node::Model {
    let mut tree_node = TreeNode::new(node::ActiveModel {
        name: Set(name.to_owned()),
        ..Default::default()
    });
    tree_node.set_parent(parent.map(|p| p.id));
    hooks.save(db, &mut tree_node).await.expect("save node")
}

pub async fn move_node(
    db: &DatabaseConnection,
    hooks: &LifecycleHooks<node::Model>,
    model: &node::Model,
    new_parent: Option<i32>,
) -> node::Model {
    let mut tree_node = TreeNode::from_model(model.clone());
    tree_node.set_parent(new_parent);
    hooks.save(db, &mut tree_node).await.expect("move node")
}

/// All closure rows as `(parent, child, depth)`, sorted.
pub async fn closure_rows(
    db: &DatabaseConnection,
    hooks: &LifecycleHooks<node::Model>,
) -> Vec<(i32, i32, i32)> {
    let mut rows: Vec<(i32, i32, i32)> = hooks
        .engine()
        .closure()
        .select(db, &ClosureFilter::all(), ClosureOrder::Depth)
        .await
        .expect("select closure rows")
        .into_iter()
        .map(|ClosureRow { parent_id, child_id, depth }| (parent_id, child_id, depth))
        .collect();
    rows.sort();
    rows
}

pub fn names(models: &[node::Model]) -> Vec<&str> {
    models.iter().map(|model| model.name.as_str()).collect()
}
