mod common;

use std::collections::HashMap;

use closure_table::{ClosureFilter, ClosureOrder, LifecycleHooks, TreeEngine};
use common::{add_node, closure_rows, move_node, node, setup_sqlite};
use proptest::prelude::*;
use proptest::sample::Index;
use sea_orm::{DatabaseConnection, EntityTrait};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

/// Parent choices for a forest of `n` nodes: node `i` picks one of the nodes
/// created before it, or none.
fn forest() -> impl Strategy<Value = Vec<Index>> {
    prop::collection::vec(any::<Index>(), 1..10)
}

fn moves() -> impl Strategy<Value = Vec<(Index, Index)>> {
    prop::collection::vec((any::<Index>(), any::<Index>()), 0..6)
}

async fn build_forest(
    db: &DatabaseConnection,
    hooks: &LifecycleHooks<node::Model>,
    parents: &[Index],
) -> Vec<node::Model> {
    let mut created: Vec<node::Model> = Vec::with_capacity(parents.len());
    for (i, choice) in parents.iter().enumerate() {
        let pick = choice.index(i + 1);
        let parent = created.get(pick).cloned();
        let model = add_node(db, hooks, &format!("n{i}"), parent.as_ref()).await;
        created.push(model);
    }
    created
}

async fn current(db: &DatabaseConnection) -> Vec<node::Model> {
    node::Entity::find().all(db).await.expect("load nodes")
}

/// Checks the self-link, level and ancestor-count invariants for every node.
async fn assert_invariants(
    db: &DatabaseConnection,
    hooks: &LifecycleHooks<node::Model>,
) -> Result<(), TestCaseError> {
    let engine: &TreeEngine<node::Model> = hooks.engine();
    let rows = engine
        .closure()
        .select(db, &ClosureFilter::all(), ClosureOrder::ChildLevel)
        .await
        .expect("select closure rows");
    let nodes = current(db).await;

    for model in &nodes {
        let self_links = rows
            .iter()
            .filter(|row| row.child_id == model.id && row.parent_id == model.id)
            .collect::<Vec<_>>();
        prop_assert_eq!(self_links.len(), 1);
        prop_assert!(self_links[0].is_self_link());

        let ancestor_rows = rows
            .iter()
            .filter(|row| row.child_id == model.id && !row.is_self_link())
            .count();
        prop_assert_eq!(ancestor_rows as i32, model.level);

        let root = engine.root(db, model).await.expect("root");
        let root_depth = rows
            .iter()
            .find(|row| row.parent_id == root.id && row.child_id == model.id)
            .map(|row| row.depth);
        prop_assert_eq!(root_depth, Some(model.level));
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn reparenting_matches_a_fresh_rebuild(parents in forest(), plan in moves()) {
        let rt = runtime();
        let (incremental, rebuilt, rebuilt_again) = rt.block_on(async {
            let db = setup_sqlite().await.expect("sqlite");
            let hooks = LifecycleHooks::<node::Model>::new();
            let engine = hooks.engine();
            let created = build_forest(&db, &hooks, &parents).await;
            let n = created.len();

            for (who, whom) in &plan {
                let by_id: HashMap<i32, node::Model> =
                    current(&db).await.into_iter().map(|m| (m.id, m)).collect();
                let target = &by_id[&created[who.index(n)].id];
                let pick = whom.index(n + 1);
                let new_parent = created.get(pick).map(|m| by_id[&m.id].clone());

                if let Some(parent) = &new_parent {
                    let would_cycle = engine
                        .is_descendant_of(&db, parent, target, true)
                        .await
                        .expect("membership");
                    if would_cycle {
                        continue;
                    }
                }
                move_node(&db, &hooks, target, new_parent.map(|p| p.id)).await;
            }

            assert_invariants(&db, &hooks).await.expect("invariants after moves");
            let incremental = closure_rows(&db, &hooks).await;
            engine.rebuild_all(&db).await.expect("rebuild");
            let rebuilt = closure_rows(&db, &hooks).await;
            engine.rebuild_all(&db).await.expect("rebuild again");
            let rebuilt_again = closure_rows(&db, &hooks).await;
            (incremental, rebuilt, rebuilt_again)
        });

        prop_assert_eq!(&incremental, &rebuilt);
        prop_assert_eq!(&rebuilt, &rebuilt_again);
    }

    #[test]
    fn descendant_and_ancestor_checks_agree(parents in forest()) {
        let rt = runtime();
        rt.block_on(async {
            let db = setup_sqlite().await.expect("sqlite");
            let hooks = LifecycleHooks::<node::Model>::new();
            let engine = hooks.engine();
            let created = build_forest(&db, &hooks, &parents).await;

            for a in &created {
                for b in &created {
                    for include_self in [false, true] {
                        let down = engine.is_descendant_of(&db, a, b, include_self).await.expect("descendant");
                        let up = engine.is_ancestor_of(&db, b, a, include_self).await.expect("ancestor");
                        assert_eq!(down, up, "{} vs {}", a.id, b.id);
                    }
                }
            }
            assert_invariants(&db, &hooks).await.expect("invariants");
        });
    }
}
