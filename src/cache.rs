use std::collections::HashMap;
use std::hash::Hash;

/// In-memory parent -> children adjacency built from an already fetched
/// descendant list, so walking a subtree does not cost one query per node.
#[derive(Clone, Debug)]
pub struct ChildrenCache<Id, N> {
    root: Id,
    children: HashMap<Id, Vec<N>>,
}

impl<Id, N> ChildrenCache<Id, N>
where
    Id: Clone + Eq + Hash,
{
    /// Every supplied node and `root` become keys, even when childless.
    /// Nodes whose parent is not part of the set hang off `root`; an entry for
    /// `root` itself in `descendants` is ignored.
    pub fn build<I, F, P>(root: Id, descendants: I, id_of: F, parent_of: P) -> Self
    where
        I: IntoIterator<Item = N>,
        F: Fn(&N) -> Id,
        P: Fn(&N) -> Option<Id>,
    {
        let nodes: Vec<N> = descendants
            .into_iter()
            .filter(|node| id_of(node) != root)
            .collect();

        let mut children: HashMap<Id, Vec<N>> = HashMap::with_capacity(nodes.len() + 1);
        children.insert(root.clone(), Vec::new());
        for node in &nodes {
            children.entry(id_of(node)).or_default();
        }

        for node in nodes {
            let key = match parent_of(&node) {
                Some(parent) if children.contains_key(&parent) => parent,
                _ => root.clone(),
            };
            children.entry(key).or_default().push(node);
        }

        Self { root, children }
    }

    pub fn root(&self) -> &Id {
        &self.root
    }

    /// Cached children of `id`, or `None` when `id` was not part of the set.
    pub fn children_of(&self, id: &Id) -> Option<&[N]> {
        self.children.get(id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.children.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
