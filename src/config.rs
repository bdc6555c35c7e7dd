use crc32fast::Hasher;

/// Number of nodes fetched per page while rebuilding a closure table.
pub const DEFAULT_REBUILD_BATCH_SIZE: u64 = 500;

/// Static configuration describing how a SeaORM model integrates with
/// its closure table.
#[derive(Clone, Debug)]
pub struct ClosureTreeConfig {
    entity_name: String,
    closure_table: String,
    dependent_behavior: DependentBehavior,
    advisory_lock_strategy: AdvisoryLockStrategy,
    rebuild_batch_size: u64,
}

impl ClosureTreeConfig {
    /// Create a new configuration for the named entity and its closure table.
    pub fn new(entity_name: impl Into<String>, closure_table: impl Into<String>) -> Self {
        let entity_name = entity_name.into();
        let closure_table = closure_table.into();

        let default_lock = AdvisoryLockStrategy::Namespaced(AdvisoryLockKey::derived_from(
            &entity_name,
            &closure_table,
        ));

        Self {
            entity_name,
            closure_table,
            dependent_behavior: DependentBehavior::default(),
            advisory_lock_strategy: default_lock,
            rebuild_batch_size: DEFAULT_REBUILD_BATCH_SIZE,
        }
    }

    /// Merge options produced by [`ClosureTreeOptions`].
    pub(crate) fn apply_options(mut self, options: ClosureTreeOptions) -> Self {
        if let Some(behavior) = options.dependent_behavior {
            self.dependent_behavior = behavior;
        }
        if let Some(strategy) = options.advisory_lock_strategy {
            self.advisory_lock_strategy = strategy;
        }
        if let Some(batch) = options.rebuild_batch_size {
            self.rebuild_batch_size = batch.max(1);
        }
        self
    }

    /// Human-readable Rust struct name for the tree entity.
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Table backing the closure entity.
    pub fn closure_table(&self) -> &str {
        &self.closure_table
    }

    /// What to do with descendants when a node is deleted.
    pub fn dependent_behavior(&self) -> DependentBehavior {
        self.dependent_behavior
    }

    /// Advisory lock strategy (PostgreSQL only).
    pub fn advisory_lock_strategy(&self) -> &AdvisoryLockStrategy {
        &self.advisory_lock_strategy
    }

    pub fn rebuild_batch_size(&self) -> u64 {
        self.rebuild_batch_size
    }
}

/// Builder-style options consumed by the derive macro.
#[derive(Clone, Debug, Default)]
pub struct ClosureTreeOptions {
    dependent_behavior: Option<DependentBehavior>,
    advisory_lock_strategy: Option<AdvisoryLockStrategy>,
    rebuild_batch_size: Option<u64>,
}

impl ClosureTreeOptions {
    pub fn dependent_behavior(mut self, behavior: DependentBehavior) -> Self {
        self.dependent_behavior = Some(behavior);
        self
    }

    pub fn advisory_lock_strategy(mut self, strategy: AdvisoryLockStrategy) -> Self {
        self.advisory_lock_strategy = Some(strategy);
        self
    }

    pub fn rebuild_batch_size(mut self, batch: u64) -> Self {
        self.rebuild_batch_size = Some(batch);
        self
    }

    pub fn apply(self, base: ClosureTreeConfig) -> ClosureTreeConfig {
        base.apply_options(self)
    }
}

/// Behaviour to apply to descendants when deleting a node.
///
/// Deleting a node only ever removes the closure rows that name it as the
/// child. Rows naming it as an ancestor of surviving descendants are left to
/// the host (or to an `ON DELETE CASCADE` on the closure table).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DependentBehavior {
    /// Remove the node's own links and nothing else.
    #[default]
    Ignore,
    /// Refuse to delete a node that still has descendants.
    Restrict,
}

/// Key used for PostgreSQL advisory locks.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct AdvisoryLockKey(String);

impl AdvisoryLockKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn derived_from(entity: &str, closure_table: &str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(entity.as_bytes());
        hasher.update(b"/");
        hasher.update(closure_table.as_bytes());
        let crc = hasher.finalize();
        Self(format!("closure-table::{entity}::{closure_table}::{crc:x}"))
    }
}

/// Configuration describing how to acquire advisory locks.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdvisoryLockStrategy {
    Disabled,
    Namespaced(AdvisoryLockKey),
}

impl AdvisoryLockStrategy {
    pub fn key(&self) -> Option<&AdvisoryLockKey> {
        match self {
            AdvisoryLockStrategy::Disabled => None,
            AdvisoryLockStrategy::Namespaced(key) => Some(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_derive_a_namespaced_lock_key() {
        let config = ClosureTreeConfig::new("Category", "categories_closure");
        let key = config
            .advisory_lock_strategy()
            .key()
            .expect("default strategy is namespaced");
        assert!(key
            .as_str()
            .starts_with("closure-table::Category::categories_closure::"));
        assert_eq!(config.closure_table(), "categories_closure");
        assert_eq!(config.dependent_behavior(), DependentBehavior::Ignore);
        assert_eq!(config.rebuild_batch_size(), DEFAULT_REBUILD_BATCH_SIZE);
    }

    #[test]
    fn lock_keys_differ_per_tree_type() {
        let a = ClosureTreeConfig::new("Category", "categories_closure");
        let b = ClosureTreeConfig::new("Folder", "folder_paths");
        assert_ne!(a.advisory_lock_strategy(), b.advisory_lock_strategy());
    }

    #[test]
    fn options_override_defaults() {
        let config = ClosureTreeOptions::default()
            .dependent_behavior(DependentBehavior::Restrict)
            .advisory_lock_strategy(AdvisoryLockStrategy::Disabled)
            .rebuild_batch_size(0)
            .apply(ClosureTreeConfig::new("Folder", "folder_paths"));

        assert_eq!(config.entity_name(), "Folder");
        assert_eq!(config.dependent_behavior(), DependentBehavior::Restrict);
        assert_eq!(config.advisory_lock_strategy().key(), None);
        assert_eq!(config.rebuild_batch_size(), 1);
    }
}
