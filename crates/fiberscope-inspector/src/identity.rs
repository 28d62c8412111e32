//! Durable identifiers for fiber nodes.

use std::collections::HashMap;

const TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::identity");

/// Assigns stable string identifiers to fiber nodes across rebuilds.
///
/// The host runtime recycles fiber objects freely, so object identity is
/// useless for correlation. Instead, nodes are keyed by their structural
/// path (child indices from the root). A path keeps its identifier for as
/// long as it stays mounted; once a subtree unmounts, its identifiers are
/// retired and a later mount at the same position receives fresh ones.
#[derive(Debug, Default)]
pub struct FiberIdRegistry {
    assigned: HashMap<Vec<u32>, String>,
    next: u64,
}

impl FiberIdRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the identifier for a structural path, allocating one if the
    /// path has not been seen since it last unmounted.
    pub fn id_for(&mut self, path: &[u32]) -> String {
        if let Some(existing) = self.assigned.get(path) {
            return existing.clone();
        }
        let id = format!("fiber:{}", self.next);
        self.next = self.next.wrapping_add(1);
        self.assigned.insert(path.to_vec(), id.clone());
        id
    }

    /// Returns the identifier already assigned to a path, if any.
    #[must_use]
    pub fn existing_id(&self, path: &[u32]) -> Option<&str> {
        self.assigned.get(path).map(String::as_str)
    }

    /// Retires the identifiers of a path and everything beneath it.
    ///
    /// Identifier values are never reused after retirement, so a remount at
    /// the same position is observably a new node.
    pub fn notify_unmount(&mut self, path: &[u32]) {
        let before = self.assigned.len();
        self.assigned
            .retain(|candidate, _| !candidate.starts_with(path));
        let retired = before - self.assigned.len();
        if retired > 0 {
            tracing::debug!(target: TARGET, retired, "retired fiber identifiers");
        }
    }

    /// Number of live identifier assignments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    /// Returns whether the registry holds no assignments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::FiberIdRegistry;

    #[rstest]
    fn same_path_keeps_its_id() {
        let mut registry = FiberIdRegistry::new();
        let first = registry.id_for(&[0, 1]);
        let second = registry.id_for(&[0, 1]);
        assert_eq!(first, second);
    }

    #[rstest]
    fn distinct_paths_get_distinct_ids() {
        let mut registry = FiberIdRegistry::new();
        let left = registry.id_for(&[0, 0]);
        let right = registry.id_for(&[0, 1]);
        assert_ne!(left, right);
    }

    #[rstest]
    fn remount_after_unmount_gets_fresh_id() {
        let mut registry = FiberIdRegistry::new();
        let original = registry.id_for(&[0, 1]);
        registry.notify_unmount(&[0, 1]);
        let replacement = registry.id_for(&[0, 1]);
        assert_ne!(original, replacement);
    }

    #[rstest]
    fn unmount_retires_whole_subtree() {
        let mut registry = FiberIdRegistry::new();
        registry.id_for(&[0]);
        registry.id_for(&[0, 1]);
        registry.id_for(&[0, 1, 2]);
        registry.id_for(&[1]);

        registry.notify_unmount(&[0, 1]);

        assert!(registry.existing_id(&[0, 1]).is_none());
        assert!(registry.existing_id(&[0, 1, 2]).is_none());
        assert!(registry.existing_id(&[0]).is_some());
        assert!(registry.existing_id(&[1]).is_some());
    }

    #[rstest]
    fn unmount_of_root_path_clears_everything() {
        let mut registry = FiberIdRegistry::new();
        registry.id_for(&[]);
        registry.id_for(&[0]);
        registry.id_for(&[3, 1]);

        registry.notify_unmount(&[]);

        assert!(registry.is_empty());
    }
}
