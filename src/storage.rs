//! Storage: the entry point that owns one scene graph tree — a
//! [`crate::registry::Registry`] (and the buffer pool behind it) plus a
//! single root container.
//!
//! Each `Storage` is independent: creating a second one gets its own
//! registry and pool, so two trees never share ids or buffers.

use std::sync::Arc;

use crate::container::Container;
use crate::layout::Layout;
use crate::registry::Registry;
use crate::view::ObjectView;

/// Owns a scene graph tree. Dropping it drops the registry and, with it,
/// every container still alive in the tree (no explicit `dispose()` of
/// descendants is required, though calling [`Storage::dispose`] first
/// fires Dispose events for anyone still subscribed).
pub struct Storage {
    registry: Arc<Registry>,
    root: Arc<Container>,
}

impl Storage {
    /// A fresh tree with an empty-object root.
    pub fn new() -> Self {
        Self::with_root_layout(Layout::empty_object())
    }

    /// A fresh tree whose root starts out with `layout` instead of the
    /// default empty object.
    pub fn with_root_layout(layout: Arc<Layout>) -> Self {
        let registry = Registry::new();
        let root = registry.create(layout);
        Storage { registry, root }
    }

    /// Wrap an already-built registry/root pair. Used by the binary codec's
    /// decoder, which constructs the tree directly rather than starting
    /// from an empty root and writing fields in afterward.
    pub(crate) fn from_parts(registry: Arc<Registry>, root: Arc<Container>) -> Self {
        Storage { registry, root }
    }

    /// A view onto the root container.
    pub fn root(&self) -> ObjectView {
        ObjectView::new(self.root.id(), self.root.generation(), self.registry.clone())
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Number of containers currently live in this tree (root included).
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Tear down the entire tree: recursively unregisters the root (firing
    /// Dispose for every descendant), leaving the `Storage` with no live
    /// containers. Further use of views minted from this tree will see
    /// `Error::ObjectDisposed`.
    pub fn dispose(&self) {
        self.registry.unregister(self.root.id());
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_storage_has_single_root() {
        let storage = Storage::new();
        assert_eq!(storage.len(), 1);
        assert!(!storage.root().is_null());
    }

    #[test]
    fn test_dispose_empties_tree() {
        let storage = Storage::new();
        storage.root().get_object("child", true).unwrap();
        assert_eq!(storage.len(), 2);
        storage.dispose();
        assert_eq!(storage.len(), 0);
    }
}
