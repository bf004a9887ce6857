//! Registry: the process-wide (per-[`crate::storage::Storage`]) id→container
//! map and parent-tracking table.
//!
//! A `parking_lot::RwLock`-guarded map keyed by a monotonically
//! increasing id, plus a separate parent-link table (needed for event
//! bubbling and recursive teardown).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::ContainerId;
use crate::container::Container;
use crate::error::{Error, Result};
use crate::event;
use crate::layout::Layout;
use crate::pool::BufferPool;

/// Records where a container sits in the tree: which container holds the
/// reference, through which field, and (for reference-array members)
/// which index.
#[derive(Debug, Clone)]
pub struct ParentLink {
    pub parent: ContainerId,
    pub field: Arc<str>,
    pub index: Option<usize>,
}

/// Owns every live container plus the buffer pool they rent from.
///
/// One `Registry` backs one [`crate::storage::Storage`] tree; nothing here
/// is shared across independent `Storage` instances.
pub struct Registry {
    pool: Arc<BufferPool>,
    containers: RwLock<HashMap<u64, Arc<Container>>>,
    parents: RwLock<HashMap<u64, ParentLink>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Arc<Registry> {
        Arc::new(Registry {
            pool: Arc::new(BufferPool::new()),
            containers: RwLock::new(HashMap::new()),
            parents: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        })
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Allocate a fresh container with `layout`, rented from this
    /// registry's pool, and register it under a new id (I1: unique,
    /// nonzero, never reused while this registry lives).
    pub fn create(self: &Arc<Self>, layout: Arc<Layout>) -> Arc<Container> {
        let id = ContainerId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let container = Container::new(id, Arc::downgrade(self), layout, &self.pool);
        self.containers.write().insert(id.0, container.clone());
        log::trace!("registry: created {id}");
        container
    }

    pub fn get(&self, id: ContainerId) -> Option<Arc<Container>> {
        if id.is_none() {
            return None;
        }
        self.containers.read().get(&id.0).cloned()
    }

    pub fn len(&self) -> usize {
        self.containers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn parent_of(&self, id: ContainerId) -> Option<ParentLink> {
        self.parents.read().get(&id.0).cloned()
    }

    /// Record that `child` is referenced from `parent.field[index]`.
    ///
    /// Rejects re-parenting a container that already has a *different*
    /// parent link: a container may only ever be referenced from one
    /// place in the tree (I2), ruling out cycles and multi-parent sharing.
    pub fn set_parent(
        &self,
        child: ContainerId,
        parent: ContainerId,
        field: Arc<str>,
        index: Option<usize>,
    ) -> Result<()> {
        let mut parents = self.parents.write();
        if let Some(existing) = parents.get(&child.0) {
            if existing.parent != parent || existing.field.as_ref() != field.as_ref() || existing.index != index {
                return Err(Error::invalid_state(format!(
                    "{child} already has a parent; references may not be shared or cyclic"
                )));
            }
            return Ok(());
        }
        parents.insert(child.0, ParentLink { parent, field, index });
        Ok(())
    }

    pub fn clear_parent(&self, child: ContainerId) {
        self.parents.write().remove(&child.0);
    }

    /// Recursively unregister `id` and every descendant reachable through
    /// a reference or reference-array field, post-order: children are
    /// fully torn down (each firing its own Dispose) before `id` itself
    /// is disposed and its buffer returned to the pool.
    ///
    /// A no-op if `id` is already gone.
    pub fn unregister(self: &Arc<Self>, id: ContainerId) {
        let container = match self.get(id) {
            Some(c) => c,
            None => return,
        };
        if container.is_disposed() {
            return;
        }

        for child in container.reference_targets() {
            self.unregister(child);
        }

        event::publish_dispose(self, id);
        let buffer = container.enter_disposed();
        self.containers.write().remove(&id.0);
        self.parents.write().remove(&id.0);
        self.pool.return_buffer(buffer);
        log::trace!("registry: unregistered {id}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Layout;

    #[test]
    fn test_create_assigns_unique_nonzero_ids() {
        let registry = Registry::new();
        let a = registry.create(Layout::empty_object());
        let b = registry.create(Layout::empty_object());
        assert!(a.id().is_some());
        assert!(b.id().is_some());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = Registry::new();
        let a = registry.create(Layout::empty_object());
        let id = a.id();
        drop(a);
        registry.unregister(id);
        assert!(registry.get(id).is_none());
        registry.unregister(id); // should not panic
    }

    #[test]
    fn test_set_parent_rejects_conflicting_reparent() {
        let registry = Registry::new();
        let parent_a = registry.create(Layout::empty_object());
        let parent_b = registry.create(Layout::empty_object());
        let child = registry.create(Layout::empty_object());

        registry
            .set_parent(child.id(), parent_a.id(), Arc::from("x"), None)
            .unwrap();
        assert!(registry
            .set_parent(child.id(), parent_b.id(), Arc::from("y"), None)
            .is_err());
    }

    #[test]
    fn test_len_and_is_empty() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        let a = registry.create(Layout::empty_object());
        assert_eq!(registry.len(), 1);
        registry.unregister(a.id());
        assert!(registry.is_empty());
    }
}
