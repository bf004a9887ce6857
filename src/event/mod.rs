//! Event Bus: per-container subscription tables plus ancestor bubbling.
//!
//! Each [`crate::container::Container`] owns its own [`SubscriptionTable`];
//! there is no process-wide dispatcher. Bubbling (`publish`) walks the
//! [`crate::registry::Registry`]'s parent map from the event's origin
//! outward, notifying each ancestor's container-scoped subscribers with a
//! path relative to that ancestor.
//!
//! Handler lists are snapshotted (moved out of the table) before running,
//! so a handler that subscribes/unsubscribes/writes during its own
//! callback neither corrupts the table nor recurses into itself — a
//! resubscribe during dispatch lands in a fresh list that is only
//! visited on the *next* dispatch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::common::ContainerId;
use crate::registry::Registry;
use crate::types::ElementType;
use crate::view::ObjectView;

/// What kind of structural change an [`Event`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Write,
    Rename,
    Delete,
    Dispose,
}

/// A single notification delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    /// The container the event concerns. Null (`target.is_null()`) for
    /// Dispose events, whose subject no longer exists.
    pub target: ObjectView,
    /// Field name for a direct subscriber, or the dotted path from the
    /// receiving ancestor to the affected field for a bubbled event.
    pub path: String,
    pub field_type: Option<ElementType>,
    pub old_name: Option<String>,
}

/// A handle returned from `subscribe_*`. Dropping it does *not*
/// unsubscribe — call [`SubscriptionHandle::unsubscribe`] to detach.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: u64,
    disposed: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    pub fn unsubscribe(&self) {
        self.disposed.store(true, Ordering::Relaxed);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Relaxed)
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

type Handler = Box<dyn FnMut(&Event) + Send>;

struct Subscription {
    disposed: Arc<AtomicBool>,
    handler: Handler,
}

/// Per-container subscription storage: field-scoped tables plus the
/// container-wide ("any-field") list.
#[derive(Default)]
pub struct SubscriptionTable {
    by_field: HashMap<String, Vec<Subscription>>,
    any: Vec<Subscription>,
    next_id: u64,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_handle(&mut self) -> (u64, Arc<AtomicBool>) {
        self.next_id += 1;
        (self.next_id, Arc::new(AtomicBool::new(false)))
    }

    pub fn add_field(&mut self, field: &str, handler: Handler) -> SubscriptionHandle {
        let (id, disposed) = self.alloc_handle();
        self.by_field
            .entry(field.to_string())
            .or_default()
            .push(Subscription {
                disposed: disposed.clone(),
                handler,
            });
        SubscriptionHandle { id, disposed }
    }

    pub fn add_any(&mut self, handler: Handler) -> SubscriptionHandle {
        let (id, disposed) = self.alloc_handle();
        self.any.push(Subscription {
            disposed: disposed.clone(),
            handler,
        });
        SubscriptionHandle { id, disposed }
    }

    /// Dispatch to a field's subscribers, preserving late (re-entrant)
    /// subscriptions registered during the callback.
    pub fn dispatch_field(&mut self, field: &str, event: &Event) {
        let mut snapshot = self.by_field.remove(field).unwrap_or_default();
        for sub in snapshot.iter_mut() {
            if !sub.disposed.load(Ordering::Relaxed) {
                (sub.handler)(event);
            }
        }
        snapshot.retain(|s| !s.disposed.load(Ordering::Relaxed));
        if let Some(added) = self.by_field.remove(field) {
            snapshot.extend(added);
        }
        if !snapshot.is_empty() {
            self.by_field.insert(field.to_string(), snapshot);
        }
    }

    pub fn dispatch_any(&mut self, event: &Event) {
        let mut snapshot = std::mem::take(&mut self.any);
        for sub in snapshot.iter_mut() {
            if !sub.disposed.load(Ordering::Relaxed) {
                (sub.handler)(event);
            }
        }
        snapshot.retain(|s| !s.disposed.load(Ordering::Relaxed));
        snapshot.extend(std::mem::take(&mut self.any));
        self.any = snapshot;
    }

    /// Final notification to a field's subscribers before the field is
    /// structurally removed, then drop the key outright.
    pub fn notify_and_drop_field(&mut self, field: &str, event: &Event) {
        if let Some(mut list) = self.by_field.remove(field) {
            for sub in list.iter_mut() {
                if !sub.disposed.load(Ordering::Relaxed) {
                    (sub.handler)(event);
                }
            }
        }
        // Any resubscription attempted inside the callback above also
        // lands under `field` in `by_field` (since the key was removed,
        // `Container::subscribe_field` would have rejected it as the
        // field no longer exists by the time the caller observes it);
        // drop it defensively so no entry survives for a deleted field.
        self.by_field.remove(field);
    }

    pub fn rekey_field(&mut self, old_name: &str, new_name: &str) {
        if let Some(subs) = self.by_field.remove(old_name) {
            self.by_field.insert(new_name.to_string(), subs);
        }
    }

    /// Deliver a final Dispose to every subscription (field and any),
    /// then clear the table (generation gating).
    pub fn dispatch_all_and_clear(&mut self, event: &Event) {
        for list in self.by_field.values_mut() {
            for sub in list.iter_mut() {
                if !sub.disposed.load(Ordering::Relaxed) {
                    (sub.handler)(event);
                }
            }
        }
        for sub in self.any.iter_mut() {
            if !sub.disposed.load(Ordering::Relaxed) {
                (sub.handler)(event);
            }
        }
        self.by_field.clear();
        self.any.clear();
    }
}

/// Publish a Write/Rename/Delete event originating at `origin`'s field
/// `field`, notifying `origin`'s field and container-scoped subscribers,
/// then bubbling to every ancestor.
///
/// For `EventKind::Delete`, pass `drop_field = true` so the field's own
/// subscription key is torn down after this final notification.
pub fn publish(
    registry: &Arc<Registry>,
    origin: ContainerId,
    field: &str,
    kind: EventKind,
    field_type: Option<ElementType>,
    old_name: Option<String>,
    drop_field: bool,
) {
    let origin_container = match registry.get(origin) {
        Some(c) => c,
        None => return,
    };

    let target = ObjectView::new(origin, origin_container.generation(), registry.clone());
    let event = Event {
        kind,
        target,
        path: field.to_string(),
        field_type,
        old_name: old_name.clone(),
    };

    {
        let mut inner = origin_container.inner_for_events();
        if drop_field {
            inner.subs.notify_and_drop_field(field, &event);
        } else {
            inner.subs.dispatch_field(field, &event);
        }
        inner.subs.dispatch_any(&event);
    }

    let mut cur_id = origin;
    let mut cur_path = field.to_string();
    loop {
        let link = match registry.parent_of(cur_id) {
            Some(l) => l,
            None => break,
        };
        let parent_container = match registry.get(link.parent) {
            Some(c) => c,
            None => break,
        };
        if parent_container.is_disposed() {
            // Bubbling stops at a container that is being deleted.
            break;
        }
        let segment = match link.index {
            Some(i) => format!("{}[{}]", link.field, i),
            None => link.field.to_string(),
        };
        let new_path = format!("{segment}.{cur_path}");

        let ancestor_event = Event {
            kind,
            target: ObjectView::new(link.parent, parent_container.generation(), registry.clone()),
            path: new_path.clone(),
            field_type,
            old_name: old_name.clone(),
        };
        parent_container.inner_for_events().subs.dispatch_any(&ancestor_event);

        cur_id = link.parent;
        cur_path = new_path;
    }
}

/// Fire the final Dispose notification for a container that is being torn
/// down, then clear its subscription table (called by
/// [`Registry::unregister`] once all descendants are gone).
pub fn publish_dispose(registry: &Arc<Registry>, id: ContainerId) {
    let container = match registry.get(id) {
        Some(c) => c,
        None => return,
    };
    let event = Event {
        kind: EventKind::Dispose,
        target: ObjectView::null(registry.clone()),
        path: String::new(),
        field_type: None,
        old_name: None,
    };
    container.inner_for_events().subs.dispatch_all_and_clear(&event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_field_reentrant_subscribe_is_deferred() {
        let mut table = SubscriptionTable::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();

        table.add_field(
            "hp",
            Box::new(move |_e| {
                fired2.store(true, Ordering::Relaxed);
            }),
        );

        let event = Event {
            kind: EventKind::Write,
            target: ObjectView::null(Registry::new()),
            path: "hp".to_string(),
            field_type: None,
            old_name: None,
        };
        table.dispatch_field("hp", &event);
        assert!(fired.load(Ordering::Relaxed));
    }

    #[test]
    fn test_unsubscribe_stops_future_delivery() {
        let mut table = SubscriptionTable::new();
        let count = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let count2 = count.clone();
        let handle = table.add_field(
            "hp",
            Box::new(move |_e| {
                count2.fetch_add(1, Ordering::Relaxed);
            }),
        );

        let event = Event {
            kind: EventKind::Write,
            target: ObjectView::null(Registry::new()),
            path: "hp".to_string(),
            field_type: None,
            old_name: None,
        };
        table.dispatch_field("hp", &event);
        handle.unsubscribe();
        table.dispatch_field("hp", &event);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
