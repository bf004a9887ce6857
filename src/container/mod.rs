//! Container: a single node in the tree — an id, a generation, a
//! [`Layout`]-described byte buffer, and a subscription table.
//!
//! Reads and writes go straight at the buffer under a `parking_lot::Mutex`.
//! A write that doesn't fit the current layout triggers *reschema*: rent a
//! new buffer sized to the new layout, copy surviving fields by name, swap
//! it in, return the old buffer to the pool — all while the container
//! keeps its id and generation. Event dispatch always
//! happens with the lock released, since handlers routinely call back
//! into the same container.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use crate::common::ContainerId;
use crate::error::{Error, Result};
use crate::event::{self, EventKind, SubscriptionHandle, SubscriptionTable};
use crate::layout::{Layout, LayoutBuilder, ARRAY_FIELD_NAME};
use crate::pool::BufferPool;
use crate::registry::Registry;
use crate::types::{ElementType, Scalar};
use crate::view::{ArrayView, ObjectView};

pub(crate) struct ContainerInner {
    layout: Arc<Layout>,
    buffer: Vec<u8>,
    generation: u64,
    disposed: bool,
    pub(crate) subs: SubscriptionTable,
}

/// One node in the scene graph.
pub struct Container {
    id: ContainerId,
    registry: Weak<Registry>,
    inner: Mutex<ContainerInner>,
}

fn read_ref_cell(buffer: &[u8], offset: usize) -> ContainerId {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buffer[offset..offset + 8]);
    ContainerId::new(u64::from_le_bytes(b))
}

fn write_ref_cell(buffer: &mut [u8], offset: usize, id: ContainerId) {
    buffer[offset..offset + 8].copy_from_slice(&id.0.to_le_bytes());
}

fn is_same_size_swappable(a: ElementType, b: ElementType) -> bool {
    let eligible = |t: ElementType| !matches!(t, ElementType::Blob | ElementType::Ref | ElementType::Unknown);
    a != b && eligible(a) && eligible(b) && a.size() == b.size()
}

/// Rent a new buffer sized to `new_layout`, copy every surviving
/// same-named field, swap it in, return the old buffer to `pool`. Does
/// not publish events or touch subscriptions — callers do that.
fn reschema_locked(inner: &mut ContainerInner, pool: &BufferPool, new_layout: Arc<Layout>) {
    log::trace!("container: reschema {} -> {}", inner.layout, new_layout);
    let mut new_buffer = pool.rent(new_layout.stride());
    for nf in new_layout.fields() {
        if let Some(of) = inner.layout.field(&nf.name) {
            let copy_len = of.length.min(nf.length);
            new_buffer[nf.offset..nf.offset + copy_len]
                .copy_from_slice(&inner.buffer[of.offset..of.offset + copy_len]);
        }
    }
    let old_buffer = std::mem::replace(&mut inner.buffer, new_buffer);
    inner.layout = new_layout;
    pool.return_buffer(old_buffer);
}

impl Container {
    pub(crate) fn new(
        id: ContainerId,
        registry: Weak<Registry>,
        layout: Arc<Layout>,
        pool: &Arc<BufferPool>,
    ) -> Arc<Container> {
        let buffer = pool.rent(layout.stride());
        Arc::new(Container {
            id,
            registry,
            inner: Mutex::new(ContainerInner {
                layout,
                buffer,
                generation: 1,
                disposed: false,
                subs: SubscriptionTable::new(),
            }),
        })
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    pub fn layout(&self) -> Arc<Layout> {
        self.inner.lock().layout.clone()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.inner.lock().layout.has_field(name)
    }

    pub(crate) fn registry(&self) -> Result<Arc<Registry>> {
        self.registry
            .upgrade()
            .ok_or_else(|| Error::invalid_state("registry no longer available"))
    }

    /// Used only by the event module to reach the subscription table
    /// without exposing the whole container lock to callers outside the
    /// crate's event-dispatch machinery.
    pub(crate) fn inner_for_events(&self) -> MutexGuard<'_, ContainerInner> {
        self.inner.lock()
    }

    /// Container ids referenced by any field (single reference or
    /// reference-array), in layout order. Used by the registry to recurse
    /// into subtrees during teardown.
    pub(crate) fn reference_targets(&self) -> Vec<ContainerId> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        for f in inner.layout.fields() {
            if f.flags.is_reference {
                let cid = read_ref_cell(&inner.buffer, f.offset);
                if cid.is_some() {
                    out.push(cid);
                }
            } else if f.flags.is_reference_array {
                for i in 0..f.array_len {
                    let cid = read_ref_cell(&inner.buffer, f.offset + i * 8);
                    if cid.is_some() {
                        out.push(cid);
                    }
                }
            }
        }
        out
    }

    /// Mark the container disposed, bump its generation, and hand back
    /// its buffer for the registry to return to the pool. The registry
    /// has already published the Dispose event and torn down referenced
    /// subtrees by the time this is called.
    pub(crate) fn enter_disposed(&self) -> Vec<u8> {
        let mut inner = self.inner.lock();
        inner.disposed = true;
        inner.generation += 1;
        std::mem::take(&mut inner.buffer)
    }

    // --- scalar read/write -------------------------------------------------

    pub fn read<T: Scalar>(&self, field: &str) -> Result<T> {
        let inner = self.inner.lock();
        if inner.disposed {
            return Err(Error::ObjectDisposed);
        }
        let fh = inner
            .layout
            .field(field)
            .ok_or_else(|| Error::invalid_argument(format!("no such field '{field}'")))?;
        T::decode_from(fh.element_type, &inner.buffer[fh.offset..fh.offset + fh.length]).ok_or_else(|| {
            Error::type_mismatch(field, format!("cannot read {} as {}", fh.element_type, T::ELEMENT_TYPE))
        })
    }

    pub fn try_read<T: Scalar>(&self, field: &str) -> Option<T> {
        let inner = self.inner.lock();
        if inner.disposed {
            return None;
        }
        let fh = inner.layout.field(field)?;
        T::decode_from(fh.element_type, &inner.buffer[fh.offset..fh.offset + fh.length])
    }

    pub fn read_or_default<T: Scalar + Default>(&self, field: &str) -> T {
        self.read(field).unwrap_or_default()
    }

    /// Write `value` into `field`.
    ///
    /// - Exact type+size match: encode in place.
    /// - Same byte length, different numeric type (e.g. Int32<->Float32):
    ///   cheap same-size reassignment (R4), no buffer copy.
    /// - Otherwise: reschema, gated by `allow_reschema` (B1: a disallowed
    ///   reschema fails without mutating the buffer or firing events).
    pub fn write<T: Scalar>(&self, field: &str, value: T, allow_reschema: bool) -> Result<()> {
        let registry = self.registry()?;
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(Error::ObjectDisposed);
        }

        let existing = inner.layout.field(field).cloned();
        match existing {
            Some(fh) if fh.element_type == T::ELEMENT_TYPE && fh.length == T::SIZE => {
                value.encode(&mut inner.buffer[fh.offset..fh.offset + fh.length]);
            }
            Some(fh) if fh.length == T::SIZE && is_same_size_swappable(fh.element_type, T::ELEMENT_TYPE) => {
                inner.layout = inner.layout.with_retyped_field(field, T::ELEMENT_TYPE)?;
                value.encode(&mut inner.buffer[fh.offset..fh.offset + fh.length]);
            }
            Some(_) => {
                if !allow_reschema {
                    return Err(Error::type_mismatch(
                        field,
                        "write would require a reschema and allow_reschema is false",
                    ));
                }
                let new_layout = {
                    let mut b = inner.layout.to_builder();
                    b.ensure_scalar_capacity(field, T::ELEMENT_TYPE, T::SIZE);
                    b.build()
                };
                reschema_locked(&mut inner, registry.pool(), new_layout);
                let fh2 = inner.layout.field(field).unwrap().clone();
                value.encode(&mut inner.buffer[fh2.offset..fh2.offset + T::SIZE]);
            }
            None => {
                if !allow_reschema {
                    return Err(Error::type_mismatch(
                        field,
                        "field does not exist and allow_reschema is false",
                    ));
                }
                let new_layout = {
                    let mut b = inner.layout.to_builder();
                    b.add_scalar(field, T::ELEMENT_TYPE);
                    b.build()
                };
                reschema_locked(&mut inner, registry.pool(), new_layout);
                let fh2 = inner.layout.field(field).unwrap().clone();
                value.encode(&mut inner.buffer[fh2.offset..fh2.offset + T::SIZE]);
            }
        }
        drop(inner);
        event::publish(&registry, self.id, field, EventKind::Write, Some(T::ELEMENT_TYPE), None, false);
        Ok(())
    }

    pub fn try_write<T: Scalar>(&self, field: &str, value: T) -> bool {
        self.write(field, value, false).is_ok()
    }

    // --- inline arrays -------------------------------------------------

    pub fn read_array<T: Scalar>(&self, field: &str) -> Result<Vec<T>> {
        let inner = self.inner.lock();
        if inner.disposed {
            return Err(Error::ObjectDisposed);
        }
        let fh = inner
            .layout
            .field(field)
            .ok_or_else(|| Error::invalid_argument(format!("no such field '{field}'")))?;
        if fh.element_type != T::ELEMENT_TYPE {
            return Err(Error::type_mismatch(field, "array element type mismatch"));
        }
        let mut out = Vec::with_capacity(fh.array_len);
        for i in 0..fh.array_len {
            let off = fh.offset + i * T::SIZE;
            out.push(T::decode_native(&inner.buffer[off..off + T::SIZE]));
        }
        Ok(out)
    }

    pub fn write_array<T: Scalar>(&self, field: &str, values: &[T], allow_reschema: bool) -> Result<()> {
        let registry = self.registry()?;
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(Error::ObjectDisposed);
        }
        let needed_len = values.len();
        let existing = inner.layout.field(field).cloned();
        let needs_reschema = match &existing {
            Some(fh) => fh.element_type != T::ELEMENT_TYPE || fh.array_len != needed_len,
            None => true,
        };
        if needs_reschema {
            if !allow_reschema {
                return Err(Error::type_mismatch(
                    field,
                    "array shape mismatch and allow_reschema is false",
                ));
            }
            let new_layout = {
                let mut b = inner.layout.to_builder();
                b.remove(field);
                b.add_inline_array(field, T::ELEMENT_TYPE, needed_len);
                b.build()
            };
            reschema_locked(&mut inner, registry.pool(), new_layout);
        }
        let fh = inner.layout.field(field).unwrap().clone();
        for (i, v) in values.iter().enumerate() {
            let off = fh.offset + i * T::SIZE;
            v.encode(&mut inner.buffer[off..off + T::SIZE]);
        }
        drop(inner);
        event::publish(&registry, self.id, field, EventKind::Write, Some(T::ELEMENT_TYPE), None, false);
        Ok(())
    }

    /// Write a single array element by index without reschema. Returns
    /// `false` on out-of-range index or type mismatch, mutating nothing
    /// (B3).
    pub fn try_write_array_elem<T: Scalar>(&self, field: &str, index: usize, value: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return false;
        }
        let fh = match inner.layout.field(field) {
            Some(f) => f.clone(),
            None => return false,
        };
        if fh.element_type != T::ELEMENT_TYPE || index >= fh.array_len {
            return false;
        }
        let off = fh.offset + index * T::SIZE;
        value.encode(&mut inner.buffer[off..off + T::SIZE]);
        drop(inner);
        if let Ok(registry) = self.registry() {
            event::publish(&registry, self.id, field, EventKind::Write, Some(T::ELEMENT_TYPE), None, false);
        }
        true
    }

    // --- object/array references -------------------------------------------------

    /// Resolve `field` as a reference to a child object, creating one with
    /// `default_layout` (or an empty object) if the field is missing and
    /// `allocate_if_missing` is set.
    pub fn get_object(
        &self,
        field: &str,
        allocate_if_missing: bool,
        default_layout: Option<Arc<Layout>>,
    ) -> Result<ObjectView> {
        let registry = self.registry()?;
        {
            let inner = self.inner.lock();
            if inner.disposed {
                return Err(Error::ObjectDisposed);
            }
            if let Some(fh) = inner.layout.field(field) {
                if !fh.flags.is_reference {
                    return Err(Error::type_mismatch(field, "field is not a reference"));
                }
                let cid = read_ref_cell(&inner.buffer, fh.offset);
                if cid.is_some() {
                    let child = registry.get(cid).ok_or(Error::ObjectDisposed)?;
                    return Ok(ObjectView::new(cid, child.generation(), registry.clone()));
                }
            }
        }
        if !allocate_if_missing {
            return Err(Error::invalid_argument(format!(
                "field '{field}' has no object and allocate_if_missing is false"
            )));
        }

        let layout = default_layout.unwrap_or_else(Layout::empty_object);
        let child = registry.create(layout);
        registry.set_parent(child.id(), self.id, Arc::from(field), None)?;

        let mut inner = self.inner.lock();
        if !inner.layout.has_field(field) {
            let new_layout = {
                let mut b = inner.layout.to_builder();
                b.add_reference(field);
                b.build()
            };
            reschema_locked(&mut inner, registry.pool(), new_layout);
        }
        let fh = inner.layout.field(field).unwrap().clone();
        write_ref_cell(&mut inner.buffer, fh.offset, child.id());
        drop(inner);
        event::publish(&registry, self.id, field, EventKind::Write, Some(ElementType::Ref), None, false);
        Ok(ObjectView::new(child.id(), child.generation(), registry))
    }

    /// Resolve `field` as an array, either an inline value array already
    /// on this container or a reference to an array-container child.
    /// Creates a fresh array-container child when missing and
    /// `create_if_missing` is set.
    pub fn get_array(
        &self,
        field: &str,
        element_type: ElementType,
        create_if_missing: bool,
        override_existing: bool,
    ) -> Result<ArrayView> {
        let registry = self.registry()?;
        {
            let inner = self.inner.lock();
            if inner.disposed {
                return Err(Error::ObjectDisposed);
            }
            if let Some(fh) = inner.layout.field(field) {
                if fh.flags.is_inline_array || fh.flags.is_reference_array {
                    if fh.element_type == element_type {
                        return Ok(ArrayView::new(
                            ObjectView::new(self.id, inner.generation, registry.clone()),
                            field,
                        ));
                    }
                    if !override_existing {
                        return Err(Error::type_mismatch(field, "existing array element type differs"));
                    }
                } else if fh.flags.is_reference {
                    let cid = read_ref_cell(&inner.buffer, fh.offset);
                    if cid.is_some() {
                        let child = registry.get(cid).ok_or(Error::ObjectDisposed)?;
                        return Ok(ArrayView::new(
                            ObjectView::new(cid, child.generation(), registry.clone()),
                            ARRAY_FIELD_NAME,
                        ));
                    }
                } else {
                    return Err(Error::type_mismatch(field, "field is not array-shaped"));
                }
            }
        }
        if !create_if_missing {
            return Err(Error::invalid_argument(format!(
                "field '{field}' has no array and create_if_missing is false"
            )));
        }

        let child_layout = {
            let mut b = LayoutBuilder::new();
            if element_type == ElementType::Ref {
                b.add_reference_array(ARRAY_FIELD_NAME, 0);
            } else {
                b.add_inline_array(ARRAY_FIELD_NAME, element_type, 0);
            }
            b.build()
        };
        let child = registry.create(child_layout);
        registry.set_parent(child.id(), self.id, Arc::from(field), None)?;

        let mut inner = self.inner.lock();
        let new_layout = {
            let mut b = inner.layout.to_builder();
            b.remove(field);
            b.add_reference(field);
            b.build()
        };
        reschema_locked(&mut inner, registry.pool(), new_layout);
        let fh = inner.layout.field(field).unwrap().clone();
        write_ref_cell(&mut inner.buffer, fh.offset, child.id());
        drop(inner);
        event::publish(&registry, self.id, field, EventKind::Write, Some(ElementType::Ref), None, false);
        Ok(ArrayView::new(
            ObjectView::new(child.id(), child.generation(), registry),
            ARRAY_FIELD_NAME,
        ))
    }

    /// Grow or shrink a reference-array field to exactly `new_len` slots,
    /// preserving existing entries in place. Used by the JSON codec to
    /// size an object-array container once the source array's length is
    /// known.
    pub fn resize_reference_array(&self, field: &str, new_len: usize) -> Result<()> {
        let registry = self.registry()?;
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(Error::ObjectDisposed);
        }
        let new_layout = {
            let mut b = inner.layout.to_builder();
            b.remove(field);
            b.add_reference_array(field, new_len);
            b.build()
        };
        reschema_locked(&mut inner, registry.pool(), new_layout);
        Ok(())
    }

    /// Install `child` at `index` of a reference-array field, recording
    /// the parent link with that index (so bubbled event paths read
    /// `field[index].rest`).
    pub fn set_reference_array_elem(&self, field: &str, index: usize, child: &Arc<Container>) -> Result<()> {
        let registry = self.registry()?;
        {
            let inner = self.inner.lock();
            if inner.disposed {
                return Err(Error::ObjectDisposed);
            }
            let fh = inner
                .layout
                .field(field)
                .ok_or_else(|| Error::invalid_argument(format!("no such field '{field}'")))?;
            if !fh.flags.is_reference_array {
                return Err(Error::type_mismatch(field, "field is not a reference array"));
            }
            if index >= fh.array_len {
                return Err(Error::index_out_of_range(index, fh.array_len));
            }
        }
        registry.set_parent(child.id(), self.id, Arc::from(field), Some(index))?;
        let mut inner = self.inner.lock();
        let fh = inner.layout.field(field).unwrap().clone();
        write_ref_cell(&mut inner.buffer, fh.offset + index * 8, child.id());
        drop(inner);
        event::publish(&registry, self.id, field, EventKind::Write, Some(ElementType::Ref), None, false);
        Ok(())
    }

    /// Resolve element `index` of a reference-array field to an
    /// [`ObjectView`]. Used by the path navigator for `field[index]`
    /// segments.
    pub fn object_at(&self, field: &str, index: usize) -> Result<ObjectView> {
        let registry = self.registry()?;
        let inner = self.inner.lock();
        if inner.disposed {
            return Err(Error::ObjectDisposed);
        }
        let fh = inner
            .layout
            .field(field)
            .ok_or_else(|| Error::invalid_argument(format!("no such field '{field}'")))?;
        if !fh.flags.is_reference_array {
            return Err(Error::type_mismatch(field, "field is not a reference array"));
        }
        if index >= fh.array_len {
            return Err(Error::index_out_of_range(index, fh.array_len));
        }
        let cid = read_ref_cell(&inner.buffer, fh.offset + index * 8);
        if cid.is_none() {
            return Err(Error::invalid_state(format!("element {index} of '{field}' is empty")));
        }
        let child = registry.get(cid).ok_or(Error::ObjectDisposed)?;
        Ok(ObjectView::new(cid, child.generation(), registry))
    }

    /// Point a reference field at `child`, reschema-ing in the field if it
    /// doesn't already exist. Used by the binary codec's decoder, which
    /// rebuilds a tree from freshly-created containers rather than walking
    /// `get_object`'s allocate-a-default-child path.
    pub fn set_reference(&self, field: &str, child: &Arc<Container>) -> Result<()> {
        let registry = self.registry()?;
        {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return Err(Error::ObjectDisposed);
            }
            if !inner.layout.has_field(field) {
                let new_layout = {
                    let mut b = inner.layout.to_builder();
                    b.add_reference(field);
                    b.build()
                };
                reschema_locked(&mut inner, registry.pool(), new_layout);
            }
        }
        registry.set_parent(child.id(), self.id, Arc::from(field), None)?;
        let mut inner = self.inner.lock();
        let fh = inner.layout.field(field).unwrap().clone();
        write_ref_cell(&mut inner.buffer, fh.offset, child.id());
        drop(inner);
        event::publish(&registry, self.id, field, EventKind::Write, Some(ElementType::Ref), None, false);
        Ok(())
    }

    /// Reschema in a reference field left empty (no target). Used by the
    /// binary codec's decoder when a presence flag says a reference slot
    /// was absent in the encoded tree.
    pub fn declare_empty_reference(&self, field: &str) -> Result<()> {
        let registry = self.registry()?;
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(Error::ObjectDisposed);
        }
        if inner.layout.has_field(field) {
            return Ok(());
        }
        let new_layout = {
            let mut b = inner.layout.to_builder();
            b.add_reference(field);
            b.build()
        };
        reschema_locked(&mut inner, registry.pool(), new_layout);
        Ok(())
    }

    /// The id a reference field currently points at, or `None` if the
    /// field exists but is empty. Used by the binary codec's encoder to
    /// decide whether to recurse into a child.
    pub fn reference_target(&self, field: &str) -> Result<Option<ContainerId>> {
        let inner = self.inner.lock();
        if inner.disposed {
            return Err(Error::ObjectDisposed);
        }
        let fh = inner
            .layout
            .field(field)
            .ok_or_else(|| Error::invalid_argument(format!("no such field '{field}'")))?;
        if !fh.flags.is_reference {
            return Err(Error::type_mismatch(field, "field is not a reference"));
        }
        let cid = read_ref_cell(&inner.buffer, fh.offset);
        Ok(if cid.is_some() { Some(cid) } else { None })
    }

    /// The id at `index` of a reference-array field, or `None` if that
    /// slot is empty. Used by the binary codec's encoder.
    pub fn reference_array_target(&self, field: &str, index: usize) -> Result<Option<ContainerId>> {
        let inner = self.inner.lock();
        if inner.disposed {
            return Err(Error::ObjectDisposed);
        }
        let fh = inner
            .layout
            .field(field)
            .ok_or_else(|| Error::invalid_argument(format!("no such field '{field}'")))?;
        if !fh.flags.is_reference_array {
            return Err(Error::type_mismatch(field, "field is not a reference array"));
        }
        if index >= fh.array_len {
            return Err(Error::index_out_of_range(index, fh.array_len));
        }
        let cid = read_ref_cell(&inner.buffer, fh.offset + index * 8);
        Ok(if cid.is_some() { Some(cid) } else { None })
    }

    // --- structural edits -------------------------------------------------

    /// Remove the named fields, if present. Reference subtrees rooted at
    /// removed fields are recursively unregistered. A Delete event is
    /// published per removed field *before* the layout is rebuilt (so
    /// handlers observe the container's state at the moment of removal),
    /// and the field's own subscription key is dropped afterward.
    pub fn delete(&self, names: &[&str]) -> Result<usize> {
        let registry = self.registry()?;
        let existing: Vec<String> = {
            let inner = self.inner.lock();
            if inner.disposed {
                return Err(Error::ObjectDisposed);
            }
            names
                .iter()
                .filter(|n| inner.layout.has_field(n))
                .map(|n| n.to_string())
                .collect()
        };
        if existing.is_empty() {
            return Ok(0);
        }

        let mut to_unregister = Vec::new();
        {
            let inner = self.inner.lock();
            for name in &existing {
                let f = inner.layout.field(name).unwrap();
                if f.flags.is_reference {
                    let cid = read_ref_cell(&inner.buffer, f.offset);
                    if cid.is_some() {
                        to_unregister.push(cid);
                    }
                } else if f.flags.is_reference_array {
                    for i in 0..f.array_len {
                        let cid = read_ref_cell(&inner.buffer, f.offset + i * 8);
                        if cid.is_some() {
                            to_unregister.push(cid);
                        }
                    }
                }
            }
        }

        for name in &existing {
            event::publish(&registry, self.id, name, EventKind::Delete, None, None, true);
        }

        for cid in to_unregister {
            registry.unregister(cid);
        }

        let mut inner = self.inner.lock();
        let new_layout = {
            let mut b = inner.layout.to_builder();
            for name in &existing {
                b.remove(name);
            }
            b.build()
        };
        reschema_locked(&mut inner, registry.pool(), new_layout);
        Ok(existing.len())
    }

    /// Rename a field, preserving its value, type, and any subscriptions
    /// (re-keyed to the new name).
    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        let registry = self.registry()?;
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(Error::ObjectDisposed);
        }
        if !inner.layout.has_field(old_name) {
            return Err(Error::invalid_argument(format!("no such field '{old_name}'")));
        }
        if inner.layout.has_field(new_name) {
            return Err(Error::invalid_argument(format!("field '{new_name}' already exists")));
        }
        let new_layout = {
            let mut b = inner.layout.to_builder();
            b.rename(old_name, new_name);
            b.build()
        };
        reschema_locked(&mut inner, registry.pool(), new_layout);
        inner.subs.rekey_field(old_name, new_name);
        drop(inner);
        event::publish(
            &registry,
            self.id,
            new_name,
            EventKind::Rename,
            None,
            Some(old_name.to_string()),
            false,
        );
        Ok(())
    }

    /// Directly install raw bytes under `field`, declaring its element
    /// type and (for an inline array) element count. Used by the binary
    /// and JSON codecs to write blobs and pre-encoded payloads without
    /// going through the typed `write`/`write_array` paths.
    pub fn override_raw(
        &self,
        field: &str,
        raw_bytes: &[u8],
        declared_type: ElementType,
        inline_array_length: Option<usize>,
    ) -> Result<()> {
        let registry = self.registry()?;
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(Error::ObjectDisposed);
        }
        let needed_len = raw_bytes.len();
        let existing = inner.layout.field(field).cloned();
        let needs_reschema = match &existing {
            Some(fh) => fh.element_type != declared_type || fh.length != needed_len,
            None => true,
        };
        if needs_reschema {
            let mut b = inner.layout.to_builder();
            b.remove(field);
            match inline_array_length {
                Some(count) => {
                    b.add_inline_array(field, declared_type, count);
                }
                None => {
                    b.add_blob(field, needed_len);
                }
            }
            let new_layout = b.build();
            reschema_locked(&mut inner, registry.pool(), new_layout);
        }
        let fh = inner.layout.field(field).unwrap().clone();
        let len = fh.length.min(raw_bytes.len());
        inner.buffer[fh.offset..fh.offset + len].copy_from_slice(&raw_bytes[..len]);
        drop(inner);
        event::publish(&registry, self.id, field, EventKind::Write, Some(declared_type), None, false);
        Ok(())
    }

    pub fn read_blob(&self, field: &str) -> Result<Vec<u8>> {
        let inner = self.inner.lock();
        if inner.disposed {
            return Err(Error::ObjectDisposed);
        }
        let fh = inner
            .layout
            .field(field)
            .ok_or_else(|| Error::invalid_argument(format!("no such field '{field}'")))?;
        Ok(inner.buffer[fh.offset..fh.offset + fh.length].to_vec())
    }

    // --- subscriptions -------------------------------------------------

    pub fn subscribe_field(
        &self,
        field: &str,
        handler: impl FnMut(&event::Event) + Send + 'static,
    ) -> Result<SubscriptionHandle> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(Error::ObjectDisposed);
        }
        if !inner.layout.has_field(field) {
            return Err(Error::invalid_argument(format!(
                "field '{field}' does not exist; subscribe requires an existing field"
            )));
        }
        Ok(inner.subs.add_field(field, Box::new(handler)))
    }

    pub fn subscribe_any(
        &self,
        handler: impl FnMut(&event::Event) + Send + 'static,
    ) -> Result<SubscriptionHandle> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(Error::ObjectDisposed);
        }
        Ok(inner.subs.add_any(Box::new(handler)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutBuilder;
    use std::sync::atomic::AtomicU32;

    fn new_registry_and_root() -> (Arc<Registry>, Arc<Container>) {
        let registry = Registry::new();
        let layout = LayoutBuilder::new().add_scalar("hp", ElementType::I32).build();
        let container = registry.create(layout);
        (registry, container)
    }

    #[test]
    fn test_read_write_roundtrip() {
        let (_r, c) = new_registry_and_root();
        c.write("hp", 42i32, false).unwrap();
        assert_eq!(c.read::<i32>("hp").unwrap(), 42);
    }

    #[test]
    fn test_write_without_reschema_on_type_mismatch_fails_and_does_not_mutate() {
        let (_r, c) = new_registry_and_root();
        c.write("hp", 7i32, false).unwrap();
        let err = c.write("hp", 1.5f64, false);
        assert!(err.is_err());
        assert_eq!(c.read::<i32>("hp").unwrap(), 7);
    }

    #[test]
    fn test_same_size_reassignment_does_not_reschema_buffer_identity() {
        let (_r, c) = new_registry_and_root();
        c.write("hp", 1i32, false).unwrap();
        c.write("hp", 2.5f32, true).unwrap();
        assert_eq!(c.read::<f32>("hp").unwrap(), 2.5f32);
    }

    #[test]
    fn test_reschema_preserves_id_and_other_fields() {
        let (_r, c) = new_registry_and_root();
        let id_before = c.id();
        c.write("mana", 10i64, true).unwrap();
        assert_eq!(c.id(), id_before);
        assert_eq!(c.read::<i32>("hp").unwrap(), 0);
        assert_eq!(c.read::<i64>("mana").unwrap(), 10);
    }

    #[test]
    fn test_delete_removes_field() {
        let (_r, c) = new_registry_and_root();
        c.write("mana", 5i32, true).unwrap();
        let removed = c.delete(&["mana"]).unwrap();
        assert_eq!(removed, 1);
        assert!(!c.has_field("mana"));
        assert!(c.has_field("hp"));
    }

    #[test]
    fn test_subscribe_field_requires_existing_field() {
        let (_r, c) = new_registry_and_root();
        assert!(c.subscribe_field("ghost", |_e| {}).is_err());
        assert!(c.subscribe_field("hp", |_e| {}).is_ok());
    }

    #[test]
    fn test_write_fires_field_subscription() {
        let (_r, c) = new_registry_and_root();
        let count = Arc::new(AtomicU32::new(0));
        let count2 = count.clone();
        c.subscribe_field("hp", move |_e| {
            count2.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
        c.write("hp", 5i32, false).unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_get_object_allocates_and_reuses() {
        let (_r, c) = new_registry_and_root();
        let child1 = c.get_object("owner", true, None).unwrap();
        let child2 = c.get_object("owner", false, None).unwrap();
        assert_eq!(child1.id(), child2.id());
    }

    #[test]
    fn test_array_out_of_range_write_fails_without_mutation() {
        let (_r, c) = new_registry_and_root();
        c.write_array("speeds", &[1.0f32, 2.0, 3.0], true).unwrap();
        assert!(!c.try_write_array_elem("speeds", 10, 9.0f32));
        assert_eq!(c.read_array::<f32>("speeds").unwrap(), vec![1.0, 2.0, 3.0]);
    }
}
