//! Views: copy-by-value, non-owning handles onto containers and their
//! fields.
//!
//! A view carries just enough to re-resolve through the registry on demand:
//! a [`ContainerId`], the generation the view was minted against, and
//! (for field/member views) a field name or index. Views are `Clone`,
//! cheap to pass around, and become inert — every operation returns
//! `Error::ObjectDisposed` — once the underlying container's generation
//! has moved on.

use std::sync::Arc;

use crate::common::ContainerId;
use crate::container::Container;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::types::{ElementType, Scalar};

/// A view onto an object-role (or array-role) container as a whole.
///
/// `id == ContainerId::NONE` represents the null view delivered with
/// Dispose events.
#[derive(Clone)]
pub struct ObjectView {
    pub(crate) id: ContainerId,
    pub(crate) generation: u64,
    pub(crate) registry: Arc<Registry>,
}

impl std::fmt::Debug for ObjectView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectView")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .finish()
    }
}

impl ObjectView {
    pub fn new(id: ContainerId, generation: u64, registry: Arc<Registry>) -> Self {
        ObjectView { id, generation, registry }
    }

    pub fn null(registry: Arc<Registry>) -> Self {
        ObjectView { id: ContainerId::NONE, generation: 0, registry }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn is_null(&self) -> bool {
        self.id.is_none()
    }

    /// Re-resolve to the live container, checking the view's generation
    /// still matches (I4: a stale generation means the container was
    /// disposed, or reschemaed in a way the view no longer tracks).
    pub fn resolve(&self) -> Result<Arc<Container>> {
        if self.id.is_none() {
            return Err(Error::ObjectDisposed);
        }
        let container = self.registry.get(self.id).ok_or(Error::ObjectDisposed)?;
        if container.is_disposed() || container.generation() != self.generation {
            return Err(Error::ObjectDisposed);
        }
        Ok(container)
    }

    pub fn has_field(&self, name: &str) -> Result<bool> {
        Ok(self.resolve()?.has_field(name))
    }

    pub fn read<T: Scalar>(&self, field: &str) -> Result<T> {
        self.resolve()?.read(field)
    }

    pub fn try_read<T: Scalar>(&self, field: &str) -> Option<T> {
        self.resolve().ok()?.try_read(field)
    }

    pub fn write<T: Scalar>(&self, field: &str, value: T, allow_reschema: bool) -> Result<()> {
        self.resolve()?.write(field, value, allow_reschema)
    }

    pub fn read_array<T: Scalar>(&self, field: &str) -> Result<Vec<T>> {
        self.resolve()?.read_array(field)
    }

    pub fn write_array<T: Scalar>(&self, field: &str, values: &[T], allow_reschema: bool) -> Result<()> {
        self.resolve()?.write_array(field, values, allow_reschema)
    }

    pub fn get_object(&self, field: &str, allocate_if_missing: bool) -> Result<ObjectView> {
        self.resolve()?.get_object(field, allocate_if_missing, None)
    }

    pub fn get_object_with_layout(
        &self,
        field: &str,
        layout: Arc<crate::layout::Layout>,
    ) -> Result<ObjectView> {
        self.resolve()?.get_object(field, true, Some(layout))
    }

    pub fn subscribe_field(
        &self,
        field: &str,
        handler: impl FnMut(&crate::event::Event) + Send + 'static,
    ) -> Result<crate::event::SubscriptionHandle> {
        self.resolve()?.subscribe_field(field, handler)
    }

    pub fn subscribe_any(
        &self,
        handler: impl FnMut(&crate::event::Event) + Send + 'static,
    ) -> Result<crate::event::SubscriptionHandle> {
        self.resolve()?.subscribe_any(handler)
    }

    pub fn get_array(
        &self,
        field: &str,
        element_type: ElementType,
        create_if_missing: bool,
    ) -> Result<ArrayView> {
        self.resolve()?
            .get_array(field, element_type, create_if_missing, false)
    }

    pub fn object_at(&self, field: &str, index: usize) -> Result<ObjectView> {
        self.resolve()?.object_at(field, index)
    }

    pub fn delete(&self, field_names: &[&str]) -> Result<usize> {
        self.resolve()?.delete(field_names)
    }

    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.resolve()?.rename(old_name, new_name)
    }
}

impl PartialEq for ObjectView {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.generation == other.generation
    }
}
impl Eq for ObjectView {}

/// A view onto a single field slot of an object container: might hold a
/// scalar, an inline array, or a reference, depending on the container's
/// current layout. Callers narrow it via `as_scalar`/`as_array`/`as_object`
/// once they know the shape (mirrors the path-query DSL's `expect`).
#[derive(Clone)]
pub struct FieldView {
    pub(crate) object: ObjectView,
    pub(crate) field: Arc<str>,
}

impl FieldView {
    pub fn new(object: ObjectView, field: impl Into<Arc<str>>) -> Self {
        FieldView { object, field: field.into() }
    }

    pub fn field_name(&self) -> &str {
        &self.field
    }

    pub fn exists(&self) -> Result<bool> {
        self.object.has_field(&self.field)
    }

    pub fn as_scalar(&self) -> ScalarView {
        ScalarView { object: self.object.clone(), field: self.field.clone() }
    }

    pub fn as_array(&self, element_type: ElementType, create_if_missing: bool) -> Result<ArrayView> {
        self.object.get_array(&self.field, element_type, create_if_missing)
    }

    pub fn as_object(&self, allocate_if_missing: bool) -> Result<ObjectView> {
        self.object.get_object(&self.field, allocate_if_missing)
    }
}

/// A view onto a single scalar field, typed at the call site via
/// `read::<T>`/`write::<T>`.
#[derive(Clone)]
pub struct ScalarView {
    pub(crate) object: ObjectView,
    pub(crate) field: Arc<str>,
}

impl ScalarView {
    pub fn read<T: Scalar>(&self) -> Result<T> {
        self.object.read(&self.field)
    }

    pub fn try_read<T: Scalar>(&self) -> Option<T> {
        self.object.try_read(&self.field)
    }

    pub fn write<T: Scalar>(&self, value: T, allow_reschema: bool) -> Result<()> {
        self.object.write(&self.field, value, allow_reschema)
    }
}

/// A view onto an array's payload: either an inline array field on `object`
/// named `field`, or (when `object` is itself an array-role container) the
/// distinguished `$value` field — both are represented identically here.
#[derive(Clone)]
pub struct ArrayView {
    pub(crate) object: ObjectView,
    pub(crate) field: Arc<str>,
}

impl ArrayView {
    pub fn new(object: ObjectView, field: impl Into<Arc<str>>) -> Self {
        ArrayView { object, field: field.into() }
    }

    pub fn len(&self) -> Result<usize> {
        let container = self.object.resolve()?;
        let layout = container.layout();
        let fh = layout
            .field(&self.field)
            .ok_or_else(|| Error::invalid_state("array field missing"))?;
        Ok(fh.array_len)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn element_type(&self) -> Result<ElementType> {
        let container = self.object.resolve()?;
        let layout = container.layout();
        let fh = layout
            .field(&self.field)
            .ok_or_else(|| Error::invalid_state("array field missing"))?;
        Ok(fh.element_type)
    }

    pub fn read<T: Scalar>(&self) -> Result<Vec<T>> {
        self.object.resolve()?.read_array(&self.field)
    }

    pub fn write<T: Scalar>(&self, values: &[T], allow_reschema: bool) -> Result<()> {
        self.object.resolve()?.write_array(&self.field, values, allow_reschema)
    }

    pub fn member(&self, index: usize) -> MemberView {
        MemberView { array: self.clone(), index }
    }
}

/// A view onto a single element of an array by index.
#[derive(Clone)]
pub struct MemberView {
    pub(crate) array: ArrayView,
    pub(crate) index: usize,
}

impl MemberView {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn try_write<T: Scalar>(&self, value: T) -> bool {
        match self.array.object.resolve() {
            Ok(container) => container.try_write_array_elem(&self.array.field, self.index, value),
            Err(_) => false,
        }
    }

    pub fn try_read<T: Scalar>(&self) -> Option<T> {
        let values: Vec<T> = self.array.read().ok()?;
        values.get(self.index).copied()
    }
}
