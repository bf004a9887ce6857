//! Fluent Query DSL: a chainable builder over [`ObjectView`] for the
//! common "walk down, then read/write/subscribe a leaf" pattern. A thin
//! convenience layer over [`super::get_object_by_path`] — everything it
//! does is also reachable through the plain path functions.
//!
//! Beyond plain navigation, the chain offers a typed expectation/ensure/
//! make sub-DSL (`expect()`, `ensure(..).is()`, `make()`) that treats the
//! most recently added segment as a candidate *field* on its parent
//! rather than a nested object to walk into. A failed expectation parks
//! the query in a failed state: further shape checks are skipped and any
//! terminal call returns `Error::InvalidState` until a fresh `Query` is
//! started.

use crate::error::{Error, Result};
use crate::event::{Event, SubscriptionHandle};
use crate::layout::{Layout, LayoutRole, ARRAY_FIELD_NAME};
use crate::types::{Char16, ElementType, Scalar};
use crate::view::{ArrayView, ObjectView};

use super::PathSegment;

/// A location being built up one segment at a time. Resolution is lazy:
/// nothing is touched until a terminal call (`read`, `write`, `exist`,
/// `object`, `persist`, `subscribe_field`/`subscribe_any`).
#[derive(Clone)]
pub struct Query {
    root: ObjectView,
    segments: Vec<PathSegment>,
    allocate: bool,
    failed: Option<String>,
}

impl Query {
    pub fn new(root: ObjectView) -> Self {
        Query { root, segments: Vec::new(), allocate: false, failed: None }
    }

    /// Step into a nested object field without creating it.
    pub fn location(mut self, field: &str) -> Self {
        self.segments.push(PathSegment { name: field.to_string(), index: None });
        self
    }

    /// Step into a nested object field, creating an empty object if
    /// absent. Once set, every subsequent step in the chain allocates.
    pub fn ensure(mut self, field: &str) -> Self {
        self.allocate = true;
        self.segments.push(PathSegment { name: field.to_string(), index: None });
        self
    }

    /// Narrow the most recently added location to one element of a
    /// reference array: `.location("children").index(2)` == `children[2]`.
    pub fn index(mut self, i: usize) -> Self {
        if let Some(last) = self.segments.last_mut() {
            last.index = Some(i);
        }
        self
    }

    /// Drop the last step, returning to the parent location.
    pub fn previous(mut self) -> Self {
        self.segments.pop();
        self
    }

    fn resolve(&self) -> Result<ObjectView> {
        let mut cur = self.root.clone();
        for seg in &self.segments {
            cur = match seg.index {
                None => cur.get_object(&seg.name, self.allocate)?,
                Some(i) => cur.object_at(&seg.name, i)?,
            };
        }
        Ok(cur)
    }

    /// Resolve every segment but the last as nested objects, returning the
    /// parent view plus the pending leaf segment. Used by the shape DSL
    /// (`expect().scalar/string/array`, `ensure(..).is()`, `make()`),
    /// which interpret the leaf's name as a field on `parent` instead of
    /// recursing into it.
    fn parent_and_leaf(&self) -> Result<(ObjectView, PathSegment)> {
        let (leaf, init) = self
            .segments
            .split_last()
            .ok_or_else(|| Error::invalid_argument("query has no location to check"))?;
        let mut cur = self.root.clone();
        for seg in init {
            cur = match seg.index {
                None => cur.get_object(&seg.name, self.allocate)?,
                Some(i) => cur.object_at(&seg.name, i)?,
            };
        }
        Ok((cur, leaf.clone()))
    }

    fn current_name(&self) -> &str {
        self.segments.last().map(|s| s.name.as_str()).unwrap_or("<root>")
    }

    fn fail(&mut self, err: Error) {
        if self.failed.is_none() {
            self.failed = Some(err.to_string());
        }
    }

    fn check_not_failed(&self) -> Result<()> {
        match &self.failed {
            Some(reason) => Err(Error::invalid_state(format!(
                "query terminal call after expectation failure: {reason}"
            ))),
            None => Ok(()),
        }
    }

    /// Whether an earlier `expect()`/`make()` check already failed this
    /// chain.
    pub fn has_failed(&self) -> bool {
        self.failed.is_some()
    }

    /// Begin an expectation check against the current location: enforce
    /// a shape, then keep chaining. On failure the query enters a failed
    /// state and every later `expect()` call is a no-op until a fresh
    /// `Query` is started.
    pub fn expect(self) -> Expect {
        Expect { query: self }
    }

    /// Begin the create-or-override shape DSL for the most recently
    /// added segment, typically right after `ensure(field)`.
    pub fn is(self) -> EnsureIs {
        EnsureIs { query: self }
    }

    /// Begin the (re)create-fresh shape DSL for the current location.
    /// Throws immediately if the query already failed.
    pub fn make(self) -> Make {
        Make { query: self }
    }

    /// Whether the current location resolves to a live object.
    pub fn exist(&self) -> Existence {
        Existence { outcome: self.parent_and_leaf() }
    }

    /// Resolve and return the current location as a view.
    pub fn object(&self) -> Result<ObjectView> {
        self.check_not_failed()?;
        self.resolve()
    }

    /// Force materialization of every missing intermediate object along
    /// the chain (as `ensure` would), then return the resolved view.
    pub fn persist(mut self) -> Result<ObjectView> {
        self.check_not_failed()?;
        self.allocate = true;
        self.resolve()
    }

    pub fn read<T: Scalar>(&self, field: &str) -> Result<T> {
        self.check_not_failed()?;
        self.resolve()?.read(field)
    }

    pub fn try_read<T: Scalar>(&self, field: &str) -> Option<T> {
        if self.failed.is_some() {
            return None;
        }
        self.resolve().ok()?.try_read(field)
    }

    pub fn write<T: Scalar>(&self, field: &str, value: T, allow_reschema: bool) -> Result<()> {
        self.check_not_failed()?;
        self.resolve()?.write(field, value, allow_reschema)
    }

    /// Install a string (a Char16-element array container) at `field` on
    /// the current location.
    pub fn write_string(&self, field: &str, value: &str, allow_reschema: bool) -> Result<()> {
        self.check_not_failed()?;
        let object = self.resolve()?;
        let units: Vec<Char16> = value.encode_utf16().map(Char16).collect();
        let array = object.get_array(field, ElementType::Char16, allow_reschema)?;
        array.write(&units, allow_reschema)
    }

    pub fn subscribe_field(
        &self,
        field: &str,
        handler: impl FnMut(&Event) + Send + 'static,
    ) -> Result<SubscriptionHandle> {
        self.check_not_failed()?;
        self.resolve()?.subscribe_field(field, handler)
    }

    pub fn subscribe_any(&self, handler: impl FnMut(&Event) + Send + 'static) -> Result<SubscriptionHandle> {
        self.check_not_failed()?;
        self.resolve()?.subscribe_any(handler)
    }
}

/// Result of a [`Query::exist`] check against the pending leaf field.
pub struct Existence {
    outcome: Result<(ObjectView, PathSegment)>,
}

impl Existence {
    /// The leaf field exists on its parent, regardless of shape.
    pub fn has(&self) -> bool {
        match &self.outcome {
            Ok((parent, leaf)) => parent.has_field(&leaf.name).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// The leaf field exists and is stored as exactly `T` (no implicit
    /// widening, unlike a plain `read::<T>`).
    pub fn as_exact<T: Scalar>(&self) -> bool {
        match &self.outcome {
            Ok((parent, leaf)) => match parent.resolve() {
                Ok(container) => container
                    .layout()
                    .field(&leaf.name)
                    .map(|fh| fh.element_type == T::ELEMENT_TYPE)
                    .unwrap_or(false),
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    /// The leaf field exists as an inline array of `T`; returns its
    /// current contents when it does.
    pub fn array_of<T: Scalar>(&self) -> Option<Vec<T>> {
        match &self.outcome {
            Ok((parent, leaf)) => parent.read_array::<T>(&leaf.name).ok(),
            Err(_) => None,
        }
    }
}

/// Shape-check builder returned by [`Query::expect`].
pub struct Expect {
    query: Query,
}

impl Expect {
    fn settle(mut self, outcome: Result<()>) -> Query {
        if let Err(e) = outcome {
            self.query.fail(e);
        }
        self.query
    }

    fn check_object(&self) -> Result<()> {
        let view = self.query.resolve()?;
        let container = view.resolve()?;
        if container.layout().role() != LayoutRole::Object {
            return Err(Error::type_mismatch(self.query.current_name(), "location is not an object"));
        }
        Ok(())
    }

    fn check_object_array(&self) -> Result<()> {
        let view = self.query.resolve()?;
        let container = view.resolve()?;
        let layout = container.layout();
        let fh = layout
            .field(ARRAY_FIELD_NAME)
            .filter(|_| layout.role() == LayoutRole::Array)
            .ok_or_else(|| Error::type_mismatch(self.query.current_name(), "location is not an array"))?;
        if !fh.flags.is_reference_array {
            return Err(Error::type_mismatch(self.query.current_name(), "array does not hold object references"));
        }
        Ok(())
    }

    fn check_scalar<T: Scalar>(&self) -> Result<()> {
        let (parent, leaf) = self.query.parent_and_leaf()?;
        if leaf.index.is_some() {
            return Err(Error::invalid_argument("scalar expectation cannot target an indexed segment"));
        }
        parent.read::<T>(&leaf.name)?;
        Ok(())
    }

    fn check_string(&self) -> Result<()> {
        let (parent, leaf) = self.query.parent_and_leaf()?;
        if leaf.index.is_some() {
            return Err(Error::invalid_argument("string expectation cannot target an indexed segment"));
        }
        parent.get_array(&leaf.name, ElementType::Char16, false)?;
        Ok(())
    }

    fn check_array<T: Scalar>(&self) -> Result<()> {
        let (parent, leaf) = self.query.parent_and_leaf()?;
        if leaf.index.is_some() {
            return Err(Error::invalid_argument("array expectation cannot target an indexed segment"));
        }
        parent.get_array(&leaf.name, T::ELEMENT_TYPE, false)?;
        Ok(())
    }

    fn check_object_element(&self) -> Result<()> {
        let (parent, leaf) = self.query.parent_and_leaf()?;
        let index = leaf
            .index
            .ok_or_else(|| Error::invalid_argument("object_element expectation requires an indexed segment"))?;
        parent.object_at(&leaf.name, index)?;
        Ok(())
    }

    /// The full location (every segment walked as a nested object
    /// reference, including the last) resolves to an object-role
    /// container.
    pub fn object(self) -> Query {
        if self.query.failed.is_some() {
            return self.query;
        }
        let outcome = self.check_object();
        self.settle(outcome)
    }

    /// The full location resolves to an array-role container holding
    /// object references.
    pub fn object_array(self) -> Query {
        if self.query.failed.is_some() {
            return self.query;
        }
        let outcome = self.check_object_array();
        self.settle(outcome)
    }

    /// The pending leaf field (see [`Query::parent_and_leaf`]) exists on
    /// its parent as a scalar decodable as `T`.
    pub fn scalar<T: Scalar>(self) -> Query {
        if self.query.failed.is_some() {
            return self.query;
        }
        let outcome = self.check_scalar::<T>();
        self.settle(outcome)
    }

    /// The pending leaf field exists on its parent as a Char16 array
    /// (string) container.
    pub fn string(self) -> Query {
        if self.query.failed.is_some() {
            return self.query;
        }
        let outcome = self.check_string();
        self.settle(outcome)
    }

    /// The pending leaf field exists on its parent as an inline array of
    /// `T`.
    pub fn array<T: Scalar>(self) -> Query {
        if self.query.failed.is_some() {
            return self.query;
        }
        let outcome = self.check_array::<T>();
        self.settle(outcome)
    }

    /// The pending leaf field, indexed via `.index(i)`, resolves to a
    /// live object element of a reference array.
    pub fn object_element(self) -> Query {
        if self.query.failed.is_some() {
            return self.query;
        }
        let outcome = self.check_object_element();
        self.settle(outcome)
    }
}

/// Create-or-override shape builder returned by [`Query::is`], acting on
/// the pending leaf field of the chain it was built from (see
/// [`Query::parent_and_leaf`]). Unlike `expect`, a shape mismatch is
/// repaired rather than treated as failure; an already-matching field is
/// left untouched.
pub struct EnsureIs {
    query: Query,
}

impl EnsureIs {
    fn settle(mut self, outcome: Result<()>) -> Query {
        if let Err(e) = outcome {
            self.query.fail(e);
        }
        self.query
    }

    fn apply_scalar<T: Scalar>(&self, default: T) -> Result<()> {
        let (parent, leaf) = self.query.parent_and_leaf()?;
        if leaf.index.is_some() {
            return Err(Error::invalid_argument("ensure().is().scalar cannot target an indexed segment"));
        }
        if parent.try_read::<T>(&leaf.name).is_none() {
            parent.write(&leaf.name, default, true)?;
        }
        Ok(())
    }

    fn apply_string(&self, value: &str) -> Result<()> {
        let (parent, leaf) = self.query.parent_and_leaf()?;
        if leaf.index.is_some() {
            return Err(Error::invalid_argument("ensure().is().string cannot target an indexed segment"));
        }
        let container = parent.resolve()?;
        let array = container.get_array(&leaf.name, ElementType::Char16, true, true)?;
        if array.len()? == 0 && !value.is_empty() {
            let units: Vec<Char16> = value.encode_utf16().map(Char16).collect();
            array.write(&units, true)?;
        }
        Ok(())
    }

    fn apply_array<T: Scalar + Default>(&self, min_length: usize) -> Result<()> {
        let (parent, leaf) = self.query.parent_and_leaf()?;
        if leaf.index.is_some() {
            return Err(Error::invalid_argument("ensure().is().array cannot target an indexed segment"));
        }
        let container = parent.resolve()?;
        let array = container.get_array(&leaf.name, T::ELEMENT_TYPE, true, true)?;
        let mut values: Vec<T> = array.read().unwrap_or_default();
        if values.len() < min_length {
            values.resize(min_length, T::default());
            array.write(&values, true)?;
        }
        Ok(())
    }

    /// Ensure the leaf field holds a scalar, writing `default` only if it
    /// is missing or not currently readable as `T`.
    pub fn scalar<T: Scalar>(self, default: T) -> Query {
        if self.query.failed.is_some() {
            return self.query;
        }
        let outcome = self.apply_scalar(default);
        self.settle(outcome)
    }

    /// Ensure the leaf field holds a string, writing `value` only if the
    /// field is currently empty or absent; overrides a mismatched shape
    /// (e.g. a scalar field reused as a string).
    pub fn string(self, value: &str) -> Query {
        if self.query.failed.is_some() {
            return self.query;
        }
        let outcome = self.apply_string(value);
        self.settle(outcome)
    }

    /// Ensure the leaf field holds an inline array of `T` with at least
    /// `min_length` elements, padding with `T::default()` if it is
    /// shorter; overrides a mismatched element type.
    pub fn array<T: Scalar + Default>(self, min_length: usize) -> Query {
        if self.query.failed.is_some() {
            return self.query;
        }
        let outcome = self.apply_array::<T>(min_length);
        self.settle(outcome)
    }
}

/// (Re)create-fresh shape builder returned by [`Query::make`]. Unlike
/// `ensure`/`is`, every method replaces whatever currently occupies the
/// leaf field.
pub struct Make {
    query: Query,
}

impl Make {
    /// (Re)create an empty object at the current location, replacing any
    /// existing content.
    pub fn object(self) -> Result<ObjectView> {
        self.query.check_not_failed()?;
        let (parent, leaf) = self.query.parent_and_leaf()?;
        if leaf.index.is_some() {
            return Err(Error::invalid_argument("make().object() cannot target an indexed segment"));
        }
        if parent.has_field(&leaf.name)? {
            parent.delete(&[leaf.name.as_str()])?;
        }
        parent.get_object_with_layout(&leaf.name, Layout::empty_object())
    }

    /// (Re)create a reference array of `min_length` object-element slots
    /// at the current location.
    pub fn object_array(self, min_length: usize) -> Result<ArrayView> {
        self.query.check_not_failed()?;
        let (parent, leaf) = self.query.parent_and_leaf()?;
        if leaf.index.is_some() {
            return Err(Error::invalid_argument("make().object_array() cannot target an indexed segment"));
        }
        let container = parent.resolve()?;
        let array = container.get_array(&leaf.name, ElementType::Ref, true, true)?;
        array.object.resolve()?.resize_reference_array(ARRAY_FIELD_NAME, min_length)?;
        Ok(array)
    }

    /// (Re)create an inline value array of at least `min_length` elements
    /// of type `T`. `allow_override` permits replacing a field that
    /// already exists with a different element type; without it a shape
    /// mismatch is an error.
    pub fn array<T: Scalar + Default>(self, min_length: usize, allow_override: bool) -> Result<ArrayView> {
        self.query.check_not_failed()?;
        let (parent, leaf) = self.query.parent_and_leaf()?;
        if leaf.index.is_some() {
            return Err(Error::invalid_argument("make().array() cannot target an indexed segment"));
        }
        let container = parent.resolve()?;
        let array = container.get_array(&leaf.name, T::ELEMENT_TYPE, true, allow_override)?;
        let mut values: Vec<T> = array.read().unwrap_or_default();
        if values.len() < min_length {
            values.resize(min_length, T::default());
            array.write(&values, true)?;
        }
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[test]
    fn test_ensure_then_write_then_read() {
        let storage = Storage::new();
        let root = storage.root();
        Query::new(root.clone())
            .ensure("stats")
            .write("hp", 10i32, true)
            .unwrap();
        assert_eq!(
            Query::new(root.clone()).location("stats").read::<i32>("hp").unwrap(),
            10
        );
    }

    #[test]
    fn test_exist_false_for_missing_location() {
        let storage = Storage::new();
        let root = storage.root();
        assert!(!Query::new(root).location("nope").exist().has());
    }

    #[test]
    fn test_previous_steps_back_up() {
        let storage = Storage::new();
        let root = storage.root();
        Query::new(root.clone()).ensure("a").ensure("b").object().unwrap();

        let a_direct = Query::new(root.clone()).location("a").object().unwrap();
        let a_via_back = Query::new(root).location("a").location("b").previous().object().unwrap();
        assert_eq!(a_direct.id(), a_via_back.id());
    }

    #[test]
    fn test_expect_scalar_passes_then_fails_on_type_mismatch() {
        let storage = Storage::new();
        let root = storage.root();
        root.write("hp", 10i32, true).unwrap();

        let ok = Query::new(root.clone()).location("hp").expect().scalar::<i32>();
        assert!(!ok.has_failed());

        let bad = Query::new(root).location("missing").expect().scalar::<i32>();
        assert!(bad.has_failed());
    }

    #[test]
    fn test_expect_short_circuits_further_checks() {
        let storage = Storage::new();
        let root = storage.root();
        let failed = Query::new(root)
            .location("missing")
            .expect()
            .scalar::<i32>()
            .expect()
            .object();
        assert!(failed.has_failed());
        assert!(matches!(failed.object(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_ensure_is_scalar_creates_default_once() {
        let storage = Storage::new();
        let root = storage.root();
        Query::new(root.clone()).location("hp").is().scalar(5i32);
        assert_eq!(root.read::<i32>("hp").unwrap(), 5);

        // A second ensure does not clobber the existing value.
        Query::new(root.clone()).location("hp").is().scalar(999i32);
        assert_eq!(root.read::<i32>("hp").unwrap(), 5);
    }

    #[test]
    fn test_ensure_is_string_writes_once() {
        let storage = Storage::new();
        let root = storage.root();
        Query::new(root.clone()).location("name").is().string("Rin");
        let array = root.get_array("name", ElementType::Char16, false).unwrap();
        let units: Vec<Char16> = array.read().unwrap();
        let s = String::from_utf16(&units.into_iter().map(|c| c.0).collect::<Vec<u16>>()).unwrap();
        assert_eq!(s, "Rin");
    }

    #[test]
    fn test_make_object_replaces_existing() {
        let storage = Storage::new();
        let root = storage.root();
        let first = Query::new(root.clone()).location("child").make().object().unwrap();
        let second = Query::new(root).location("child").make().object().unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_make_array_grows_and_pads() {
        let storage = Storage::new();
        let root = storage.root();
        let array = Query::new(root).location("speeds").make().array::<f32>(3, false).unwrap();
        assert_eq!(array.read::<f32>().unwrap(), vec![0.0f32, 0.0, 0.0]);
    }
}
