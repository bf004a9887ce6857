//! Layout: the immutable, hashable field schema of a container.
//!
//! A [`Layout`] is built once via [`LayoutBuilder`] and then shared
//! (`Arc<Layout>`) by every container that uses it; a reschema produces a
//! *new* `Layout` rather than mutating one in place, so existing `Arc`
//! clones (e.g. held by an in-flight event) keep seeing the old shape.

mod field;

pub use field::{FieldFlags, FieldHeader};

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::ElementType;

/// The field name reserved for an array container's single payload field.
///
/// An "array container" (including strings, which are array containers of
/// [`ElementType::Char16`]) is a `Layout` with exactly one field, named
/// this, carrying `is_inline_array` or `is_reference_array`.
pub const ARRAY_FIELD_NAME: &str = "$value";

/// The structural role a [`Layout`] plays, inferred from its field set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutRole {
    /// Named fields, the common case.
    Object,
    /// A single distinguished payload field of element type `Char16`.
    String,
    /// A single distinguished inline-array or reference-array payload field.
    Array,
}

/// An immutable, interned-by-value field schema.
///
/// Two layouts are equal iff their canonicalized field sets (sorted by
/// name) and offset plans are identical.
#[derive(Debug, Clone)]
pub struct Layout {
    fields: Vec<FieldHeader>,
    stride: usize,
}

impl PartialEq for Layout {
    fn eq(&self, other: &Self) -> bool {
        self.stride == other.stride && self.canonical_fields() == other.canonical_fields()
    }
}
impl Eq for Layout {}

impl Layout {
    /// An empty object layout (no fields, zero stride) — the default shape
    /// used when the path API auto-materializes an intermediate object.
    pub fn empty_object() -> Arc<Layout> {
        Arc::new(Layout {
            fields: Vec::new(),
            stride: 0,
        })
    }

    pub fn fields(&self) -> &[FieldHeader] {
        &self.fields
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn field(&self, name: &str) -> Option<&FieldHeader> {
        self.fields.iter().find(|f| f.name.as_ref() == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Structural role, inferred per the "distinguished array name" rule.
    pub fn role(&self) -> LayoutRole {
        if self.fields.len() == 1 && self.fields[0].name.as_ref() == ARRAY_FIELD_NAME {
            let f = &self.fields[0];
            if f.element_type == ElementType::Char16 && f.flags.is_inline_array {
                return LayoutRole::String;
            }
            if f.flags.is_inline_array || f.flags.is_reference_array {
                return LayoutRole::Array;
            }
        }
        LayoutRole::Object
    }

    fn canonical_fields(&self) -> Vec<&FieldHeader> {
        let mut v: Vec<&FieldHeader> = self.fields.iter().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        v
    }

    /// Produce a new layout identical to `self` except that `field` is
    /// retyped in place (same offset, same length). Used for the
    /// same-size-reassignment write path where no buffer
    /// copy is required, only a relabeling of the stored type.
    pub fn with_retyped_field(&self, field: &str, new_type: ElementType) -> Result<Arc<Layout>> {
        let mut fields = self.fields.clone();
        let f = fields
            .iter_mut()
            .find(|f| f.name.as_ref() == field)
            .ok_or_else(|| Error::invalid_argument(format!("no such field '{field}'")))?;
        f.element_type = new_type;
        Ok(Arc::new(Layout {
            fields,
            stride: self.stride,
        }))
    }

    /// Builder entry point, starting from this layout's current fields
    /// (used by reschema: add/remove/widen/rename fields then rebuild).
    pub fn to_builder(&self) -> LayoutBuilder {
        let mut b = LayoutBuilder::new();
        for f in &self.fields {
            b.raw.push(RawField {
                name: f.name.to_string(),
                element_type: f.element_type,
                flags: f.flags,
                length: f.length,
                array_len: f.array_len,
            });
        }
        b
    }
}

impl fmt::Display for Layout {
    /// One line per field (`name@offset+length:type[array_len]`), for
    /// logging a before/after pair around a reschema.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Layout(stride={}", self.stride)?;
        for field in &self.fields {
            write!(
                f,
                ", {}@{}+{}:{:?}[{}]",
                field.name, field.offset, field.length, field.element_type, field.array_len
            )?;
        }
        write!(f, ")")
    }
}

#[derive(Clone)]
struct RawField {
    name: String,
    element_type: ElementType,
    flags: FieldFlags,
    length: usize,
    array_len: usize,
}

/// Builds a [`Layout`] by declaring fields, then computing offsets with
/// alignment padding in canonical (by-name) order.
#[derive(Default, Clone)]
pub struct LayoutBuilder {
    raw: Vec<RawField>,
}

impl LayoutBuilder {
    pub fn new() -> Self {
        LayoutBuilder { raw: Vec::new() }
    }

    pub fn add_scalar(&mut self, name: impl Into<String>, element_type: ElementType) -> &mut Self {
        self.push(name, element_type, FieldFlags::SCALAR, element_type.size(), 1)
    }

    pub fn add_inline_array(
        &mut self,
        name: impl Into<String>,
        element_type: ElementType,
        count: usize,
    ) -> &mut Self {
        self.push(
            name,
            element_type,
            FieldFlags::INLINE_ARRAY,
            element_type.size() * count,
            count,
        )
    }

    pub fn add_reference(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(name, ElementType::Ref, FieldFlags::REFERENCE, 8, 1)
    }

    pub fn add_reference_array(&mut self, name: impl Into<String>, count: usize) -> &mut Self {
        self.push(
            name,
            ElementType::Ref,
            FieldFlags::REFERENCE_ARRAY,
            8 * count,
            count,
        )
    }

    pub fn add_blob(&mut self, name: impl Into<String>, length: usize) -> &mut Self {
        self.push(name, ElementType::Blob, FieldFlags::SCALAR, length, 1)
    }

    /// Remove a field by name, if present. Used by reschema when building
    /// the target layout for a `delete`.
    pub fn remove(&mut self, name: &str) -> &mut Self {
        self.raw.retain(|f| f.name != name);
        self
    }

    /// Rename a field in place, preserving its type/length/flags.
    pub fn rename(&mut self, old_name: &str, new_name: impl Into<String>) -> &mut Self {
        if let Some(f) = self.raw.iter_mut().find(|f| f.name == old_name) {
            f.name = new_name.into();
        }
        self
    }

    /// Widen (or retype) an existing field to at least `min_length` bytes
    /// of `element_type`, or add it fresh if absent. Used by
    /// `Container::write` when a write doesn't fit the current field.
    pub fn ensure_scalar_capacity(
        &mut self,
        name: &str,
        element_type: ElementType,
        min_length: usize,
    ) -> &mut Self {
        if let Some(f) = self.raw.iter_mut().find(|f| f.name == name) {
            f.element_type = element_type;
            f.length = f.length.max(min_length);
        } else {
            self.raw.push(RawField {
                name: name.to_string(),
                element_type,
                flags: FieldFlags::SCALAR,
                length: min_length,
                array_len: 1,
            });
        }
        self
    }

    fn push(
        &mut self,
        name: impl Into<String>,
        element_type: ElementType,
        flags: FieldFlags,
        length: usize,
        array_len: usize,
    ) -> &mut Self {
        self.raw.push(RawField {
            name: name.into(),
            element_type,
            flags,
            length,
            array_len,
        });
        self
    }

    /// Finalize the layout: sort fields canonically by name, then assign
    /// offsets with alignment padding (I3). `stride` ends exactly at the
    /// last field (no tail padding).
    pub fn build(&self) -> Arc<Layout> {
        let mut raw = self.raw.clone();
        raw.sort_by(|a, b| a.name.cmp(&b.name));

        let mut fields = Vec::with_capacity(raw.len());
        let mut cursor = 0usize;
        for r in raw {
            let align = r.element_type.align();
            if align > 0 {
                let rem = cursor % align;
                if rem != 0 {
                    cursor += align - rem;
                }
            }
            fields.push(FieldHeader {
                name: Arc::from(r.name.as_str()),
                element_type: r.element_type,
                offset: cursor,
                length: r.length,
                flags: r.flags,
                array_len: r.array_len,
            });
            cursor += r.length;
        }

        Arc::new(Layout {
            fields,
            stride: cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_monotonic_and_aligned() {
        let layout = LayoutBuilder::new()
            .add_scalar("flag", ElementType::Bool)
            .add_scalar("value", ElementType::I64)
            .add_scalar("small", ElementType::I16)
            .build();

        let mut last_end = 0;
        for f in layout.fields() {
            assert!(f.offset >= last_end);
            assert_eq!(f.offset % f.element_type.align(), 0);
            last_end = f.end();
        }
        assert_eq!(layout.stride(), last_end);
    }

    #[test]
    fn test_canonical_equality_ignores_declaration_order() {
        let a = LayoutBuilder::new()
            .add_scalar("a", ElementType::I32)
            .add_scalar("b", ElementType::I32)
            .build();
        let b = LayoutBuilder::new()
            .add_scalar("b", ElementType::I32)
            .add_scalar("a", ElementType::I32)
            .build();
        assert_eq!(a, b);
    }

    #[test]
    fn test_string_role() {
        let layout = LayoutBuilder::new()
            .add_inline_array(ARRAY_FIELD_NAME, ElementType::Char16, 4)
            .build();
        assert_eq!(layout.role(), LayoutRole::String);
    }

    #[test]
    fn test_array_role() {
        let layout = LayoutBuilder::new()
            .add_reference_array(ARRAY_FIELD_NAME, 3)
            .build();
        assert_eq!(layout.role(), LayoutRole::Array);
    }

    #[test]
    fn test_display_includes_stride_and_field_names() {
        let layout = LayoutBuilder::new()
            .add_scalar("hp", ElementType::I32)
            .add_inline_array("speeds", ElementType::F32, 4)
            .build();
        let rendered = layout.to_string();
        assert!(rendered.contains("hp"));
        assert!(rendered.contains("speeds"));
        assert!(rendered.contains(&format!("stride={}", layout.stride())));
    }

    #[test]
    fn test_remove_and_rebuild_preserves_siblings() {
        let layout = LayoutBuilder::new()
            .add_scalar("hp", ElementType::I32)
            .add_inline_array("speeds", ElementType::F32, 4)
            .build();

        let rebuilt = layout.to_builder().remove("speeds").build();
        assert!(rebuilt.has_field("hp"));
        assert!(!rebuilt.has_field("speeds"));
    }
}
