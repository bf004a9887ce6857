//! Field headers: the per-field metadata recorded inside a [`super::Layout`].

use std::sync::Arc;

use crate::types::ElementType;

/// Flags recorded on a [`FieldHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldFlags {
    /// The field holds a single 8-byte reference cell.
    pub is_reference: bool,
    /// The field holds a contiguous run of reference cells.
    pub is_reference_array: bool,
    /// The field holds a contiguous run of scalar elements (a value array
    /// or the distinguished array-container payload).
    pub is_inline_array: bool,
}

impl FieldFlags {
    pub const SCALAR: FieldFlags = FieldFlags {
        is_reference: false,
        is_reference_array: false,
        is_inline_array: false,
    };

    pub const REFERENCE: FieldFlags = FieldFlags {
        is_reference: true,
        is_reference_array: false,
        is_inline_array: false,
    };

    pub const REFERENCE_ARRAY: FieldFlags = FieldFlags {
        is_reference: false,
        is_reference_array: true,
        is_inline_array: false,
    };

    pub const INLINE_ARRAY: FieldFlags = FieldFlags {
        is_reference: false,
        is_reference_array: false,
        is_inline_array: true,
    };
}

/// Describes one named field within a [`super::Layout`].
///
/// Offsets are relative to the start of the container's payload buffer.
/// Invariant (I3): across a `Layout`, offsets are non-overlapping,
/// monotonically increasing in whatever order the layout iterates them,
/// and respect `element_type.align()` (capped at 8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHeader {
    pub name: Arc<str>,
    pub element_type: ElementType,
    pub offset: usize,
    pub length: usize,
    pub flags: FieldFlags,
    /// Number of elements, for inline-array and reference-array fields.
    /// `1` for plain scalars and single references.
    pub array_len: usize,
}

impl FieldHeader {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}
