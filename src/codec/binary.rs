//! Binary snapshot codec: a length-prefixed, depth-first preorder
//! encoding of a tree.
//!
//! Each container writes its field count, then per field a small header
//! (name, element type, flags, element count) followed by that field's
//! payload: raw bytes for scalar/inline-array/blob fields, or a presence
//! byte plus a recursively-encoded child record for reference and
//! reference-array fields. Container ids are never written — decode
//! assigns fresh ones from a new [`Registry`], hand-rolling fixed-field
//! encoding with `to_le_bytes`/`from_le_bytes` rather than reaching for a
//! serialization framework.
//!
//! Subscriptions never persist across a snapshot round-trip.

use std::sync::Arc;

use crate::container::Container;
use crate::error::{Error, Result};
use crate::layout::{FieldFlags, FieldHeader, Layout};
use crate::registry::Registry;
use crate::storage::Storage;
use crate::types::{ElementType, Scalar};
use crate::view::ObjectView;

const MAGIC: &[u8; 4] = b"SCNG";
const VERSION: u32 = 1;

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Writer { buf: Vec::new() }
    }

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn write_str(&mut self, s: &str) {
        self.write_u16(s.len() as u16);
        self.write_bytes(s.as_bytes());
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(Error::Decode("unexpected end of snapshot".to_string()));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        Ok(self.take(n)?.to_vec())
    }

    fn read_str(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::Decode(format!("non-utf8 field name: {e}")))
    }
}

fn element_type_to_u8(t: ElementType) -> u8 {
    use ElementType::*;
    match t {
        Bool => 0,
        I8 => 1,
        U8 => 2,
        I16 => 3,
        U16 => 4,
        Char16 => 5,
        I32 => 6,
        U32 => 7,
        F32 => 8,
        I64 => 9,
        U64 => 10,
        F64 => 11,
        Blob => 12,
        Ref => 13,
        Unknown => 14,
    }
}

fn u8_to_element_type(b: u8) -> Result<ElementType> {
    use ElementType::*;
    Ok(match b {
        0 => Bool,
        1 => I8,
        2 => U8,
        3 => I16,
        4 => U16,
        5 => Char16,
        6 => I32,
        7 => U32,
        8 => F32,
        9 => I64,
        10 => U64,
        11 => F64,
        12 => Blob,
        13 => Ref,
        14 => Unknown,
        other => return Err(Error::Decode(format!("unknown element type tag {other}"))),
    })
}

const FLAG_REFERENCE: u8 = 1 << 0;
const FLAG_REFERENCE_ARRAY: u8 = 1 << 1;
const FLAG_INLINE_ARRAY: u8 = 1 << 2;

fn flags_to_u8(f: FieldFlags) -> u8 {
    let mut bits = 0u8;
    if f.is_reference {
        bits |= FLAG_REFERENCE;
    }
    if f.is_reference_array {
        bits |= FLAG_REFERENCE_ARRAY;
    }
    if f.is_inline_array {
        bits |= FLAG_INLINE_ARRAY;
    }
    bits
}

fn u8_to_flags(bits: u8) -> FieldFlags {
    FieldFlags {
        is_reference: bits & FLAG_REFERENCE != 0,
        is_reference_array: bits & FLAG_REFERENCE_ARRAY != 0,
        is_inline_array: bits & FLAG_INLINE_ARRAY != 0,
    }
}

/// Encode `root` and every container reachable from it into a byte vector.
pub fn encode(root: &ObjectView) -> Result<Vec<u8>> {
    let container = root.resolve()?;
    let registry = container.registry()?;
    let mut w = Writer::new();
    w.write_bytes(MAGIC);
    w.write_u32(VERSION);
    encode_container(&container, &registry, &mut w)?;
    Ok(w.into_inner())
}

fn encode_container(container: &Arc<Container>, registry: &Arc<Registry>, w: &mut Writer) -> Result<()> {
    let layout = container.layout();
    let fields: &[FieldHeader] = layout.fields();
    w.write_u32(fields.len() as u32);
    for field in fields {
        w.write_str(&field.name);
        w.write_u8(element_type_to_u8(field.element_type));
        w.write_u8(flags_to_u8(field.flags));
        w.write_u32(field.array_len as u32);

        if field.flags.is_reference {
            match container.reference_target(&field.name)? {
                None => w.write_u8(0),
                Some(cid) => {
                    w.write_u8(1);
                    let child = registry.get(cid).ok_or(Error::ObjectDisposed)?;
                    encode_container(&child, registry, w)?;
                }
            }
        } else if field.flags.is_reference_array {
            for i in 0..field.array_len {
                match container.reference_array_target(&field.name, i)? {
                    None => w.write_u8(0),
                    Some(cid) => {
                        w.write_u8(1);
                        let child = registry.get(cid).ok_or(Error::ObjectDisposed)?;
                        encode_container(&child, registry, w)?;
                    }
                }
            }
        } else {
            let bytes = container.read_blob(&field.name)?;
            w.write_u32(bytes.len() as u32);
            w.write_bytes(&bytes);
        }
    }
    Ok(())
}

/// Decode a byte vector produced by [`encode`] into a fresh [`Storage`].
/// Every container gets a new id from a new [`Registry`]; nothing from the
/// encoding side's registry is reused.
pub fn decode(bytes: &[u8]) -> Result<Storage> {
    let mut r = Reader::new(bytes);
    let magic = r.take(4)?;
    if magic != MAGIC.as_slice() {
        return Err(Error::Decode("not a scene graph snapshot (bad magic)".to_string()));
    }
    let version = r.read_u32()?;
    if version != VERSION {
        return Err(Error::Decode(format!("unsupported snapshot version {version}")));
    }
    let registry = Registry::new();
    let root = decode_container(&mut r, &registry)?;
    Ok(Storage::from_parts(registry, root))
}

fn decode_container(r: &mut Reader, registry: &Arc<Registry>) -> Result<Arc<Container>> {
    let container = registry.create(Layout::empty_object());
    let field_count = r.read_u32()?;
    for _ in 0..field_count {
        let name = r.read_str()?;
        let element_type = u8_to_element_type(r.read_u8()?)?;
        let flags = u8_to_flags(r.read_u8()?);
        let array_len = r.read_u32()? as usize;

        if flags.is_reference {
            let present = r.read_u8()? != 0;
            if present {
                let child = decode_container(r, registry)?;
                container.set_reference(&name, &child)?;
            } else {
                container.declare_empty_reference(&name)?;
            }
        } else if flags.is_reference_array {
            container.resize_reference_array(&name, array_len)?;
            for i in 0..array_len {
                let present = r.read_u8()? != 0;
                if present {
                    let child = decode_container(r, registry)?;
                    container.set_reference_array_elem(&name, i, &child)?;
                }
            }
        } else {
            let len = r.read_u32()? as usize;
            let bytes = r.read_bytes(len)?;
            if flags.is_inline_array {
                container.override_raw(&name, &bytes, element_type, Some(array_len))?;
            } else if element_type == ElementType::Blob {
                container.override_raw(&name, &bytes, ElementType::Blob, None)?;
            } else {
                write_scalar_field(&container, &name, element_type, &bytes)?;
            }
        }
    }
    Ok(container)
}

fn write_scalar_field(container: &Arc<Container>, name: &str, element_type: ElementType, bytes: &[u8]) -> Result<()> {
    use ElementType::*;
    match element_type {
        Bool => container.write(name, bool::decode_native(bytes), true),
        I8 => container.write(name, i8::decode_native(bytes), true),
        U8 => container.write(name, u8::decode_native(bytes), true),
        I16 => container.write(name, i16::decode_native(bytes), true),
        U16 => container.write(name, u16::decode_native(bytes), true),
        I32 => container.write(name, i32::decode_native(bytes), true),
        U32 => container.write(name, u32::decode_native(bytes), true),
        F32 => container.write(name, f32::decode_native(bytes), true),
        I64 => container.write(name, i64::decode_native(bytes), true),
        U64 => container.write(name, u64::decode_native(bytes), true),
        F64 => container.write(name, f64::decode_native(bytes), true),
        Char16 | Blob | Ref | Unknown => Err(Error::Decode(format!(
            "field '{name}' has no plain-scalar wire form (element type {element_type})"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::json;
    use serde_json::json;

    #[test]
    fn test_round_trip_preserves_shape() {
        let input = json::from_json(&json!({
            "name": "Root",
            "hp": 42,
            "speeds": [1.0f64, 2.0, 3.0],
            "children": [{ "name": "a" }, { "name": "b" }],
            "nothing": null,
        }))
        .unwrap();

        let bytes = encode(&input.root()).unwrap();
        let restored = decode(&bytes).unwrap();

        let original = json::to_json(&input.root()).unwrap();
        let round_tripped = json::to_json(&restored.root()).unwrap();
        assert_eq!(original, round_tripped);
    }

    #[test]
    fn test_fresh_ids_assigned_on_decode() {
        let input = Storage::new();
        input.root().write("hp", 1i32, true).unwrap();
        let original_id = input.root().id();

        let bytes = encode(&input.root()).unwrap();
        let restored = decode(&bytes).unwrap();

        assert_ne!(original_id, restored.root().id());
        assert_eq!(restored.root().read::<i32>("hp").unwrap(), 1);
    }

    #[test]
    fn test_bad_magic_rejected() {
        assert!(decode(b"nope").is_err());
    }
}
