//! JSON codec: `serde_json::Value` as the tree's interchange format.
//! Objects become containers, scalars become JSON primitives,
//! strings become Char16 array-container children, homogeneous scalar
//! arrays become inline value arrays, empty arrays become zero-length
//! byte array-container children, and arrays of objects become
//! reference-array children. Blobs round-trip as `{"$blob": "<base64>"}`.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Map, Value};

use crate::container::Container;
use crate::error::{Error, Result};
use crate::layout::{Layout, LayoutBuilder, LayoutRole, ARRAY_FIELD_NAME};
use crate::registry::Registry;
use crate::storage::Storage;
use crate::types::{Char16, ElementType};
use crate::view::ObjectView;

const BLOB_KEY: &str = "$blob";

/// Render an object view and everything reachable from it as a
/// `serde_json::Value`. The view's container must have [`LayoutRole::Object`];
/// callers wanting a raw array or string container at the root should walk
/// to a field first.
pub fn to_json(view: &ObjectView) -> Result<Value> {
    let container = view.resolve()?;
    let registry = container.registry()?;
    container_to_json(&container, &registry)
}

/// Build a fresh [`Storage`] tree from a JSON value. `value` must be a
/// JSON object.
pub fn from_json(value: &Value) -> Result<Storage> {
    let map = value
        .as_object()
        .ok_or_else(|| Error::invalid_argument("JSON root must be an object"))?;
    let storage = Storage::new();
    write_object_fields(&storage.root(), map)?;
    Ok(storage)
}

fn container_to_json(container: &Arc<Container>, registry: &Arc<Registry>) -> Result<Value> {
    match container.layout().role() {
        LayoutRole::String => Ok(Value::String(decode_utf16_field(container, ARRAY_FIELD_NAME)?)),
        LayoutRole::Array => array_container_to_json(container, registry),
        LayoutRole::Object => {
            let mut map = Map::new();
            for field in container.layout().fields() {
                map.insert(field.name.to_string(), field_to_json(container, field, registry)?);
            }
            Ok(Value::Object(map))
        }
    }
}

fn field_to_json(
    container: &Arc<Container>,
    field: &crate::layout::FieldHeader,
    registry: &Arc<Registry>,
) -> Result<Value> {
    let name = field.name.as_ref();
    if field.flags.is_reference {
        return match container.reference_target(name)? {
            None => Ok(Value::Null),
            Some(cid) => {
                let child = registry.get(cid).ok_or(Error::ObjectDisposed)?;
                container_to_json(&child, registry)
            }
        };
    }
    if field.flags.is_inline_array {
        return if field.element_type == ElementType::Char16 {
            Ok(Value::String(decode_utf16_field(container, name)?))
        } else {
            scalar_array_to_json(container, field)
        };
    }
    if field.element_type == ElementType::Blob {
        let bytes = container.read_blob(name)?;
        let mut obj = Map::new();
        obj.insert(BLOB_KEY.to_string(), Value::String(BASE64.encode(bytes)));
        return Ok(Value::Object(obj));
    }
    scalar_to_json(container, field)
}

fn array_container_to_json(container: &Arc<Container>, registry: &Arc<Registry>) -> Result<Value> {
    let layout = container.layout();
    let fh = layout
        .field(ARRAY_FIELD_NAME)
        .ok_or_else(|| Error::invalid_state("array container missing its $value field"))?;
    if fh.flags.is_reference_array {
        let mut items = Vec::with_capacity(fh.array_len);
        for i in 0..fh.array_len {
            match container.reference_array_target(ARRAY_FIELD_NAME, i)? {
                None => items.push(Value::Null),
                Some(cid) => {
                    let child = registry.get(cid).ok_or(Error::ObjectDisposed)?;
                    items.push(container_to_json(&child, registry)?);
                }
            }
        }
        Ok(Value::Array(items))
    } else {
        scalar_array_to_json(container, fh)
    }
}

fn scalar_to_json(container: &Arc<Container>, field: &crate::layout::FieldHeader) -> Result<Value> {
    use ElementType::*;
    let name = field.name.as_ref();
    Ok(match field.element_type {
        Bool => Value::Bool(container.read::<bool>(name)?),
        I8 => json!(container.read::<i8>(name)?),
        U8 => json!(container.read::<u8>(name)?),
        I16 => json!(container.read::<i16>(name)?),
        U16 => json!(container.read::<u16>(name)?),
        I32 => json!(container.read::<i32>(name)?),
        U32 => json!(container.read::<u32>(name)?),
        F32 => json!(container.read::<f32>(name)?),
        I64 => json!(container.read::<i64>(name)?),
        U64 => json!(container.read::<u64>(name)?),
        F64 => json!(container.read::<f64>(name)?),
        Char16 | Blob | Ref | Unknown => {
            return Err(Error::invalid_state(format!("field '{name}' has no scalar JSON form")))
        }
    })
}

fn scalar_array_to_json(container: &Arc<Container>, field: &crate::layout::FieldHeader) -> Result<Value> {
    use ElementType::*;
    let name = field.name.as_ref();
    Ok(match field.element_type {
        Bool => Value::Array(
            container
                .read_array::<bool>(name)?
                .into_iter()
                .map(Value::Bool)
                .collect(),
        ),
        I8 => json!(container.read_array::<i8>(name)?),
        U8 => json!(container.read_array::<u8>(name)?),
        I16 => json!(container.read_array::<i16>(name)?),
        U16 => json!(container.read_array::<u16>(name)?),
        I32 => json!(container.read_array::<i32>(name)?),
        U32 => json!(container.read_array::<u32>(name)?),
        F32 => json!(container.read_array::<f32>(name)?),
        I64 => json!(container.read_array::<i64>(name)?),
        U64 => json!(container.read_array::<u64>(name)?),
        F64 => json!(container.read_array::<f64>(name)?),
        Char16 | Blob | Ref | Unknown => {
            return Err(Error::invalid_state(format!("field '{name}' has no scalar array JSON form")))
        }
    })
}

fn decode_utf16_field(container: &Arc<Container>, field: &str) -> Result<String> {
    let units: Vec<Char16> = container.read_array(field)?;
    let units: Vec<u16> = units.into_iter().map(|c| c.0).collect();
    String::from_utf16(&units).map_err(|e| Error::Decode(format!("invalid utf-16 in field '{field}': {e}")))
}

fn write_object_fields(view: &ObjectView, map: &Map<String, Value>) -> Result<()> {
    for (key, value) in map {
        write_field(view, key, value)?;
    }
    Ok(())
}

fn write_field(parent: &ObjectView, name: &str, value: &Value) -> Result<()> {
    match value {
        Value::Null => {
            parent.resolve()?.declare_empty_reference(name)?;
        }
        Value::Bool(b) => parent.write(name, *b, true)?,
        Value::Number(n) => write_number(parent, name, n)?,
        Value::String(s) => {
            let container = parent.resolve()?;
            let registry = container.registry()?;
            let child = make_string_container(&registry, s)?;
            container.set_reference(name, &child)?;
        }
        Value::Array(items) => write_array_field(parent, name, items)?,
        Value::Object(map) => write_object_field(parent, name, map)?,
    }
    Ok(())
}

fn write_number(parent: &ObjectView, name: &str, n: &serde_json::Number) -> Result<()> {
    if let Some(i) = n.as_i64() {
        return match i32::try_from(i) {
            Ok(v) => parent.write(name, v, true),
            Err(_) => parent.write(name, i, true),
        };
    }
    if let Some(u) = n.as_u64() {
        return parent.write(name, u, true);
    }
    let f = n
        .as_f64()
        .ok_or_else(|| Error::Decode(format!("number '{n}' has no f64 representation")))?;
    parent.write(name, f, true)
}

fn write_object_field(parent: &ObjectView, name: &str, map: &Map<String, Value>) -> Result<()> {
    let container = parent.resolve()?;
    if map.len() == 1 {
        if let Some(Value::String(b64)) = map.get(BLOB_KEY) {
            let bytes = BASE64.decode(b64.as_bytes())?;
            container.override_raw(name, &bytes, ElementType::Blob, None)?;
            return Ok(());
        }
    }
    let registry = container.registry()?;
    let child = registry.create(Layout::empty_object());
    write_object_fields(&ObjectView::new(child.id(), child.generation(), registry.clone()), map)?;
    container.set_reference(name, &child)?;
    Ok(())
}

fn write_array_field(parent: &ObjectView, name: &str, items: &[Value]) -> Result<()> {
    let container = parent.resolve()?;
    let registry = container.registry()?;

    if items.is_empty() {
        let child_layout = {
            let mut b = LayoutBuilder::new();
            b.add_inline_array(ARRAY_FIELD_NAME, ElementType::U8, 0);
            b.build()
        };
        let child = registry.create(child_layout);
        container.set_reference(name, &child)?;
        return Ok(());
    }

    if items.iter().all(|v| v.is_boolean() || v.is_number()) {
        return write_inline_scalar_array(&container, name, items);
    }

    if !items.iter().all(|v| v.is_object()) {
        return Err(Error::Decode(format!(
            "array field '{name}' mixes scalars with objects/strings; only homogeneous scalar or all-object arrays are supported"
        )));
    }

    let child_layout = {
        let mut b = LayoutBuilder::new();
        b.add_reference_array(ARRAY_FIELD_NAME, items.len());
        b.build()
    };
    let array_container = registry.create(child_layout);
    container.set_reference(name, &array_container)?;

    for (i, item) in items.iter().enumerate() {
        let map = item.as_object().unwrap();
        if map.len() == 1 {
            if let Some(Value::String(b64)) = map.get(BLOB_KEY) {
                let bytes = BASE64.decode(b64.as_bytes())?;
                let wrapper = registry.create(Layout::empty_object());
                wrapper.override_raw(BLOB_KEY, &bytes, ElementType::Blob, None)?;
                array_container.set_reference_array_elem(ARRAY_FIELD_NAME, i, &wrapper)?;
                continue;
            }
        }
        let child = registry.create(Layout::empty_object());
        write_object_fields(&ObjectView::new(child.id(), child.generation(), registry.clone()), map)?;
        array_container.set_reference_array_elem(ARRAY_FIELD_NAME, i, &child)?;
    }
    Ok(())
}

fn write_inline_scalar_array(container: &Arc<Container>, name: &str, items: &[Value]) -> Result<()> {
    if items.iter().all(|v| v.is_boolean()) {
        let values: Vec<bool> = items.iter().map(|v| v.as_bool().unwrap()).collect();
        return container.write_array(name, &values, true);
    }
    if items.iter().all(|v| v.as_i64().is_some_and(|i| i32::try_from(i).is_ok())) {
        let values: Vec<i32> = items.iter().map(|v| v.as_i64().unwrap() as i32).collect();
        return container.write_array(name, &values, true);
    }
    if items.iter().all(|v| v.is_i64()) {
        let values: Vec<i64> = items.iter().map(|v| v.as_i64().unwrap()).collect();
        return container.write_array(name, &values, true);
    }
    if items.iter().all(|v| v.is_u64()) {
        let values: Vec<u64> = items.iter().map(|v| v.as_u64().unwrap()).collect();
        return container.write_array(name, &values, true);
    }
    let values: Vec<f64> = items
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| Error::Decode(format!("array element '{v}' is not numeric"))))
        .collect::<Result<Vec<_>>>()?;
    container.write_array(name, &values, true)
}

fn make_string_container(registry: &Arc<Registry>, s: &str) -> Result<Arc<Container>> {
    let units: Vec<Char16> = s.encode_utf16().map(Char16).collect();
    let layout = {
        let mut b = LayoutBuilder::new();
        b.add_inline_array(ARRAY_FIELD_NAME, ElementType::Char16, units.len());
        b.build()
    };
    let child = registry.create(layout);
    child.write_array(ARRAY_FIELD_NAME, &units, true)?;
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_scalars_and_nesting() {
        let input = json!({
            "name": "Aria",
            "hp": 42,
            "alive": true,
            "speeds": [1.5f64, 2.5, 3.5],
            "stats": { "str": 10, "dex": 7 },
            "tags": [],
        });
        let storage = from_json(&input).unwrap();
        let out = to_json(&storage.root()).unwrap();
        assert_eq!(out["name"], json!("Aria"));
        assert_eq!(out["hp"], json!(42));
        assert_eq!(out["alive"], json!(true));
        assert_eq!(out["speeds"], json!([1.5, 2.5, 3.5]));
        assert_eq!(out["stats"]["str"], json!(10));
        assert_eq!(out["tags"], json!([]));
    }

    #[test]
    fn test_array_of_objects_round_trips() {
        let input = json!({
            "children": [
                { "name": "a" },
                { "name": "b" },
            ]
        });
        let storage = from_json(&input).unwrap();
        let out = to_json(&storage.root()).unwrap();
        assert_eq!(out["children"][0]["name"], json!("a"));
        assert_eq!(out["children"][1]["name"], json!("b"));
    }

    #[test]
    fn test_blob_round_trips_as_base64() {
        let input = json!({ "payload": { "$blob": BASE64.encode([1u8, 2, 3, 4]) } });
        let storage = from_json(&input).unwrap();
        let out = to_json(&storage.root()).unwrap();
        assert_eq!(out["payload"]["$blob"], input["payload"]["$blob"]);
    }

    #[test]
    fn test_null_field_round_trips_as_empty_reference() {
        let input = json!({ "parent": null });
        let storage = from_json(&input).unwrap();
        let out = to_json(&storage.root()).unwrap();
        assert_eq!(out["parent"], Value::Null);
    }

    #[test]
    fn test_non_object_root_rejected() {
        assert!(from_json(&json!([1, 2, 3])).is_err());
    }
}
