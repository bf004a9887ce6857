//! Path navigation: a small dotted-path grammar over [`ObjectView`].
//!
//! Grammar: `segment (SEP segment)*`, where a `segment` is a field name
//! optionally followed by an array index (`name[3]`). `SEP` defaults to
//! [`crate::common::config::DEFAULT_PATH_SEPARATOR`] but every entry point
//! takes an explicit separator so callers with field names that contain
//! `.` can pick another character.

pub mod query;

use crate::error::{Error, Result};
use crate::types::{Char16, ElementType, Scalar};
use crate::view::ObjectView;

/// One step of a parsed path: a field name, and (for `name[i]` segments)
/// the array index to follow into next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub index: Option<usize>,
}

/// Split `path` on `separator` into segments, parsing a trailing
/// `[digits]` on each. Rejects empty segments and malformed indices.
pub fn parse(path: &str, separator: char) -> Result<Vec<PathSegment>> {
    if path.is_empty() {
        return Err(Error::invalid_argument("path must not be empty"));
    }
    path.split(separator)
        .map(|raw| {
            if raw.is_empty() {
                return Err(Error::invalid_argument(format!("empty path segment in '{path}'")));
            }
            match raw.find('[') {
                None => Ok(PathSegment { name: raw.to_string(), index: None }),
                Some(open) => {
                    if !raw.ends_with(']') {
                        return Err(Error::invalid_argument(format!("malformed index in segment '{raw}'")));
                    }
                    let name = &raw[..open];
                    let digits = &raw[open + 1..raw.len() - 1];
                    if name.is_empty() {
                        return Err(Error::invalid_argument(format!("missing field name in segment '{raw}'")));
                    }
                    let index: usize = digits
                        .parse()
                        .map_err(|_| Error::invalid_argument(format!("non-numeric index in segment '{raw}'")))?;
                    Ok(PathSegment { name: name.to_string(), index: Some(index) })
                }
            }
        })
        .collect()
}

fn step(cur: &ObjectView, seg: &PathSegment, allocate_if_missing: bool) -> Result<ObjectView> {
    match seg.index {
        None => cur.get_object(&seg.name, allocate_if_missing),
        Some(i) => cur.object_at(&seg.name, i),
    }
}

/// Walk every segment of `path`, resolving each as a nested object
/// reference. An empty path targets the current container. With
/// `allocate_if_missing`, non-indexed intermediate segments materialize
/// an empty object when absent; indexed segments never auto-allocate
/// (array shape is controlled explicitly via `write_array_path`/
/// `get_array`).
pub fn get_object_by_path(root: &ObjectView, path: &str, separator: char, allocate_if_missing: bool) -> Result<ObjectView> {
    if path.is_empty() {
        return Ok(root.clone());
    }
    let segments = parse(path, separator)?;
    let mut cur = root.clone();
    for seg in &segments {
        cur = step(&cur, seg, allocate_if_missing)?;
    }
    Ok(cur)
}

fn split_leaf(path: &str, separator: char) -> Result<(Vec<PathSegment>, PathSegment)> {
    let mut segments = parse(path, separator)?;
    let leaf = segments.pop().ok_or_else(|| Error::invalid_argument("path must have at least one segment"))?;
    Ok((segments, leaf))
}

fn resolve_parent(root: &ObjectView, parents: &[PathSegment], allocate_if_missing: bool) -> Result<ObjectView> {
    let mut cur = root.clone();
    for seg in parents {
        cur = step(&cur, seg, allocate_if_missing)?;
    }
    Ok(cur)
}

/// Read a scalar at `path`. A trailing indexed segment (`field[i]`) reads
/// one element of an inline array instead of an object field.
pub fn read_path<T: Scalar>(root: &ObjectView, path: &str, separator: char) -> Result<T> {
    let (parents, leaf) = split_leaf(path, separator)?;
    let parent = resolve_parent(root, &parents, false)?;
    match leaf.index {
        None => parent.read(&leaf.name),
        Some(i) => {
            let values: Vec<T> = parent.read_array(&leaf.name)?;
            values
                .get(i)
                .copied()
                .ok_or_else(|| Error::index_out_of_range(i, values.len()))
        }
    }
}

/// Write a scalar at `path`, auto-materializing missing intermediate
/// objects when `allow_reschema` is set (matching `allocate_if_missing`
/// semantics for the parent chain).
pub fn write_path<T: Scalar>(root: &ObjectView, path: &str, separator: char, value: T, allow_reschema: bool) -> Result<()> {
    let (parents, leaf) = split_leaf(path, separator)?;
    let parent = resolve_parent(root, &parents, allow_reschema)?;
    match leaf.index {
        None => parent.write(&leaf.name, value, allow_reschema),
        Some(i) => {
            let container = parent.resolve()?;
            if container.try_write_array_elem(&leaf.name, i, value) {
                Ok(())
            } else {
                Err(Error::invalid_argument(format!("no such array element '{}[{}]'", leaf.name, i)))
            }
        }
    }
}

/// Install an inline value array at `path`, auto-materializing missing
/// intermediate objects when `allow_reschema` is set.
pub fn write_array_path<T: Scalar>(
    root: &ObjectView,
    path: &str,
    separator: char,
    values: &[T],
    allow_reschema: bool,
) -> Result<()> {
    let (parents, leaf) = split_leaf(path, separator)?;
    if leaf.index.is_some() {
        return Err(Error::invalid_argument("write_array_path's leaf segment may not be indexed"));
    }
    let parent = resolve_parent(root, &parents, allow_reschema)?;
    parent.write_array(&leaf.name, values, allow_reschema)
}

/// Install a string (a Char16-element array container) at `path`,
/// auto-materializing missing intermediate objects when `allow_reschema`
/// is set.
pub fn write_string_path(root: &ObjectView, path: &str, separator: char, value: &str, allow_reschema: bool) -> Result<()> {
    let (parents, leaf) = split_leaf(path, separator)?;
    if leaf.index.is_some() {
        return Err(Error::invalid_argument("write_string_path's leaf segment may not be indexed"));
    }
    let parent = resolve_parent(root, &parents, allow_reschema)?;
    let container = parent.resolve()?;
    let units: Vec<Char16> = value.encode_utf16().map(Char16).collect();
    let array = container.get_array(&leaf.name, ElementType::Char16, allow_reschema, allow_reschema)?;
    array.write(&units, allow_reschema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[test]
    fn test_parse_plain_segments() {
        let segs = parse("a.b.c", '.').unwrap();
        assert_eq!(segs, vec![
            PathSegment { name: "a".into(), index: None },
            PathSegment { name: "b".into(), index: None },
            PathSegment { name: "c".into(), index: None },
        ]);
    }

    #[test]
    fn test_parse_indexed_segment() {
        let segs = parse("children[2].hp", '.').unwrap();
        assert_eq!(segs[0], PathSegment { name: "children".into(), index: Some(2) });
        assert_eq!(segs[1], PathSegment { name: "hp".into(), index: None });
    }

    #[test]
    fn test_parse_rejects_empty_segment() {
        assert!(parse("a..b", '.').is_err());
    }

    #[test]
    fn test_write_then_read_nested_path() {
        let storage = Storage::new();
        let root = storage.root();
        write_path(&root, "stats.hp", '.', 42i32, true).unwrap();
        assert_eq!(read_path::<i32>(&root, "stats.hp", '.').unwrap(), 42);
    }

    #[test]
    fn test_write_path_without_reschema_on_missing_parent_fails() {
        let storage = Storage::new();
        let root = storage.root();
        assert!(write_path(&root, "stats.hp", '.', 42i32, false).is_err());
    }

    #[test]
    fn test_empty_path_resolves_to_current_container() {
        let storage = Storage::new();
        let root = storage.root();
        let same = get_object_by_path(&root, "", '.', false).unwrap();
        assert_eq!(root.id(), same.id());
    }

    #[test]
    fn test_write_string_path_then_read_back() {
        let storage = Storage::new();
        let root = storage.root();
        write_string_path(&root, "profile.name", '.', "Rin", true).unwrap();

        let profile = get_object_by_path(&root, "profile", '.', false).unwrap();
        let array = profile.get_array("name", ElementType::Char16, false).unwrap();
        let units: Vec<Char16> = array.read().unwrap();
        let s = String::from_utf16(&units.into_iter().map(|c| c.0).collect::<Vec<u16>>()).unwrap();
        assert_eq!(s, "Rin");
    }
}
