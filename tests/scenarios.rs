//! End-to-end scenario tests (scalars, hierarchy, reschema, reference
//! teardown, event bubbling, malformed JSON) exercised through the public
//! API the way an embedding application would use it.

use std::sync::{Arc, Mutex};

use scenegraph::codec::json;
use scenegraph::event::{Event, EventKind};
use scenegraph::layout::{Layout, LayoutBuilder};
use scenegraph::types::{Char16, ElementType};
use scenegraph::Storage;

fn write_string(root: &scenegraph::ObjectView, field: &str, s: &str) {
    let units: Vec<Char16> = s.encode_utf16().map(Char16).collect();
    let array = root.get_array(field, ElementType::Char16, true).unwrap();
    array.write(&units, true).unwrap();
}

fn read_string(view: &scenegraph::ObjectView, field: &str) -> String {
    let array = view.get_array(field, ElementType::Char16, false).unwrap();
    let units: Vec<Char16> = array.read().unwrap();
    String::from_utf16(&units.into_iter().map(|c| c.0).collect::<Vec<u16>>()).unwrap()
}

#[test]
fn s1_simple_scalar_and_string_json_round_trip() {
    let storage = Storage::new();
    let root = storage.root();
    let original_root_id = root.id();

    root.write("Health", 100i32, true).unwrap();
    root.write("Mana", 50.0f32, true).unwrap();
    write_string(&root, "Name", "Hero");

    let rendered = json::to_json(&root).unwrap();
    let restored = json::from_json(&rendered).unwrap();
    let restored_root = restored.root();

    assert_eq!(restored_root.read::<i32>("Health").unwrap(), 100);
    assert_eq!(restored_root.read::<f32>("Mana").unwrap(), 50.0);
    assert_eq!(read_string(&restored_root, "Name"), "Hero");

    assert!(!restored_root.id().is_none());
    assert_ne!(original_root_id, restored_root.id());
}

#[test]
fn s2_deep_hierarchy_round_trips_via_json() {
    let storage = Storage::new();
    let root = storage.root();
    root.write("RootValue", 42i32, true).unwrap();

    let child = root.get_object("Child", true).unwrap();
    child.write("ChildValue", 99i32, true).unwrap();

    let grand = child.get_object("GrandChild", true).unwrap();
    grand.write("GrandValue", -123i32, true).unwrap();

    let rendered = json::to_json(&root).unwrap();
    let restored = json::from_json(&rendered).unwrap();
    let restored_root = restored.root();

    assert_eq!(restored_root.read::<i32>("RootValue").unwrap(), 42);
    let restored_child = restored_root.get_object("Child", false).unwrap();
    assert_eq!(restored_child.read::<i32>("ChildValue").unwrap(), 99);
    let restored_grand = restored_child.get_object("GrandChild", false).unwrap();
    assert_eq!(restored_grand.read::<i32>("GrandValue").unwrap(), -123);
}

#[test]
fn s3_reschema_preserves_siblings() {
    let layout = {
        let mut b = LayoutBuilder::new();
        b.add_scalar("hp", ElementType::I32);
        b.add_inline_array("speeds", ElementType::F32, 4);
        b.build()
    };
    let storage = Storage::with_root_layout(layout);
    let root = storage.root();

    root.write("hp", 77i32, false).unwrap();
    root.write_array("speeds", &[1.0f32, 2.0, 3.0, 4.0], false).unwrap();

    root.delete(&["speeds"]).unwrap();

    assert_eq!(root.read::<i32>("hp").unwrap(), 77);
    assert!(!root.has_field("speeds").unwrap());
}

#[test]
fn s4_reference_subtree_unregistration_leaves_siblings_intact() {
    let storage = Storage::new();
    let root = storage.root();

    let child = root.get_object("child", true).unwrap();
    let child_id = child.id();

    // Build a reference array of two objects directly, the way the
    // binary codec's decoder does, since a fresh array has no elements yet.
    let first = storage.registry().create(Layout::empty_object());
    let second = storage.registry().create(Layout::empty_object());
    let root_container = root.resolve().unwrap();
    root_container.resize_reference_array("children", 2).unwrap();
    root_container.set_reference_array_elem("children", 0, &first).unwrap();
    root_container.set_reference_array_elem("children", 1, &second).unwrap();

    let first_id = first.id();
    let second_id = second.id();

    root.delete(&["child"]).unwrap();

    assert!(storage.registry().get(child_id).is_none());
    assert!(storage.registry().get(first_id).is_some());
    assert!(storage.registry().get(second_id).is_some());
}

#[test]
fn s5_delete_bubbles_and_disposes_descendants() {
    let storage = Storage::new();
    let grand_parent = storage.root();
    let parent = grand_parent.get_object("parent", true).unwrap();
    let child = parent.get_object("child", true).unwrap();
    let grand = child.get_object("grand", true).unwrap();

    child.write("stat", 1i32, true).unwrap();
    grand.write("hp", 2i32, true).unwrap();

    let grand_parent_events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
    let gp_events = grand_parent_events.clone();
    grand_parent.subscribe_any(move |e| gp_events.lock().unwrap().push(e.clone())).unwrap();

    let parent_events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
    let p_events = parent_events.clone();
    parent.subscribe_any(move |e| p_events.lock().unwrap().push(e.clone())).unwrap();

    let child_events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
    let c_events = child_events.clone();
    child.subscribe_any(move |e| c_events.lock().unwrap().push(e.clone())).unwrap();

    let grand_events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
    let g_events = grand_events.clone();
    grand.subscribe_any(move |e| g_events.lock().unwrap().push(e.clone())).unwrap();

    let stat_events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
    let s_events = stat_events.clone();
    child.subscribe_field("stat", move |e| s_events.lock().unwrap().push(e.clone())).unwrap();

    let hp_events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
    let h_events = hp_events.clone();
    grand.subscribe_field("hp", move |e| h_events.lock().unwrap().push(e.clone())).unwrap();

    grand_parent.delete(&["parent"]).unwrap();

    let gp = grand_parent_events.lock().unwrap();
    assert_eq!(gp.len(), 1);
    assert_eq!(gp[0].kind, EventKind::Delete);
    assert_eq!(gp[0].path, "parent");

    let p = parent_events.lock().unwrap();
    assert_eq!(p.len(), 1);
    assert_eq!(p[0].kind, EventKind::Dispose);
    assert_eq!(p[0].path, "");

    let c = child_events.lock().unwrap();
    assert_eq!(c.len(), 1);
    assert_eq!(c[0].kind, EventKind::Dispose);

    let g = grand_events.lock().unwrap();
    assert_eq!(g.len(), 1);
    assert_eq!(g[0].kind, EventKind::Dispose);

    let s = stat_events.lock().unwrap();
    assert_eq!(s.len(), 1);
    assert_eq!(s[0].kind, EventKind::Dispose);

    let h = hp_events.lock().unwrap();
    assert_eq!(h.len(), 1);
    assert_eq!(h[0].kind, EventKind::Dispose);
}

#[test]
fn s6_mixed_type_array_rejected_then_fresh_storage_still_works() {
    let bad = serde_json::json!({ "Mixed": [1, "x"] });
    assert!(json::from_json(&bad).is_err());

    let good = serde_json::json!({ "Health": 5 });
    let storage = json::from_json(&good).unwrap();
    assert_eq!(storage.root().read::<i32>("Health").unwrap(), 5);
}
