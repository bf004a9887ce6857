//! Property: reschema preserves every surviving field's value across an
//! arbitrary sequence of field additions and deletions (each write or
//! delete that changes a container's layout triggers a reschema).

use std::collections::HashMap;

use proptest::collection::vec;
use proptest::prelude::*;

use scenegraph::Storage;

const FIELD_NAMES: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

#[derive(Debug, Clone)]
enum Op {
    Write(usize, i32),
    Delete(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..FIELD_NAMES.len(), any::<i32>()).prop_map(|(i, v)| Op::Write(i, v)),
        (0..FIELD_NAMES.len()).prop_map(Op::Delete),
    ]
}

proptest! {
    #[test]
    fn reschema_preserves_surviving_fields(ops in vec(op_strategy(), 1..60)) {
        let storage = Storage::new();
        let root = storage.root();
        let mut expected: HashMap<&str, i32> = HashMap::new();

        for op in &ops {
            match *op {
                Op::Write(i, v) => {
                    let name = FIELD_NAMES[i];
                    root.write(name, v, true).unwrap();
                    expected.insert(name, v);
                }
                Op::Delete(i) => {
                    let name = FIELD_NAMES[i];
                    root.delete(&[name]).unwrap();
                    expected.remove(name);
                }
            }

            for &name in &FIELD_NAMES {
                match expected.get(name) {
                    Some(&v) => prop_assert_eq!(root.read::<i32>(name).unwrap(), v),
                    None => prop_assert!(!root.has_field(name).unwrap()),
                }
            }
        }
    }
}
