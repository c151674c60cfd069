#![no_main]
use std::sync::Arc;

use cachepack::{TypeContext, Value, ValueTree};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut tree = match ValueTree::parse(Vec::from(data), Arc::new(TypeContext::new()), 0) {
        Ok(tree) => tree,
        Err(_) => return,
    };
    let root = tree.root();
    let _ = tree.get_value(root);
    if let Ok(count) = tree.child_count(root) {
        for i in (0..count).rev() {
            if let Ok(child) = tree.get_child(root, i) {
                let _ = tree.set_value(child, Value::Null);
            }
        }
    }
    if let Ok(new) = tree.apply_changes(root) {
        let _ = ValueTree::parse(new, Arc::new(TypeContext::new()), 0);
    }
});
