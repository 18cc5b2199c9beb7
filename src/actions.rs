// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Dispatch-table synthesis.
//!
//! Every container-family leaf gets an auto-generated `set_<key>` entry for
//! each string field of its current value and for each bound child key; user
//! actions registered at construction share the same table and win on name
//! collisions. The table is regenerated whenever a commit changes the shape
//! of the leaf's value, so a leaf that turns scalar loses its setters and
//! regains them when it turns container again.

use crate::{
    leaf::{DispatchEntry, Leaf},
    store::{Family, Key},
};

/// Rebuilds `leaf`'s setter entries in place, preserving user actions.
pub(crate) fn update_do(leaf: &mut Leaf) {
    leaf.dispatch
        .retain(|_, entry| matches!(entry, DispatchEntry::Action(_)));

    // a fixed setter list suppresses key discovery entirely
    if let Some(fields) = leaf.fixed_setters.clone() {
        for field in fields {
            insert_setter(leaf, &field);
        }
        return;
    }

    if leaf.store.family() != Family::Container {
        return;
    }
    let mut keys = leaf.store.keys();
    for (_, key) in &leaf.child_keys {
        if !keys.contains(key) {
            keys.push(key.clone());
        }
    }
    for key in keys {
        if let Some(field) = key.as_field() {
            let field = field.to_string();
            insert_setter(leaf, &field);
        }
    }
}

fn insert_setter(leaf: &mut Leaf, field: &str) {
    let name = format!("set_{field}");
    leaf.dispatch
        .entry(name)
        .or_insert_with(|| DispatchEntry::Setter(Key::Field(field.to_string())));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Forest, LeafConfig};
    use serde_json::json;

    #[test]
    fn setters_follow_value_keys() {
        let forest = Forest::new(LeafConfig::new(json!({"x": 1, "y": 2}))).unwrap();
        assert!(forest.root().has_action("set_x"));
        assert!(forest.root().has_action("set_y"));
        assert!(!forest.root().has_action("set_z"));
    }

    #[test]
    fn setters_regenerate_on_shape_change() {
        let forest = Forest::new(LeafConfig::new(json!({"x": 1, "y": 2}))).unwrap();
        forest.set_value(json!({"a": 1})).unwrap();
        assert!(!forest.root().has_action("set_x"));
        assert!(forest.root().has_action("set_a"));
    }

    #[test]
    fn scalar_leaves_have_no_setters() {
        let forest = Forest::new(LeafConfig::new(json!({"x": 1}))).unwrap();
        forest.set_value(json!(5)).unwrap();
        assert!(!forest.root().has_action("set_x"));
        forest.set_value(json!({"x": 3})).unwrap();
        assert!(forest.root().has_action("set_x"));
    }

    #[test]
    fn child_keys_get_setters_too() {
        let forest = Forest::new(
            LeafConfig::new(json!({})).child("x", LeafConfig::new(0)),
        )
        .unwrap();
        assert!(forest.root().has_action("set_x"));
    }

    #[test]
    fn fixed_setter_list_suppresses_discovery() {
        let forest = Forest::new(
            LeafConfig::new(json!({"x": 1, "y": 2})).setters(["x"]),
        )
        .unwrap();
        assert!(forest.root().has_action("set_x"));
        assert!(!forest.root().has_action("set_y"));
    }

    #[test]
    fn user_actions_win_name_collisions() {
        let forest = Forest::new(
            LeafConfig::new(json!({"x": 1})).action("set_x", |leaf, _args| {
                leaf.set("x", json!(99))?;
                Ok(json!(null))
            }),
        )
        .unwrap();
        forest.call("set_x", &[json!(5)]).unwrap();
        assert_eq!(forest.value(), json!({"x": 99}));
    }
}
