// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Tests for tree construction, blended values, and value propagation.
//!
//! Covers the structural surface: building a forest from a config, reading
//! blended values, the parent/child delegation on field writes, and upward
//! reflection of child changes.

use arbor::{Family, Forest, ForestError, LeafConfig, ValueType};
use serde_json::json;

#[test]
fn scalar_root_round_trips() {
    let forest = Forest::new(42).unwrap();
    assert_eq!(forest.value(), json!(42));
    assert_eq!(forest.root().value_type(), ValueType::Number);
    assert_eq!(forest.root().family(), Family::Scalar);

    forest.set_value("hello").unwrap();
    assert_eq!(forest.value(), json!("hello"));
}

#[test]
fn children_overlay_parent_fields() {
    let forest = Forest::new(
        LeafConfig::new(json!({ "x": 100, "z": 9 }))
            .child("x", 1)
            .child("y", 2),
    )
    .unwrap();

    // children are authoritative for their slots, even when the parent's
    // own store disagrees or lacks the key entirely
    assert_eq!(forest.value(), json!({ "x": 1, "y": 2, "z": 9 }));
    assert_eq!(forest.get("x"), Some(json!(1)));
    assert_eq!(forest.get("z"), Some(json!(9)));
    assert_eq!(forest.get("missing"), None);
}

#[test]
fn blending_recurses_through_grandchildren() {
    let forest = Forest::new(
        LeafConfig::new(json!({})).child(
            "box",
            LeafConfig::new(json!({ "w": 0 })).child("h", 10),
        ),
    )
    .unwrap();
    assert_eq!(forest.value(), json!({ "box": { "w": 0, "h": 10 } }));

    forest.child("box").unwrap().set("w", 5).unwrap();
    assert_eq!(forest.value(), json!({ "box": { "w": 5, "h": 10 } }));
}

#[test]
fn set_on_bound_key_delegates_to_child() {
    let forest = Forest::new(
        LeafConfig::new(json!({}))
            .child("x", LeafConfig::new(0).filter(|v| match v.as_i64() {
                Some(n) => json!(n.clamp(0, 100)),
                None => v,
            }))
            .child("y", 0),
    )
    .unwrap();

    // the child's filter applies even though the write targets the parent
    forest.set("x", 250).unwrap();
    assert_eq!(forest.value(), json!({ "x": 100, "y": 0 }));
    assert_eq!(forest.child("x").unwrap().value(), json!(100));
}

#[test]
fn child_write_propagates_to_root() {
    let forest = Forest::new(
        LeafConfig::new(json!({})).child("point", LeafConfig::new(json!({ "x": 0, "y": 0 }))),
    )
    .unwrap();

    let point = forest.child("point").unwrap();
    point.set("x", 7).unwrap();
    assert_eq!(forest.value(), json!({ "point": { "x": 7, "y": 0 } }));
}

#[test]
fn parent_set_value_pushes_bound_fields_down() {
    let forest = Forest::new(
        LeafConfig::new(json!({}))
            .child("x", 0)
            .child("y", 0),
    )
    .unwrap();

    forest.set_value(json!({ "x": 3, "y": 4 })).unwrap();
    assert_eq!(forest.child("x").unwrap().value(), json!(3));
    assert_eq!(forest.child("y").unwrap().value(), json!(4));
    assert_eq!(forest.value(), json!({ "x": 3, "y": 4 }));
}

#[test]
fn array_children_bind_by_index() {
    let forest = Forest::new(
        LeafConfig::new(json!([10, 20, 30])).child(1usize, 99),
    )
    .unwrap();
    assert_eq!(forest.value(), json!([10, 99, 30]));

    forest.set(1usize, 42).unwrap();
    assert_eq!(forest.value(), json!([10, 42, 30]));
}

#[test]
fn setting_a_field_on_a_scalar_fails() {
    let forest = Forest::new(5).unwrap();
    let err = forest.set("x", 1).unwrap_err();
    assert!(matches!(err, ForestError::NotAContainer { .. }));
    assert_eq!(forest.value(), json!(5));
}

#[test]
fn children_on_a_scalar_config_fail() {
    let err = Forest::new(LeafConfig::new(3).child("x", 1)).unwrap_err();
    assert!(matches!(err, ForestError::NotAContainer { .. }));
}

#[test]
fn filters_normalize_on_construction() {
    let forest = Forest::new(LeafConfig::new(-5).filter(|v| match v.as_i64() {
        Some(n) => json!(n.max(0)),
        None => v,
    }))
    .unwrap();
    // the initial value passes through the filter too
    assert_eq!(forest.value(), json!(0));
}

#[test]
fn names_fall_back_to_mount_key() {
    let forest = Forest::new(
        LeafConfig::new(json!({}))
            .child("plain", 1)
            .child("labelled", LeafConfig::new(2).named("the-label")),
    )
    .unwrap();
    assert_eq!(
        forest.child("plain").unwrap().name().as_deref(),
        Some("plain")
    );
    assert_eq!(
        forest.child("labelled").unwrap().name().as_deref(),
        Some("the-label")
    );
}

#[test]
fn add_and_remove_children_at_runtime() {
    let forest = Forest::new(LeafConfig::new(json!({ "a": 1 }))).unwrap();
    assert!(forest.child("b").is_none());

    let b = forest.root().add_child("b", 2).unwrap();
    assert_eq!(forest.value(), json!({ "a": 1, "b": 2 }));
    assert_eq!(b.value(), json!(2));

    assert!(forest.root().remove_child("b").unwrap());
    assert!(forest.child("b").is_none());
    // unbinding stops the overlay; the orphan keeps its own value
    assert_eq!(b.value(), json!(2));
    assert!(!forest.root().remove_child("b").unwrap());
}

#[test]
fn mis_kinded_binding_does_not_eclipse_later_children() {
    let forest = Forest::new(LeafConfig::new(json!({ "label": "origin" }))).unwrap();
    // an index binding on an object leaf never finds a slot to overlay
    forest.root().add_child(0usize, 7).unwrap();
    forest.root().add_child("a", 1).unwrap();
    assert_eq!(forest.value(), json!({ "label": "origin", "a": 1 }));
}

#[test]
fn independent_forests_do_not_share_state() {
    let a = Forest::new(json!({ "n": 1 })).unwrap();
    let b = Forest::new(json!({ "n": 1 })).unwrap();
    a.set("n", 99).unwrap();
    assert_eq!(b.value(), json!({ "n": 1 }));
}

#[test]
fn original_value_survives_mutation() {
    let forest = Forest::new(json!({ "n": 1 })).unwrap();
    forest.set("n", 2).unwrap();
    forest.set("m", 3).unwrap();
    assert_eq!(forest.root().original_value(), json!({ "n": 1 }));
    assert_eq!(forest.value(), json!({ "n": 2, "m": 3 }));
}

#[test]
fn configs_build_from_serializable_types() {
    #[derive(serde::Serialize)]
    struct Point {
        x: i64,
        y: i64,
    }

    let config = LeafConfig::from_serialize(&Point { x: 1, y: 2 }).unwrap();
    let forest = Forest::new(config).unwrap();
    assert_eq!(forest.value(), json!({ "x": 1, "y": 2 }));
    assert!(forest.root().has_action("set_x"));
}

#[test]
fn meta_bag_reads_and_locks() {
    let forest = Forest::new(LeafConfig::new(1).meta("unit", "px")).unwrap();
    let root = forest.root();
    assert_eq!(root.meta("unit"), Some(json!("px")));
    assert_eq!(root.meta("absent"), None);

    // a set key refuses silent overwrite unless forced
    let err = root.set_meta("unit", json!("em"), false).unwrap_err();
    assert!(matches!(err, ForestError::MetaLocked { .. }));
    root.set_meta("unit", json!("em"), true).unwrap();
    assert_eq!(root.meta("unit"), Some(json!("em")));
    root.set_meta("fresh", json!(1), false).unwrap();
}
