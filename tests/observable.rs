// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Tests for the subscription surface: initial delivery, commit-coupled
//! emission, deduplication, projections, and transaction watching.

use arbor::{Forest, LeafConfig, Observer};
use serde_json::{Value, json};
use std::{cell::RefCell, rc::Rc};

/// Collects every emission for later assertions.
fn recorder() -> (Rc<RefCell<Vec<Value>>>, impl FnMut(&Value) + 'static) {
    let seen: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    (seen, move |v: &Value| sink.borrow_mut().push(v.clone()))
}

#[test]
fn subscribe_delivers_the_current_value_synchronously() {
    let forest = Forest::new(json!({ "n": 1 })).unwrap();
    let (seen, listener) = recorder();
    let _sub = forest.subscribe(listener);
    assert_eq!(*seen.borrow(), vec![json!({ "n": 1 })]);
}

#[test]
fn each_commit_emits_once() {
    let forest = Forest::new(json!({ "n": 0 })).unwrap();
    let (seen, listener) = recorder();
    let _sub = forest.subscribe(listener);

    forest.set("n", 1).unwrap();
    forest.set("n", 2).unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![json!({ "n": 0 }), json!({ "n": 1 }), json!({ "n": 2 })]
    );
}

#[test]
fn composite_actions_emit_a_single_settled_value() {
    let forest = Forest::new(
        LeafConfig::new(json!({ "x": 0, "y": 0 })).action("set_both", |leaf, args| {
            leaf.set("x", args[0].clone())?;
            leaf.set("y", args[1].clone())?;
            Ok(json!(null))
        }),
    )
    .unwrap();
    let (seen, listener) = recorder();
    let _sub = forest.subscribe(listener);

    forest.call("set_both", &[json!(1), json!(2)]).unwrap();
    // no intermediate { x: 1, y: 0 } is ever observable
    assert_eq!(
        *seen.borrow(),
        vec![json!({ "x": 0, "y": 0 }), json!({ "x": 1, "y": 2 })]
    );
}

#[test]
fn equal_values_are_deduplicated() {
    let forest = Forest::new(json!({ "n": 5 })).unwrap();
    let (seen, listener) = recorder();
    let _sub = forest.subscribe(listener);

    forest.set("n", 5).unwrap();
    forest.set("n", 6).unwrap();
    forest.set("n", 6).unwrap();
    assert_eq!(*seen.borrow(), vec![json!({ "n": 5 }), json!({ "n": 6 })]);
}

#[test]
fn fast_leaves_skip_deduplication() {
    let forest = Forest::new(LeafConfig::new(json!({ "n": 5 })).fast()).unwrap();
    let (seen, listener) = recorder();
    let _sub = forest.subscribe(listener);

    forest.set("n", 5).unwrap();
    forest.set("n", 5).unwrap();
    assert_eq!(seen.borrow().len(), 3);
}

#[test]
fn select_deduplicates_on_the_projection() {
    let forest = Forest::new(json!({ "x": 0, "y": 0 })).unwrap();
    let (seen, listener) = recorder();
    let _sub = forest.select(listener, |v| v["x"].clone());

    forest.set("y", 1).unwrap(); // projection unchanged, dropped
    forest.set("x", 7).unwrap();
    forest.set("y", 2).unwrap(); // dropped again
    assert_eq!(*seen.borrow(), vec![json!(0), json!(7)]);
}

#[test]
fn child_subscriptions_see_parent_writes_to_their_slot() {
    let forest = Forest::new(LeafConfig::new(json!({})).child("x", 0)).unwrap();
    let x = forest.child("x").unwrap();
    let (seen, listener) = recorder();
    let _sub = x.subscribe(listener);

    forest.set("x", 9).unwrap();
    assert_eq!(*seen.borrow(), vec![json!(0), json!(9)]);
}

#[test]
fn parent_subscriptions_see_child_writes() {
    let forest = Forest::new(LeafConfig::new(json!({})).child("x", 0)).unwrap();
    let (seen, listener) = recorder();
    let _sub = forest.subscribe(listener);

    forest.child("x").unwrap().set_value(3).unwrap();
    assert_eq!(*seen.borrow(), vec![json!({ "x": 0 }), json!({ "x": 3 })]);
}

#[test]
fn untouched_siblings_stay_silent() {
    let forest = Forest::new(
        LeafConfig::new(json!({})).child("x", 0).child("y", 0),
    )
    .unwrap();
    let y = forest.child("y").unwrap();
    let (seen, listener) = recorder();
    let _sub = y.subscribe(listener);

    forest.set("x", 5).unwrap();
    // only the initial delivery; y never committed anything
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn unsubscribe_stops_delivery() {
    let forest = Forest::new(json!({ "n": 0 })).unwrap();
    let (seen, listener) = recorder();
    let sub = forest.subscribe(listener);

    forest.set("n", 1).unwrap();
    sub.unsubscribe();
    forest.set("n", 2).unwrap();
    assert_eq!(*seen.borrow(), vec![json!({ "n": 0 }), json!({ "n": 1 })]);
}

#[test]
fn rolled_back_writes_never_reach_subscribers() {
    let forest = Forest::new(
        LeafConfig::new(json!({ "n": 0 })).action("fail", |leaf, _| {
            leaf.set("n", 42)?;
            Err(arbor::ForestError::Action("refused".into()))
        }),
    )
    .unwrap();
    let (seen, listener) = recorder();
    let _sub = forest.subscribe(listener);

    assert!(forest.call("fail", &[]).is_err());
    assert_eq!(*seen.borrow(), vec![json!({ "n": 0 })]);
}

#[test]
fn a_panicking_subscriber_does_not_poison_the_tree() {
    let forest = Forest::new(json!({ "n": 0 })).unwrap();
    let _bad = forest.subscribe(|_v| panic!("listener bug"));
    let (seen, listener) = recorder();
    let _good = forest.subscribe(listener);

    forest.set("n", 1).unwrap();
    forest.set("n", 2).unwrap();
    assert_eq!(seen.borrow().len(), 3);
}

#[test]
fn subscribers_may_reenter_the_tree() {
    let forest = Forest::new(json!({ "n": 1 })).unwrap();
    let reads: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&reads);
    let reader = forest.root();
    let _sub = forest.subscribe(move |_v| {
        // reading back through a handle mid-emission must not deadlock
        sink.borrow_mut().push(reader.value());
    });

    forest.set("n", 2).unwrap();
    assert_eq!(*reads.borrow(), vec![json!({ "n": 1 }), json!({ "n": 2 })]);
}

#[test]
fn watch_transactions_reports_the_drain() {
    let forest = Forest::new(json!({ "n": 0 })).unwrap();
    let depths: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&depths);
    let _sub =
        forest.watch_transactions(Observer::new(move |d: &usize| sink.borrow_mut().push(*d)));

    forest.set("n", 1).unwrap();
    let seen = depths.borrow().clone();
    assert!(!seen.is_empty());
    assert_eq!(*seen.last().unwrap(), 0);
    assert!(seen.iter().any(|d| *d > 0));
}
