// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Tests for validation failures, rollback, and the freeze gate.
//!
//! A rejected write must leave the whole tree exactly as it was, no matter
//! how far the cascade had already propagated.

use arbor::{Forest, ForestError, LeafConfig, Validator, ValueType};
use quickcheck_macros::quickcheck;
use serde_json::{Value, json};

#[test]
fn type_locked_leaves_reject_other_types() {
    let forest = Forest::new(LeafConfig::new(0).type_locked()).unwrap();
    forest.set_value(7).unwrap();
    let err = forest.set_value("seven").unwrap_err();
    assert!(matches!(err, ForestError::Validation { .. }));
    assert_eq!(forest.value(), json!(7));
}

#[test]
fn types_validator_accepts_any_listed_type() {
    let forest = Forest::new(
        LeafConfig::new(0).validator(Validator::Types(vec![
            ValueType::Number,
            ValueType::Null,
        ])),
    )
    .unwrap();
    forest.set_value(Value::Null).unwrap();
    forest.set_value(3).unwrap();
    assert!(forest.set_value(true).is_err());
    assert_eq!(forest.value(), json!(3));
}

#[test]
fn function_validators_see_the_candidate_value() {
    let forest = Forest::new(LeafConfig::new(50).validator(Validator::func(|v| {
        match v.as_i64() {
            Some(n) if (0..=100).contains(&n) => Ok(()),
            _ => Err("out of range".into()),
        }
    })))
    .unwrap();

    forest.set_value(100).unwrap();
    let err = forest.set_value(101).unwrap_err();
    match err {
        ForestError::Validation { message, .. } => assert_eq!(message, "out of range"),
        other => panic!("expected validation error, got {other}"),
    }
    assert_eq!(forest.value(), json!(100));
}

#[test]
fn child_rejection_rolls_back_the_parent_write() {
    let forest = Forest::new(
        LeafConfig::new(json!({}))
            .child("x", LeafConfig::new(0).type_locked())
            .child("y", LeafConfig::new(0).type_locked()),
    )
    .unwrap();

    // the cascade reaches x before y rejects; both must revert
    let err = forest
        .set_value(json!({ "x": 1, "y": "not a number" }))
        .unwrap_err();
    assert!(matches!(err, ForestError::Validation { .. }));
    assert_eq!(forest.value(), json!({ "x": 0, "y": 0 }));
}

#[test]
fn parent_validator_vetoes_child_writes() {
    let forest = Forest::new(
        LeafConfig::new(json!({}))
            .child("lo", 0)
            .child("hi", 10)
            .validator(Validator::func(|v| {
                let lo = v["lo"].as_i64().unwrap_or(0);
                let hi = v["hi"].as_i64().unwrap_or(0);
                if lo <= hi { Ok(()) } else { Err("lo exceeds hi".into()) }
            })),
    )
    .unwrap();

    forest.child("lo").unwrap().set_value(5).unwrap();
    // the child write is locally fine but breaks the parent invariant
    let err = forest.child("lo").unwrap().set_value(50).unwrap_err();
    assert!(matches!(err, ForestError::Validation { .. }));
    assert_eq!(forest.value(), json!({ "lo": 5, "hi": 10 }));
}

#[test]
fn explicit_validate_checks_the_committed_state() {
    let forest = Forest::new(json!({ "n": 1 })).unwrap();
    forest.validate().unwrap();
}

#[test]
fn frozen_trees_reject_writes_until_unfrozen() {
    let forest = Forest::new(json!({ "n": 0 })).unwrap();
    let token = forest.freeze().unwrap();
    assert!(forest.is_frozen());

    assert!(matches!(
        forest.set("n", 1).unwrap_err(),
        ForestError::Frozen
    ));
    assert!(matches!(forest.freeze().unwrap_err(), ForestError::Frozen));
    // reads stay available
    assert_eq!(forest.value(), json!({ "n": 0 }));

    forest.unfreeze(token).unwrap();
    assert!(!forest.is_frozen());
    forest.set("n", 1).unwrap();
    assert_eq!(forest.value(), json!({ "n": 1 }));
}

#[test]
fn unfreeze_requires_the_matching_token() {
    let a = Forest::new(json!(1)).unwrap();
    let b = Forest::new(json!(1)).unwrap();
    let _token_a = a.freeze().unwrap();
    let token_b = b.freeze().unwrap();

    assert!(matches!(
        a.unfreeze(token_b).unwrap_err(),
        ForestError::FreezeMismatch
    ));
    assert!(a.is_frozen());
}

#[test]
fn frozen_trees_reject_actions() {
    let forest = Forest::new(
        LeafConfig::new(json!({ "n": 0 })).action("bump", |leaf, _| {
            let n = leaf.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
            leaf.set("n", n + 1)?;
            Ok(json!(null))
        }),
    )
    .unwrap();
    let _token = forest.freeze().unwrap();
    assert!(forest.call("bump", &[]).is_err());
    assert_eq!(forest.value(), json!({ "n": 0 }));
}

/// Interleaving valid and invalid writes in any order always leaves the leaf
/// holding the last valid write.
#[quickcheck]
fn last_valid_write_wins(writes: Vec<Result<i64, bool>>) -> bool {
    let forest = match Forest::new(LeafConfig::new(0).type_locked()) {
        Ok(f) => f,
        Err(_) => return false,
    };
    let mut expected = json!(0);
    for write in writes {
        match write {
            Ok(n) => {
                if forest.set_value(n).is_err() {
                    return false;
                }
                expected = json!(n);
            }
            Err(b) => {
                // a bool violates the number lock and must not stick
                if forest.set_value(b).is_ok() {
                    return false;
                }
            }
        }
    }
    forest.value() == expected
}
