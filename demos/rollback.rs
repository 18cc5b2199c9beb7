// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! This example demonstrates transactional rollback: a composite action that
//! fails midway leaves the tree exactly as it found it, while an action that
//! catches inner failures keeps its successful writes.

use arbor::{Forest, ForestError, LeafConfig, Validator};
use serde_json::json;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let forest = Forest::new(
        LeafConfig::new(json!({}))
            .child("x", 0)
            .child("y", 0)
            .child(
                "z",
                LeafConfig::new(0).validator(Validator::func(|v| {
                    if v.is_i64() {
                        Ok(())
                    } else {
                        Err("z only holds integers".into())
                    }
                })),
            )
            // all-or-nothing: any failing write unwinds the whole action
            .action("set_xyz", |leaf, args| {
                leaf.set("x", args[0].clone())?;
                leaf.set("y", args[1].clone())?;
                leaf.set("z", args[2].clone())?;
                Ok(json!(null))
            })
            // best-effort: failures are caught per write and skipped
            .action("set_xyz_lenient", |leaf, args| {
                let mut applied = 0;
                for (key, value) in ["x", "y", "z"].iter().zip(args) {
                    if leaf.set(*key, value.clone()).is_ok() {
                        applied += 1;
                    }
                }
                Ok(json!(applied))
            }),
    )?;

    forest.call("set_xyz", &[json!(1), json!(2), json!(3)])?;
    println!("after set_xyz:           {}", forest.value());

    // The third write violates z's validator. x and y had already been
    // written inside the action, but the rollback purges them too.
    let err = forest
        .call("set_xyz", &[json!(10), json!(20), json!("thirty")])
        .unwrap_err();
    println!("set_xyz failed:          {err}");
    println!("unchanged:               {}", forest.value());
    assert_eq!(forest.value(), json!({ "x": 1, "y": 2, "z": 3 }));

    // The lenient variant catches the failure itself, so only the bad
    // write is dropped.
    let applied = forest
        .call("set_xyz_lenient", &[json!(10), json!(20), json!("thirty")])
        .unwrap();
    println!("lenient applied {applied}:        {}", forest.value());
    assert_eq!(forest.value(), json!({ "x": 10, "y": 20, "z": 3 }));

    // Freezing blocks all mutation until the caller presents the token.
    let token = forest.freeze()?;
    match forest.set("x", 0) {
        Err(ForestError::Frozen) => println!("frozen, write refused"),
        other => println!("unexpected: {other:?}"),
    }
    forest.unfreeze(token)?;
    forest.set("x", 0)?;
    println!("thawed and writable:     {}", forest.value());

    Ok(())
}
