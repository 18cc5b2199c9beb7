// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! This example builds a small geometric state tree: a point with bound `x`
//! and `y` children, a filter that clamps coordinates, a derived selector,
//! and a subscription watching the committed values.

use arbor::{Forest, LeafConfig};
use serde_json::{Value, json};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let clamp = |v: Value| match v.as_i64() {
        Some(n) => json!(n.clamp(-100, 100)),
        None => v,
    };

    let forest = Forest::new(
        LeafConfig::new(json!({}))
            .named("point")
            .child("x", LeafConfig::new(0).type_locked().filter(clamp))
            .child("y", LeafConfig::new(0).type_locked().filter(clamp))
            .selector("magnitude", |leaf| {
                let v = leaf.value();
                let x = v["x"].as_i64().unwrap_or(0) as f64;
                let y = v["y"].as_i64().unwrap_or(0) as f64;
                Ok(json!(x.hypot(y)))
            }),
    )?;

    // Every commit prints the settled value; the subscription fires once
    // immediately with the current state.
    let _sub = forest.subscribe(|v| println!("point is now {v}"));

    // Writes to bound keys are delegated to the children, so the clamp
    // filter applies even though we write through the parent.
    forest.set("x", 30)?;
    forest.set("y", 1000)?; // clamped to 100
    println!("magnitude: {}", forest.select_value("magnitude")?);

    // A type-locked child rejects a string, and the whole write unwinds.
    match forest.set("x", "far left") {
        Ok(()) => unreachable!(),
        Err(err) => println!("rejected: {err}"),
    }
    println!("still: {}", forest.value());

    // Container leaves grow `set_<key>` actions for their fields.
    forest.call("set_x", &[json!(-7)])?;
    println!("after set_x action: {}", forest.value());

    Ok(())
}
