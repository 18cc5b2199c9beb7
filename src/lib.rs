// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Arbor: a reactive hierarchical state container
//!
//! This crate provides a tree of named value-holding nodes ("leaves") whose
//! values can be read, written, and observed. Writes are transactional and
//! cascading: a single mutation may fan out across many leaves, down into
//! bound children and up through ancestors, and either the whole cascade
//! commits or the whole cascade rolls back.
//!
//! ## Core concepts
//!
//! - [`Forest`]: one tree; owns the leaf registry and the transaction log.
//!   Independent forests never share state.
//! - [`LeafConfig`]: the construction request for a leaf and, recursively,
//!   its subtree: a value plus optional children, validators, a filter,
//!   actions, and selectors.
//! - [`LeafHandle`]: a cheap reference to one leaf, exposing reads, writes,
//!   action dispatch, and subscription.
//!
//! Values are [`serde_json::Value`]s, so leaves hold scalars, arrays, and
//! objects uniformly. A leaf's **blended value** is its own value with every
//! bound child's value overlaid at the child's key, recursively; the child
//! is always authoritative for its slot.
//!
//! ## Transactions and rollback
//!
//! Every mutation runs inside a named, nestable transaction. Candidate
//! values accumulate as *pendings* tagged with their transaction id; they
//! are finalized only when the outermost transaction unwinds. Any failure
//! (a validator rejecting the new state, a structural error, a user action
//! returning `Err`) purges every pending produced since the failure point
//! across the whole tree and re-propagates the error. The caller can catch
//! it and continue operating on the unmodified tree:
//!
//! ```
//! use arbor::{Forest, LeafConfig};
//! use serde_json::json;
//!
//! let point = Forest::new(
//!     LeafConfig::new(json!({}))
//!         .child("x", LeafConfig::new(0).type_locked())
//!         .child("y", LeafConfig::new(0).type_locked()),
//! )
//! .unwrap();
//!
//! point.set("x", 10).unwrap();
//! // a type-locked child rejects the string; nothing is applied
//! assert!(point.set("y", "forty").is_err());
//! assert_eq!(point.value(), json!({ "x": 10, "y": 0 }));
//! ```
//!
//! Actions compose writes with all-or-nothing semantics:
//!
//! ```
//! use arbor::{Forest, LeafConfig};
//! use serde_json::json;
//!
//! let point = Forest::new(
//!     LeafConfig::new(json!({ "x": 0, "y": 0 })).action("swap", |leaf, _args| {
//!         let v = leaf.value();
//!         leaf.set("x", v["y"].clone())?;
//!         leaf.set("y", v["x"].clone())?;
//!         Ok(serde_json::Value::Null)
//!     }),
//! )
//! .unwrap();
//! point.set("x", 3).unwrap();
//! point.call("swap", &[]).unwrap();
//! assert_eq!(point.value(), json!({ "x": 0, "y": 3 }));
//! ```
//!
//! Container leaves also get an auto-generated `set_<key>` action per field,
//! regenerated whenever a commit changes the value's shape.
//!
//! ## Observation
//!
//! [`LeafHandle::subscribe`] delivers the current committed blended value
//! synchronously, then one emission per commit that touched the leaf,
//! deduplicated by deep equality unless the leaf was configured
//! [`fast`](LeafConfig::fast). [`LeafHandle::select`] narrows a subscription
//! through a projection. Subscribers run strictly after a commit is final:
//! a multi-leaf cascade is fully settled before any subscriber sees a value.
//!
//! ## Scheduling model
//!
//! Everything is synchronous, single-threaded, and cooperative. "Nesting"
//! means logical transaction nesting within one call stack, not threads;
//! handlers run to completion or fail, and there is no suspension point.
//! Handles are deliberately `!Send`.

pub mod error;
pub use error::ForestError;
mod forest;
pub use forest::{Forest, FreezeToken};
mod handle;
pub use handle::LeafHandle;
pub mod leaf;
pub use leaf::{ActionFn, FilterFn, LeafConfig, SelectorFn, Validator};
mod manager;
pub use manager::LeafId;
pub mod store;
pub use store::{Family, Key, Store, StoreError, ValueType};
pub mod stream;
pub use stream::{Observer, Subject, Subscription};

mod actions;
mod handlers;
mod transact;

// re-exported so downstream code can build values without a direct dependency
pub use serde_json;
pub use serde_json::Value;
