// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The tree facade.
//!
//! A [`Forest`] owns one tree: the leaf registry, the transaction log, and
//! the freeze state, all behind a single shared context so that independent
//! trees never interfere. Most methods delegate to the root leaf's handle;
//! [`Forest::root`] and [`LeafHandle::child`] reach the rest of the tree.

use crate::{
    error::ForestError,
    handle::LeafHandle,
    leaf::{self, LeafConfig},
    manager::{LeafId, LeafManager},
    store::Key,
    stream::{Observer, Subscription},
    transact::TransactionLog,
};
use serde_json::Value;
use std::{
    cell::RefCell,
    fmt,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

/// Freeze token values are process-unique, so a token from one tree can
/// never thaw another.
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// The shared, per-tree mutable state.
pub(crate) struct ForestState {
    pub mgr: LeafManager,
    pub log: TransactionLog,
    /// The token value of the active freeze, if any.
    pub frozen: Option<u64>,
}

impl ForestState {
    pub fn ensure_unfrozen(&self) -> Result<(), ForestError> {
        if self.frozen.is_some() {
            return Err(ForestError::Frozen);
        }
        Ok(())
    }
}

/// Proof that the holder froze the tree; required to unfreeze it.
///
/// Deliberately neither `Clone` nor `Copy`: the token is surrendered on
/// unfreeze.
#[derive(Debug)]
pub struct FreezeToken(u64);

/// A reactive hierarchical state tree.
///
/// ```
/// use arbor::{Forest, LeafConfig};
/// use serde_json::json;
///
/// let point = Forest::new(LeafConfig::new(json!({ "x": 0, "y": 0 }))).unwrap();
/// point.set("x", 10).unwrap();
/// assert_eq!(point.value(), json!({ "x": 10, "y": 0 }));
/// ```
pub struct Forest {
    state: Rc<RefCell<ForestState>>,
    root: LeafId,
}

impl fmt::Debug for Forest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forest")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl Forest {
    /// Builds a tree from its root config, recursively constructing and
    /// registering every declared child.
    pub fn new(config: impl Into<LeafConfig>) -> Result<Self, ForestError> {
        let mut state = ForestState {
            mgr: LeafManager::new(),
            log: TransactionLog::new(),
            frozen: None,
        };
        let root = leaf::build(&mut state.mgr, config.into(), None, None)?;
        Ok(Self {
            state: Rc::new(RefCell::new(state)),
            root,
        })
    }

    /// A handle to the root leaf.
    pub fn root(&self) -> LeafHandle {
        LeafHandle::new(Rc::clone(&self.state), self.root)
    }

    /// The root's blended value.
    pub fn value(&self) -> Value {
        self.root().value()
    }

    /// Replaces the root's whole value. See [`LeafHandle::set_value`].
    pub fn set_value(&self, value: impl Into<Value>) -> Result<(), ForestError> {
        self.root().set_value(value)
    }

    /// Replaces one field of the root's value. See [`LeafHandle::set`].
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<(), ForestError> {
        self.root().set(key, value)
    }

    /// Reads the root's blended value at `key`. See [`LeafHandle::get`].
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        self.root().get(key)
    }

    /// Invokes a root action or setter. See [`LeafHandle::call`].
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, ForestError> {
        self.root().call(name, args)
    }

    /// Evaluates a root selector. See [`LeafHandle::select_value`].
    pub fn select_value(&self, name: &str) -> Result<Value, ForestError> {
        self.root().select_value(name)
    }

    /// Resolves the root's child bound at `key`.
    pub fn child(&self, key: impl Into<Key>) -> Option<LeafHandle> {
        self.root().child(key)
    }

    /// Observes the root's committed values. See [`LeafHandle::subscribe`].
    pub fn subscribe(&self, listener: impl FnMut(&Value) + 'static) -> Subscription {
        self.root().subscribe(listener)
    }

    /// Observes a projection of the root's committed values.
    pub fn select(
        &self,
        listener: impl FnMut(&Value) + 'static,
        selector: impl Fn(&Value) -> Value + 'static,
    ) -> Subscription {
        self.root().select(listener, selector)
    }

    /// Forces a validation pass over the whole tree.
    pub fn validate(&self) -> Result<(), ForestError> {
        self.root().validate()
    }

    /// Reads a root annotation. See [`LeafHandle::meta`].
    pub fn meta(&self, key: &str) -> Option<Value> {
        self.root().meta(key)
    }

    /// Attaches a root annotation. See [`LeafHandle::set_meta`].
    pub fn set_meta(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
        force: bool,
    ) -> Result<(), ForestError> {
        self.root().set_meta(key, value, force)
    }

    /// Blocks every mutating operation until [`Forest::unfreeze`] is called
    /// with the returned token.
    pub fn freeze(&self) -> Result<FreezeToken, ForestError> {
        let mut state = self.state.borrow_mut();
        if state.frozen.is_some() {
            return Err(ForestError::Frozen);
        }
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        state.frozen = Some(token);
        Ok(FreezeToken(token))
    }

    /// Lifts the freeze. The token must be the one issued by the matching
    /// [`Forest::freeze`].
    pub fn unfreeze(&self, token: FreezeToken) -> Result<(), ForestError> {
        let mut state = self.state.borrow_mut();
        if state.frozen != Some(token.0) {
            return Err(ForestError::FreezeMismatch);
        }
        state.frozen = None;
        Ok(())
    }

    /// Whether the tree is currently frozen.
    pub fn is_frozen(&self) -> bool {
        self.state.borrow().frozen.is_some()
    }

    /// Observes the transaction log's live membership: the in-flight count
    /// is emitted on every open and close, so `0` marks a commit point.
    pub fn watch_transactions(&self, observer: Observer<usize>) -> Subscription {
        self.state.borrow().log.watch().subscribe(observer)
    }
}
