// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The public per-leaf surface.
//!
//! A [`LeafHandle`] is a cheap, cloneable reference into one tree: the
//! shared tree state plus a [`LeafId`]. All mutation entry points borrow the
//! state only for the duration of the handler chain, so user-supplied
//! actions, selectors, and subscribers can re-enter the tree freely.

use crate::{
    actions,
    error::ForestError,
    forest::ForestState,
    handlers,
    leaf::{self, DispatchEntry, LeafConfig},
    manager::LeafId,
    store::{Family, Key, Store, ValueType},
    stream::{self, Observer, Subject, Subscription},
    transact::TransMeta,
};
use serde_json::Value;
use std::{cell::RefCell, collections::HashSet, rc::Rc};

/// A reference to one leaf of a tree.
pub struct LeafHandle {
    state: Rc<RefCell<ForestState>>,
    id: LeafId,
}

impl Clone for LeafHandle {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            id: self.id,
        }
    }
}

impl LeafHandle {
    pub(crate) fn new(state: Rc<RefCell<ForestState>>, id: LeafId) -> Self {
        Self { state, id }
    }

    /// This leaf's id within its tree.
    pub fn id(&self) -> LeafId {
        self.id
    }

    /// The key-derived or configured name, if any.
    pub fn name(&self) -> Option<String> {
        self.state
            .borrow()
            .mgr
            .leaf(self.id)
            .ok()
            .and_then(|l| l.name.clone())
    }

    /// The blended value: this leaf's own value with every bound child's
    /// value overlaid, recursively.
    pub fn value(&self) -> Value {
        let state = self.state.borrow();
        let last = state.log.last_trans_id();
        state.mgr.blended_value(self.id, last)
    }

    /// Reads the blended value at `key`; a slot bound to a child yields the
    /// child's value.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        let state = self.state.borrow();
        let last = state.log.last_trans_id();
        Store::new(state.mgr.blended_value(self.id, last))
            .get(&key)
            .cloned()
    }

    /// The value held at construction, before any write.
    pub fn original_value(&self) -> Value {
        self.state
            .borrow()
            .mgr
            .leaf(self.id)
            .map(|l| l.original_store.value().clone())
            .unwrap_or(Value::Null)
    }

    /// The (pending-aware) type of this leaf's own value.
    pub fn value_type(&self) -> ValueType {
        self.state
            .borrow()
            .mgr
            .leaf(self.id)
            .map(|l| l.value_type())
            .unwrap_or(ValueType::Null)
    }

    /// The (pending-aware) family of this leaf's own value.
    pub fn family(&self) -> Family {
        self.value_type().family()
    }

    /// Replaces this leaf's whole value, cascading to children and parent.
    ///
    /// Fails atomically: on any validator or handler failure the entire
    /// tree is restored to its pre-call state before the error returns.
    pub fn set_value(&self, value: impl Into<Value>) -> Result<(), ForestError> {
        let value = value.into();
        {
            let mut state = self.state.borrow_mut();
            state.ensure_unfrozen()?;
            handlers::set_leaf_value(&mut state, self.id, value)?;
        }
        commit_if_drained(&self.state);
        Ok(())
    }

    /// Replaces one field of this leaf's value; requires a container-family
    /// leaf. A field bound to a child becomes a write to that child.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<(), ForestError> {
        let (key, value) = (key.into(), value.into());
        {
            let mut state = self.state.borrow_mut();
            state.ensure_unfrozen()?;
            handlers::set_leaf_field(&mut state, self.id, key, value)?;
        }
        commit_if_drained(&self.state);
        Ok(())
    }

    /// Whether `name` is present in the dispatch table.
    pub fn has_action(&self, name: &str) -> bool {
        self.state
            .borrow()
            .mgr
            .leaf(self.id)
            .map(|l| l.dispatch.contains_key(name))
            .unwrap_or(false)
    }

    /// The current dispatch table names, sorted.
    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .borrow()
            .mgr
            .leaf(self.id)
            .map(|l| l.dispatch.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Invokes a registered action or auto-generated setter as a single
    /// all-or-nothing transaction.
    ///
    /// On failure, every leaf mutation performed since the action started is
    /// purged across the whole tree before the error returns, however deep
    /// the cascade went.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, ForestError> {
        let entry = {
            let state = self.state.borrow();
            state.ensure_unfrozen()?;
            state.mgr.leaf(self.id)?.dispatch.get(name).cloned()
        }
        .ok_or_else(|| ForestError::UnknownAction {
            id: self.id,
            name: name.to_string(),
        })?;

        let trans_id = {
            let mut state = self.state.borrow_mut();
            let starting = state.log.last_trans_id();
            state.log.begin("doAction", TransMeta::StartingId(starting))
        };

        let result = match entry {
            DispatchEntry::Setter(key) => {
                let value = args.first().cloned().unwrap_or(Value::Null);
                self.set(key, value).map(|()| Value::Null)
            }
            DispatchEntry::Action(action) => action(self, args),
        };

        match result {
            Ok(value) => {
                self.state.borrow_mut().log.end(trans_id);
                commit_if_drained(&self.state);
                Ok(value)
            }
            Err(e) => {
                let mut state = self.state.borrow_mut();
                // the starting id travels in the transaction's metadata
                if let Some(starting) = state.log.starting_id(trans_id) {
                    state.mgr.purge_after(starting);
                }
                state.log.end(trans_id);
                Err(e)
            }
        }
    }

    /// Evaluates a registered read-only selector.
    pub fn select_value(&self, name: &str) -> Result<Value, ForestError> {
        let selector = self
            .state
            .borrow()
            .mgr
            .leaf(self.id)?
            .selectors
            .get(name)
            .cloned()
            .ok_or_else(|| ForestError::UnknownSelector {
                id: self.id,
                name: name.to_string(),
            })?;
        selector(self)
    }

    /// Resolves the child bound at `key`, if any.
    pub fn child(&self, key: impl Into<Key>) -> Option<LeafHandle> {
        let key = key.into();
        let child_id = self.state.borrow().mgr.leaf(self.id).ok()?.child_at(&key)?;
        Some(LeafHandle::new(Rc::clone(&self.state), child_id))
    }

    /// Constructs a new child subtree and binds it at `key`, replacing any
    /// existing binding there (the previous child stays registered but
    /// orphaned).
    pub fn add_child(
        &self,
        key: impl Into<Key>,
        config: impl Into<LeafConfig>,
    ) -> Result<LeafHandle, ForestError> {
        let key = key.into();
        let child_id = {
            let mut state = self.state.borrow_mut();
            state.ensure_unfrozen()?;
            {
                let leaf = state.mgr.leaf(self.id)?;
                if leaf.family() != Family::Container {
                    return Err(ForestError::NotAContainer {
                        id: self.id,
                        type_name: leaf.value_type().name(),
                    });
                }
            }
            let child_id = leaf::build(&mut state.mgr, config.into(), Some(self.id), Some(&key))?;
            let leaf = state.mgr.try_leaf_mut(self.id)?;
            leaf.child_keys.retain(|(_, k)| *k != key);
            leaf.child_keys.push((child_id, key));
            leaf.cache.replace(None);
            actions::update_do(leaf);
            // bump the change counter so ancestor blend caches miss
            let trans_id = state.log.begin("addChild", TransMeta::None);
            state.log.end(trans_id);
            child_id
        };
        Ok(LeafHandle::new(Rc::clone(&self.state), child_id))
    }

    /// Deletes the binding at `key`. The detached child remains in the
    /// registry, orphaned. Returns whether a binding was removed.
    pub fn remove_child(&self, key: impl Into<Key>) -> Result<bool, ForestError> {
        let key = key.into();
        let mut state = self.state.borrow_mut();
        state.ensure_unfrozen()?;
        let leaf = state.mgr.try_leaf_mut(self.id)?;
        let before = leaf.child_keys.len();
        leaf.child_keys.retain(|(_, k)| *k != key);
        let removed = leaf.child_keys.len() != before;
        if removed {
            leaf.cache.replace(None);
            actions::update_do(leaf);
            let trans_id = state.log.begin("removeChild", TransMeta::None);
            state.log.end(trans_id);
        }
        Ok(removed)
    }

    /// Observes committed values: the current blended value is delivered
    /// synchronously on subscription, then one emission per commit that
    /// touched this leaf. Unless the leaf is `fast`, emissions deep-equal to
    /// the previous one are dropped.
    pub fn subscribe(&self, listener: impl FnMut(&Value) + 'static) -> Subscription {
        self.observe(Observer::new(listener), None)
    }

    /// Like [`LeafHandle::subscribe`] with explicit error/complete hooks.
    pub fn subscribe_observer(&self, observer: Observer<Value>) -> Subscription {
        self.observe(observer, None)
    }

    /// Observes a projection of the committed value, deduplicated on the
    /// projected value.
    pub fn select(
        &self,
        listener: impl FnMut(&Value) + 'static,
        selector: impl Fn(&Value) -> Value + 'static,
    ) -> Subscription {
        self.observe(Observer::new(listener), Some(Box::new(selector)))
    }

    fn observe(
        &self,
        observer: Observer<Value>,
        selector: Option<Box<dyn Fn(&Value) -> Value>>,
    ) -> Subscription {
        let (subject, fast, current) = {
            let state = self.state.borrow();
            let Ok(leaf) = state.mgr.leaf(self.id) else {
                return Subscription::empty();
            };
            let last = state.log.last_trans_id();
            (
                leaf.subject.clone(),
                leaf.fast,
                state.mgr.blended_value(self.id, last),
            )
        };
        let staged = if fast {
            observer
        } else {
            stream::distinct_until_changed(observer)
        };
        let mut staged = match selector {
            Some(selector) => stream::map(move |value: &Value| selector(value), staged),
            None => staged,
        };
        staged.notify(&current);
        subject.subscribe(staged)
    }

    /// Forces a validation pass over this leaf's subtree and ancestors.
    pub fn validate(&self) -> Result<(), ForestError> {
        let state = self.state.borrow();
        let mut visited: HashSet<LeafId, ahash::RandomState> = HashSet::default();
        state
            .mgr
            .validate_leaf(self.id, &mut visited, true, state.log.last_trans_id())
    }

    /// Reads an out-of-band annotation.
    pub fn meta(&self, key: &str) -> Option<Value> {
        self.state
            .borrow()
            .mgr
            .leaf(self.id)
            .ok()
            .and_then(|l| l.meta.get(key).cloned())
    }

    /// Attaches an out-of-band annotation. Write-once: re-writing an
    /// existing key fails unless `force` is set.
    pub fn set_meta(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
        force: bool,
    ) -> Result<(), ForestError> {
        let key = key.into();
        let mut state = self.state.borrow_mut();
        let id = self.id;
        let leaf = state.mgr.try_leaf_mut(id)?;
        if !force && leaf.meta.contains_key(&key) {
            return Err(ForestError::MetaLocked { id, key });
        }
        leaf.meta.insert(key, value.into());
        Ok(())
    }
}

/// Finalizes pending writes and notifies subscribers, if and only if the
/// transaction log has drained to empty.
///
/// Emission happens with the tree unborrowed, so subscribers may read values
/// or dispatch follow-up writes.
pub(crate) fn commit_if_drained(state: &Rc<RefCell<ForestState>>) {
    let emissions: Vec<(Subject<Value>, Value)> = {
        let mut st = state.borrow_mut();
        if !st.log.is_drained() {
            return;
        }
        let committed = st.mgr.commit_pending();
        if committed.is_empty() {
            return;
        }
        let last = st.log.last_trans_id();
        committed
            .into_iter()
            .filter_map(|id| {
                let value = st.mgr.blended_value(id, last);
                st.mgr.leaf(id).ok().map(|l| (l.subject.clone(), value))
            })
            .collect()
    };
    for (subject, value) in emissions {
        subject.emit(&value);
    }
}
