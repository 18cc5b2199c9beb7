// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The per-tree leaf registry and pending-write bookkeeping.
//!
//! All leaves of one tree live in a single [`LeafManager`], keyed by
//! [`LeafId`]; parent/child links are ids resolved through it on demand, so
//! no leaf ever owns another. The manager also tracks which leaves carry
//! uncommitted pendings, finalizes them when the transaction log drains, and
//! unwinds them across the whole tree for a rollback. Centralizing that here
//! is what lets a single rollback point correctly undo changes fanned out
//! over many leaves by one top-level write.

use crate::{
    error::ForestError,
    leaf::{Leaf, ValueCache},
    store::{Store, StoreError},
};
use serde_json::Value;
use std::{collections::HashMap, collections::HashSet, fmt};

/// The identity of a leaf within its tree.
///
/// Ids are allocated by the registry and never reused; they are plain
/// indices, not owning references.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeafId(pub(crate) u64);

impl fmt::Display for LeafId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "leaf-{}", self.0)
    }
}

pub(crate) struct LeafManager {
    leaves: HashMap<LeafId, Leaf, ahash::RandomState>,
    /// Ids with at least one uncommitted pending, in first-marked order.
    pending_ids: Vec<LeafId>,
    next_id: u64,
}

impl LeafManager {
    pub fn new() -> Self {
        Self {
            leaves: HashMap::default(),
            pending_ids: Vec::new(),
            next_id: 0,
        }
    }

    pub fn allocate_id(&mut self) -> LeafId {
        let id = LeafId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Registers by id; on collision the newcomer wins.
    pub fn add_leaf(&mut self, leaf: Leaf) {
        self.leaves.insert(leaf.id, leaf);
    }

    pub fn contains(&self, id: LeafId) -> bool {
        self.leaves.contains_key(&id)
    }

    pub fn leaf(&self, id: LeafId) -> Result<&Leaf, ForestError> {
        self.leaves.get(&id).ok_or(ForestError::LeafNotFound(id))
    }

    pub fn leaf_mut(&mut self, id: LeafId) -> Option<&mut Leaf> {
        self.leaves.get_mut(&id)
    }

    pub fn try_leaf_mut(&mut self, id: LeafId) -> Result<&mut Leaf, ForestError> {
        self.leaves
            .get_mut(&id)
            .ok_or(ForestError::LeafNotFound(id))
    }

    pub fn mark_pending(&mut self, id: LeafId) {
        if !self.pending_ids.contains(&id) {
            self.pending_ids.push(id);
        }
    }

    /// Finalizes every pending leaf's newest pending store as its committed
    /// store and clears the pending set.
    ///
    /// Leaves whose committed type changed get their setter table
    /// regenerated here. Returns the ids that were committed, in
    /// first-marked order, for notification.
    pub fn commit_pending(&mut self) -> Vec<LeafId> {
        let ids = std::mem::take(&mut self.pending_ids);
        for id in &ids {
            if let Some(leaf) = self.leaves.get_mut(id) {
                let shape_changed = leaf.commit_pending();
                if shape_changed {
                    crate::actions::update_do(leaf);
                }
            }
        }
        ids
    }

    /// Rollback for a failed transaction: drops every pending produced at or
    /// after `trans_id`, across the whole tree.
    pub fn purge_pending(&mut self, trans_id: u64) {
        self.retain_pendings(|leaf| !leaf.purge_at_or_after(trans_id));
    }

    /// Rollback for a failed composite action: drops every pending produced
    /// after the action's starting transaction id.
    pub fn purge_after(&mut self, starting_id: u64) {
        self.retain_pendings(|leaf| !leaf.purge_after(starting_id));
    }

    fn retain_pendings(&mut self, mut keep: impl FnMut(&mut Leaf) -> bool) {
        let mut still_pending = Vec::with_capacity(self.pending_ids.len());
        for id in std::mem::take(&mut self.pending_ids) {
            if let Some(leaf) = self.leaves.get_mut(&id)
                && keep(leaf)
            {
                still_pending.push(id);
            }
        }
        self.pending_ids = still_pending;
        // values may have reverted under any cached blend
        self.clear_caches();
    }

    fn clear_caches(&mut self) {
        for leaf in self.leaves.values_mut() {
            leaf.cache.replace(None);
        }
    }

    /// The blended value of `id`: its own (pending-aware) value overlaid,
    /// per child binding, with the child's blended value, recursively.
    ///
    /// Cached per leaf keyed on the global transaction counter, so repeated
    /// reads between writes cost one clone. If the leaf's own value has
    /// dropped to a scalar while children are still bound, the bindings lie
    /// dormant and the scalar wins until the value is a container again.
    pub fn blended_value(&self, id: LeafId, last_trans_id: u64) -> Value {
        let Some(leaf) = self.leaves.get(&id) else {
            return Value::Null;
        };
        if !leaf.has_children() {
            return leaf.local_value().clone();
        }
        if let Some(cache) = leaf.cache.borrow().as_ref()
            && cache.last_trans_id == last_trans_id
        {
            return cache.value.clone();
        }
        let mut store: Store = leaf.current_store().clone();
        for (child_id, key) in leaf.child_keys.clone() {
            if self.contains(child_id) {
                let child_value = self.blended_value(child_id, last_trans_id);
                match store.set(&key, child_value) {
                    Ok(()) => {}
                    // a mis-kinded binding skips its own slot only; the
                    // remaining bindings still overlay
                    Err(StoreError::KeyMismatch { .. }) => continue,
                    // scalar holds no fields; stop overlaying
                    Err(StoreError::NotAContainer { .. }) => break,
                }
            }
        }
        let value = store.into_value();
        leaf.cache.replace(Some(ValueCache {
            last_trans_id,
            value: value.clone(),
        }));
        value
    }

    /// Runs the validation sweep over every pending leaf: descendants first,
    /// then the leaf itself, then its ancestor chain, each leaf's validators
    /// at most once per pass.
    pub fn validate_pending(&self, last_trans_id: u64) -> Result<(), ForestError> {
        let mut visited: HashSet<LeafId, ahash::RandomState> = HashSet::default();
        for id in self.pending_ids.clone() {
            self.validate_leaf(id, &mut visited, true, last_trans_id)?;
        }
        Ok(())
    }

    /// Validates one leaf and, when `downward`, its whole subtree, then
    /// continues up through its ancestors.
    pub fn validate_leaf(
        &self,
        id: LeafId,
        visited: &mut HashSet<LeafId, ahash::RandomState>,
        downward: bool,
        last_trans_id: u64,
    ) -> Result<(), ForestError> {
        if !visited.insert(id) {
            return Ok(());
        }
        let leaf = self.leaf(id)?;
        if downward {
            for (child_id, _) in leaf.child_keys.clone() {
                if self.contains(child_id) {
                    self.validate_leaf(child_id, visited, true, last_trans_id)?;
                }
            }
        }
        if !leaf.validators.is_empty() {
            let blended = self.blended_value(id, last_trans_id);
            for validator in &leaf.validators {
                validator.run(id, &blended)?;
            }
        }
        if let Some(parent_id) = leaf.parent_id
            && self.contains(parent_id)
        {
            self.validate_leaf(parent_id, visited, false, last_trans_id)?;
        }
        Ok(())
    }
}
