// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Forward/rollback handler pairs for every mutating operation.
//!
//! Each handler opens a named transaction, runs its forward body, and closes
//! the transaction whether the body succeeded or failed. On failure the
//! paired rollback drops every pending produced at or after the failing
//! transaction id, across the whole tree, then propagates the original error
//! unchanged. No error is ever absorbed on this path.
//!
//! Handlers never touch a store belonging to another leaf directly; all
//! cross-leaf effects go through nested dispatch here, which is what keeps
//! every mutation reversible by transaction id.

use crate::{
    error::ForestError,
    forest::ForestState,
    manager::LeafId,
    store::{Family, Key, Store},
    transact::TransMeta,
};
use serde_json::Value;

/// Whole-value replace: the `leaf.value = x` entry point.
pub(crate) fn set_leaf_value(
    state: &mut ForestState,
    id: LeafId,
    value: Value,
) -> Result<(), ForestError> {
    let trans_id = state.log.begin("setLeafValue", TransMeta::None);
    let result = update(state, id, value, false)
        .and_then(|()| state.mgr.validate_pending(state.log.last_trans_id()));
    state.log.end(trans_id);
    if let Err(e) = result {
        state.mgr.purge_pending(trans_id);
        return Err(e);
    }
    Ok(())
}

/// Single-field replace: the `leaf.set(key, x)` entry point. Requires a
/// container-family leaf.
pub(crate) fn set_leaf_field(
    state: &mut ForestState,
    id: LeafId,
    key: Key,
    value: Value,
) -> Result<(), ForestError> {
    {
        let leaf = state.mgr.leaf(id)?;
        if leaf.family() != Family::Container {
            return Err(ForestError::NotAContainer {
                id,
                type_name: leaf.value_type().name(),
            });
        }
    }
    let trans_id = state.log.begin("setLeafFieldValue", TransMeta::None);
    let result = update_field(state, id, key, value, false)
        .and_then(|()| state.mgr.validate_pending(state.log.last_trans_id()));
    state.log.end(trans_id);
    if let Err(e) = result {
        state.mgr.purge_pending(trans_id);
        return Err(e);
    }
    Ok(())
}

/// Replaces a leaf's own value: filter, push pending, share downward to
/// children, then (unless the write came from the parent) reflect upward.
pub(crate) fn update(
    state: &mut ForestState,
    id: LeafId,
    value: Value,
    from_parent: bool,
) -> Result<(), ForestError> {
    let trans_id = state.log.begin("update", TransMeta::None);
    let result = update_inner(state, id, value, from_parent, trans_id);
    state.log.end(trans_id);
    if let Err(e) = result {
        state.mgr.purge_pending(trans_id);
        return Err(e);
    }
    Ok(())
}

fn update_inner(
    state: &mut ForestState,
    id: LeafId,
    value: Value,
    from_parent: bool,
    trans_id: u64,
) -> Result<(), ForestError> {
    let filter = state.mgr.leaf(id)?.filter.clone();
    let filtered = match filter {
        Some(f) => f(value),
        None => value,
    };
    let parent_id = {
        let leaf = state.mgr.try_leaf_mut(id)?;
        leaf.push_pending(Store::new(filtered), trans_id);
        leaf.parent_id
    };
    state.mgr.mark_pending(id);
    share_child_values(state, id)?;
    if !from_parent
        && let Some(parent_id) = parent_id
        && state.mgr.contains(parent_id)
    {
        update_from_child(state, parent_id, id)?;
    }
    Ok(())
}

/// Pushes the newly asserted value down into every bound child whose slot is
/// present and whose value would actually change.
///
/// The change comparison is made on post-filter values: the candidate is run
/// through the child's own filter before being compared against the child's
/// current blended value.
fn share_child_values(state: &mut ForestState, id: LeafId) -> Result<(), ForestError> {
    let candidates: Vec<(LeafId, Value)> = {
        let leaf = state.mgr.leaf(id)?;
        let store = leaf.current_store();
        leaf.child_keys
            .iter()
            .filter_map(|(child_id, key)| store.get(key).map(|v| (*child_id, v.clone())))
            .collect()
    };
    for (child_id, candidate) in candidates {
        if !state.mgr.contains(child_id) {
            continue;
        }
        let child_filter = state.mgr.leaf(child_id)?.filter.clone();
        let filtered = match &child_filter {
            Some(f) => f(candidate.clone()),
            None => candidate.clone(),
        };
        let current = state
            .mgr
            .blended_value(child_id, state.log.last_trans_id());
        if !Store::same_values(&current, &filtered) {
            update(state, child_id, candidate, true)?;
        }
    }
    Ok(())
}

/// Replaces one field of a leaf's own value, or, when the field is bound to
/// a child, delegates the write wholly to that child.
pub(crate) fn update_field(
    state: &mut ForestState,
    id: LeafId,
    key: Key,
    value: Value,
    from_child: bool,
) -> Result<(), ForestError> {
    let trans_id = state.log.begin("updateFieldValue", TransMeta::None);
    let result = update_field_inner(state, id, key, value, from_child, trans_id);
    state.log.end(trans_id);
    if let Err(e) = result {
        state.mgr.purge_pending(trans_id);
        return Err(e);
    }
    Ok(())
}

fn update_field_inner(
    state: &mut ForestState,
    id: LeafId,
    key: Key,
    value: Value,
    from_child: bool,
    trans_id: u64,
) -> Result<(), ForestError> {
    let (bound_child, parent_id) = {
        let leaf = state.mgr.leaf(id)?;
        (leaf.child_at(&key), leaf.parent_id)
    };
    if !from_child
        && let Some(child_id) = bound_child
        && state.mgr.contains(child_id)
    {
        // the field write becomes a child write; the child is authoritative.
        // Its settled value is then reflected back into this leaf's own
        // store, which also continues the climb toward the root.
        update(state, child_id, value, true)?;
        return update_from_child(state, id, child_id);
    }
    // a reflection from a child (`from_child`) always lands here, in this
    // leaf's own store, even when the key is bound
    let mut store = state.mgr.leaf(id)?.current_store().clone();
    store.set(&key, value)?;
    let leaf = state.mgr.try_leaf_mut(id)?;
    leaf.push_pending(store, trans_id);
    state.mgr.mark_pending(id);
    if !from_child
        && let Some(parent_id) = parent_id
        && state.mgr.contains(parent_id)
    {
        update_from_child(state, parent_id, id)?;
    }
    Ok(())
}

/// Reflects a child's new blended value into its parent's own store, then
/// recurses toward the root. This is the only upward propagation path.
pub(crate) fn update_from_child(
    state: &mut ForestState,
    parent_id: LeafId,
    child_id: LeafId,
) -> Result<(), ForestError> {
    let trans_id = state.log.begin("updateFromChild", TransMeta::None);
    let result = update_from_child_inner(state, parent_id, child_id);
    state.log.end(trans_id);
    // no rollback of its own: the triggering handler's purge covers this id
    result
}

fn update_from_child_inner(
    state: &mut ForestState,
    parent_id: LeafId,
    child_id: LeafId,
) -> Result<(), ForestError> {
    if !state.mgr.contains(parent_id) || !state.mgr.contains(child_id) {
        return Ok(());
    }
    // an unbound (orphaned) child reflects nothing, and ends the climb
    let Some(key) = state.mgr.leaf(parent_id)?.key_of(child_id).cloned() else {
        return Ok(());
    };
    let child_value = state
        .mgr
        .blended_value(child_id, state.log.last_trans_id());
    update_field(state, parent_id, key, child_value, true)?;
    let grandparent = state.mgr.leaf(parent_id)?.parent_id;
    if let Some(grandparent) = grandparent
        && state.mgr.contains(grandparent)
    {
        update_from_child(state, grandparent, parent_id)?;
    }
    Ok(())
}
