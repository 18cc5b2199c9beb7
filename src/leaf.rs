// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The leaf node: one named value holder in the state tree.
//!
//! A leaf owns its committed [`Store`], an ordered stack of uncommitted
//! pending stores, its child bindings, and the per-leaf tables (validators,
//! actions, selectors, meta). Leaves reference their parent and children by
//! [`LeafId`] only; the registry in [`crate::manager::LeafManager`] is the
//! single owning collection.

use crate::{
    error::ForestError,
    handle::LeafHandle,
    manager::{LeafId, LeafManager},
    store::{Family, Key, Store, ValueType},
    stream::Subject,
};
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;
use std::{cell::RefCell, collections::HashMap, rc::Rc};

/// Normalizes every incoming write before it is stored.
pub type FilterFn = Rc<dyn Fn(Value) -> Value>;

/// A user-defined callable exposed through the leaf's dispatch table.
///
/// Invoked with a handle to the leaf it is mounted on plus the caller's
/// arguments; runs inside a rollback-capable transaction.
pub type ActionFn = Rc<dyn Fn(&LeafHandle, &[Value]) -> Result<Value, ForestError>>;

/// A read-only computed value derived from the leaf.
pub type SelectorFn = Rc<dyn Fn(&LeafHandle) -> Result<Value, ForestError>>;

/// A declarative check run against a leaf's blended value after every write.
///
/// A failing validator rolls the whole write back; it never merely flags.
#[derive(Clone)]
pub enum Validator {
    /// The value must have exactly this type.
    Type(ValueType),
    /// The value must have one of these types.
    Types(Vec<ValueType>),
    /// An arbitrary predicate; return `Err(message)` to reject.
    Fn(Rc<dyn Fn(&Value) -> Result<(), String>>),
}

impl Validator {
    /// A predicate validator.
    pub fn func(f: impl Fn(&Value) -> Result<(), String> + 'static) -> Self {
        Self::Fn(Rc::new(f))
    }

    pub(crate) fn run(&self, id: LeafId, value: &Value) -> Result<(), ForestError> {
        let actual = ValueType::of(value);
        match self {
            Self::Type(expected) => {
                if actual != *expected {
                    return Err(ForestError::Validation {
                        id,
                        message: format!("value is {actual}, must be {expected}"),
                    });
                }
            }
            Self::Types(expected) => {
                if !expected.contains(&actual) {
                    let names: Vec<&str> = expected.iter().map(|t| t.name()).collect();
                    return Err(ForestError::Validation {
                        id,
                        message: format!("value is {actual}, must be {}", names.join(" or ")),
                    });
                }
            }
            Self::Fn(f) => {
                if let Err(message) = f(value) {
                    return Err(ForestError::Validation { id, message });
                }
            }
        }
        Ok(())
    }
}

/// An entry in a leaf's dispatch table.
#[derive(Clone)]
pub(crate) enum DispatchEntry {
    /// An auto-generated single-key setter.
    Setter(Key),
    /// A user-supplied action.
    Action(ActionFn),
}

/// An uncommitted candidate replacement store, tagged with the transaction
/// that produced it.
#[derive(Debug, Clone)]
pub(crate) struct Pending {
    pub trans_id: u64,
    pub store: Store,
}

pub(crate) struct ValueCache {
    pub last_trans_id: u64,
    pub value: Value,
}

pub(crate) struct Leaf {
    pub id: LeafId,
    pub name: Option<String>,
    pub parent_id: Option<LeafId>,
    /// The committed, validated store.
    pub store: Store,
    /// Snapshot taken at construction, for auditing and reset.
    pub original_store: Store,
    /// Only the last entry is authoritative for reads; earlier entries exist
    /// to support rollback to arbitrary earlier transaction ids.
    pub pendings: SmallVec<[Pending; 2]>,
    /// child leaf id -> the slot in this leaf's own value it is mounted at.
    pub child_keys: Vec<(LeafId, Key)>,
    pub filter: Option<FilterFn>,
    pub validators: SmallVec<[Validator; 1]>,
    pub dispatch: HashMap<String, DispatchEntry, ahash::RandomState>,
    pub selectors: HashMap<String, SelectorFn, ahash::RandomState>,
    /// When set, key discovery is skipped and only these names get setters.
    pub fixed_setters: Option<Vec<String>>,
    /// Disables change-deduplication on this leaf's stream.
    pub fast: bool,
    pub meta: HashMap<String, Value, ahash::RandomState>,
    pub subject: Subject<Value>,
    pub cache: RefCell<Option<ValueCache>>,
}

impl Leaf {
    /// The authoritative store for reads: the newest pending if any,
    /// otherwise the committed store.
    pub fn current_store(&self) -> &Store {
        self.pendings.last().map_or(&self.store, |p| &p.store)
    }

    pub fn local_value(&self) -> &Value {
        self.current_store().value()
    }

    pub fn value_type(&self) -> ValueType {
        self.current_store().value_type()
    }

    pub fn family(&self) -> Family {
        self.current_store().family()
    }

    pub fn has_children(&self) -> bool {
        !self.child_keys.is_empty()
    }

    /// The child bound at `key`, if any.
    pub fn child_at(&self, key: &Key) -> Option<LeafId> {
        self.child_keys
            .iter()
            .find(|(_, k)| k == key)
            .map(|(id, _)| *id)
    }

    /// The slot `child` is mounted at, if bound.
    pub fn key_of(&self, child: LeafId) -> Option<&Key> {
        self.child_keys
            .iter()
            .find(|(id, _)| *id == child)
            .map(|(_, k)| k)
    }

    pub fn push_pending(&mut self, store: Store, trans_id: u64) {
        self.pendings.push(Pending { trans_id, store });
        self.cache.replace(None);
    }

    /// Drops pendings produced at or after `trans_id`; true if none remain.
    pub fn purge_at_or_after(&mut self, trans_id: u64) -> bool {
        self.pendings.retain(|p| p.trans_id < trans_id);
        self.cache.replace(None);
        self.pendings.is_empty()
    }

    /// Drops pendings produced after `trans_id`; true if none remain.
    pub fn purge_after(&mut self, trans_id: u64) -> bool {
        self.pendings.retain(|p| p.trans_id <= trans_id);
        self.cache.replace(None);
        self.pendings.is_empty()
    }

    /// Finalizes the newest pending store as the committed store.
    ///
    /// Returns whether the committed value's shape changed, meaning its type
    /// or its set of addressable keys; that is the trigger for regenerating
    /// the setter table.
    pub fn commit_pending(&mut self) -> bool {
        let Some(last) = self.pendings.pop() else {
            return false;
        };
        self.pendings.clear();
        let shape_changed = last.store.value_type() != self.store.value_type()
            || last.store.keys() != self.store.keys();
        self.store = last.store;
        shape_changed
    }
}

/// The construction request for a leaf and, recursively, its subtree.
///
/// ```
/// use arbor::{Forest, LeafConfig};
/// use serde_json::json;
///
/// let forest = Forest::new(
///     LeafConfig::new(json!({ "label": "origin" }))
///         .child("x", LeafConfig::new(0).type_locked())
///         .child("y", LeafConfig::new(0).type_locked()),
/// )
/// .unwrap();
/// assert_eq!(forest.value(), json!({ "label": "origin", "x": 0, "y": 0 }));
/// ```
pub struct LeafConfig {
    pub(crate) value: Value,
    pub(crate) name: Option<String>,
    pub(crate) children: Vec<(Key, LeafConfig)>,
    pub(crate) validators: Vec<Validator>,
    pub(crate) type_locked: bool,
    pub(crate) filter: Option<FilterFn>,
    pub(crate) actions: Vec<(String, ActionFn)>,
    pub(crate) selectors: Vec<(String, SelectorFn)>,
    pub(crate) setters: Option<Vec<String>>,
    pub(crate) fast: bool,
    pub(crate) meta: Vec<(String, Value)>,
}

impl LeafConfig {
    /// A config holding `value`, with no children or tables.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            name: None,
            children: Vec::new(),
            validators: Vec::new(),
            type_locked: false,
            filter: None,
            actions: Vec::new(),
            selectors: Vec::new(),
            setters: None,
            fast: false,
            meta: Vec::new(),
        }
    }

    /// A config holding the JSON form of any serializable value.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, ForestError> {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    /// Names the leaf independently of the key it is mounted at.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mounts a child config at `key` in this leaf's value.
    pub fn child(mut self, key: impl Into<Key>, child: impl Into<LeafConfig>) -> Self {
        self.children.push((key.into(), child.into()));
        self
    }

    /// Adds a validator, run against the blended value after every write.
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Pins the leaf to the type of its initial value.
    pub fn type_locked(mut self) -> Self {
        self.type_locked = true;
        self
    }

    /// Installs a filter applied to every incoming write before storage.
    pub fn filter(mut self, filter: impl Fn(Value) -> Value + 'static) -> Self {
        self.filter = Some(Rc::new(filter));
        self
    }

    /// Registers a named action on the dispatch table.
    pub fn action(
        mut self,
        name: impl Into<String>,
        action: impl Fn(&LeafHandle, &[Value]) -> Result<Value, ForestError> + 'static,
    ) -> Self {
        self.actions.push((name.into(), Rc::new(action)));
        self
    }

    /// Registers a named read-only selector.
    pub fn selector(
        mut self,
        name: impl Into<String>,
        selector: impl Fn(&LeafHandle) -> Result<Value, ForestError> + 'static,
    ) -> Self {
        self.selectors.push((name.into(), Rc::new(selector)));
        self
    }

    /// Replaces automatic setter discovery with a fixed list of field names.
    pub fn setters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.setters = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Emits every write on the leaf's stream, even when the value is
    /// unchanged.
    pub fn fast(mut self) -> Self {
        self.fast = true;
        self
    }

    /// Attaches an out-of-band annotation.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.push((key.into(), value.into()));
        self
    }
}

// Raw values are accepted wherever a child config is expected.
macro_rules! config_from_value {
    ($($ty:ty),* $(,)?) => {$(
        impl From<$ty> for LeafConfig {
            fn from(value: $ty) -> Self {
                Self::new(value)
            }
        }
    )*};
}

config_from_value!(
    Value, bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String, &str,
);

/// Builds `config` into a registered leaf, recursively constructing and
/// registering its declared children. Returns the new leaf's id.
pub(crate) fn build(
    mgr: &mut LeafManager,
    config: LeafConfig,
    parent_id: Option<LeafId>,
    mounted_at: Option<&Key>,
) -> Result<LeafId, ForestError> {
    let id = mgr.allocate_id();
    // the filter normalizes the construction value like any later write
    let value = match &config.filter {
        Some(filter) => filter(config.value),
        None => config.value,
    };
    let store = Store::new(value);
    if !config.children.is_empty() && store.family() != Family::Container {
        return Err(ForestError::NotAContainer {
            id,
            type_name: store.value_type().name(),
        });
    }

    let mut validators: SmallVec<[Validator; 1]> = config.validators.into();
    if config.type_locked {
        validators.push(Validator::Type(store.value_type()));
    }

    let name = config
        .name
        .or_else(|| mounted_at.and_then(|k| k.as_field().map(str::to_string)));

    let mut leaf = Leaf {
        id,
        name,
        parent_id,
        original_store: store.clone(),
        store,
        pendings: SmallVec::new(),
        child_keys: Vec::new(),
        filter: config.filter,
        validators,
        dispatch: HashMap::default(),
        selectors: config.selectors.into_iter().collect(),
        fixed_setters: config.setters,
        fast: config.fast,
        meta: config.meta.into_iter().collect(),
        subject: Subject::new(),
        cache: RefCell::new(None),
    };
    for (key, action) in config.actions {
        leaf.dispatch.insert(key, DispatchEntry::Action(action));
    }
    mgr.add_leaf(leaf);

    for (key, child_config) in config.children {
        let child_id = build(mgr, child_config, Some(id), Some(&key))?;
        if let Some(leaf) = mgr.leaf_mut(id) {
            leaf.child_keys.push((child_id, key));
        }
    }

    if let Some(leaf) = mgr.leaf_mut(id) {
        crate::actions::update_do(leaf);
    }
    Ok(id)
}
