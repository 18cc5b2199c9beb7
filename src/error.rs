// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Error types surfaced by the mutation and validation paths.
//!
//! Every forward handler failure is paired with a rollback that restores the
//! tree before the error reaches the caller, so catching a [`ForestError`]
//! leaves the tree in its pre-call state.

use crate::{manager::LeafId, store::StoreError};
use std::fmt;

/// The error type for all fallible tree operations.
#[derive(Debug)]
pub enum ForestError {
    /// A leaf id did not resolve through the registry.
    LeafNotFound(LeafId),
    /// A field write or child attachment was attempted on a scalar-family leaf.
    NotAContainer {
        /// The offending leaf.
        id: LeafId,
        /// The scalar type it currently holds.
        type_name: &'static str,
    },
    /// A key-level store operation failed.
    Store(StoreError),
    /// A validator rejected the blended value of a leaf.
    Validation {
        /// The leaf whose validator failed.
        id: LeafId,
        /// The validator's message.
        message: String,
    },
    /// `call` was invoked with a name absent from the dispatch table.
    UnknownAction {
        /// The leaf that was asked.
        id: LeafId,
        /// The requested action name.
        name: String,
    },
    /// `select_value` was invoked with a name absent from the selector table.
    UnknownSelector {
        /// The leaf that was asked.
        id: LeafId,
        /// The requested selector name.
        name: String,
    },
    /// A mutation was attempted while the tree is frozen.
    Frozen,
    /// `unfreeze` was called with a token other than the one `freeze` issued.
    FreezeMismatch,
    /// A meta key was written twice without `force`.
    MetaLocked {
        /// The leaf carrying the meta bag.
        id: LeafId,
        /// The key already present.
        key: String,
    },
    /// A user-supplied action failed for its own reasons.
    Action(String),
    /// A value could not be converted into a JSON value.
    Serialize(serde_json::Error),
}

impl fmt::Display for ForestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeafNotFound(id) => write!(f, "no leaf with id {id}"),
            Self::NotAContainer { id, type_name } => {
                write!(f, "leaf {id} holds a {type_name} value, which cannot hold fields")
            }
            Self::Store(e) => write!(f, "{e}"),
            Self::Validation { id, message } => {
                write!(f, "validation failed for leaf {id}: {message}")
            }
            Self::UnknownAction { id, name } => {
                write!(f, "leaf {id} has no action named '{name}'")
            }
            Self::UnknownSelector { id, name } => {
                write!(f, "leaf {id} has no selector named '{name}'")
            }
            Self::Frozen => write!(f, "the tree is frozen against mutation"),
            Self::FreezeMismatch => write!(f, "unfreeze token does not match the freeze token"),
            Self::MetaLocked { id, key } => {
                write!(f, "meta key '{key}' on leaf {id} is already set")
            }
            Self::Action(message) => write!(f, "{message}"),
            Self::Serialize(e) => write!(f, "cannot convert value: {e}"),
        }
    }
}

impl std::error::Error for ForestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Serialize(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for ForestError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<serde_json::Error> for ForestError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e)
    }
}
