// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The ordered, uniquely numbered record of in-flight actions.
//!
//! Every mutating operation runs inside a named transaction. Transactions
//! nest: a handler that dispatches further operations pushes further records
//! onto the same live stack, and the commit signal fires only when the
//! outermost record unwinds and the stack drains to empty. Rollback targets
//! are expressed as transaction ids; see [`crate::manager::LeafManager`] for
//! the restore pass itself.

use crate::stream::Subject;

/// Rollback-relevant state attached to one transaction.
///
/// Composite actions record the id of the last transaction allocated before
/// they started, so their rollback can purge everything produced since.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TransMeta {
    /// Nothing to carry; rollback purges at/after the transaction's own id.
    None,
    /// The `last_trans_id` observed when a composite action began.
    StartingId(u64),
}

/// One live entry in the transaction log.
#[derive(Debug)]
pub(crate) struct Transaction {
    pub id: u64,
    pub action: &'static str,
    pub meta: TransMeta,
}

/// The per-tree transaction log.
///
/// Ids are strictly increasing in dispatch order; a nested dispatch always
/// receives an id greater than its trigger. `last_trans_id` doubles as the
/// global change counter that keys blended-value caches.
pub(crate) struct TransactionLog {
    next_id: u64,
    live: Vec<Transaction>,
    last_trans_id: u64,
    watchers: Subject<usize>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            live: Vec::new(),
            last_trans_id: 0,
            watchers: Subject::new(),
        }
    }

    /// Opens a named transaction, returning its id.
    pub fn begin(&mut self, action: &'static str, meta: TransMeta) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.last_trans_id = id;
        tracing::trace!(action, id, depth = self.live.len(), "transaction open");
        self.live.push(Transaction { id, action, meta });
        self.watchers.emit(&self.live.len());
        id
    }

    /// Closes the transaction with `id`, success or failure alike.
    pub fn end(&mut self, id: u64) {
        if let Some(pos) = self.live.iter().rposition(|t| t.id == id) {
            let trans = self.live.remove(pos);
            tracing::trace!(action = trans.action, id, "transaction closed");
        }
        self.watchers.emit(&self.live.len());
    }

    /// Whether no transaction is in flight; the commit signal.
    pub fn is_drained(&self) -> bool {
        self.live.is_empty()
    }

    /// The id of the most recently opened transaction.
    pub fn last_trans_id(&self) -> u64 {
        self.last_trans_id
    }

    /// The starting id recorded for the innermost live composite action
    /// holding one, if any.
    pub fn starting_id(&self, id: u64) -> Option<u64> {
        self.live.iter().rev().find(|t| t.id == id).and_then(|t| match t.meta {
            TransMeta::StartingId(start) => Some(start),
            TransMeta::None => None,
        })
    }

    /// The live-membership stream: emits the in-flight count on every open
    /// and close, so `0` marks a drain.
    pub fn watch(&self) -> Subject<usize> {
        self.watchers.clone()
    }
}
