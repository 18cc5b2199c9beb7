// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Synchronous push-based notification.
//!
//! [`Subject`] is an explicit observer-list broadcaster: subscribers are
//! notified synchronously, in subscription order, within the emitting call
//! stack. Combinator stages ([`map`], [`filter`], [`distinct_until_changed`])
//! are composed at subscribe time by decorating an [`Observer`].
//!
//! A panicking subscriber must not break the fan-out to the remaining
//! subscribers, and must not surface to the writer that triggered the
//! emission. Delivery is therefore wrapped in `catch_unwind`; failures are
//! logged and dropped. This is the only place in the crate where a failure is
//! intentionally absorbed.

use std::{
    cell::RefCell,
    panic::{AssertUnwindSafe, catch_unwind},
    rc::{Rc, Weak},
};

/// A set of callbacks notified by a [`Subject`].
///
/// `next` receives each emission; `error` receives at most one terminal
/// error; `complete` fires once when the subject closes. Hooks that are not
/// installed default to no-ops.
pub struct Observer<T> {
    next: Box<dyn FnMut(&T)>,
    error: Box<dyn FnMut(&str)>,
    complete: Box<dyn FnMut()>,
}

impl<T: 'static> Observer<T> {
    /// An observer with only a `next` hook.
    pub fn new(next: impl FnMut(&T) + 'static) -> Self {
        Self {
            next: Box::new(next),
            error: Box::new(|_| {}),
            complete: Box::new(|| {}),
        }
    }

    /// Installs an `error` hook.
    pub fn on_error(mut self, error: impl FnMut(&str) + 'static) -> Self {
        self.error = Box::new(error);
        self
    }

    /// Installs a `complete` hook.
    pub fn on_complete(mut self, complete: impl FnMut() + 'static) -> Self {
        self.complete = Box::new(complete);
        self
    }

    /// Feeds one value through the `next` hook, absorbing panics.
    pub(crate) fn notify(&mut self, value: &T) {
        if catch_unwind(AssertUnwindSafe(|| (self.next)(value))).is_err() {
            tracing::warn!("subscriber panicked during delivery; continuing fan-out");
        }
    }

    fn notify_error(&mut self, message: &str) {
        if catch_unwind(AssertUnwindSafe(|| (self.error)(message))).is_err() {
            tracing::warn!("error hook panicked during delivery; continuing fan-out");
        }
    }

    fn notify_complete(&mut self) {
        if catch_unwind(AssertUnwindSafe(|| (self.complete)())).is_err() {
            tracing::warn!("complete hook panicked during delivery; continuing fan-out");
        }
    }
}

/// Decorates `observer` so only values passing `pred` are forwarded.
pub fn filter<T: 'static>(
    pred: impl Fn(&T) -> bool + 'static,
    observer: Observer<T>,
) -> Observer<T> {
    let Observer {
        mut next,
        error,
        complete,
    } = observer;
    Observer {
        next: Box::new(move |value| {
            if pred(value) {
                next(value);
            }
        }),
        error,
        complete,
    }
}

/// Decorates `observer` so each value is projected through `project` first.
pub fn map<T: 'static, U: 'static>(
    project: impl Fn(&T) -> U + 'static,
    observer: Observer<U>,
) -> Observer<T> {
    let Observer {
        mut next,
        error,
        complete,
    } = observer;
    Observer {
        next: Box::new(move |value| {
            let projected = project(value);
            next(&projected);
        }),
        error,
        complete,
    }
}

/// Decorates `observer` to drop emissions deep-equal to the previous one.
pub fn distinct_until_changed<T: Clone + PartialEq + 'static>(
    observer: Observer<T>,
) -> Observer<T> {
    let Observer {
        mut next,
        error,
        complete,
    } = observer;
    let mut last: Option<T> = None;
    Observer {
        next: Box::new(move |value| {
            if last.as_ref() == Some(value) {
                return;
            }
            last = Some(value.clone());
            next(value);
        }),
        error,
        complete,
    }
}

struct SubjectInner<T> {
    next_key: u64,
    observers: Vec<(u64, Observer<T>)>,
    // keys unsubscribed while their observer was checked out for delivery
    cancelled: Vec<u64>,
    closed: bool,
}

/// A multi-subscriber broadcaster with synchronous delivery.
///
/// Cloning a `Subject` clones a handle to the same observer list, which is
/// how the tree hands a leaf's stream out without keeping the tree borrowed
/// during delivery.
pub struct Subject<T> {
    inner: Rc<RefCell<SubjectInner<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Subject<T> {
    /// An open subject with no observers.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SubjectInner {
                next_key: 0,
                observers: Vec::new(),
                cancelled: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Registers `observer`, returning a handle that removes it again.
    ///
    /// Subscribing to a closed subject delivers `complete` immediately.
    pub fn subscribe(&self, mut observer: Observer<T>) -> Subscription {
        let closed = self.inner.borrow().closed;
        if closed {
            observer.notify_complete();
            return Subscription::empty();
        }
        let key = {
            let mut inner = self.inner.borrow_mut();
            let key = inner.next_key;
            inner.next_key += 1;
            inner.observers.push((key, observer));
            key
        };
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || Self::remove(&weak, key))
    }

    fn remove(weak: &Weak<RefCell<SubjectInner<T>>>, key: u64) {
        if let Some(inner) = weak.upgrade() {
            let mut inner = inner.borrow_mut();
            if let Some(pos) = inner.observers.iter().position(|(k, _)| *k == key) {
                inner.observers.remove(pos);
            } else {
                // mid-delivery; emit() will drop it on re-insert
                inner.cancelled.push(key);
            }
        }
    }

    /// Delivers `value` to every current observer, in subscription order.
    ///
    /// Observers may subscribe or unsubscribe reentrantly from within their
    /// hooks; each observer is checked out of the list for the duration of
    /// its delivery to keep that safe.
    pub fn emit(&self, value: &T) {
        self.for_each_checked_out(|observer| observer.notify(value));
    }

    /// Delivers a non-terminal error message to every observer's error hook.
    pub fn emit_error(&self, message: &str) {
        self.for_each_checked_out(|observer| observer.notify_error(message));
    }

    /// Closes the subject, firing every `complete` hook and dropping all
    /// observers. Later emissions are ignored.
    pub fn complete(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.closed {
                return;
            }
            inner.closed = true;
        }
        self.for_each_checked_out(|observer| observer.notify_complete());
        self.inner.borrow_mut().observers.clear();
    }

    /// The number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.borrow().observers.len()
    }

    fn for_each_checked_out(&self, mut deliver: impl FnMut(&mut Observer<T>)) {
        let keys: Vec<u64> = self
            .inner
            .borrow()
            .observers
            .iter()
            .map(|(k, _)| *k)
            .collect();
        for key in keys {
            let checked_out = {
                let mut inner = self.inner.borrow_mut();
                inner
                    .observers
                    .iter()
                    .position(|(k, _)| *k == key)
                    .map(|pos| inner.observers.remove(pos))
            };
            let Some((key, mut observer)) = checked_out else {
                continue;
            };
            deliver(&mut observer);
            let mut inner = self.inner.borrow_mut();
            if let Some(pos) = inner.cancelled.iter().position(|k| *k == key) {
                inner.cancelled.remove(pos);
            } else if !inner.closed {
                // keep subscription order stable across deliveries
                let pos = inner
                    .observers
                    .iter()
                    .position(|(k, _)| *k > key)
                    .unwrap_or(inner.observers.len());
                inner.observers.insert(pos, (key, observer));
            }
        }
    }
}

/// A handle to one registration on a [`Subject`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub(crate) fn empty() -> Self {
        Self { cancel: None }
    }

    /// Removes the observer from its subject. Idempotent.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
