#![forbid(unsafe_code)]

//! Observable value containers.
//!
//! [`Store<T>`] is the writable root of the reactive graph: a shared value
//! plus an ordered list of subscriber callbacks. Mutations are synchronous;
//! every subscriber observes the new value before `set` returns.
//!
//! # Invariants
//!
//! 1. `set` with a value equal to the current one (by `PartialEq`) is a
//!    complete no-op: no version bump, no notification, no propagation.
//! 2. Subscribers are invoked in registration order with `(new, Some(old))`.
//! 3. `subscribe` invokes the callback once immediately with
//!    `(current, None)` before returning.
//! 4. Registering the same shared callback (`Rc` identity) twice is a no-op
//!    the second time.
//! 5. Dropping a [`Subscription`] removes exactly one registration.
//!
//! # Failure Modes
//!
//! - **Subscriber panics**: not caught; they propagate to the caller of
//!   `set`/`subscribe` (fail-fast).
//! - **Re-entrant `set` from a subscriber**: runs nested, synchronously.
//!   The nested notification completes before the outer one resumes.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::graph::{self, DependentNode};

/// Subscriber callback: `(new_value, old_value)`. `old_value` is `None` only
/// for the immediate invocation at subscribe time.
pub type SubscriberFn<T> = dyn Fn(&T, Option<&T>);

pub(crate) mod sealed {
    use std::rc::Weak;

    use crate::graph::DependentNode;

    /// Sealed graph-wiring surface shared by `Store` and `Derived`.
    pub trait DependencySource {
        /// Register a derived node as a dependent of this source.
        fn add_dependent(&self, node: Weak<dyn DependentNode>);

        /// Depth of this source in the dependency graph (stores are 0).
        fn depth(&self) -> u32;
    }
}

/// Read surface shared by [`Store<T>`] and [`Derived`](crate::Derived).
///
/// Object-safe: the render layer binds slots to `Rc<dyn Readable<Value>>`
/// without caring whether the source is a root store or a derived chain.
/// Sealed; the two implementations in this crate are the only ones.
pub trait Readable<T: Clone + 'static>: sealed::DependencySource {
    /// Current value (cloned out).
    fn get(&self) -> T;

    /// Monotonic version counter; bumped once per value change.
    fn version(&self) -> u64;

    /// Register a shared subscriber. Invokes it once immediately with
    /// `(current, None)`; returns the RAII unsubscribe guard.
    fn subscribe_shared(&self, cb: Rc<SubscriberFn<T>>) -> Subscription;

    /// Register a plain closure subscriber.
    fn subscribe(&self, cb: impl Fn(&T, Option<&T>) + 'static) -> Subscription
    where
        Self: Sized,
    {
        self.subscribe_shared(Rc::new(cb))
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// RAII guard for a subscriber registration.
///
/// Dropping the guard removes the registration before the next notification
/// cycle. [`detach`](Subscription::detach) leaks the registration on purpose,
/// keeping the subscriber alive for as long as the source lives.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A guard that does nothing on drop. Returned when a registration was
    /// deduplicated away.
    pub(crate) fn inert() -> Self {
        Self { cancel: None }
    }

    /// Consume the guard without unsubscribing.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Store<T>
// ---------------------------------------------------------------------------

pub(crate) struct StoreInner<T> {
    value: T,
    version: u64,
    subscribers: Vec<(u64, Rc<SubscriberFn<T>>)>,
    next_sub_id: u64,
    dependents: Vec<Weak<dyn DependentNode>>,
}

/// A shared, observable value container.
///
/// Cloning a `Store` creates a new handle to the **same** inner state.
pub struct Store<T> {
    inner: Rc<RefCell<StoreInner<T>>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Store")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Store<T> {
    /// Create a store holding `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                value: initial,
                version: 0,
                subscribers: Vec::new(),
                next_sub_id: 0,
                dependents: Vec::new(),
            })),
        }
    }

    /// Current value (cloned out).
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference without cloning.
    ///
    /// # Panics
    ///
    /// Panics if the closure calls `set` on the same store (re-entrant
    /// borrow).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Replace the value, notifying subscribers if it changed.
    ///
    /// Returns the post-call version: unchanged for an equal-value no-op,
    /// incremented by one otherwise. Subscribers run synchronously, in
    /// registration order, before derived propagation.
    pub fn set(&self, value: T) -> u64 {
        let (old, new, subscribers, dependents, version) = {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return inner.version;
            }
            let old = std::mem::replace(&mut inner.value, value);
            inner.version += 1;
            let subscribers: Vec<Rc<SubscriberFn<T>>> = inner
                .subscribers
                .iter()
                .map(|(_, cb)| Rc::clone(cb))
                .collect();
            let new = inner.value.clone();
            let dependents = graph::upgrade_dependents(&mut inner.dependents);
            (old, new, subscribers, dependents, inner.version)
        };
        // Borrow released: subscribers may freely read (or re-enter) the
        // store.
        for cb in subscribers {
            cb(&new, Some(&old));
        }
        graph::propagate(dependents);
        version
    }

    /// `set(f(&current))`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> u64 {
        let next = f(&self.inner.borrow().value);
        self.set(next)
    }

    /// Monotonic version counter; bumped once per value change.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Register a subscriber closure. See [`Readable::subscribe_shared`] for
    /// the immediate-invocation contract.
    pub fn subscribe(&self, cb: impl Fn(&T, Option<&T>) + 'static) -> Subscription {
        self.subscribe_shared(Rc::new(cb))
    }

    /// Register a shared subscriber.
    ///
    /// Invokes `cb(current, None)` once before returning. Registering the
    /// same `Rc` (pointer identity) a second time returns an inert guard and
    /// does not re-invoke the callback.
    pub fn subscribe_shared(&self, cb: Rc<SubscriberFn<T>>) -> Subscription {
        let (current, id) = {
            let mut inner = self.inner.borrow_mut();
            if inner
                .subscribers
                .iter()
                .any(|(_, existing)| Rc::ptr_eq(existing, &cb))
            {
                return Subscription::inert();
            }
            let id = inner.next_sub_id;
            inner.next_sub_id += 1;
            inner.subscribers.push((id, Rc::clone(&cb)));
            (inner.value.clone(), id)
        };
        cb(&current, None);
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .borrow_mut()
                    .subscribers
                    .retain(|(sub_id, _)| *sub_id != id);
            }
        })
    }
}

impl<T: Clone + PartialEq + 'static> sealed::DependencySource for Store<T> {
    fn add_dependent(&self, node: Weak<dyn DependentNode>) {
        self.inner.borrow_mut().dependents.push(node);
    }

    fn depth(&self) -> u32 {
        0
    }
}

impl<T: Clone + PartialEq + 'static> Readable<T> for Store<T> {
    fn get(&self) -> T {
        Store::get(self)
    }

    fn version(&self) -> u64 {
        Store::version(self)
    }

    fn subscribe_shared(&self, cb: Rc<SubscriberFn<T>>) -> Subscription {
        Store::subscribe_shared(self, cb)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
