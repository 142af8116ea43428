#![forbid(unsafe_code)]

//! Read-only stores computed from dependency sources.
//!
//! # Design
//!
//! [`Derived<T>`] wraps a combinator function plus its cached result in
//! shared, reference-counted storage, and registers itself as a dependent of
//! every source. Propagation is eager and glitch-free: when an upstream
//! [`Store`](crate::Store) changes, the dependency graph recomputes each
//! affected derived exactly once, in depth order (see [`crate::graph`]), and
//! a derived notifies its own subscribers only when the recomputed value
//! actually changed.
//!
//! The combinator runs exactly once synchronously during construction. While
//! the initial wiring is still in progress the node is gated as
//! uninitialized; any notification arriving mid-wiring is absorbed rather
//! than triggering a separate recompute.
//!
//! # Invariants
//!
//! 1. A single upstream `set` invokes the combinator at most once, even when
//!    the derived is reachable over several dependency paths (diamond
//!    fan-in).
//! 2. An unchanged recompute result is silent: no version bump, no
//!    subscriber notification.
//! 3. `set`/`update` fail with [`StoreError::ReadOnlyDerived`] at call time.
//!
//! # Failure Modes
//!
//! - **Combinator panics**: propagates; the cached value remains from the
//!   last successful computation and the node stays dirty.
//! - **Dependency dropped**: the derived keeps its last cached value and
//!   never goes dirty again from that source.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::error::StoreError;
use crate::graph::{self, DependentNode};
use crate::store::sealed::DependencySource;
use crate::store::{Readable, SubscriberFn, Subscription};

struct DerivedState<T> {
    cached: T,
    version: u64,
    subscribers: Vec<(u64, Rc<SubscriberFn<T>>)>,
    next_sub_id: u64,
    dependents: Vec<Weak<dyn DependentNode>>,
}

pub(crate) struct DerivedInner<T> {
    state: RefCell<DerivedState<T>>,
    /// Stale flag, set during the invalidation wave.
    dirty: Cell<bool>,
    /// The "initialized" gate: false until construction wiring completes.
    initialized: Cell<bool>,
    /// 1 + max dependency depth; fixed at construction.
    depth: u32,
    compute: Box<dyn Fn() -> T>,
}

impl<T: Clone + PartialEq + 'static> DependentNode for DerivedInner<T> {
    fn depth(&self) -> u32 {
        self.depth
    }

    fn mark_dirty(&self) -> bool {
        if !self.initialized.get() || self.dirty.get() {
            return false;
        }
        self.dirty.set(true);
        true
    }

    fn dependents(&self) -> Vec<Rc<dyn DependentNode>> {
        graph::upgrade_dependents(&mut self.state.borrow_mut().dependents)
    }

    fn recompute_if_dirty(&self) {
        if !self.dirty.get() {
            return;
        }
        // Compute before clearing the flag so a panic leaves the node dirty
        // and the next wave retries.
        let new = (self.compute)();
        self.dirty.set(false);

        let (old, new, subscribers) = {
            let mut state = self.state.borrow_mut();
            if state.cached == new {
                return;
            }
            let old = std::mem::replace(&mut state.cached, new.clone());
            state.version += 1;
            let subscribers: Vec<Rc<SubscriberFn<T>>> = state
                .subscribers
                .iter()
                .map(|(_, cb)| Rc::clone(cb))
                .collect();
            (old, new, subscribers)
        };
        for cb in subscribers {
            cb(&new, Some(&old));
        }
        // Downstream dependents were already collected by the same
        // invalidation wave; nothing more to do here.
    }
}

/// A read-only store derived from one or more dependency sources.
///
/// Cloning a `Derived` creates a new handle to the **same** inner state.
/// Any [`Readable`] (a root [`Store`](crate::Store) or another `Derived`)
/// can serve as a dependency, so chains compose.
pub struct Derived<T> {
    inner: Rc<DerivedInner<T>>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Derived")
            .field("cached", &state.cached)
            .field("version", &state.version)
            .field("depth", &self.inner.depth)
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Derived<T> {
    fn make(compute: Box<dyn Fn() -> T>, depth: u32) -> Rc<DerivedInner<T>> {
        // The one construction-time invocation of the combinator.
        let initial = compute();
        Rc::new(DerivedInner {
            state: RefCell::new(DerivedState {
                cached: initial,
                version: 0,
                subscribers: Vec::new(),
                next_sub_id: 0,
                dependents: Vec::new(),
            }),
            dirty: Cell::new(false),
            initialized: Cell::new(false),
            depth,
            compute,
        })
    }

    /// Derive from a single source.
    pub fn map<S, DS>(source: &DS, f: impl Fn(&S) -> T + 'static) -> Self
    where
        S: Clone + PartialEq + 'static,
        DS: Readable<S> + Clone + 'static,
    {
        let src = source.clone();
        let compute = Box::new(move || {
            let v = src.get();
            f(&v)
        });
        let inner = Self::make(compute, source.depth() + 1);
        // Bind the concrete `Weak` first; the unsize coercion happens at the
        // `add_dependent` call.
        let weak = Rc::downgrade(&inner);
        source.add_dependent(weak);
        inner.initialized.set(true);
        Self { inner }
    }

    /// Derive from two sources.
    pub fn zip2<A, B, DA, DB>(a: &DA, b: &DB, f: impl Fn(&A, &B) -> T + 'static) -> Self
    where
        A: Clone + PartialEq + 'static,
        B: Clone + PartialEq + 'static,
        DA: Readable<A> + Clone + 'static,
        DB: Readable<B> + Clone + 'static,
    {
        let (sa, sb) = (a.clone(), b.clone());
        let compute = Box::new(move || {
            let va = sa.get();
            let vb = sb.get();
            f(&va, &vb)
        });
        let inner = Self::make(compute, a.depth().max(b.depth()) + 1);
        let weak_a = Rc::downgrade(&inner);
        let weak_b = Rc::downgrade(&inner);
        a.add_dependent(weak_a);
        b.add_dependent(weak_b);
        inner.initialized.set(true);
        Self { inner }
    }

    /// Derive from three sources.
    pub fn zip3<A, B, C, DA, DB, DC>(
        a: &DA,
        b: &DB,
        c: &DC,
        f: impl Fn(&A, &B, &C) -> T + 'static,
    ) -> Self
    where
        A: Clone + PartialEq + 'static,
        B: Clone + PartialEq + 'static,
        C: Clone + PartialEq + 'static,
        DA: Readable<A> + Clone + 'static,
        DB: Readable<B> + Clone + 'static,
        DC: Readable<C> + Clone + 'static,
    {
        let (sa, sb, sc) = (a.clone(), b.clone(), c.clone());
        let compute = Box::new(move || {
            let va = sa.get();
            let vb = sb.get();
            let vc = sc.get();
            f(&va, &vb, &vc)
        });
        let depth = a.depth().max(b.depth()).max(c.depth()) + 1;
        let inner = Self::make(compute, depth);
        let weak_a = Rc::downgrade(&inner);
        let weak_b = Rc::downgrade(&inner);
        let weak_c = Rc::downgrade(&inner);
        a.add_dependent(weak_a);
        b.add_dependent(weak_b);
        c.add_dependent(weak_c);
        inner.initialized.set(true);
        Self { inner }
    }

    /// Current value (cloned out).
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.state.borrow().cached.clone()
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.state.borrow().cached)
    }

    /// Monotonic version counter; bumped once per changed recompute.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.state.borrow().version
    }

    /// Always fails: derived stores are read-only.
    pub fn set(&self, _value: T) -> Result<(), StoreError> {
        Err(StoreError::ReadOnlyDerived { op: "set" })
    }

    /// Always fails: derived stores are read-only.
    pub fn update(&self, _f: impl FnOnce(&T) -> T) -> Result<(), StoreError> {
        Err(StoreError::ReadOnlyDerived { op: "update" })
    }

    /// Register a subscriber closure.
    pub fn subscribe(&self, cb: impl Fn(&T, Option<&T>) + 'static) -> Subscription {
        self.subscribe_shared(Rc::new(cb))
    }

    /// Register a shared subscriber; same contract as
    /// [`Store::subscribe_shared`](crate::Store::subscribe_shared).
    pub fn subscribe_shared(&self, cb: Rc<SubscriberFn<T>>) -> Subscription {
        let (current, id) = {
            let mut state = self.inner.state.borrow_mut();
            if state
                .subscribers
                .iter()
                .any(|(_, existing)| Rc::ptr_eq(existing, &cb))
            {
                return Subscription::inert();
            }
            let id = state.next_sub_id;
            state.next_sub_id += 1;
            state.subscribers.push((id, Rc::clone(&cb)));
            (state.cached.clone(), id)
        };
        cb(&current, None);
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .state
                    .borrow_mut()
                    .subscribers
                    .retain(|(sub_id, _)| *sub_id != id);
            }
        })
    }
}

impl<T: Clone + PartialEq + 'static> DependencySource for Derived<T> {
    fn add_dependent(&self, node: Weak<dyn DependentNode>) {
        self.inner.state.borrow_mut().dependents.push(node);
    }

    fn depth(&self) -> u32 {
        self.inner.depth
    }
}

impl<T: Clone + PartialEq + 'static> Readable<T> for Derived<T> {
    fn get(&self) -> T {
        Derived::get(self)
    }

    fn version(&self) -> u64 {
        Derived::version(self)
    }

    fn subscribe_shared(&self, cb: Rc<SubscriberFn<T>>) -> Subscription {
        Derived::subscribe_shared(self, cb)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::store::Store;

    #[test]
    fn combinator_runs_once_at_construction() {
        let calls = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&calls);
        let source = Store::new(10);
        let derived = Derived::map(&source, move |v| {
            c.set(c.get() + 1);
            v * 2
        });
        assert_eq!(calls.get(), 1);
        assert_eq!(derived.get(), 20);
    }

    #[test]
    fn recomputes_eagerly_on_set() {
        let source = Store::new(10);
        let derived = Derived::map(&source, |v| v * 2);
        source.set(5);
        assert_eq!(derived.get(), 10);
        assert_eq!(derived.version(), 1);
    }

    #[test]
    fn zip2_combines_two_sources() {
        let width = Store::new(10);
        let height = Store::new(20);
        let area = Derived::zip2(&width, &height, |w, h| w * h);
        assert_eq!(area.get(), 200);

        width.set(5);
        assert_eq!(area.get(), 100);
        height.set(30);
        assert_eq!(area.get(), 150);
    }

    #[test]
    fn zip3_combines_three_sources() {
        let a = Store::new(1);
        let b = Store::new(2);
        let c = Store::new(3);
        let sum = Derived::zip3(&a, &b, &c, |x, y, z| x + y + z);
        assert_eq!(sum.get(), 6);

        a.set(10);
        assert_eq!(sum.get(), 15);
    }

    #[test]
    fn diamond_recomputes_each_node_exactly_once() {
        // A -> B, A -> C, (B, C) -> D
        let a = Store::new(1);
        let b = Derived::map(&a, |v| v + 1);
        let c = Derived::map(&a, |v| v * 10);

        let d_computes = Rc::new(Cell::new(0u32));
        let dc = Rc::clone(&d_computes);
        let d = Derived::zip2(&b, &c, move |x, y| {
            dc.set(dc.get() + 1);
            x + y
        });
        assert_eq!(d_computes.get(), 1, "construction compute only");
        assert_eq!(d.get(), 12);

        let d_fires = Rc::new(Cell::new(0u32));
        let df = Rc::clone(&d_fires);
        let _sub = d.subscribe(move |_, _| df.set(df.get() + 1));
        d_fires.set(0);

        a.set(2);
        assert_eq!(d.get(), 23);
        assert_eq!(d_computes.get(), 2, "one recompute per upstream set");
        assert_eq!(d_fires.get(), 1, "one notification per upstream set");
    }

    #[test]
    fn diamond_observes_settled_values_only() {
        // D must never observe B new with C old (no glitch value).
        let a = Store::new(1);
        let b = Derived::map(&a, |v| *v);
        let c = Derived::map(&a, |v| *v);
        let glitches = Rc::new(Cell::new(0u32));
        let g = Rc::clone(&glitches);
        let _d = Derived::zip2(&b, &c, move |x, y| {
            if x != y {
                g.set(g.get() + 1);
            }
            x + y
        });
        for i in 2..=20 {
            a.set(i);
        }
        assert_eq!(glitches.get(), 0);
    }

    #[test]
    fn unchanged_recompute_is_silent() {
        let a = Store::new(0);
        let parity = Derived::map(&a, |v| v % 2);
        let fired = Rc::new(Cell::new(0u32));
        let f = Rc::clone(&fired);
        let _sub = parity.subscribe(move |_, _| f.set(f.get() + 1));
        fired.set(0);

        a.set(2); // parity unchanged
        assert_eq!(fired.get(), 0);
        assert_eq!(parity.version(), 0);

        a.set(3); // parity flips
        assert_eq!(fired.get(), 1);
        assert_eq!(parity.version(), 1);
    }

    #[test]
    fn chains_propagate_synchronously() {
        let a = Store::new(1);
        let b = Derived::map(&a, |v| v + 1);
        let c = Derived::map(&b, |v| v + 1);
        let d = Derived::map(&c, |v| v + 1);
        a.set(10);
        assert_eq!(d.get(), 13, "whole chain settled before set returns");
    }

    #[test]
    fn set_is_a_capability_error() {
        let a = Store::new(1);
        let d = Derived::map(&a, |v| *v);
        assert_eq!(d.set(5), Err(StoreError::ReadOnlyDerived { op: "set" }));
        assert_eq!(
            d.update(|v| v + 1),
            Err(StoreError::ReadOnlyDerived { op: "update" })
        );
        assert_eq!(d.get(), 1, "failed write must not mutate");
    }

    #[test]
    fn subscriber_gets_new_and_old() {
        let a = Store::new(1);
        let d = Derived::map(&a, |v| v * 2);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = d.subscribe(move |new, old| s.borrow_mut().push((*new, old.copied())));
        a.set(3);
        assert_eq!(*seen.borrow(), vec![(2, None), (6, Some(2))]);
    }

    #[test]
    fn derived_survives_source_drop() {
        let derived;
        {
            let source = Store::new(42);
            derived = Derived::map(&source, |v| *v);
        }
        assert_eq!(derived.get(), 42);
    }

    #[test]
    fn dropped_derived_is_pruned_from_graph() {
        let a = Store::new(1);
        {
            let _d = Derived::map(&a, |v| *v);
        }
        // Propagation over the dangling weak edge must be a clean no-op.
        a.set(2);
        assert_eq!(a.get(), 2);
    }

    #[test]
    fn clone_shares_state() {
        let a = Store::new(1);
        let d1 = Derived::map(&a, |v| v * 2);
        let d2 = d1.clone();
        a.set(4);
        assert_eq!(d1.get(), 8);
        assert_eq!(d2.get(), 8);
    }

    #[test]
    fn deep_fanin_depth_ordering() {
        // E depends on both a shallow and a deep path from A; it must still
        // recompute only once per set and observe settled values.
        let a = Store::new(1);
        let b = Derived::map(&a, |v| v + 1);
        let c = Derived::map(&b, |v| v + 1);
        let computes = Rc::new(Cell::new(0u32));
        let k = Rc::clone(&computes);
        let e = Derived::zip2(&a, &c, move |x, y| {
            k.set(k.get() + 1);
            x + y
        });
        computes.set(0);
        a.set(10);
        assert_eq!(computes.get(), 1);
        assert_eq!(e.get(), 22);
    }

    #[test]
    fn debug_format() {
        let a = Store::new(7);
        let d = Derived::map(&a, |v| *v);
        let dbg = format!("{d:?}");
        assert!(dbg.contains("Derived"));
        assert!(dbg.contains('7'));
    }
}
