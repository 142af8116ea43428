#![forbid(unsafe_code)]

//! Single-threaded deferred results.
//!
//! [`Deferred<T>`] is the promise analogue the render layer uses for
//! "pending" reactive values: a shared cell that some later code on the same
//! logical thread completes (or fails). Continuations registered with
//! [`on_ready`](Deferred::on_ready) run synchronously at completion time, or
//! immediately when the value is already available.
//!
//! # Invariants
//!
//! 1. A deferred settles at most once; later `complete`/`fail` calls are
//!    no-ops.
//! 2. `fail` drops all registered continuations without invoking them — a
//!    failed deferred produces **no** update downstream.
//! 3. Continuations registered after completion run immediately, in the
//!    registering call.

use std::cell::RefCell;
use std::rc::Rc;

enum DeferredState<T> {
    Pending(Vec<Box<dyn FnOnce(T)>>),
    Ready(T),
    Failed,
}

/// A value that becomes available later on the same thread.
///
/// Cloning a `Deferred` creates a new handle to the **same** cell.
pub struct Deferred<T> {
    inner: Rc<RefCell<DeferredState<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.inner.borrow() {
            DeferredState::Pending(_) => "pending",
            DeferredState::Ready(_) => "ready",
            DeferredState::Failed => "failed",
        };
        f.debug_struct("Deferred").field("state", &state).finish()
    }
}

impl<T: Clone + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// Create an unsettled deferred.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeferredState::Pending(Vec::new()))),
        }
    }

    /// Create an already-completed deferred.
    #[must_use]
    pub fn ready(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeferredState::Ready(value))),
        }
    }

    /// Settle with `value`, running registered continuations in registration
    /// order. No-op if already settled.
    pub fn complete(&self, value: T) {
        let continuations = {
            let mut state = self.inner.borrow_mut();
            match &mut *state {
                DeferredState::Pending(waiting) => {
                    let continuations = std::mem::take(waiting);
                    *state = DeferredState::Ready(value.clone());
                    continuations
                }
                _ => return,
            }
        };
        // Borrow released: continuations may inspect or clone the deferred.
        for cont in continuations {
            cont(value.clone());
        }
    }

    /// Settle as failed, dropping all continuations. No-op if already
    /// settled.
    pub fn fail(&self) {
        let mut state = self.inner.borrow_mut();
        if matches!(&*state, DeferredState::Pending(_)) {
            *state = DeferredState::Failed;
        }
    }

    /// Register a continuation. Runs immediately if already completed; is
    /// dropped silently if the deferred failed (or later fails).
    pub fn on_ready(&self, cont: impl FnOnce(T) + 'static) {
        let ready: T;
        {
            let mut state = self.inner.borrow_mut();
            match &mut *state {
                DeferredState::Pending(waiting) => {
                    waiting.push(Box::new(cont));
                    return;
                }
                DeferredState::Ready(value) => ready = value.clone(),
                DeferredState::Failed => return,
            }
        }
        cont(ready);
    }

    /// Whether `self` and `other` are handles to the same cell.
    #[must_use]
    pub fn same_cell(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether the deferred has not yet settled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(&*self.inner.borrow(), DeferredState::Pending(_))
    }

    /// Whether the deferred completed with a value.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(&*self.inner.borrow(), DeferredState::Ready(_))
    }

    /// Whether the deferred failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(&*self.inner.borrow(), DeferredState::Failed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn complete_runs_continuations_in_order() {
        let d = Deferred::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = Rc::clone(&log);
        d.on_ready(move |v: i32| l1.borrow_mut().push(("a", v)));
        let l2 = Rc::clone(&log);
        d.on_ready(move |v: i32| l2.borrow_mut().push(("b", v)));

        d.complete(7);
        assert_eq!(*log.borrow(), vec![("a", 7), ("b", 7)]);
        assert!(d.is_ready());
    }

    #[test]
    fn on_ready_after_completion_runs_immediately() {
        let d = Deferred::ready(3);
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        d.on_ready(move |v| s.set(v));
        assert_eq!(seen.get(), 3);
    }

    #[test]
    fn settles_at_most_once() {
        let d = Deferred::new();
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        d.on_ready(move |_: i32| c.set(c.get() + 1));

        d.complete(1);
        d.complete(2);
        d.fail();
        assert_eq!(count.get(), 1);
        assert!(d.is_ready());
    }

    #[test]
    fn fail_drops_continuations() {
        let d = Deferred::new();
        let fired = Rc::new(Cell::new(false));
        let f = Rc::clone(&fired);
        d.on_ready(move |_: i32| f.set(true));

        d.fail();
        assert!(!fired.get());
        assert!(d.is_failed());

        // Completing after failure is a no-op as well.
        d.complete(1);
        assert!(!fired.get());
        assert!(d.is_failed());
    }

    #[test]
    fn on_ready_after_failure_is_dropped() {
        let d = Deferred::new();
        d.fail();
        let fired = Rc::new(Cell::new(false));
        let f = Rc::clone(&fired);
        d.on_ready(move |_: i32| f.set(true));
        assert!(!fired.get());
    }

    #[test]
    fn default_is_an_unsettled_cell() {
        let d: Deferred<i32> = Deferred::default();
        assert!(d.is_pending());
        d.complete(9);
        assert!(d.is_ready());
    }

    #[test]
    fn clone_shares_cell() {
        let d = Deferred::new();
        let d2 = d.clone();
        d2.complete(5);
        assert!(d.is_ready());
    }

    #[test]
    fn debug_format() {
        let d: Deferred<i32> = Deferred::new();
        assert!(format!("{d:?}").contains("pending"));
        d.complete(1);
        assert!(format!("{d:?}").contains("ready"));
    }
}
