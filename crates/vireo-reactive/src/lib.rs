#![forbid(unsafe_code)]

//! Reactive primitives for Vireo.
//!
//! This crate provides the observable core the render layer is driven by:
//!
//! - [`Store`]: A shared value container with synchronous change
//!   notification via subscriber callbacks.
//! - [`Derived`]: A read-only store recomputed from one or more dependency
//!   sources, with glitch-free propagation.
//! - [`Subscription`]: RAII guard that automatically unsubscribes on drop.
//! - [`Deferred`]: A single-threaded promise analogue for values that become
//!   available later in the same logical thread.
//!
//! # Architecture
//!
//! `Store<T>` uses `Rc<RefCell<..>>` for single-threaded shared ownership.
//! Derived values are wired into an explicit dependency graph: a `set` on a
//! store first notifies the store's own subscribers, then collects every
//! transitively affected [`Derived`] exactly once and recomputes them in
//! dependency-depth order. A derived notifies its subscribers only when its
//! recomputed value actually changed.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op (no version bump,
//!    no notifications).
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 5. One upstream `set` recomputes each affected derived exactly once, even
//!    when it is reachable over several dependency paths.
//! 6. Subscriber panics are not caught; a misbehaving subscriber is a
//!    programming error, not a runtime condition to recover from.

pub mod deferred;
pub mod derived;
pub mod error;
pub mod store;

pub(crate) mod graph;

pub use deferred::Deferred;
pub use derived::Derived;
pub use error::StoreError;
pub use store::{Readable, Store, SubscriberFn, Subscription};
