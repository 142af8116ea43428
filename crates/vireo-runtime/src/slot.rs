#![forbid(unsafe_code)]

//! Slot and attribute bindings: the resolver that unwraps layered values
//! and feeds concrete ones to the patchers through the scheduler.
//!
//! A bound source emits [`Value`]s that may be wrapped arbitrarily deep in
//! `Thunk` (invoke and recurse), `Pending` (continue when the deferred
//! completes), and `Reactive` (subscribe and recurse per emission). The
//! resolver peels all of it down to a concrete value before anything is
//! scheduled.
//!
//! # Invariants
//!
//! 1. Each top-level emission bumps the binding's epoch and drops the
//!    previous emission's nested subscriptions; a continuation or nested
//!    emission carrying a stale epoch is ignored. A late-completing
//!    deferred can therefore never overwrite a newer value.
//! 2. A failed deferred produces no update.
//! 3. Applying a value equal to the last applied one is a no-op (no tree
//!    mutation).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use vireo_dom::{
    DisposalRegistry, Document, NodeId, Rendered, Value, patch_attribute, patch_slot,
};
use vireo_reactive::{Readable, Subscription};

use crate::scheduler::Scheduler;

/// Per-binding staleness state: the emission epoch plus the nested
/// subscriptions belonging to the current epoch.
pub(crate) struct Resolver {
    epoch: Cell<u64>,
    nested: RefCell<Vec<Subscription>>,
}

impl Resolver {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            epoch: Cell::new(0),
            nested: RefCell::new(Vec::new()),
        })
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.get()
    }

    /// Start a new top-level emission: invalidate everything in flight,
    /// then resolve `value` under the fresh epoch.
    pub(crate) fn begin(self: &Rc<Self>, value: Value, apply: &Rc<dyn Fn(Value)>) {
        let epoch = self.invalidate();
        resolve(self, value, epoch, apply);
    }

    /// Bump the epoch and drop nested subscriptions. In-flight deferred
    /// continuations become stale. Returns the new epoch.
    pub(crate) fn invalidate(&self) -> u64 {
        let epoch = self.epoch.get() + 1;
        self.epoch.set(epoch);
        self.nested.borrow_mut().clear();
        epoch
    }
}

/// Recursively unwrap `value` until it is concrete, then hand it to
/// `apply`. Every step checks the epoch first.
fn resolve(resolver: &Rc<Resolver>, value: Value, epoch: u64, apply: &Rc<dyn Fn(Value)>) {
    if resolver.epoch.get() != epoch {
        return;
    }
    match value {
        Value::Thunk(thunk) => {
            let next = thunk();
            resolve(resolver, next, epoch, apply);
        }
        Value::Pending(deferred) => {
            let resolver = Rc::clone(resolver);
            let apply = Rc::clone(apply);
            deferred.on_ready(move |next| resolve(&resolver, next, epoch, &apply));
        }
        Value::Reactive(source) => {
            let nested_resolver = Rc::clone(resolver);
            let nested_apply = Rc::clone(apply);
            let subscription = source.subscribe_shared(Rc::new(
                move |next: &Value, _old: Option<&Value>| {
                    resolve(&nested_resolver, next.clone(), epoch, &nested_apply);
                },
            ));
            // Held until the next top-level emission.
            resolver.nested.borrow_mut().push(subscription);
        }
        concrete => apply(concrete),
    }
}

/// Wire a node slot: append a marker under `parent`, subscribe to `source`,
/// and schedule a minimal patch per resolved emission. Returns the marker,
/// which is also the disposal anchor for the binding.
pub(crate) fn bind_slot(
    doc: &Rc<RefCell<Document>>,
    registry: &Rc<RefCell<DisposalRegistry>>,
    scheduler: &Scheduler,
    parent: NodeId,
    source: Rc<dyn Readable<Value>>,
) -> Result<NodeId, vireo_dom::DomError> {
    let marker = {
        let mut doc = doc.borrow_mut();
        let marker = doc.create_marker("slot");
        doc.append(parent, marker)?;
        marker
    };
    let key = scheduler.alloc_key();
    let resolver = Resolver::new();
    let rendered = Rc::new(RefCell::new(Rendered::None));
    let last = Rc::new(RefCell::new(None::<Value>));

    let apply: Rc<dyn Fn(Value)> = {
        let doc = Rc::clone(doc);
        let registry = Rc::clone(registry);
        let scheduler = scheduler.clone();
        let resolver = Rc::clone(&resolver);
        let rendered = Rc::clone(&rendered);
        let last = Rc::clone(&last);
        Rc::new(move |value: Value| {
            let epoch = resolver.epoch();
            let doc = Rc::clone(&doc);
            let registry = Rc::clone(&registry);
            let resolver = Rc::clone(&resolver);
            let rendered = Rc::clone(&rendered);
            let last = Rc::clone(&last);
            scheduler.schedule(key, move || {
                if resolver.epoch() != epoch {
                    return;
                }
                if last.borrow().as_ref() == Some(&value) {
                    return;
                }
                let prev = std::mem::take(&mut *rendered.borrow_mut());
                let mut doc = doc.borrow_mut();
                let mut registry = registry.borrow_mut();
                match patch_slot(&mut doc, &mut registry, prev, &value, marker) {
                    Ok(next) => {
                        *rendered.borrow_mut() = next;
                        *last.borrow_mut() = Some(value);
                    }
                    Err(error) => {
                        tracing::error!(target: "vireo::runtime", %error, "slot patch failed");
                    }
                }
            });
        })
    };

    let subscription = {
        let resolver = Rc::clone(&resolver);
        source.subscribe_shared(Rc::new(move |value: &Value, _old: Option<&Value>| {
            resolver.begin(value.clone(), &apply);
        }))
    };

    let subscription = Rc::new(RefCell::new(Some(subscription)));
    registry.borrow_mut().register(
        marker,
        Rc::new(move |_| {
            resolver.invalidate();
            subscription.borrow_mut().take();
        }),
    );
    Ok(marker)
}

/// Wire an attribute slot on `el`: subscribe to `source` and schedule
/// [`patch_attribute`] per resolved emission, threading the previously
/// applied value.
pub(crate) fn bind_attr(
    doc: &Rc<RefCell<Document>>,
    registry: &Rc<RefCell<DisposalRegistry>>,
    scheduler: &Scheduler,
    el: NodeId,
    name: &str,
    source: Rc<dyn Readable<Value>>,
) {
    let name: Rc<str> = Rc::from(name);
    let key = scheduler.alloc_key();
    let resolver = Resolver::new();
    let last = Rc::new(RefCell::new(Value::Null));

    let apply: Rc<dyn Fn(Value)> = {
        let doc = Rc::clone(doc);
        let scheduler = scheduler.clone();
        let resolver = Rc::clone(&resolver);
        let last = Rc::clone(&last);
        Rc::new(move |value: Value| {
            let epoch = resolver.epoch();
            let doc = Rc::clone(&doc);
            let resolver = Rc::clone(&resolver);
            let last = Rc::clone(&last);
            let name = Rc::clone(&name);
            scheduler.schedule(key, move || {
                if resolver.epoch() != epoch {
                    return;
                }
                let prev = last.borrow().clone();
                if prev == value {
                    return;
                }
                let mut doc = doc.borrow_mut();
                match patch_attribute(&mut doc, el, &name, &prev, &value) {
                    Ok(()) => *last.borrow_mut() = value,
                    Err(error) => {
                        tracing::error!(target: "vireo::runtime", %error, "attribute patch failed");
                    }
                }
            });
        })
    };

    let subscription = {
        let resolver = Rc::clone(&resolver);
        source.subscribe_shared(Rc::new(move |value: &Value, _old: Option<&Value>| {
            resolver.begin(value.clone(), &apply);
        }))
    };

    let subscription = Rc::new(RefCell::new(Some(subscription)));
    registry.borrow_mut().register(
        el,
        Rc::new(move |_| {
            resolver.invalidate();
            subscription.borrow_mut().take();
        }),
    );
}
