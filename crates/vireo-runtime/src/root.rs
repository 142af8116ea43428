#![forbid(unsafe_code)]

//! Render roots: the explicit context a view renders into.
//!
//! A [`RenderRoot`] bundles a document, a disposal registry, and a
//! scheduler. Nothing is process-wide; roots are independent and any number
//! can coexist. Cloning a root is cheap and shares the same context.

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

use vireo_dom::{DisposalRegistry, Document, DomError, Event, NodeId, Value};
use vireo_reactive::{Readable, Store};

use crate::list::{self, EmptyFactory, RowFactory};
use crate::scheduler::{Scheduler, SchedulerConfig, Settled};
use crate::slot;

/// A self-contained rendering context.
#[derive(Clone)]
pub struct RenderRoot {
    pub(crate) doc: Rc<RefCell<Document>>,
    pub(crate) registry: Rc<RefCell<DisposalRegistry>>,
    pub(crate) scheduler: Scheduler,
}

impl Default for RenderRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RenderRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderRoot")
            .field("nodes", &self.doc.borrow().len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl RenderRoot {
    /// Root with default scheduling (no frame budget).
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Root with explicit scheduler configuration.
    #[must_use]
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            doc: Rc::new(RefCell::new(Document::new())),
            registry: Rc::new(RefCell::new(DisposalRegistry::new())),
            scheduler: Scheduler::new(config),
        }
    }

    /// The root's document.
    #[must_use]
    pub fn document(&self) -> &Rc<RefCell<Document>> {
        &self.doc
    }

    /// The root's disposal registry.
    #[must_use]
    pub fn registry(&self) -> &Rc<RefCell<DisposalRegistry>> {
        &self.registry
    }

    /// The root's scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    // -- bindings -----------------------------------------------------------

    /// Bind a node slot under `parent`. Returns the slot's marker node.
    ///
    /// The slot renders each emission of `source` (fully resolving thunks,
    /// deferreds, and nested reactive values) immediately before the
    /// marker. Disposing the marker (or an ancestor) severs the binding.
    pub fn bind_slot(
        &self,
        parent: NodeId,
        source: Rc<dyn Readable<Value>>,
    ) -> Result<NodeId, DomError> {
        slot::bind_slot(&self.doc, &self.registry, &self.scheduler, parent, source)
    }

    /// Bind one attribute position on `el` to `source`.
    pub fn bind_attr(
        &self,
        el: NodeId,
        name: &str,
        source: Rc<dyn Readable<Value>>,
    ) -> Result<(), DomError> {
        // Surface a stale handle now rather than at first patch.
        self.doc.borrow().tag(el)?;
        slot::bind_attr(&self.doc, &self.registry, &self.scheduler, el, name, source);
        Ok(())
    }

    /// Bind a keyed list region under `parent`. Returns the region's start
    /// marker, the binding's disposal anchor.
    pub fn bind_list<T, K>(
        &self,
        parent: NodeId,
        source: Rc<dyn Readable<Vec<T>>>,
        key_fn: impl Fn(&T) -> K + 'static,
        factory: impl Fn(&mut Document, &T, usize) -> Result<NodeId, DomError> + 'static,
    ) -> Result<NodeId, DomError>
    where
        T: Clone + PartialEq + 'static,
        K: Eq + Hash + Clone + 'static,
    {
        list::bind_list(
            &self.doc,
            &self.registry,
            &self.scheduler,
            parent,
            source,
            Rc::new(key_fn),
            Rc::new(factory),
            None,
        )
    }

    /// [`bind_list`](Self::bind_list) with an empty-state placeholder,
    /// rendered while the list is empty and swapped exactly once per
    /// empty/non-empty transition.
    #[allow(clippy::too_many_arguments)]
    pub fn bind_list_with_empty<T, K>(
        &self,
        parent: NodeId,
        source: Rc<dyn Readable<Vec<T>>>,
        key_fn: impl Fn(&T) -> K + 'static,
        factory: impl Fn(&mut Document, &T, usize) -> Result<NodeId, DomError> + 'static,
        empty_factory: impl Fn(&mut Document) -> Result<NodeId, DomError> + 'static,
    ) -> Result<NodeId, DomError>
    where
        T: Clone + PartialEq + 'static,
        K: Eq + Hash + Clone + 'static,
    {
        let factory: Rc<RowFactory<T>> = Rc::new(factory);
        let empty: Rc<EmptyFactory> = Rc::new(empty_factory);
        list::bind_list(
            &self.doc,
            &self.registry,
            &self.scheduler,
            parent,
            source,
            Rc::new(key_fn),
            factory,
            Some(empty),
        )
    }

    // -- driving ------------------------------------------------------------

    /// `store.set(value)` plus a [`Settled`] handle for the resulting flush.
    pub fn commit<T: Clone + PartialEq + 'static>(&self, store: &Store<T>, value: T) -> Settled {
        store.set(value);
        self.scheduler.settled()
    }

    /// Drive frames until no more work is pending.
    pub fn pump(&self) {
        while self.scheduler.needs_frame() {
            self.scheduler.run_frame();
        }
    }

    /// Drive exactly one frame.
    pub fn pump_one(&self) {
        self.scheduler.run_frame();
    }

    /// Dispatch an event to the listeners registered on `target`.
    ///
    /// Listeners run off a snapshot with no document borrow held, so they
    /// may freely mutate the tree or the listener list.
    pub fn dispatch(&self, target: NodeId, name: &str) -> Result<(), DomError> {
        let listeners = self.doc.borrow().listeners(target, name)?;
        let event = Event {
            name: Rc::from(name),
            target,
        };
        for listener in listeners {
            listener(&event);
        }
        Ok(())
    }

    /// Sever every binding in the subtree rooted at `node`, then release it
    /// from the arena.
    ///
    /// Cleanup callbacks run with no document or registry borrow held, so
    /// they may freely detach, re-parent, or register further cleanup.
    pub fn dispose_subtree(&self, node: NodeId) -> Result<(), DomError> {
        let drained = {
            let doc = self.doc.borrow();
            self.registry.borrow_mut().drain_subtree(&doc, node)
        };
        for (owner, callback) in drained {
            callback(owner);
        }
        self.doc.borrow_mut().release(node)
    }
}
