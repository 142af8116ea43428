#![forbid(unsafe_code)]

//! Node-keyed cleanup callbacks.
//!
//! Bindings register teardown closures against the node that anchors them
//! (a marker, an element, a list row). Disposing a subtree drains the
//! callbacks top-down so every reactive link into the subtree is severed
//! before the nodes are released.
//!
//! # Invariants
//!
//! 1. A node's callbacks are removed from the table **before** they are
//!    invoked, so re-entrant disposal cannot double-fire them.
//! 2. `dispose` visits every descendant exactly once: the whole subtree's
//!    callbacks are drained off a tree snapshot before any of them runs
//!    (callbacks may mutate the tree).
//! 3. Disposing a node with no registrations is a no-op.

use std::rc::Rc;

use ahash::AHashMap;

use crate::document::{Document, NodeId};

/// Cleanup callback, invoked with the node it was registered on.
pub type CleanupFn = dyn Fn(NodeId);

/// Side table of per-node cleanup callbacks.
#[derive(Default)]
pub struct DisposalRegistry {
    callbacks: AHashMap<NodeId, Vec<Rc<CleanupFn>>>,
}

impl std::fmt::Debug for DisposalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposalRegistry")
            .field("nodes", &self.callbacks.len())
            .finish()
    }
}

impl DisposalRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup callback for `node`. Callbacks fire in
    /// registration order at disposal.
    pub fn register(&mut self, node: NodeId, callback: Rc<CleanupFn>) {
        self.callbacks.entry(node).or_default().push(callback);
    }

    /// Register the same callback against several nodes (the fragment case:
    /// one binding producing a node sequence).
    pub fn register_many(&mut self, nodes: &[NodeId], callback: Rc<CleanupFn>) {
        for &node in nodes {
            self.register(node, Rc::clone(&callback));
        }
    }

    /// Number of nodes with at least one pending callback.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether no callbacks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Run and clear the callbacks for `node` and every descendant.
    ///
    /// The whole subtree is drained before any callback runs, so a callback
    /// cannot be skipped, revisited, or double-fired no matter how it
    /// mutates the tree or the registry.
    pub fn dispose(&mut self, doc: &Document, node: NodeId) {
        for (owner, callback) in self.drain_subtree(doc, node) {
            callback(owner);
        }
    }

    /// Remove and return the callbacks for `node` and every descendant
    /// without invoking them, in parent-before-children order.
    ///
    /// Callers holding the document behind a `RefCell` drain under a short
    /// borrow, release it, and only then invoke the callbacks, which lets a
    /// callback detach or re-parent nodes.
    pub fn drain_subtree(
        &mut self,
        doc: &Document,
        node: NodeId,
    ) -> Vec<(NodeId, Rc<CleanupFn>)> {
        let mut out = Vec::new();
        self.drain_into(doc, node, &mut out);
        out
    }

    fn drain_into(&mut self, doc: &Document, node: NodeId, out: &mut Vec<(NodeId, Rc<CleanupFn>)>) {
        if let Some(callbacks) = self.callbacks.remove(&node) {
            out.extend(callbacks.into_iter().map(|callback| (node, callback)));
        }
        let Ok(children) = doc.children(node) else {
            return;
        };
        for child in children {
            self.drain_into(doc, child, out);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
