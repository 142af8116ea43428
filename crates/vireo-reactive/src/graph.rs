#![forbid(unsafe_code)]

//! Dependency-graph internals shared by [`Store`](crate::Store) and
//! [`Derived`](crate::Derived).
//!
//! A mutation propagates in two phases:
//!
//! 1. **Invalidation wave**: starting from the mutated store's direct
//!    dependents, every transitively reachable derived is marked dirty and
//!    collected exactly once.
//! 2. **Recompute pass**: the collected set is sorted by dependency depth
//!    (stores are depth 0, a derived is one deeper than its deepest
//!    dependency) and recomputed in that order, so every recompute observes
//!    fully settled upstream values. A derived whose recomputed value is
//!    unchanged stays silent.
//!
//! This is what makes diamond graphs glitch-free: a shared ancestor changing
//! once triggers each downstream derived exactly once, never once per path.

use std::rc::{Rc, Weak};

/// A node that depends on one or more reactive sources.
///
/// Implemented by the shared interior of `Derived<T>`. Not part of the public
/// API surface.
pub trait DependentNode {
    /// Depth in the dependency graph (1 + max dependency depth).
    fn depth(&self) -> u32;

    /// Mark this node stale. Returns `false` when the node was already dirty
    /// in the current wave, or is still being wired up (the "initialized"
    /// gate), in which case the wave does not descend through it again.
    fn mark_dirty(&self) -> bool;

    /// Live downstream dependents of this node.
    fn dependents(&self) -> Vec<Rc<dyn DependentNode>>;

    /// Recompute the cached value if dirty, notifying the node's own
    /// subscribers when the value actually changed.
    fn recompute_if_dirty(&self);
}

/// Upgrade a weak dependent list, pruning entries whose target is gone.
///
/// Dead weak references are dropped lazily here, during notification, rather
/// than eagerly on `Derived` drop.
pub fn upgrade_dependents(dependents: &mut Vec<Weak<dyn DependentNode>>) -> Vec<Rc<dyn DependentNode>> {
    let mut live = Vec::with_capacity(dependents.len());
    dependents.retain(|weak| match weak.upgrade() {
        Some(node) => {
            live.push(node);
            true
        }
        None => false,
    });
    live
}

/// Run the two-phase propagation starting from `roots` (the direct dependents
/// of a store or derived whose value just changed).
pub fn propagate(roots: Vec<Rc<dyn DependentNode>>) {
    let mut collected: Vec<Rc<dyn DependentNode>> = Vec::new();
    let mut stack = roots;

    // Phase 1: invalidation wave. `mark_dirty` dedupes revisits, so each
    // node lands in `collected` at most once per wave.
    while let Some(node) = stack.pop() {
        if node.mark_dirty() {
            stack.extend(node.dependents());
            collected.push(node);
        }
    }

    if collected.is_empty() {
        return;
    }

    // Phase 2: recompute shallow-to-deep. Stable sort keeps collection order
    // among nodes at equal depth, which keeps notification order predictable.
    collected.sort_by_key(|node| node.depth());
    for node in &collected {
        node.recompute_if_dirty();
    }
}
