#![forbid(unsafe_code)]

//! Minimal-mutation child-content patching for one reactive slot.
//!
//! A slot is a region of children anchored by a marker node: whatever the
//! slot currently renders sits immediately before the marker. [`patch_slot`]
//! replaces that region with the rendering of a new [`Value`], touching the
//! tree as little as the shapes allow.
//!
//! # Invariants
//!
//! 1. Text-to-text updates mutate the existing text node in place; node
//!    identity is preserved across the patch.
//! 2. Every node the patch removes from the tree is disposed through the
//!    registry before its arena slot is released.
//! 3. A node present in both the previous and next rendering is moved, never
//!    disposed.
//!
//! `Thunk`, `Pending`, and `Reactive` values never reach this layer; the
//! runtime resolver unwraps them first. If one does arrive it renders
//! nothing, like `Null`.

use ahash::AHashSet;

use crate::disposal::DisposalRegistry;
use crate::document::{Document, NodeId};
use crate::error::DomError;
use crate::value::Value;

/// What a slot currently renders.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Rendered {
    /// Nothing rendered.
    #[default]
    None,
    /// A single node before the marker.
    One(NodeId),
    /// An ordered node sequence before the marker.
    Many(Vec<NodeId>),
}

impl Rendered {
    /// The rendered nodes, in order.
    #[must_use]
    pub fn into_nodes(self) -> Vec<NodeId> {
        match self {
            Rendered::None => Vec::new(),
            Rendered::One(id) => vec![id],
            Rendered::Many(nodes) => nodes,
        }
    }

    /// Number of rendered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Rendered::None => 0,
            Rendered::One(_) => 1,
            Rendered::Many(nodes) => nodes.len(),
        }
    }

    /// Whether the slot renders nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Rendered::None)
    }

    fn from_nodes(nodes: Vec<NodeId>) -> Self {
        match nodes.len() {
            0 => Rendered::None,
            1 => Rendered::One(nodes[0]),
            _ => Rendered::Many(nodes),
        }
    }
}

/// Flatten a value into the node sequence it renders, creating text nodes
/// for text-like entries. `Null` entries (and resolver-only arms) vanish;
/// nested lists flatten recursively.
fn flatten_into(doc: &mut Document, value: &Value, out: &mut Vec<NodeId>) {
    match value {
        Value::Node(id) => out.push(*id),
        Value::List(items) => {
            for item in items {
                flatten_into(doc, item, out);
            }
        }
        other => {
            if let Some(text) = other.coerce_text() {
                out.push(doc.create_text(&text));
            }
        }
    }
}

/// Patch the slot anchored at `marker` from `prev` to the rendering of
/// `next`. Returns the new [`Rendered`] state.
///
/// The marker must be attached; rendered nodes are spliced immediately
/// before it under its parent.
pub fn patch_slot(
    doc: &mut Document,
    registry: &mut DisposalRegistry,
    prev: Rendered,
    next: &Value,
    marker: NodeId,
) -> Result<Rendered, DomError> {
    #[cfg(feature = "tracing")]
    let _span = tracing::trace_span!("patch_slot", marker = ?marker).entered();

    // Fast path: single text node updated with text-like content. Mutate the
    // character data in place, preserving node identity.
    if let Rendered::One(old) = &prev
        && doc.is_text(*old)
        && let Some(text) = next.coerce_text()
    {
        let old = *old;
        doc.set_text(old, &text)?;
        return Ok(Rendered::One(old));
    }

    let parent = doc
        .parent(marker)?
        .ok_or(DomError::DetachedMarker(marker))?;

    let mut new_nodes = Vec::new();
    flatten_into(doc, next, &mut new_nodes);

    let old_nodes = prev.into_nodes();

    // One-for-one swap: replace in place rather than detach-then-insert.
    if old_nodes.len() == 1 && new_nodes.len() == 1 && old_nodes[0] != new_nodes[0] {
        let old = old_nodes[0];
        let new = new_nodes[0];
        doc.replace(old, new)?;
        registry.dispose(doc, old);
        doc.release(old)?;
        return Ok(Rendered::One(new));
    }

    // General path: dispose the previous rendering (keeping nodes the next
    // rendering reuses), then splice the new sequence before the marker.
    let reused: AHashSet<NodeId> = new_nodes.iter().copied().collect();
    for old in old_nodes {
        if reused.contains(&old) {
            continue;
        }
        registry.dispose(doc, old);
        doc.release(old)?;
    }
    for &node in &new_nodes {
        doc.insert_before(parent, node, Some(marker))?;
    }
    Ok(Rendered::from_nodes(new_nodes))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
