#![forbid(unsafe_code)]

//! Error types for the document layer.

use thiserror::Error;

use crate::document::NodeId;

/// Errors surfaced by [`Document`](crate::Document) operations and the
/// patching kernel built on top of it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    /// The handle refers to a node that was released (or never existed).
    #[error("stale node handle: {0:?}")]
    StaleNode(NodeId),

    /// An element-only operation was applied to a text or marker node.
    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),

    /// A text-only operation was applied to a non-text node.
    #[error("node {0:?} is not a text node")]
    NotAText(NodeId),

    /// The property is reserved and cannot be assigned.
    ///
    /// The arena analogue of a host-enforced read-only property; callers in
    /// the attribute patcher treat this as a recoverable, suppressed
    /// condition.
    #[error("property `{name}` is read-only")]
    ReadOnlyProperty {
        /// The property name that was rejected.
        name: String,
    },

    /// A slot marker must be attached for patching to know where to splice.
    #[error("slot marker {0:?} is detached")]
    DetachedMarker(NodeId),

    /// The referenced anchor is not a child of the given parent.
    #[error("anchor {anchor:?} is not a child of {parent:?}")]
    AnchorNotChild {
        /// Intended parent.
        parent: NodeId,
        /// The `insert_before` anchor that was not found under it.
        anchor: NodeId,
    },

    /// Inserting the node would create a cycle (node into itself or a
    /// descendant).
    #[error("inserting {node:?} under {parent:?} would create a cycle")]
    WouldCycle {
        /// Node being inserted.
        node: NodeId,
        /// Destination parent.
        parent: NodeId,
    },
}
