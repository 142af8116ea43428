#![forbid(unsafe_code)]

//! Document model and patching kernel for Vireo.
//!
//! This crate owns everything that touches the rendered tree:
//!
//! - [`Document`]: an arena-backed node tree (elements, text, markers) with
//!   O(1) sibling-linked structural edits and generational handles.
//! - [`Value`]: the tagged union of every shape a template interpolation can
//!   take (literals, nodes, lists, thunks, deferreds, reactive sources,
//!   event handlers).
//! - [`patch_slot`]: minimal-mutation child-content updates for one reactive
//!   slot.
//! - [`patch_attribute`]: attribute/property/style/listener updates for one
//!   attribute slot.
//! - [`reconcile_list`]: keyed-sequence reconciliation (LIS-based minimal
//!   move).
//! - [`DisposalRegistry`]: node-keyed cleanup callbacks, drained depth-first
//!   on subtree disposal.
//!
//! The crate is deliberately renderer-shaped rather than browser-shaped:
//! node identity is an arena handle plus a side table, not a garbage
//! collected host object (so no weak-reference semantics are required).

pub mod attr;
pub mod disposal;
pub mod document;
pub mod error;
pub mod patch;
pub mod reconcile;
pub mod value;

pub use attr::patch_attribute;
pub use disposal::{CleanupFn, DisposalRegistry};
pub use document::{Document, Event, ListenerFn, NodeId, PropValue};
pub use error::DomError;
pub use patch::{Rendered, patch_slot};
pub use reconcile::{ListState, reconcile_list};
pub use value::Value;
