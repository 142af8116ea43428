#![forbid(unsafe_code)]

//! Vireo public facade crate.
//!
//! Re-exports the reactive core, the document layer, and the runtime under
//! one roof; `use vireo::prelude::*` pulls in the working set.

pub use vireo_dom as dom;
pub use vireo_reactive as reactive;
pub use vireo_runtime as runtime;

pub mod prelude {
    pub use vireo_dom::{
        DisposalRegistry, Document, DomError, Event, NodeId, PropValue, Value,
    };
    pub use vireo_reactive::{Deferred, Derived, Readable, Store, StoreError, Subscription};
    pub use vireo_runtime::{RenderRoot, Scheduler, SchedulerConfig, Settled, SlotKey};
}
