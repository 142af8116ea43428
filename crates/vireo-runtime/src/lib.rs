#![forbid(unsafe_code)]

//! Runtime layer for Vireo: the frame scheduler, render roots, and the
//! bindings that connect reactive sources to the document.
//!
//! The flow end to end:
//!
//! 1. A binding subscribes to a [`Readable`](vireo_reactive::Readable)
//!    source and resolves each emission down to a concrete
//!    [`Value`](vireo_dom::Value).
//! 2. The resolved emission is scheduled under the binding's
//!    [`SlotKey`]; repeated emissions before a flush coalesce to the
//!    latest one.
//! 3. [`Scheduler::run_frame`] (driven by the host, or
//!    [`RenderRoot::pump`] in tests) applies one minimal patch per dirty
//!    slot.
//!
//! Synchronous reads ([`Store::get`](vireo_reactive::Store::get)) always
//! observe the latest written value; only the rendered tree is
//! frame-deferred.

mod bindings;
pub mod list;
pub mod root;
pub mod scheduler;
mod slot;

pub use list::{EmptyFactory, RowFactory};
pub use root::RenderRoot;
pub use scheduler::{Scheduler, SchedulerConfig, Settled, SlotKey};
