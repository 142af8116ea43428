#![forbid(unsafe_code)]

//! Error types for the reactive layer.

use thiserror::Error;

/// Errors surfaced by reactive primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A write operation was attempted on a derived (read-only) store.
    ///
    /// Derived values are computed from their dependencies; mutating one
    /// directly is a capability misuse, reported at call time rather than
    /// silently coerced.
    #[error("derived stores are read-only: `{op}` is not permitted")]
    ReadOnlyDerived {
        /// The operation that was attempted (`"set"` or `"update"`).
        op: &'static str,
    },
}
