//! Crate-wide error type.
//!
//! Most of the taxonomy below is *not* surfaced to callers that follow the
//! documented lifecycle: setters on an already-committed [`crate::Domain`] or
//! [`crate::DField`] simply log and no-op rather than returning `Err`, matching
//! the source library's void-returning setters. Only the two rows that mark a
//! collective-consistency violation (`DecompositionImpossible`, `PeerFailure`)
//! and the two report-and-return rows (`BadArity`, `NotCommitted`) are ever
//! constructed as real `Result::Err` values.

use thiserror::Error;

/// Errors produced by domain decomposition, field management, and guard
/// exchange.
#[derive(Debug, Error)]
pub enum Error {
    /// A setter was invoked after `commit`; the call was ignored.
    #[error("setter called on an already-committed object")]
    AlreadyCommitted,

    /// An axis index fell outside `[0, n_dims)`.
    #[error("dimension index {index} out of range for n_dims={n_dims}")]
    BadDimension {
        /// The offending index.
        index: usize,
        /// The active dimensionality.
        n_dims: usize,
    },

    /// A spectral operation was invoked against a field with the wrong
    /// member count.
    #[error("operation requires {expected} member(s), field has {actual}")]
    BadArity {
        /// Member count the operation requires.
        expected: usize,
        /// Member count the field actually has.
        actual: usize,
    },

    /// An operation that requires a committed [`crate::DField`] or
    /// [`crate::Domain`] was invoked before `commit`.
    #[error("operation requires a committed object")]
    NotCommitted,

    /// `proc_sizes` cannot be factored to match the process-group size.
    #[error("cannot factor {size} processes into a {n_dims}-d grid matching proc_sizes={proc_sizes:?}")]
    DecompositionImpossible {
        /// Total process count.
        size: usize,
        /// Requested dimensionality.
        n_dims: usize,
        /// Partially-specified process grid extents.
        proc_sizes: [usize; 3],
    },

    /// The underlying transport failed mid-exchange. Treated as fatal; the
    /// process group is assumed unrecoverable afterward.
    #[error("peer communication failure: {0}")]
    PeerFailure(String),

    /// An operation named in the public surface whose full semantics belong
    /// to the out-of-scope I/O subsystem (`set_collective`, `set_chunk`,
    /// `set_align`, `read_size`, `write`, `read`).
    #[error("operation is reserved for the (unimplemented) I/O subsystem")]
    Unimplemented,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
