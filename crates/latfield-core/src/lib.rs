//! Domain decomposition, guard-zone exchange, and the process-group
//! abstraction distributed fields are built on.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod dfield;
pub mod domain;
pub mod error;
pub mod procgroup;

pub use dfield::{DField, SubarrayDescriptor};
pub use domain::{Domain, Neighbor};
pub use error::{Error, Result};
pub use procgroup::{CartesianTopology, ProcessGroup, SingleProcessGroup};

#[cfg(feature = "mpi")]
pub use procgroup::MpiProcessGroup;
