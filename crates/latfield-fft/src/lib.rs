//! Distributed 3-D FFT, spherically-integrated power spectrum, and
//! Helmholtz projection built atop [`latfield_core::Domain`].

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod engine;
pub mod helmholtz;
pub mod pspec;
pub mod spectral;

pub use engine::{fft3, fft_1d, Direction};
pub use helmholtz::{helmholtz_decompose, ProjectMode};
pub use pspec::{pspec_scalar, pspec_vector};
pub use spectral::{forward_component, k_at, khat_at, reverse_component, FreqField};
