//! # lib-types
//!
//! Core type definitions shared across the ibis2spice workspace:
//! - Physical units with compile-time safety
//! - Corner and edge selectors plus `(typ, min, max)` value triples
//! - K-parameter time series exchanged between solver, compressor and generator

pub mod units;
pub mod corner;
pub mod kparam;

pub use units::*;
pub use corner::*;
pub use kparam::*;
