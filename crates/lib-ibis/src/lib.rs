//! # lib-ibis
//!
//! IBIS file parser for ibis2spice.
//!
//! This crate turns `.ibs` text (IBIS I/O buffer models) into a typed
//! [`IbisFile`]: header, components with package and pin data, and models
//! with their I-V tables and V-T waveforms. Numeric tokens (scale suffixes,
//! unit letters, `NA`) are handled with the `nom` parser combinator library.

pub mod error;
pub mod ibs_parser;

pub use error::ParseError;
pub use ibs_parser::{
    parse_ibs_file, Component, IVTable, IbisFile, IbisHeader, Model, ModelType, Package, Pin,
    TableRow, WaveformTable,
};

use std::path::Path;

/// Read and parse an `.ibs` file from disk.
pub fn load_ibs_file(path: impl AsRef<Path>) -> Result<IbisFile, ParseError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    tracing::debug!("Read {} bytes from {}", content.len(), path.display());
    parse_ibs_file(&content)
}
