//! Error types for conversion operations.

use lib_types::{Corner, Edge};
use thiserror::Error;

/// Errors that can occur while extracting, solving or generating a model.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// A component or model name is not in the document.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// The model lacks data needed for conversion.
    #[error("Model '{model}' is incomplete: {reason}")]
    IncompleteModel { model: String, reason: String },

    /// No V-T waveform exists for the requested edge.
    #[error("Model '{model}' has no {edge} waveform")]
    NoWaveform { model: String, edge: Edge },

    /// A waveform voltage falls outside an I-V table's usable domain.
    #[error(
        "Model '{model}' ({corner}, {edge}): sample at t={time:e}s, V={voltage}V \
         is outside the {table} table domain [{domain_lo}, {domain_hi}]V"
    )]
    UnsolvableSample {
        model: String,
        corner: Corner,
        edge: Edge,
        time: f64,
        voltage: f64,
        table: &'static str,
        domain_lo: f64,
        domain_hi: f64,
    },

    /// An argument is out of range.
    #[error("Invalid {name}: {message}")]
    InvalidArgument { name: &'static str, message: String },

    /// The model type cannot provide the requested subcircuit.
    #[error("Unsupported io type {io_type}: {reason}")]
    UnsupportedIoType { io_type: String, reason: String },

    /// Unrecognized simulator dialect.
    #[error("Unsupported SPICE dialect '{0}' (expected ltspice or ngspice)")]
    UnsupportedDialect(String),

    /// The output sink could not be written.
    #[error("Failed to write subcircuit: {0}")]
    SinkWrite(#[from] std::io::Error),
}

impl ConvertError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn incomplete(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IncompleteModel {
            model: model.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            message: message.into(),
        }
    }

    pub fn unsupported_io_type(io_type: impl ToString, reason: impl Into<String>) -> Self {
        Self::UnsupportedIoType {
            io_type: io_type.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for conversion operations.
pub type ConvertResult<T> = Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_model() {
        let err = ConvertError::NoWaveform {
            model: "OUT_50".to_string(),
            edge: Edge::Falling,
        };
        assert_eq!(err.to_string(), "Model 'OUT_50' has no Falling waveform");

        let err = ConvertError::not_found("model", "MISSING");
        assert_eq!(err.to_string(), "model 'MISSING' not found");
    }
}
