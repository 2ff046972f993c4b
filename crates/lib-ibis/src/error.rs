//! Error types for parsing operations.

use thiserror::Error;

/// Errors that can occur while parsing an IBIS file.
#[derive(Debug, Error)]
pub enum ParseError {
    /// I/O error reading the file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Syntax error in the file.
    #[error("Syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// Missing required section or keyword.
    #[error("Missing required {kind}: {name}")]
    Missing { kind: &'static str, name: String },

    /// Invalid value for a field.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ParseError {
    /// Create a syntax error at a specific location.
    pub fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a missing keyword error.
    pub fn missing_keyword(name: impl Into<String>) -> Self {
        Self::Missing {
            kind: "keyword",
            name: name.into(),
        }
    }

    /// Create an invalid value error.
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Attach a 1-based line number to a value error raised while reading a row.
    pub fn at_line(self, line: usize) -> Self {
        match self {
            Self::InvalidValue { field, message } => Self::syntax(line, 1, format!("{}: {}", field, message)),
            other => other,
        }
    }
}
