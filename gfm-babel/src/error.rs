//! Error types for conversion operations
//!
//! Malformed Markdown never produces an error: the parser degrades to literal
//! text. [`ParseError`] is reserved for input the engine cannot read at all,
//! and [`FormatError`] wraps it for the registry-level API.

use thiserror::Error;

/// Catastrophic parse failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The input bytes are not valid UTF-8
    #[error("input is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidEncoding { valid_up_to: usize },

    /// Nesting exceeded the configured limit
    #[error("nesting depth {depth} exceeds the limit of {limit}")]
    NestingTooDeep { depth: usize, limit: usize },

    /// A JSON document tree could not be read
    #[error("invalid document JSON: {0}")]
    InvalidJson(String),
}

/// Errors that can occur during format operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    /// Format not found in registry
    #[error("Format '{0}' not found")]
    FormatNotFound(String),

    /// Error during parsing
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Error during serialization
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Format does not support the requested operation
    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

/// A structural rule of the document schema that a tree breaks
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{parent} cannot contain {child} (at {path})")]
pub struct SchemaViolation {
    pub parent: String,
    pub child: String,
    /// Child indices from the document root, e.g. `0/2/1`
    pub path: String,
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;
