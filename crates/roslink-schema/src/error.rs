//! Schema errors.

use thiserror::Error;

/// Errors raised while parsing schemas or running codecs.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Malformed message definition line.
    #[error("Invalid message definition for {type_name} at line {line}: {message}")]
    Parse {
        type_name: String,
        line: usize,
        message: String,
    },

    /// Malformed IDL text.
    #[error("Invalid IDL: {0}")]
    Idl(String),

    /// A field references a type with no definition.
    #[error("Unknown type {0}")]
    UnknownType(String),

    /// The definition contains no message type.
    #[error("Empty definition for {0}")]
    Empty(String),

    /// Payload ended before the message was fully read.
    #[error("Truncated payload: need {needed} bytes at offset {offset}")]
    Truncated { needed: usize, offset: usize },

    /// Unknown CDR encapsulation header.
    #[error("Unsupported CDR encapsulation {0:#06x}")]
    Encapsulation(u16),

    /// A value does not match its field type.
    #[error("Invalid value for field {field}: expected {expected}")]
    InvalidValue {
        field: String,
        expected: &'static str,
    },

    /// Fixed-size or bounded array length mismatch.
    #[error("Invalid length {actual} for field {field} (limit {limit})")]
    Length {
        field: String,
        limit: usize,
        actual: usize,
    },

    /// String payload is not valid UTF-8.
    #[error("Invalid UTF-8 in field {0}")]
    Utf8(String),

    /// Type the codecs cannot serialize.
    #[error("Unsupported type {0}")]
    Unsupported(String),
}
