use thiserror::Error;

/// Errors raised when dial parameters are read from text
#[derive(Debug, Error, PartialEq)]
pub enum DialError {
    #[error("Unknown direction: {0}")]
    UnknownDirection(String),

    #[error("Unknown dial field: {0}")]
    UnknownField(String),

    #[error("Field {0} cannot be locked")]
    NotLockable(String),

    #[error("Invalid test parameters '{input}': expected sec,size,pkt")]
    InvalidParameters { input: String },

    #[error("{field} {value} is outside {min}..={max}")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

pub type Result<T> = std::result::Result<T, DialError>;
