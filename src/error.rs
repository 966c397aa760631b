//! Error types for the hashdex library.
//!
//! Every fallible operation returns [`Result`], whose error side is the
//! [`HashdexError`] enum. A missing token is not an error: lookups report it
//! as `Ok(None)`.
//!
//! # Examples
//!
//! ```
//! use hashdex::error::{HashdexError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(HashdexError::invalid_argument("Invalid input"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for hashdex operations.
#[derive(Error, Debug)]
pub enum HashdexError {
    /// I/O errors (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Storage-related errors (missing files, closed storage, ...).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Index-related errors.
    #[error("Index error: {0}")]
    Index(String),

    /// Malformed postings bytes or docInfo lines.
    #[error("Codec error: {0}")]
    Codec(String),

    /// No free slot was found within a full probe of the dictionary table.
    #[error("Capacity exceeded: dictionary table of {table_size} slots is full ({context})")]
    CapacityExceeded { table_size: u64, context: String },

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid argument passed by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not allowed in the current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A merge task panicked.
    #[error("Thread join error: {0}")]
    ThreadJoin(String),

    /// Internal bookkeeping reached a state that must not happen.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for operations that may fail with HashdexError.
pub type Result<T> = std::result::Result<T, HashdexError>;

impl HashdexError {
    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        HashdexError::Storage(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        HashdexError::Index(msg.into())
    }

    /// Create a new codec error.
    pub fn codec<S: Into<String>>(msg: S) -> Self {
        HashdexError::Codec(msg.into())
    }

    /// Create a new capacity error for a table of `table_size` slots.
    pub fn capacity_exceeded<S: Into<String>>(table_size: u64, context: S) -> Self {
        HashdexError::CapacityExceeded {
            table_size,
            context: context.into(),
        }
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        HashdexError::InvalidConfig(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        HashdexError::InvalidArgument(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        HashdexError::InvalidOperation(msg.into())
    }

    /// Create a new invariant violation error.
    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        HashdexError::InvariantViolation(msg.into())
    }

    /// Whether this error reports a full dictionary table.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, HashdexError::CapacityExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = HashdexError::index("Test index error");
        assert_eq!(error.to_string(), "Index error: Test index error");

        let error = HashdexError::codec("truncated varint");
        assert_eq!(error.to_string(), "Codec error: truncated varint");

        let error = HashdexError::capacity_exceeded(17, "put");
        assert_eq!(
            error.to_string(),
            "Capacity exceeded: dictionary table of 17 slots is full (put)"
        );
        assert!(error.is_capacity_exceeded());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = HashdexError::from(io_error);

        match error {
            HashdexError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }
}
