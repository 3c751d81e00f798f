//! Error types for the ephemfile module
//!
//! This module defines error types for the binary ephemeris table codec.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ephemeris table functionality
#[derive(Error, Debug)]
pub enum EphemFileError {
    /// Error when a file I/O operation fails
    #[error("File I/O error on {path:?}: {source}")]
    FileError {
        /// The path of the file that caused the error
        path: PathBuf,
        /// The underlying I/O error
        source: std::io::Error,
    },

    /// Error when a time is outside the span covered by the table
    #[error("Time {jd} is outside table coverage ({start_jd}..{end_jd})")]
    OutOfRange {
        /// The Julian date that was requested
        jd: f64,
        /// The start of the covered span
        start_jd: f64,
        /// The end of the covered span
        end_jd: f64,
    },

    /// Error when the file format is invalid or unsupported
    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    /// Error when the embedded model id does not match the requested one
    #[error("Model number mismatch: file carries {found}, requested {requested}")]
    ModelMismatch {
        /// Model id embedded in the file
        found: u32,
        /// Model id the caller asked for
        requested: u32,
    },

    /// Error when the item count exceeds the decoder's capacity
    #[error("Item count {0} exceeds capacity {1}")]
    TooManyItems(usize, usize),

    /// Error when a requested body is not represented in this file variant
    #[error("Body not available in this file variant: {0}")]
    BodyUnavailable(String),

    /// Other, miscellaneous errors
    #[error("{0}")]
    Other(String),
}

/// Extension of the Result type for ephemfile operations
pub type Result<T> = std::result::Result<T, EphemFileError>;

/// Helper function to convert a std::io::Error to EphemFileError
pub fn io_err(path: impl Into<PathBuf>, err: std::io::Error) -> EphemFileError {
    EphemFileError::FileError {
        path: path.into(),
        source: err,
    }
}
