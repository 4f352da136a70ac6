//! Error types for spilink-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate and by backend implementations.

use alloc::string::String;
use core::fmt;

/// A parameter value outside its valid domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Configuration key the value was given for (e.g. `bitsPerWord`)
    pub key: &'static str,
    /// The rejected value, as text
    pub value: String,
    /// What is wrong with it (e.g. "illegal bits per word")
    pub message: &'static str,
}

impl ValidationError {
    /// Create a validation error for `key` rejecting `value`
    pub fn new(key: &'static str, value: impl fmt::Display, message: &'static str) -> Self {
        use alloc::string::ToString;
        Self {
            key,
            value: value.to_string(),
            message,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}={})", self.message, self.key, self.value)
    }
}

/// Why a device path could not be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    /// Path does not exist
    NotFound,
    /// Caller lacks permission to open the path
    PermissionDenied,
    /// Device is held by someone else
    Busy,
    /// Any other OS error, by code
    Other(i32),
}

impl fmt::Display for OpenFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no such device"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::Busy => write!(f, "device busy"),
            Self::Other(code) => write!(f, "os error {}", code),
        }
    }
}

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Caller errors
    /// A configuration or parameter value violates its domain
    Validation(ValidationError),
    /// A transfer was attempted on a handle that is not open
    NotOpen,
    /// Write and read buffers of a full-duplex transfer differ in length
    BufferSizeMismatch {
        /// Length of the write buffer
        write_len: usize,
        /// Length of the read buffer
        read_len: usize,
    },
    /// Lifecycle violation, such as opening a handle twice
    InvalidState(&'static str),

    // Backend errors
    /// Opening the underlying device failed
    DeviceOpen {
        /// Path that was being opened
        path: String,
        /// Reason reported by the backend
        cause: OpenFailure,
    },
    /// The backend refused a transfer parameter
    Configure {
        /// Which setting was being written
        setting: &'static str,
        /// OS error code
        code: i32,
    },
    /// The backend failed to perform a transfer
    Transfer {
        /// OS error code
        code: i32,
    },
    /// A buffer is longer than the backend can move in one message
    TransferTooLong {
        /// Requested length in bytes
        len: usize,
        /// Backend limit in bytes
        max: usize,
    },
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "{}", e),
            Self::NotOpen => write!(f, "device not opened"),
            Self::BufferSizeMismatch {
                write_len,
                read_len,
            } => write!(
                f,
                "write buffer ({} bytes) and read buffer ({} bytes) differ in length",
                write_len, read_len
            ),
            Self::InvalidState(what) => write!(f, "invalid state: {}", what),
            Self::DeviceOpen { path, cause } => write!(f, "failed to open {}: {}", path, cause),
            Self::Configure { setting, code } => {
                write!(f, "failed to set {}: os error {}", setting, code)
            }
            Self::Transfer { code } => write!(f, "SPI transfer failed: os error {}", code),
            Self::TransferTooLong { len, max } => write!(
                f,
                "transfer of {} bytes exceeds the {} byte limit of the device",
                len, max
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ValidationError {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
