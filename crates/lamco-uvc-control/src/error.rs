//! Error types for control-plane operations

use thiserror::Error;

/// Errors that can occur while talking to the device's control endpoint
///
/// # Examples
///
/// ```rust
/// use lamco_uvc_control::ControlError;
///
/// let err = ControlError::ShortTransfer { expected: 26, actual: 18 };
/// assert_eq!(err.to_string(), "Short control transfer: expected 26 bytes, got 18");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// The control exchange failed, timed out, or moved an unexpected
    /// number of bytes
    #[error("Control I/O failed: {0}")]
    IoFault(String),

    /// The device returned fewer bytes than the record requires
    #[error("Short control transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer {
        /// Bytes the record needs
        expected: usize,
        /// Bytes actually transferred
        actual: usize,
    },

    /// The device or this crate does not support the request
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for control-plane operations
pub type Result<T> = std::result::Result<T, ControlError>;

impl ControlError {
    /// Create an I/O fault
    pub fn io_fault(msg: impl Into<String>) -> Self {
        Self::IoFault(msg.into())
    }

    /// Create an invalid config error
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
