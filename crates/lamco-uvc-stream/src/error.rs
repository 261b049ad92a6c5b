//! Error types for stream operations
//!
//! Per-packet problems never leave the reassembly engine; they are
//! described by [`PacketError`], counted, and traced. Everything the
//! caller can observe is a [`StreamError`].

use lamco_uvc_control::ControlError;
use lamco_videobuf::BufferError;
use thiserror::Error;

/// Errors returned by [`StreamManager`](crate::StreamManager) and the
/// transfer scheduler
///
/// # Examples
///
/// ```rust
/// use lamco_uvc_stream::StreamError;
/// use lamco_videobuf::BufferError;
///
/// let err: StreamError = BufferError::NoBuffers.into();
/// assert!(matches!(err, StreamError::Buffer(BufferError::NoBuffers)));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Negotiation or a control request failed
    #[error("Control request failed: {0}")]
    Control(#[from] ControlError),

    /// A buffer queue operation failed
    #[error("Buffer queue error: {0}")]
    Buffer(#[from] BufferError),

    /// The USB transport rejected a request
    #[error("Transport error: {0}")]
    Transport(String),

    /// The stream can no longer make progress
    ///
    /// Buffers still waiting for data have been completed with an error
    /// and every waiter has been woken.
    #[error("Stream failed: {0}")]
    StreamFatal(String),

    /// The operation is not allowed in the current stream state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid parameter or configuration
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Only MJPEG is supported
    #[error("Unsupported pixel format")]
    UnsupportedFormat,
}

/// Result type for stream operations
pub type Result<T> = std::result::Result<T, StreamError>;

impl StreamError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an invalid state error
    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Whether the stream must be stopped and restarted to recover
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StreamFatal(_) | Self::Buffer(BufferError::StreamFatal(_))
        )
    }
}

/// Reasons a single isochronous packet is dropped
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// The host controller reported the packet lost
    #[error("packet lost")]
    Lost,

    /// Fewer than two bytes arrived
    #[error("packet too short ({0} bytes)")]
    TooShort(usize),

    /// The header length byte is below two
    #[error("header length {0} below minimum")]
    HeaderTooShort(u8),

    /// The header claims more bytes than the packet holds
    #[error("header length {header} exceeds packet length {packet}")]
    HeaderOverrun {
        /// Declared header length
        header: u8,
        /// Bytes in the packet
        packet: usize,
    },

    /// The device flagged the payload as erroneous
    #[error("device set the error bit")]
    DeviceError,
}
