//! Error types for buffer queue operations
//!
//! Every consumer-facing call fails synchronously with one of these kinds.
//! Producer-side problems never show up here except through
//! [`BufferError::StreamFatal`] and the ERROR state of a dequeued buffer.

use thiserror::Error;

/// Errors returned by [`VideoQueue`](crate::VideoQueue) operations
///
/// # Examples
///
/// ```rust
/// use lamco_videobuf::{BufferError, VideoQueue};
///
/// let queue = VideoQueue::new();
/// match queue.queue_buffer(7) {
///     Err(BufferError::InvalidArgument(msg)) => println!("rejected: {msg}"),
///     other => println!("unexpected: {other:?}"),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Bad index, wrong state for the requested transition, or mismatched
    /// mapping size
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The pool could not be allocated even with a single slot
    #[error("Out of memory allocating buffer pool")]
    OutOfMemory,

    /// The pool is still referenced (live mappings) and cannot be released
    #[error("Buffer pool busy: {0}")]
    Busy(String),

    /// The dequeued buffer completed in the ERROR state
    ///
    /// The buffer has already been returned to IDLE and removed from the
    /// ready queue; its bytes are not trustworthy.
    #[error("Frame in buffer {index} is corrupted")]
    FrameCorrupted {
        /// Index of the affected buffer
        index: usize,
    },

    /// The ready-queue head has not completed yet
    #[error("Buffer {index} is not ready")]
    NotReady {
        /// Index of the ready-queue head
        index: usize,
    },

    /// The ready queue is empty, nothing to wait for or dequeue
    #[error("No buffers queued")]
    NoBuffers,

    /// The producer side can no longer make progress
    #[error("Stream failed: {0}")]
    StreamFatal(String),
}

/// Result type for buffer queue operations
pub type Result<T> = std::result::Result<T, BufferError>;

impl BufferError {
    /// Create an invalid argument error
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a busy error
    pub(crate) fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }

    /// Whether the error reports a per-frame integrity failure rather than a
    /// misuse of the API
    pub fn is_frame_error(&self) -> bool {
        matches!(self, Self::FrameCorrupted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BufferError::invalid("index 9 out of range");
        assert_eq!(err.to_string(), "Invalid argument: index 9 out of range");

        let err = BufferError::FrameCorrupted { index: 2 };
        assert_eq!(err.to_string(), "Frame in buffer 2 is corrupted");
    }

    #[test]
    fn test_error_helpers() {
        assert!(matches!(BufferError::busy("mapped"), BufferError::Busy(_)));
        assert!(BufferError::FrameCorrupted { index: 0 }.is_frame_error());
        assert!(!BufferError::OutOfMemory.is_frame_error());
    }
}
