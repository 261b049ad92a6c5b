//! Frame buffer descriptors and their state machine
//!
//! ```text
//!          queue_buffer            first payload
//!   IDLE ──────────────► QUEUED ──────────────► ACTIVE
//!    ▲                     │                      │
//!    │ dequeue             │ abort                │ FID edge / EOF / full
//!    │                     ▼                      ▼
//!    └──────────────── ERROR ◄──── abort ──── DONE
//! ```
//!
//! DONE and ERROR both leave the capture queue and wake a waiter; only a
//! consumer dequeue brings a buffer back to IDLE.

use std::sync::Arc;
use std::time::Instant;

use enumflags2::{bitflags, BitFlags};
use tokio::sync::Notify;

/// Lifecycle state of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferState {
    /// Owned by the consumer, on no queue
    Idle,
    /// Submitted, waiting for the first payload of a new frame
    Queued,
    /// Receiving payload
    Active,
    /// Holds a complete frame
    Done,
    /// Completed with an integrity failure
    Error,
}

impl BufferState {
    /// Whether the buffer has left the producer side
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Whether the buffer sits on the capture queue
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Queued | Self::Active)
    }
}

impl std::fmt::Display for BufferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Queued => "QUEUED",
            Self::Active => "ACTIVE",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Descriptor flags reported by buffer queries (V4L2 bit values)
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFlag {
    /// At least one live mapping
    Mapped = 0x0001,
    /// On the capture queue
    Queued = 0x0002,
    /// Completed, waiting for dequeue
    Done = 0x0004,
    /// Completed with an error
    Error = 0x0040,
}

/// Set of [`BufferFlag`]s
pub type BufferFlags = BitFlags<BufferFlag>;

/// Snapshot of one buffer descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferInfo {
    /// Buffer index
    pub index: usize,
    /// Byte offset of the slot inside the pool, used as the map key
    pub offset: usize,
    /// Usable capacity (the requested frame size)
    pub length: usize,
    /// Bytes of frame data currently held
    pub bytes_used: usize,
    /// Current state
    pub state: BufferState,
    /// Descriptor flags
    pub flags: BufferFlags,
    /// Frame sequence number assigned at completion
    pub sequence: u32,
    /// Completion instant, if the buffer has completed since submission
    pub timestamp: Option<Instant>,
}

/// Per-slot bookkeeping, guarded by the queue lock
#[derive(Debug)]
pub(crate) struct FrameBuffer {
    pub(crate) index: usize,
    pub(crate) offset: usize,
    pub(crate) capacity: usize,
    pub(crate) filled: usize,
    pub(crate) state: BufferState,
    pub(crate) sequence: u32,
    pub(crate) timestamp: Option<Instant>,
    pub(crate) signal: Arc<Notify>,
}

impl FrameBuffer {
    pub(crate) fn new(index: usize, offset: usize, capacity: usize) -> Self {
        Self {
            index,
            offset,
            capacity,
            filled: 0,
            state: BufferState::Idle,
            sequence: 0,
            timestamp: None,
            signal: Arc::new(Notify::new()),
        }
    }

    /// IDLE -> QUEUED, clearing the previous frame
    pub(crate) fn submit(&mut self) {
        self.filled = 0;
        self.timestamp = None;
        self.state = BufferState::Queued;
    }

    pub(crate) fn flags(&self, map_count: usize) -> BufferFlags {
        let mut flags = BufferFlags::empty();
        if map_count > 0 {
            flags |= BufferFlag::Mapped;
        }
        match self.state {
            BufferState::Queued | BufferState::Active => flags |= BufferFlag::Queued,
            BufferState::Done => flags |= BufferFlag::Done,
            BufferState::Error => flags |= BufferFlag::Done | BufferFlag::Error,
            BufferState::Idle => {}
        }
        flags
    }

    pub(crate) fn info(&self, map_count: usize) -> BufferInfo {
        BufferInfo {
            index: self.index,
            offset: self.offset,
            length: self.capacity,
            bytes_used: self.filled,
            state: self.state,
            flags: self.flags(map_count),
            sequence: self.sequence,
            timestamp: self.timestamp,
        }
    }
}
