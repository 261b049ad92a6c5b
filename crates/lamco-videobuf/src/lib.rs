//! # lamco-videobuf
//!
//! Zero-copy frame buffer pool for video capture drivers, with ordered
//! capture and ready queues shared between a fast producer (USB transfer
//! completion) and a slower consumer.
//!
//! This crate is part of the [lamco-uvc](https://github.com/lamco-admin/lamco-uvc)
//! workspace. [`lamco-uvc-stream`](https://crates.io/crates/lamco-uvc-stream)
//! is the producer that fills these buffers from isochronous packets.
//!
//! # Features
//!
//! - **One mmap arena**: up to 32 page-aligned slots in a single anonymous mapping
//! - **Graceful allocation**: retries with fewer buffers when memory is short
//! - **Ordered delivery**: frames come out in exactly the order buffers were submitted
//! - **Zero-copy mapping**: consumers read slots in place, with live-mapping accounting
//! - **Async and blocking waits**: per-buffer `tokio::sync::Notify` signals
//!
//! # Quick Start
//!
//! ```rust
//! use lamco_videobuf::{Completion, VideoQueue};
//!
//! # fn example() -> Result<(), lamco_videobuf::BufferError> {
//! let queue = VideoQueue::new();
//! let count = queue.request_buffers(4, 77_312)?;
//! for index in 0..count {
//!     queue.queue_buffer(index)?;
//! }
//!
//! // Producer side (normally the transfer completion handler)
//! {
//!     let mut producer = queue.producer();
//!     producer.activate_head();
//!     if let Some(mut frame) = producer.head_frame() {
//!         frame.append(&[0xFF, 0xD8, 0xFF, 0xD9]);
//!     }
//!     producer.complete_head(Completion::Done);
//! }
//!
//! // Consumer side
//! let index = queue.wait_ready_blocking()?;
//! let frame = queue.dequeue_buffer()?;
//! assert_eq!(frame.index, index);
//! assert_eq!(frame.bytes_used, 4);
//! queue.queue_buffer(frame.index)?;
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      VideoQueue                          │
//! │   parking_lot::Mutex ── capture queue ── ready queue     │
//! │          │                                               │
//! │          ▼                                               │
//! │   FrameBuffer[0..count]   (state, filled, Notify)        │
//! │          │                                               │
//! │          ▼                                               │
//! │   Arc<PoolArena>  ◄──────────── MappedRegion (consumer)  │
//! │   (one mmap, page-aligned slots, per-slot map counts)    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The pool cannot be released or reallocated while any slot is mapped.
//! Mappings also hold a reference to the arena, so a slot's memory can
//! never disappear underneath a reader.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod buffer;
mod error;
mod mapping;
mod pool;
mod queue;

pub use buffer::{BufferFlag, BufferFlags, BufferInfo, BufferState};
pub use error::{BufferError, Result};
pub use mapping::MappedRegion;
pub use pool::{PoolArena, MAX_BUFFERS};
pub use queue::{Completion, DequeuedBuffer, HeadFrame, Producer, Readiness, VideoQueue};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// System page size in bytes
pub fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

/// Round `len` up to a whole number of pages
pub fn page_align(len: usize) -> usize {
    let page = page_size();
    len.div_ceil(page) * page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_page_align() {
        let page = page_size();
        assert!(page.is_power_of_two());
        assert_eq!(page_align(0), 0);
        assert_eq!(page_align(1), page);
        assert_eq!(page_align(page), page);
        assert_eq!(page_align(page + 1), 2 * page);
        assert_eq!(page_align(77_312) % page, 0);
    }
}
