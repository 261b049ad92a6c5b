//! Capture and ready queues
//!
//! Submission appends a buffer to both queues at once. The producer
//! consumes the capture queue from its head, the consumer consumes the
//! ready queue from its head, so frames come out in exactly the order the
//! buffers went in.
//!
//! ```text
//!   queue_buffer(i) ──┬──► capture: [i0, i1, i2]  ◄── producer fills head
//!                     │
//!                     └──► ready:   [i0, i1, i2]  ◄── consumer waits on head,
//!                                                     then dequeues it
//! ```
//!
//! One [`parking_lot::Mutex`] guards both queues and every descriptor.
//! It is only held for bounded work; waiting happens on per-buffer
//! [`tokio::sync::Notify`] signals outside the lock.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::buffer::{BufferFlags, BufferInfo, BufferState, FrameBuffer};
use crate::error::{BufferError, Result};
use crate::mapping::MappedRegion;
use crate::pool::{PoolArena, MAX_BUFFERS};

/// Result of a non-blocking readiness query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The ready-queue head has completed and can be dequeued
    Ready,
    /// The ready-queue head is still in flight
    Pending,
    /// Nothing has been submitted
    Empty,
}

/// Outcome of a producer-side completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The frame is complete
    Done,
    /// The frame failed an integrity check
    Error,
}

/// A buffer handed back to the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DequeuedBuffer {
    /// Buffer index
    pub index: usize,
    /// Bytes of frame data
    pub bytes_used: usize,
    /// Flags at completion time
    pub flags: BufferFlags,
    /// Frame sequence number
    pub sequence: u32,
    /// Completion instant
    pub timestamp: Option<Instant>,
}

#[derive(Default)]
struct QueueInner {
    arena: Option<Arc<PoolArena>>,
    buffers: Vec<FrameBuffer>,
    capture: VecDeque<usize>,
    ready: VecDeque<usize>,
    sequence: u32,
    fatal: Option<String>,
}

impl QueueInner {
    fn buffer(&self, index: usize) -> Result<&FrameBuffer> {
        self.buffers
            .get(index)
            .ok_or_else(|| BufferError::invalid(format!("buffer index {index} out of range")))
    }

    fn map_count(&self, index: usize) -> usize {
        self.arena.as_ref().map_or(0, |arena| arena.map_count(index))
    }

    fn empty_error(&self) -> BufferError {
        match &self.fatal {
            Some(reason) => BufferError::StreamFatal(reason.clone()),
            None => BufferError::NoBuffers,
        }
    }

    /// Drop the pool and descriptors, waking anyone parked on them
    fn teardown(&mut self) {
        for buffer in &self.buffers {
            buffer.signal.notify_waiters();
        }
        self.buffers.clear();
        self.capture.clear();
        self.ready.clear();
        self.arena = None;
        self.sequence = 0;
        self.fatal = None;
    }
}

/// Frame buffer pool with its capture and ready queues
///
/// Shared between the consumer (submission, waiting, dequeue, mapping)
/// and the producer (see [`VideoQueue::producer`]). Wrap it in an `Arc` to
/// hand it to both sides.
pub struct VideoQueue {
    inner: Mutex<QueueInner>,
    memory_limit: Option<usize>,
}

impl Default for VideoQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoQueue {
    /// Create an empty queue with no pool
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            memory_limit: None,
        }
    }

    /// Create an empty queue whose pool may not exceed `limit` bytes
    ///
    /// Allocations above the limit fail like an out-of-memory condition
    /// and fall back to fewer buffers.
    pub fn with_memory_limit(limit: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            memory_limit: Some(limit),
        }
    }

    // ========================================================================
    // Pool management
    // ========================================================================

    /// Allocate `count` buffers able to hold `frame_size` bytes each
    ///
    /// Any previous pool is released first. The count is capped at 32 and
    /// reduced further while the allocation fails; the number actually
    /// allocated is returned. A count of 0 only releases the pool.
    pub fn request_buffers(&self, count: usize, frame_size: usize) -> Result<usize> {
        if count > 0 && frame_size == 0 {
            return Err(BufferError::invalid("frame size must be non-zero"));
        }

        let mut inner = self.inner.lock();

        if let Some(arena) = &inner.arena {
            let mappings = arena.total_mappings();
            if mappings > 0 {
                warn!("Refusing to reallocate pool with {} live mappings", mappings);
                return Err(BufferError::busy(format!("{mappings} live mappings")));
            }
        }

        inner.teardown();

        if count == 0 {
            debug!("Buffer pool released");
            return Ok(0);
        }

        let requested = count.min(MAX_BUFFERS);
        let (arena, actual) = (1..=requested)
            .rev()
            .find_map(|n| PoolArena::map(n, frame_size, self.memory_limit).map(|arena| (arena, n)))
            .ok_or(BufferError::OutOfMemory)?;

        inner.buffers = (0..actual)
            .map(|i| FrameBuffer::new(i, arena.slot_offset(i), frame_size))
            .collect();
        inner.arena = Some(Arc::new(arena));

        info!(
            "Allocated {} buffers of {} bytes ({} requested)",
            actual, frame_size, count
        );

        Ok(actual)
    }

    /// Release the pool
    ///
    /// Fails with [`BufferError::Busy`] while any slot is still mapped.
    pub fn release(&self) -> Result<()> {
        self.request_buffers(0, 0).map(|_| ())
    }

    /// Number of buffers in the current pool
    pub fn buffer_count(&self) -> usize {
        self.inner.lock().buffers.len()
    }

    /// Page-aligned slot size of the current pool
    pub fn slot_size(&self) -> Option<usize> {
        self.inner.lock().arena.as_ref().map(|arena| arena.slot_size())
    }

    /// Describe one buffer
    pub fn query_buffer(&self, index: usize) -> Result<BufferInfo> {
        let inner = self.inner.lock();
        let buffer = inner.buffer(index)?;
        Ok(buffer.info(inner.map_count(index)))
    }

    // ========================================================================
    // Consumer side
    // ========================================================================

    /// Submit an IDLE buffer for capture
    pub fn queue_buffer(&self, index: usize) -> Result<()> {
        let mut inner = self.inner.lock();

        if let Some(reason) = &inner.fatal {
            return Err(BufferError::StreamFatal(reason.clone()));
        }

        let state = inner.buffer(index)?.state;
        if state != BufferState::Idle {
            return Err(BufferError::invalid(format!(
                "buffer {index} is {state}, expected IDLE"
            )));
        }

        inner.buffers[index].submit();
        inner.capture.push_back(index);
        inner.ready.push_back(index);
        Ok(())
    }

    /// Non-blocking readiness of the ready-queue head
    pub fn poll(&self) -> Readiness {
        let inner = self.inner.lock();
        match inner.ready.front() {
            None => Readiness::Empty,
            Some(&index) if inner.buffers[index].state.is_complete() => Readiness::Ready,
            Some(_) => Readiness::Pending,
        }
    }

    /// Wait until the ready-queue head completes and return its index
    ///
    /// Returns immediately when the head is already DONE or ERROR. Fails
    /// with [`BufferError::NoBuffers`] when nothing is queued (or the pool
    /// goes away while waiting) and with [`BufferError::StreamFatal`] once
    /// the stream has failed and every buffer was dequeued. There is no
    /// implicit timeout.
    pub async fn wait_ready(&self) -> Result<usize> {
        loop {
            let signal;
            let mut notified;
            {
                let inner = self.inner.lock();
                let Some(&index) = inner.ready.front() else {
                    return Err(inner.empty_error());
                };
                let buffer = &inner.buffers[index];
                if buffer.state.is_complete() {
                    return Ok(index);
                }
                signal = Arc::clone(&buffer.signal);
                // Register before unlocking so a completion cannot slip in
                // between the check and the wait.
                notified = Box::pin(signal.notified());
                notified.as_mut().enable();
            }
            notified.await;
        }
    }

    /// Blocking variant of [`wait_ready`](Self::wait_ready) for sync callers
    pub fn wait_ready_blocking(&self) -> Result<usize> {
        futures::executor::block_on(self.wait_ready())
    }

    /// Take the completed ready-queue head back to IDLE
    ///
    /// An ERROR buffer is still removed and returned to IDLE, but the call
    /// reports [`BufferError::FrameCorrupted`].
    pub fn dequeue_buffer(&self) -> Result<DequeuedBuffer> {
        let mut inner = self.inner.lock();

        let Some(&index) = inner.ready.front() else {
            return Err(inner.empty_error());
        };

        let map_count = inner.map_count(index);
        let buffer = &mut inner.buffers[index];
        if !buffer.state.is_complete() {
            return Err(BufferError::NotReady { index });
        }

        let failed = buffer.state == BufferState::Error;
        let dequeued = DequeuedBuffer {
            index,
            bytes_used: buffer.filled,
            flags: buffer.flags(map_count),
            sequence: buffer.sequence,
            timestamp: buffer.timestamp,
        };
        buffer.state = BufferState::Idle;
        inner.ready.pop_front();

        if failed {
            return Err(BufferError::FrameCorrupted { index });
        }
        Ok(dequeued)
    }

    /// Wait for the ready-queue head and dequeue it
    pub async fn dequeue(&self) -> Result<DequeuedBuffer> {
        self.wait_ready().await?;
        self.dequeue_buffer()
    }

    /// Copy the frame held by an IDLE buffer into `out`
    ///
    /// For consumers that do not map the pool. Returns the number of bytes
    /// copied.
    pub fn copy_frame(&self, index: usize, out: &mut Vec<u8>) -> Result<usize> {
        let inner = self.inner.lock();
        let buffer = inner.buffer(index)?;
        if buffer.state != BufferState::Idle {
            return Err(BufferError::invalid(format!(
                "buffer {index} is {}, expected IDLE",
                buffer.state
            )));
        }
        let filled = buffer.filled;
        let Some(arena) = &inner.arena else {
            return Err(BufferError::NoBuffers);
        };

        // SAFETY: The buffer is IDLE, so the producer will not touch it, and
        // the queue lock is held.
        let slot = unsafe { arena.slot(index) };
        out.clear();
        out.extend_from_slice(&slot[..filled]);
        Ok(filled)
    }

    // ========================================================================
    // Zero-copy mapping
    // ========================================================================

    /// Map slot `index`; `size` must equal the slot size
    pub fn map(&self, index: usize, size: usize) -> Result<MappedRegion> {
        let inner = self.inner.lock();
        let Some(arena) = &inner.arena else {
            return Err(BufferError::invalid("no buffer pool allocated"));
        };
        inner.buffer(index)?;
        if size != arena.slot_size() {
            return Err(BufferError::invalid(format!(
                "mapping size {size} does not match slot size {}",
                arena.slot_size()
            )));
        }
        Ok(MappedRegion::new(Arc::clone(arena), index))
    }

    /// Map the slot starting at pool byte `offset`
    pub fn map_offset(&self, offset: usize, size: usize) -> Result<MappedRegion> {
        let index = {
            let inner = self.inner.lock();
            let Some(arena) = &inner.arena else {
                return Err(BufferError::invalid("no buffer pool allocated"));
            };
            if offset % arena.slot_size() != 0 {
                return Err(BufferError::invalid(format!(
                    "offset {offset} is not a slot boundary"
                )));
            }
            offset / arena.slot_size()
        };
        self.map(index, size)
    }

    // ========================================================================
    // Stream control
    // ========================================================================

    /// Fail the stream
    ///
    /// Every buffer still on the capture queue moves to ERROR and is
    /// signalled; further submissions, and waits on an empty ready queue,
    /// report [`BufferError::StreamFatal`]. Returns the number of buffers
    /// failed.
    pub fn abort(&self, reason: &str) -> usize {
        let mut inner = self.inner.lock();
        error!("Stream failed, aborting capture queue: {}", reason);

        let failed: Vec<usize> = inner.capture.drain(..).collect();
        let now = Instant::now();
        for &index in &failed {
            let sequence = inner.sequence;
            inner.sequence = inner.sequence.wrapping_add(1);
            let buffer = &mut inner.buffers[index];
            buffer.state = BufferState::Error;
            buffer.sequence = sequence;
            buffer.timestamp = Some(now);
            buffer.signal.notify_waiters();
            buffer.signal.notify_one();
        }
        inner.fatal = Some(reason.to_string());
        failed.len()
    }

    /// Whether the stream has been failed by [`abort`](Self::abort)
    pub fn is_fatal(&self) -> bool {
        self.inner.lock().fatal.is_some()
    }

    /// Clear a previous failure so a new stream session can start
    pub fn clear_fatal(&self) {
        self.inner.lock().fatal = None;
    }

    /// Return ACTIVE buffers on the capture queue to QUEUED
    ///
    /// Used when streaming stops: in-flight buffers stay submitted but
    /// lose their partial frame, and nobody is woken.
    pub fn rewind_capture(&self) -> usize {
        let mut inner = self.inner.lock();
        let capture: Vec<usize> = inner.capture.iter().copied().collect();
        let mut rewound = 0;
        for index in capture {
            let buffer = &mut inner.buffers[index];
            if buffer.state == BufferState::Active {
                buffer.submit();
                rewound += 1;
            }
        }
        rewound
    }

    // ========================================================================
    // Producer side
    // ========================================================================

    /// Lock the queue for the producer
    ///
    /// Hold the returned guard only for bounded, non-sleeping work such as
    /// processing one completed transfer.
    pub fn producer(&self) -> Producer<'_> {
        Producer {
            inner: self.inner.lock(),
        }
    }
}

impl std::fmt::Debug for VideoQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("VideoQueue")
            .field("buffers", &inner.buffers.len())
            .field("capture", &inner.capture)
            .field("ready", &inner.ready)
            .field("fatal", &inner.fatal)
            .finish()
    }
}

/// Exclusive producer access to the capture-queue head
pub struct Producer<'a> {
    inner: MutexGuard<'a, QueueInner>,
}

/// Writable view of the frame at the capture-queue head
pub struct HeadFrame<'a> {
    data: &'a mut [u8],
    filled: &'a mut usize,
}

impl HeadFrame<'_> {
    /// Bytes written so far
    pub fn filled(&self) -> usize {
        *self.filled
    }

    /// Usable capacity
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes still free
    pub fn remaining(&self) -> usize {
        self.data.len() - *self.filled
    }

    /// Append as much of `payload` as fits, returning the bytes copied
    pub fn append(&mut self, payload: &[u8]) -> usize {
        let start = *self.filled;
        let len = payload.len().min(self.remaining());
        self.data[start..start + len].copy_from_slice(&payload[..len]);
        *self.filled += len;
        len
    }

    /// Capacity-bounded bytes from `start` to the end of the buffer
    pub fn tail_mut(&mut self, start: usize) -> &mut [u8] {
        let start = start.min(self.data.len());
        &mut self.data[start..]
    }

    /// Override the fill level, clamped to capacity
    pub fn set_filled(&mut self, filled: usize) {
        *self.filled = filled.min(self.data.len());
    }
}

impl Producer<'_> {
    /// Index of the capture-queue head
    pub fn head(&self) -> Option<usize> {
        self.inner.capture.front().copied()
    }

    /// State of the capture-queue head
    pub fn head_state(&self) -> Option<BufferState> {
        self.head().map(|index| self.inner.buffers[index].state)
    }

    /// QUEUED -> ACTIVE for the capture-queue head
    pub fn activate_head(&mut self) {
        if let Some(index) = self.head() {
            let buffer = &mut self.inner.buffers[index];
            if buffer.state == BufferState::Queued {
                buffer.state = BufferState::Active;
            }
        }
    }

    /// Writable frame of the capture-queue head
    pub fn head_frame(&mut self) -> Option<HeadFrame<'_>> {
        let index = self.head()?;
        let inner = &mut *self.inner;
        let arena = inner.arena.as_ref()?;
        let buffer = &mut inner.buffers[index];

        // SAFETY: The queue lock is held through `self`, and the producer is
        // the only writer of capture-queue slots.
        let slot = unsafe { arena.slot_mut(index) };
        Some(HeadFrame {
            data: &mut slot[..buffer.capacity],
            filled: &mut buffer.filled,
        })
    }

    /// Complete the capture-queue head and wake one waiter
    ///
    /// Returns the index of the completed buffer.
    pub fn complete_head(&mut self, outcome: Completion) -> Option<usize> {
        let index = self.inner.capture.pop_front()?;
        let sequence = self.inner.sequence;
        self.inner.sequence = sequence.wrapping_add(1);

        let buffer = &mut self.inner.buffers[index];
        buffer.state = match outcome {
            Completion::Done => BufferState::Done,
            Completion::Error => BufferState::Error,
        };
        buffer.sequence = sequence;
        buffer.timestamp = Some(Instant::now());
        debug!(
            "Buffer {} {} with {} bytes (seq {})",
            index, buffer.state, buffer.filled, sequence
        );
        buffer.signal.notify_one();
        Some(index)
    }

    /// Number of buffers on the capture queue
    pub fn pending(&self) -> usize {
        self.inner.capture.len()
    }
}

#[cfg(test)]
impl VideoQueue {
    fn signal(&self, index: usize) -> Arc<tokio::sync::Notify> {
        Arc::clone(&self.inner.lock().buffers[index].signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferFlag;
    use std::time::Duration;

    fn queue_with(count: usize, frame_size: usize) -> VideoQueue {
        let queue = VideoQueue::new();
        assert_eq!(queue.request_buffers(count, frame_size).unwrap(), count);
        queue
    }

    fn fill_and_complete(queue: &VideoQueue, payload: &[u8], outcome: Completion) -> Option<usize> {
        let mut producer = queue.producer();
        producer.activate_head();
        producer.head_frame()?.append(payload);
        producer.complete_head(outcome)
    }

    #[test]
    fn test_request_buffers_initialises_idle() {
        let queue = queue_with(4, 4096);
        assert_eq!(queue.buffer_count(), 4);

        for i in 0..4 {
            let info = queue.query_buffer(i).unwrap();
            assert_eq!(info.state, BufferState::Idle);
            assert_eq!(info.length, 4096);
            assert_eq!(info.offset, i * queue.slot_size().unwrap());
            assert!(info.flags.is_empty());
        }
        assert_eq!(queue.poll(), Readiness::Empty);
    }

    #[test]
    fn test_request_buffers_caps_count() {
        let queue = VideoQueue::new();
        assert_eq!(queue.request_buffers(40, 1024).unwrap(), MAX_BUFFERS);
    }

    #[test]
    fn test_request_buffers_retries_smaller_counts() {
        let slot = crate::page_align(4096);
        let queue = VideoQueue::with_memory_limit(2 * slot);
        assert_eq!(queue.request_buffers(4, 4096).unwrap(), 2);
    }

    #[test]
    fn test_request_buffers_out_of_memory() {
        let queue = VideoQueue::with_memory_limit(16);
        assert_eq!(queue.request_buffers(4, 4096), Err(BufferError::OutOfMemory));
        assert_eq!(queue.buffer_count(), 0);
    }

    #[test]
    fn test_request_zero_releases() {
        let queue = queue_with(2, 4096);
        assert_eq!(queue.request_buffers(0, 0).unwrap(), 0);
        assert_eq!(queue.buffer_count(), 0);
        assert!(queue.slot_size().is_none());
    }

    #[test]
    fn test_realloc_empties_queues() {
        let queue = queue_with(2, 4096);
        queue.queue_buffer(0).unwrap();
        assert_eq!(queue.request_buffers(3, 2048).unwrap(), 3);
        assert_eq!(queue.poll(), Readiness::Empty);
        assert!(queue.producer().head().is_none());
    }

    #[test]
    fn test_queue_buffer_rejects_illegal_transitions() {
        let queue = queue_with(2, 4096);

        assert!(matches!(queue.queue_buffer(2), Err(BufferError::InvalidArgument(_))));

        queue.queue_buffer(0).unwrap();
        assert!(matches!(queue.queue_buffer(0), Err(BufferError::InvalidArgument(_))));

        fill_and_complete(&queue, b"frame", Completion::Done);
        assert!(matches!(queue.queue_buffer(0), Err(BufferError::InvalidArgument(_))));

        queue.dequeue_buffer().unwrap();
        queue.queue_buffer(0).unwrap();
    }

    #[test]
    fn test_frames_delivered_in_submission_order() {
        let queue = queue_with(3, 4096);
        for i in [2, 0, 1] {
            queue.queue_buffer(i).unwrap();
        }

        for payload in [b"aa".as_slice(), b"bbb", b"c"] {
            fill_and_complete(&queue, payload, Completion::Done);
        }

        let order: Vec<(usize, usize)> = (0..3)
            .map(|_| {
                let d = queue.dequeue_buffer().unwrap();
                (d.index, d.bytes_used)
            })
            .collect();
        assert_eq!(order, vec![(2, 2), (0, 3), (1, 1)]);
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let queue = queue_with(2, 4096);
        queue.queue_buffer(0).unwrap();
        queue.queue_buffer(1).unwrap();
        fill_and_complete(&queue, b"x", Completion::Done);
        fill_and_complete(&queue, b"y", Completion::Done);

        let first = queue.dequeue_buffer().unwrap();
        let second = queue.dequeue_buffer().unwrap();
        assert_eq!(second.sequence, first.sequence + 1);
        assert!(first.timestamp.is_some());
        assert!(first.flags.contains(BufferFlag::Done));
    }

    #[test]
    fn test_poll_tracks_head_only() {
        let queue = queue_with(2, 4096);
        queue.queue_buffer(0).unwrap();
        queue.queue_buffer(1).unwrap();
        assert_eq!(queue.poll(), Readiness::Pending);

        fill_and_complete(&queue, b"frame", Completion::Done);
        assert_eq!(queue.poll(), Readiness::Ready);
        assert_eq!(queue.poll(), Readiness::Ready);

        queue.dequeue_buffer().unwrap();
        assert_eq!(queue.poll(), Readiness::Pending);
    }

    #[test]
    fn test_dequeue_errors() {
        let queue = queue_with(1, 4096);
        assert_eq!(queue.dequeue_buffer(), Err(BufferError::NoBuffers));

        queue.queue_buffer(0).unwrap();
        assert_eq!(queue.dequeue_buffer(), Err(BufferError::NotReady { index: 0 }));
    }

    #[test]
    fn test_error_buffer_dequeues_as_corrupted() {
        let queue = queue_with(1, 4096);
        queue.queue_buffer(0).unwrap();
        fill_and_complete(&queue, b"bad", Completion::Error);

        assert_eq!(
            queue.query_buffer(0).unwrap().flags,
            BufferFlag::Done | BufferFlag::Error
        );
        assert_eq!(
            queue.dequeue_buffer(),
            Err(BufferError::FrameCorrupted { index: 0 })
        );
        assert_eq!(queue.query_buffer(0).unwrap().state, BufferState::Idle);
        assert_eq!(queue.poll(), Readiness::Empty);
    }

    #[test]
    fn test_head_frame_truncates_at_capacity() {
        let queue = queue_with(1, 8);
        queue.queue_buffer(0).unwrap();

        let mut producer = queue.producer();
        producer.activate_head();
        let mut frame = producer.head_frame().unwrap();
        assert_eq!(frame.append(b"12345"), 5);
        assert_eq!(frame.append(b"6789ABC"), 3);
        assert_eq!(frame.remaining(), 0);
        drop(producer);

        assert_eq!(queue.query_buffer(0).unwrap().bytes_used, 8);
    }

    #[test]
    fn test_copy_frame_requires_idle() {
        let queue = queue_with(1, 4096);
        queue.queue_buffer(0).unwrap();
        let mut out = Vec::new();
        assert!(queue.copy_frame(0, &mut out).is_err());

        fill_and_complete(&queue, b"jpeg", Completion::Done);
        queue.dequeue_buffer().unwrap();
        assert_eq!(queue.copy_frame(0, &mut out).unwrap(), 4);
        assert_eq!(out, b"jpeg");
    }

    #[test]
    fn test_map_rejects_wrong_size() {
        let queue = queue_with(2, 4096);
        let slot = queue.slot_size().unwrap();

        assert!(matches!(queue.map(0, slot - 1), Err(BufferError::InvalidArgument(_))));
        assert!(matches!(queue.map(0, slot + 1), Err(BufferError::InvalidArgument(_))));
        assert!(matches!(queue.map(5, slot), Err(BufferError::InvalidArgument(_))));
        assert!(queue.map(1, slot).is_ok());
    }

    #[test]
    fn test_map_offset_resolves_slot() {
        let queue = queue_with(3, 4096);
        let slot = queue.slot_size().unwrap();

        let region = queue.map_offset(2 * slot, slot).unwrap();
        assert_eq!(region.index(), 2);
        assert!(queue.map_offset(slot + 1, slot).is_err());
        assert!(queue.map_offset(3 * slot, slot).is_err());
    }

    #[test]
    fn test_mapping_reflects_frame_bytes() {
        let queue = queue_with(1, 4096);
        let slot = queue.slot_size().unwrap();
        let region = queue.map(0, slot).unwrap();

        queue.queue_buffer(0).unwrap();
        fill_and_complete(&queue, b"\xFF\xD8zero-copy", Completion::Done);
        let dequeued = queue.dequeue_buffer().unwrap();

        // SAFETY: The buffer is IDLE after dequeue.
        let bytes = unsafe { region.as_slice() };
        assert_eq!(&bytes[..dequeued.bytes_used], b"\xFF\xD8zero-copy");
        assert!(dequeued.flags.contains(BufferFlag::Mapped));
    }

    #[test]
    fn test_double_mapping_blocks_release() {
        let queue = queue_with(2, 4096);
        let slot = queue.slot_size().unwrap();

        let first = queue.map(0, slot).unwrap();
        let second = queue.map(0, slot).unwrap();
        assert!(queue.query_buffer(0).unwrap().flags.contains(BufferFlag::Mapped));

        assert!(matches!(queue.release(), Err(BufferError::Busy(_))));
        drop(first);
        assert!(matches!(queue.release(), Err(BufferError::Busy(_))));
        assert!(matches!(queue.request_buffers(4, 4096), Err(BufferError::Busy(_))));
        drop(second);

        queue.release().unwrap();
        assert_eq!(queue.buffer_count(), 0);
    }

    #[test]
    fn test_abort_fails_capture_queue() {
        let queue = queue_with(3, 4096);
        for i in 0..3 {
            queue.queue_buffer(i).unwrap();
        }
        fill_and_complete(&queue, b"good", Completion::Done);

        assert_eq!(queue.abort("resubmit failed"), 2);
        assert!(queue.is_fatal());
        assert!(matches!(queue.queue_buffer(0), Err(BufferError::StreamFatal(_))));

        assert!(queue.dequeue_buffer().is_ok());
        assert_eq!(
            queue.dequeue_buffer(),
            Err(BufferError::FrameCorrupted { index: 1 })
        );
        assert_eq!(
            queue.dequeue_buffer(),
            Err(BufferError::FrameCorrupted { index: 2 })
        );
        assert!(matches!(queue.dequeue_buffer(), Err(BufferError::StreamFatal(_))));

        queue.clear_fatal();
        assert_eq!(queue.dequeue_buffer(), Err(BufferError::NoBuffers));
        queue.queue_buffer(0).unwrap();
    }

    #[test]
    fn test_rewind_capture_discards_partial_frame() {
        let queue = queue_with(2, 4096);
        queue.queue_buffer(0).unwrap();
        queue.queue_buffer(1).unwrap();
        {
            let mut producer = queue.producer();
            producer.activate_head();
            producer.head_frame().unwrap().append(b"partial");
        }

        assert_eq!(queue.rewind_capture(), 1);
        let info = queue.query_buffer(0).unwrap();
        assert_eq!(info.state, BufferState::Queued);
        assert_eq!(info.bytes_used, 0);
        assert_eq!(queue.poll(), Readiness::Pending);
    }

    #[tokio::test]
    async fn test_wait_ready_returns_immediately_when_done() {
        let queue = queue_with(1, 4096);
        queue.queue_buffer(0).unwrap();
        fill_and_complete(&queue, b"frame", Completion::Done);

        assert_eq!(queue.wait_ready().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wait_ready_empty_queue_errors() {
        let queue = queue_with(1, 4096);
        assert_eq!(queue.wait_ready().await, Err(BufferError::NoBuffers));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wait_ready_wakes_on_completion() {
        let queue = Arc::new(queue_with(2, 4096));
        queue.queue_buffer(0).unwrap();
        queue.queue_buffer(1).unwrap();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        fill_and_complete(&queue, b"hello", Completion::Done);

        let dequeued = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter woke")
            .unwrap()
            .unwrap();
        assert_eq!(dequeued.index, 0);
        assert_eq!(dequeued.bytes_used, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abort_wakes_waiter() {
        let queue = Arc::new(queue_with(1, 4096));
        queue.queue_buffer(0).unwrap();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait_ready().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        queue.abort("device gone");
        let index = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter woke")
            .unwrap()
            .unwrap();
        assert_eq!(index, 0);
        assert_eq!(queue.poll(), Readiness::Ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_release_wakes_waiter_with_no_buffers() {
        let queue = Arc::new(queue_with(1, 4096));
        queue.queue_buffer(0).unwrap();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait_ready().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        queue.release().unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
        assert_eq!(result, Err(BufferError::NoBuffers));
    }

    #[test]
    fn test_wait_ready_blocking() {
        let queue = Arc::new(queue_with(1, 4096));
        queue.queue_buffer(0).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                fill_and_complete(&queue, b"sync", Completion::Done)
            })
        };

        assert_eq!(queue.wait_ready_blocking().unwrap(), 0);
        assert_eq!(producer.join().unwrap(), Some(0));
    }

    #[test]
    fn test_completion_stores_permit_for_late_waiter() {
        let queue = queue_with(1, 4096);
        queue.queue_buffer(0).unwrap();
        let signal = queue.signal(0);

        fill_and_complete(&queue, b"early", Completion::Done);
        // notify_one left a permit behind, so a late waiter does not hang.
        futures::executor::block_on(signal.notified());
    }
}
