//! Page-aligned buffer pool arena
//!
//! One anonymous `mmap` region holds every slot back to back. Each slot
//! starts on a page boundary so it can be handed out on its own, and the
//! whole region lives exactly as long as the last [`Arc<PoolArena>`]:
//! the owning queue holds one reference and every live mapping holds
//! another.
//!
//! ```text
//! offset 0          slot_size         2*slot_size
//! ┌─────────────────┬─────────────────┬─────────────────┐
//! │ slot 0 │ pad    │ slot 1 │ pad    │ slot 2 │ pad    │
//! └─────────────────┴─────────────────┴─────────────────┘
//! ```

use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
use tracing::{debug, warn};

use crate::page_align;

/// Maximum number of slots a pool may hold
pub const MAX_BUFFERS: usize = 32;

/// Contiguous, page-aligned memory arena divided into fixed-size slots
pub struct PoolArena {
    /// Start of the mapping
    memory: NonNull<u8>,

    /// Total mapping size (for munmap)
    total_size: usize,

    /// Page-aligned stride between slots
    slot_size: usize,

    /// Number of slots
    count: usize,

    /// Live zero-copy mappings per slot
    map_counts: Box<[AtomicUsize]>,
}

// SAFETY: The arena owns its mapping. Slot bytes are only written while the
// owning queue's lock is held, and mapping counters are atomics.
unsafe impl Send for PoolArena {}
// SAFETY: See above; shared access goes through the queue lock or raw
// pointers whose use is governed by the documented mapping contract.
unsafe impl Sync for PoolArena {}

impl PoolArena {
    /// Map an arena of `count` slots of `frame_size` bytes each
    ///
    /// `frame_size` is rounded up to whole pages. Returns `None` when the
    /// mapping fails or would exceed `memory_limit`.
    pub(crate) fn map(count: usize, frame_size: usize, memory_limit: Option<usize>) -> Option<Self> {
        let slot_size = page_align(frame_size);
        let total_size = count.checked_mul(slot_size)?;

        if let Some(limit) = memory_limit {
            if total_size > limit {
                debug!(
                    "Pool of {} x {} bytes exceeds memory limit {}",
                    count, slot_size, limit
                );
                return None;
            }
        }

        let length = NonZeroUsize::new(total_size)?;

        // SAFETY: Anonymous private mapping with no address hint; the result
        // is checked before use and unmapped exactly once in Drop.
        let ptr = unsafe {
            mmap_anonymous(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_PRIVATE | MapFlags::MAP_ANONYMOUS,
            )
        };

        let memory = match ptr {
            Ok(ptr) => ptr.cast::<u8>(),
            Err(e) => {
                debug!("mmap of {} bytes failed: {}", total_size, e);
                return None;
            }
        };

        let map_counts = (0..count).map(|_| AtomicUsize::new(0)).collect();

        Some(Self {
            memory,
            total_size,
            slot_size,
            count,
            map_counts,
        })
    }

    /// Page-aligned size of one slot
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Number of slots in the arena
    pub fn count(&self) -> usize {
        self.count
    }

    /// Total mapped bytes
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Byte offset of a slot inside the arena
    pub fn slot_offset(&self, index: usize) -> usize {
        index * self.slot_size
    }

    /// Raw pointer to the first byte of a slot
    pub(crate) fn slot_ptr(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.count);
        // SAFETY: index < count, so the offset stays inside the mapping.
        unsafe { self.memory.as_ptr().add(self.slot_offset(index)) }
    }

    /// Mutable view of a whole slot
    ///
    /// # Safety
    ///
    /// The caller must guarantee exclusive access to the slot for the
    /// lifetime of the returned slice. Inside this crate that means holding
    /// the owning queue's lock.
    pub(crate) unsafe fn slot_mut(&self, index: usize) -> &mut [u8] {
        // SAFETY: The pointer covers slot_size bytes inside the mapping;
        // exclusivity is the caller's obligation.
        unsafe { std::slice::from_raw_parts_mut(self.slot_ptr(index), self.slot_size) }
    }

    /// Shared view of a whole slot
    ///
    /// # Safety
    ///
    /// No writer may touch the slot while the returned slice is alive.
    pub(crate) unsafe fn slot(&self, index: usize) -> &[u8] {
        // SAFETY: Bounds as in slot_mut; absence of writers is the caller's
        // obligation.
        unsafe { std::slice::from_raw_parts(self.slot_ptr(index), self.slot_size) }
    }

    /// Number of live mappings of a slot
    pub fn map_count(&self, index: usize) -> usize {
        self.map_counts
            .get(index)
            .map_or(0, |count| count.load(Ordering::Acquire))
    }

    /// Number of live mappings across all slots
    pub fn total_mappings(&self) -> usize {
        self.map_counts
            .iter()
            .map(|count| count.load(Ordering::Acquire))
            .sum()
    }

    pub(crate) fn acquire_mapping(&self, index: usize) -> usize {
        self.map_counts[index].fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn release_mapping(&self, index: usize) {
        let previous = self.map_counts[index].fetch_sub(1, Ordering::AcqRel);
        if previous == 0 {
            warn!("Mapping count underflow on slot {}", index);
            self.map_counts[index].store(0, Ordering::Release);
        }
    }
}

impl Drop for PoolArena {
    fn drop(&mut self) {
        // SAFETY: memory/total_size describe the mapping created in map();
        // this is the last reference, so nothing can observe it afterwards.
        let result = unsafe { munmap(self.memory.cast::<c_void>(), self.total_size) };
        if let Err(e) = result {
            warn!("munmap of buffer pool failed: {}", e);
        }
    }
}

impl std::fmt::Debug for PoolArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolArena")
            .field("count", &self.count)
            .field("slot_size", &self.slot_size)
            .field("total_size", &self.total_size)
            .field("mappings", &self.total_mappings())
            .finish()
    }
}
