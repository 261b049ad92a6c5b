//! Zero-copy slot mappings

use std::sync::Arc;

use crate::pool::PoolArena;

/// A consumer's view of one pool slot
///
/// The region keeps the pool arena alive and counts as a live mapping
/// until dropped; while any mapping exists the queue refuses to release
/// or reallocate the pool. Cloning counts as a second mapping.
///
/// The producer writes into a slot only while the buffer is QUEUED or
/// ACTIVE. Reading a slot whose buffer has been dequeued (IDLE) is
/// race-free until it is submitted again.
pub struct MappedRegion {
    arena: Arc<PoolArena>,
    index: usize,
}

impl MappedRegion {
    pub(crate) fn new(arena: Arc<PoolArena>, index: usize) -> Self {
        arena.acquire_mapping(index);
        Self { arena, index }
    }

    /// Buffer index this region maps
    pub fn index(&self) -> usize {
        self.index
    }

    /// Byte offset of the slot inside the pool
    pub fn offset(&self) -> usize {
        self.arena.slot_offset(self.index)
    }

    /// Mapped length (the page-aligned slot size)
    pub fn len(&self) -> usize {
        self.arena.slot_size()
    }

    /// Always false, slots are never empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start of the mapped slot
    pub fn as_ptr(&self) -> *const u8 {
        self.arena.slot_ptr(self.index)
    }

    /// Start of the mapped slot, writable
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.arena.slot_ptr(self.index)
    }

    /// View the slot as a byte slice
    ///
    /// # Safety
    ///
    /// The buffer must not be QUEUED or ACTIVE for the lifetime of the
    /// returned slice, otherwise the producer may write concurrently.
    pub unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: The arena outlives self; absence of producer writes is the
        // caller's obligation.
        unsafe { self.arena.slot(self.index) }
    }
}

impl Clone for MappedRegion {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.arena), self.index)
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        self.arena.release_mapping(self.index);
    }
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("index", &self.index)
            .field("offset", &self.offset())
            .field("len", &self.len())
            .finish()
    }
}
