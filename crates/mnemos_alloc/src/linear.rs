//! # Linear Allocators
//!
//! Bump allocators for temporary allocations that are freed all at once.
//!
//! ```text
//! buffer:  [ used ........ | free ................. ]
//!          ^ start         ^ cursor                ^ capacity
//! ```
//!
//! `alloc(size)` hands out `[cursor, cursor + size)` and advances the cursor
//! by exactly `size`: no alignment padding is inserted. Individual frees are
//! not supported; `clear()` resets the cursor.

// SAFETY: Pointers are computed inside the owned `RawBuffer` after a bounds
// check against its length.
#![allow(unsafe_code)]

use std::cell::Cell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::MemoryConfig;
use crate::raw::RawBuffer;
use crate::traits::{Allocator, BumpAllocator};

/// A single-thread bump allocator.
///
/// Allocations are fast (just bump a cursor). Memory is reclaimed all at
/// once when the allocator is cleared or dropped.
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. Use one per thread, or
/// [`ThreadedLinearAllocator`] for concurrent bumps.
///
/// # Example
///
/// ```rust
/// use mnemos_alloc::LinearAllocator;
///
/// let mut arena = LinearAllocator::with_capacity(8);
/// assert!(arena.alloc(4).is_some());
/// assert!(arena.alloc(4).is_some());
/// assert!(arena.alloc(4).is_none());
///
/// arena.clear();
/// assert!(arena.alloc(8).is_some());
/// ```
pub struct LinearAllocator {
    /// The backing storage.
    storage: RawBuffer,
    /// Current allocation offset.
    cursor: Cell<usize>,
}

impl LinearAllocator {
    /// Creates an allocator with no buffer. Every allocation fails until
    /// [`LinearAllocator::set_capacity`] is called.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            storage: RawBuffer::empty(),
            cursor: Cell::new(0),
        }
    }

    /// Creates an allocator with a zeroed buffer of `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: RawBuffer::with_len(capacity),
            cursor: Cell::new(0),
        }
    }

    /// Creates an allocator sized by `config.linear.capacity`.
    #[must_use]
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::with_capacity(config.linear.capacity)
    }

    /// Returns the buffer size in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Returns the bytes handed out since the last clear.
    #[inline]
    #[must_use]
    pub fn used(&self) -> usize {
        self.cursor.get()
    }

    /// Returns the remaining free space in bytes.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.used()
    }

    /// Pre-allocates the buffer. Must only be called while empty.
    pub fn set_capacity(&mut self, capacity: usize) {
        debug_assert_eq!(self.cursor.get(), 0, "set_capacity on a non-empty linear allocator");
        tracing::debug!(from = self.capacity(), to = capacity, "linear allocator resized");
        self.storage.resize(capacity);
    }

    /// Bumps the cursor by `size` bytes.
    ///
    /// Returns the previous cursor position, or `None` (cursor untouched)
    /// if the buffer cannot fit `size` more bytes.
    #[inline]
    pub fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        let offset = self.cursor.get();
        let end = offset.checked_add(size)?;
        if end > self.capacity() {
            return None;
        }
        self.cursor.set(end);
        // SAFETY: `offset <= end <= len`, so the pointer stays inside (or one
        // past) the buffer, and the buffer pointer is never null.
        Some(unsafe { NonNull::new_unchecked(self.storage.as_ptr().add(offset)) })
    }

    /// Whether `ptr` lies inside the buffer.
    #[inline]
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.storage.contains(ptr)
    }

    /// Resets the cursor, invalidating all previous allocations.
    ///
    /// No memory is freed or reallocated.
    #[inline]
    pub fn clear(&mut self) {
        self.cursor.set(0);
    }

    /// Resets the cursor and grows the buffer by `extra` bytes.
    pub fn clear_and_resize_extra(&mut self, extra: usize) {
        self.cursor.set(0);
        self.storage.resize(self.capacity() + extra);
    }
}

impl Default for LinearAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LinearAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearAllocator")
            .field("used", &self.used())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl Allocator for LinearAllocator {
    #[inline]
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        LinearAllocator::alloc(self, size)
    }

    #[inline]
    fn free(&self, _ptr: NonNull<u8>) {}

    fn owns(&self, ptr: *const u8) -> bool {
        LinearAllocator::owns(self, ptr)
    }

    fn size(&self) -> usize {
        self.used()
    }

    fn clear(&mut self) {
        LinearAllocator::clear(self);
    }
}

impl BumpAllocator for LinearAllocator {
    fn capacity(&self) -> usize {
        LinearAllocator::capacity(self)
    }

    fn set_capacity(&mut self, capacity: usize) {
        LinearAllocator::set_capacity(self, capacity);
    }

    fn clear_and_resize_extra(&mut self, extra: usize) {
        LinearAllocator::clear_and_resize_extra(self, extra);
    }
}

// ============================================================================
// THREADED - lock-free concurrent bump
// ============================================================================

/// A fixed buffer shared by many threads, bumped with one atomic counter.
///
/// `alloc` claims its range with a compare-and-swap on one counter, so
/// concurrent allocation is lock-free and every successful caller gets a
/// disjoint range. A failed allocation leaves the counter untouched; space
/// is only reclaimed by `clear`.
///
/// # Thread Safety
///
/// `alloc`, `owns`, `used` and `capacity` take `&self` and may run
/// concurrently. `clear`, `set_capacity` and `clear_and_resize_extra` take
/// `&mut self`, so they can only run when no allocation is in flight.
pub struct ThreadedLinearAllocator {
    /// The backing storage, fully committed up-front.
    storage: RawBuffer,
    /// Bytes claimed so far. Never exceeds the buffer length.
    cursor: AtomicUsize,
}

impl ThreadedLinearAllocator {
    /// Creates an allocator with no buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            storage: RawBuffer::empty(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Creates an allocator with a zeroed buffer of `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: RawBuffer::with_len(capacity),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Creates an allocator sized by `config.linear.capacity`.
    #[must_use]
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::with_capacity(config.linear.capacity)
    }

    /// Returns the buffer size in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes handed out since the last clear.
    #[inline]
    #[must_use]
    pub fn used(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Pre-allocates the buffer. Must only be called while empty.
    pub fn set_capacity(&mut self, capacity: usize) {
        debug_assert_eq!(
            *self.cursor.get_mut(),
            0,
            "set_capacity on a non-empty threaded linear allocator"
        );
        tracing::debug!(from = self.capacity(), to = capacity, "threaded linear allocator resized");
        self.storage.resize(capacity);
    }

    /// Claims `size` bytes, or returns `None` without claiming anything.
    #[inline]
    pub fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        let capacity = self.capacity();
        // The counter only partitions the buffer; nothing is published
        // through it, so relaxed ordering is enough for disjointness.
        let offset = self
            .cursor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |offset| {
                offset.checked_add(size).filter(|&end| end <= capacity)
            })
            .ok()?;
        // SAFETY: `offset + size <= len`; the range belongs to this caller only.
        Some(unsafe { NonNull::new_unchecked(self.storage.as_ptr().add(offset)) })
    }

    /// Whether `ptr` lies inside the buffer.
    #[inline]
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.storage.contains(ptr)
    }

    /// Resets the counter.
    #[inline]
    pub fn clear(&mut self) {
        *self.cursor.get_mut() = 0;
    }

    /// Resets the counter and grows the buffer by `extra` bytes.
    pub fn clear_and_resize_extra(&mut self, extra: usize) {
        *self.cursor.get_mut() = 0;
        self.storage.resize(self.capacity() + extra);
    }
}

impl Default for ThreadedLinearAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ThreadedLinearAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedLinearAllocator")
            .field("used", &self.used())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl Allocator for ThreadedLinearAllocator {
    #[inline]
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        ThreadedLinearAllocator::alloc(self, size)
    }

    #[inline]
    fn free(&self, _ptr: NonNull<u8>) {}

    fn owns(&self, ptr: *const u8) -> bool {
        ThreadedLinearAllocator::owns(self, ptr)
    }

    fn size(&self) -> usize {
        self.used()
    }

    fn clear(&mut self) {
        ThreadedLinearAllocator::clear(self);
    }
}

impl BumpAllocator for ThreadedLinearAllocator {
    fn capacity(&self) -> usize {
        ThreadedLinearAllocator::capacity(self)
    }

    fn set_capacity(&mut self, capacity: usize) {
        ThreadedLinearAllocator::set_capacity(self, capacity);
    }

    fn clear_and_resize_extra(&mut self, extra: usize) {
        ThreadedLinearAllocator::clear_and_resize_extra(self, extra);
    }
}
