//! # Overflow Allocator
//!
//! Heap-backed fallback that remembers every live block, so it can answer
//! "do I own this pointer" and free by pointer alone.
//!
//! Three flavours share one implementation:
//!
//! - [`OverflowAllocator`]: single-thread, interior mutability via `RefCell`.
//! - [`ThreadedOverflowAllocator`]: every operation under one mutex.
//! - [`SharedOverflowAllocator`]: clonable handle to one threaded heap.

// SAFETY: Blocks come from `std::alloc` and are released with the layout
// recorded at allocation time.
#![allow(unsafe_code)]

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::traits::{Allocator, OverflowFallback};

/// Alignment of every overflow block, matching the bump buffers.
const BLOCK_ALIGN: usize = crate::raw::BUFFER_ALIGN;

/// Tracked heap allocator.
///
/// # Thread Safety
///
/// NOT thread-safe. Use [`ThreadedOverflowAllocator`] to share one heap.
#[derive(Default)]
pub struct OverflowAllocator {
    /// Live blocks: start address -> requested size.
    blocks: RefCell<HashMap<usize, usize>>,
}

impl OverflowAllocator {
    /// Creates an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates `size` bytes and starts tracking the block.
    ///
    /// Zero-sized requests get a distinct one-byte block.
    pub fn alloc(&self, size: usize) -> NonNull<u8> {
        let layout = block_layout(size);
        // SAFETY: `block_layout` never returns a zero-sized layout.
        let raw = unsafe { alloc(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            handle_alloc_error(layout);
        };

        let previous = self.blocks.borrow_mut().insert(ptr.as_ptr() as usize, size);
        debug_assert!(previous.is_none(), "heap returned a live block twice");
        ptr
    }

    /// Frees a block.
    ///
    /// Freeing a pointer this heap does not track is a contract violation.
    pub fn free(&self, ptr: NonNull<u8>) {
        let freed = self.try_free(ptr);
        debug_assert!(freed, "freeing a block the overflow allocator does not own");
    }

    /// Frees a block if it is tracked. Returns whether it was.
    pub fn try_free(&self, ptr: NonNull<u8>) -> bool {
        let removed = self.blocks.borrow_mut().remove(&(ptr.as_ptr() as usize));
        match removed {
            Some(size) => {
                // SAFETY: the block was allocated in `alloc` with this layout
                // and has just stopped being tracked.
                unsafe { dealloc(ptr.as_ptr(), block_layout(size)) };
                true
            }
            None => false,
        }
    }

    /// Whether `ptr` lies inside any tracked block.
    ///
    /// Linear scan over all blocks; this is a cold path.
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        self.blocks
            .borrow()
            .iter()
            .any(|(&start, &size)| addr >= start && addr - start < size)
    }

    /// Sum of the sizes of all tracked blocks.
    #[must_use]
    pub fn size(&self) -> usize {
        self.blocks.borrow().values().sum()
    }

    /// Number of tracked blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.borrow().len()
    }

    /// Whether no blocks are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.borrow().is_empty()
    }

    /// Frees every tracked block.
    pub fn release_all(&self) {
        let blocks = std::mem::take(&mut *self.blocks.borrow_mut());
        for (start, size) in blocks {
            // SAFETY: every tracked entry is a live block from `alloc`.
            unsafe { dealloc(start as *mut u8, block_layout(size)) };
        }
    }

    /// Exchanges tracked blocks with `other`.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.blocks, &mut other.blocks);
    }
}

impl Drop for OverflowAllocator {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl std::fmt::Debug for OverflowAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverflowAllocator")
            .field("blocks", &self.len())
            .field("bytes", &self.size())
            .finish()
    }
}

impl Allocator for OverflowAllocator {
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        Some(OverflowAllocator::alloc(self, size))
    }

    fn free(&self, ptr: NonNull<u8>) {
        OverflowAllocator::free(self, ptr);
    }

    fn owns(&self, ptr: *const u8) -> bool {
        OverflowAllocator::owns(self, ptr)
    }

    fn size(&self) -> usize {
        OverflowAllocator::size(self)
    }

    fn clear(&mut self) {
        self.release_all();
    }
}

impl OverflowFallback for OverflowAllocator {
    fn alloc(&self, size: usize) -> NonNull<u8> {
        OverflowAllocator::alloc(self, size)
    }

    fn try_free(&self, ptr: NonNull<u8>) -> bool {
        OverflowAllocator::try_free(self, ptr)
    }

    fn size(&self) -> usize {
        OverflowAllocator::size(self)
    }

    fn intrusive_visit<R>(&self, visit: impl FnOnce(&OverflowAllocator) -> R) -> R {
        visit(self)
    }
}

fn block_layout(size: usize) -> Layout {
    Layout::from_size_align(size.max(1), BLOCK_ALIGN).expect("overflow block exceeds isize::MAX")
}

// ============================================================================
// THREADED
// ============================================================================

/// [`OverflowAllocator`] with every operation serialized under one lock.
///
/// Critical sections are bounded: no I/O and no callbacks except the one
/// passed to [`ThreadedOverflowAllocator::intrusive_visit`].
#[derive(Default, Debug)]
pub struct ThreadedOverflowAllocator {
    heap: Mutex<OverflowAllocator>,
}

impl ThreadedOverflowAllocator {
    /// Creates an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locked [`OverflowAllocator::alloc`].
    pub fn alloc(&self, size: usize) -> NonNull<u8> {
        self.heap.lock().alloc(size)
    }

    /// Locked [`OverflowAllocator::free`].
    pub fn free(&self, ptr: NonNull<u8>) {
        self.heap.lock().free(ptr);
    }

    /// Locked [`OverflowAllocator::try_free`].
    pub fn try_free(&self, ptr: NonNull<u8>) -> bool {
        self.heap.lock().try_free(ptr)
    }

    /// Locked [`OverflowAllocator::owns`].
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.heap.lock().owns(ptr)
    }

    /// Locked [`OverflowAllocator::size`].
    #[must_use]
    pub fn size(&self) -> usize {
        self.heap.lock().size()
    }

    /// Locked [`OverflowAllocator::release_all`].
    pub fn release_all(&self) {
        self.heap.lock().release_all();
    }

    /// Runs `visit` on the unlocked heap while holding the lock.
    ///
    /// `visit` must not call back into this allocator: the lock is not
    /// re-entrant.
    pub fn intrusive_visit<R>(&self, visit: impl FnOnce(&OverflowAllocator) -> R) -> R {
        let heap = self.heap.lock();
        visit(&heap)
    }
}

impl Allocator for ThreadedOverflowAllocator {
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        Some(ThreadedOverflowAllocator::alloc(self, size))
    }

    fn free(&self, ptr: NonNull<u8>) {
        ThreadedOverflowAllocator::free(self, ptr);
    }

    fn owns(&self, ptr: *const u8) -> bool {
        ThreadedOverflowAllocator::owns(self, ptr)
    }

    fn size(&self) -> usize {
        ThreadedOverflowAllocator::size(self)
    }

    fn clear(&mut self) {
        self.heap.get_mut().release_all();
    }
}

impl OverflowFallback for ThreadedOverflowAllocator {
    fn alloc(&self, size: usize) -> NonNull<u8> {
        ThreadedOverflowAllocator::alloc(self, size)
    }

    fn try_free(&self, ptr: NonNull<u8>) -> bool {
        ThreadedOverflowAllocator::try_free(self, ptr)
    }

    fn size(&self) -> usize {
        ThreadedOverflowAllocator::size(self)
    }

    fn intrusive_visit<R>(&self, visit: impl FnOnce(&OverflowAllocator) -> R) -> R {
        ThreadedOverflowAllocator::intrusive_visit(self, visit)
    }
}

// ============================================================================
// SHARED
// ============================================================================

/// Clonable handle to one [`ThreadedOverflowAllocator`].
///
/// Several `SafeAllocator`s can fall back into the same heap. Clearing
/// through any handle clears the heap for all of them.
#[derive(Clone, Default, Debug)]
pub struct SharedOverflowAllocator {
    heap: Arc<ThreadedOverflowAllocator>,
}

impl SharedOverflowAllocator {
    /// Creates a handle to a fresh heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates from the shared heap.
    pub fn alloc(&self, size: usize) -> NonNull<u8> {
        self.heap.alloc(size)
    }

    /// Frees a block of the shared heap.
    pub fn free(&self, ptr: NonNull<u8>) {
        self.heap.free(ptr);
    }

    /// Frees a block if the shared heap tracks it.
    pub fn try_free(&self, ptr: NonNull<u8>) -> bool {
        self.heap.try_free(ptr)
    }

    /// Whether the shared heap owns `ptr`.
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.heap.owns(ptr)
    }

    /// Bytes tracked by the shared heap.
    #[must_use]
    pub fn size(&self) -> usize {
        self.heap.size()
    }

    /// Frees every block of the shared heap.
    pub fn release_all(&self) {
        self.heap.release_all();
    }

    /// Points each handle at the other's heap.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.heap, &mut other.heap);
    }

    /// Number of handles to this heap.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.heap)
    }

    /// Runs `visit` on the shared heap under its lock.
    pub fn intrusive_visit<R>(&self, visit: impl FnOnce(&OverflowAllocator) -> R) -> R {
        self.heap.intrusive_visit(visit)
    }
}

impl Allocator for SharedOverflowAllocator {
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        Some(SharedOverflowAllocator::alloc(self, size))
    }

    fn free(&self, ptr: NonNull<u8>) {
        SharedOverflowAllocator::free(self, ptr);
    }

    fn owns(&self, ptr: *const u8) -> bool {
        SharedOverflowAllocator::owns(self, ptr)
    }

    fn size(&self) -> usize {
        SharedOverflowAllocator::size(self)
    }

    fn clear(&mut self) {
        self.release_all();
    }
}

impl OverflowFallback for SharedOverflowAllocator {
    fn alloc(&self, size: usize) -> NonNull<u8> {
        SharedOverflowAllocator::alloc(self, size)
    }

    fn try_free(&self, ptr: NonNull<u8>) -> bool {
        SharedOverflowAllocator::try_free(self, ptr)
    }

    fn size(&self) -> usize {
        SharedOverflowAllocator::size(self)
    }

    fn intrusive_visit<R>(&self, visit: impl FnOnce(&OverflowAllocator) -> R) -> R {
        SharedOverflowAllocator::intrusive_visit(self, visit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_tracks_size_and_ownership() {
        let heap = OverflowAllocator::new();
        let a = heap.alloc(24);
        let b = heap.alloc(8);

        assert_eq!(heap.size(), 32);
        assert_eq!(heap.len(), 2);
        assert!(heap.owns(a.as_ptr()));
        assert!(heap.owns(a.as_ptr().wrapping_add(23)));
        assert!(heap.owns(b.as_ptr()));

        let mut local = 0u8;
        assert!(!heap.owns(&mut local));
    }

    #[test]
    fn test_free_and_try_free() {
        let heap = OverflowAllocator::new();
        let a = heap.alloc(16);
        heap.free(a);
        assert!(heap.is_empty());
        assert_eq!(heap.size(), 0);

        let b = heap.alloc(16);
        assert!(heap.try_free(b));
        assert!(!heap.try_free(NonNull::<u8>::dangling()));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "does not own")]
    fn test_free_foreign_pointer_asserts() {
        let heap = OverflowAllocator::new();
        let mut local = 0u8;
        heap.free(NonNull::from(&mut local));
    }

    #[test]
    fn test_zero_sized_blocks_are_distinct() {
        let heap = OverflowAllocator::new();
        let a = heap.alloc(0);
        let b = heap.alloc(0);
        assert_ne!(a, b);
        assert_eq!(heap.size(), 0);
        assert_eq!(heap.len(), 2);
        // Empty ranges own nothing.
        assert!(!heap.owns(a.as_ptr()));
    }

    #[test]
    fn test_release_all() {
        let mut heap = OverflowAllocator::new();
        for size in 1..10 {
            let _ = heap.alloc(size);
        }
        assert_eq!(heap.size(), 45);
        Allocator::clear(&mut heap);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_swap() {
        let mut a = OverflowAllocator::new();
        let mut b = OverflowAllocator::new();
        let block = a.alloc(12);
        a.swap(&mut b);
        assert!(!a.owns(block.as_ptr()));
        assert!(b.owns(block.as_ptr()));
        assert_eq!(b.size(), 12);
    }

    #[test]
    fn test_threaded_visit_sees_heap() {
        let heap = ThreadedOverflowAllocator::new();
        let block = heap.alloc(40);
        let (owned, size) = heap.intrusive_visit(|inner| (inner.owns(block.as_ptr()), inner.size()));
        assert!(owned);
        assert_eq!(size, 40);
        heap.free(block);
        assert_eq!(heap.size(), 0);
    }

    #[test]
    fn test_threaded_concurrent_alloc() {
        let heap = Arc::new(ThreadedOverflowAllocator::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let heap = Arc::clone(&heap);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let _ = heap.alloc(8);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(heap.size(), 8 * 100 * 8);
    }

    #[test]
    fn test_shared_handles_see_one_heap() {
        let a = SharedOverflowAllocator::new();
        let b = a.clone();
        assert_eq!(a.handle_count(), 2);

        let block = a.alloc(64);
        assert!(b.owns(block.as_ptr()));
        assert!(b.try_free(block));
        assert_eq!(a.size(), 0);
    }

    #[test]
    fn test_shared_swap() {
        let mut a = SharedOverflowAllocator::new();
        let mut b = SharedOverflowAllocator::new();
        let block = a.alloc(4);
        a.swap(&mut b);
        assert!(b.owns(block.as_ptr()));
        assert!(!a.owns(block.as_ptr()));
    }
}
