//! # Allocator Capabilities
//!
//! The interface every downstream consumer (string pools, callable storage,
//! pools in `mnemos_pool`) depends on. Nothing outside this crate should
//! reach into a concrete allocator's internals.
//!
//! ```text
//! alloc(size) -> pointer | none
//! free(pointer)            // no-op permitted
//! owns(pointer) -> bool
//! clear()
//! size() -> usize
//! capacity() -> usize      // arenas only
//! ```

// SAFETY: `alloc_value` writes into a block the allocator just returned.
#![allow(unsafe_code)]

use std::ptr::NonNull;

use bytemuck::Pod;

use crate::overflow::OverflowAllocator;

/// Raw allocation capability.
///
/// Allocation goes through `&self`; implementations that are safe to share
/// across threads are `Sync`. Resetting goes through `&mut self`, which
/// makes "only at a quiescent point" a compile-time property.
pub trait Allocator {
    /// Returns a block of at least `size` bytes, or `None` when exhausted.
    ///
    /// Blocks carry no alignment guarantee beyond what the implementation
    /// documents.
    fn alloc(&self, size: usize) -> Option<NonNull<u8>>;

    /// Returns a block to the allocator. Bump allocators ignore this.
    fn free(&self, ptr: NonNull<u8>);

    /// Whether `ptr` lies inside memory currently managed by this allocator.
    fn owns(&self, ptr: *const u8) -> bool;

    /// Bytes currently handed out.
    fn size(&self) -> usize;

    /// Releases every block at once.
    fn clear(&mut self);

    /// Allocates a block and writes `value` into it.
    ///
    /// The block may be unaligned for `T`; read it back with
    /// [`std::ptr::read_unaligned`] or [`bytemuck::pod_read_unaligned`].
    fn alloc_value<T: Pod>(&self, value: T) -> Option<NonNull<T>> {
        let ptr = self.alloc(std::mem::size_of::<T>())?.cast::<T>();
        // SAFETY: the block is at least `size_of::<T>()` bytes and unused.
        unsafe { ptr.as_ptr().write_unaligned(value) };
        Some(ptr)
    }
}

/// A fixed-buffer allocator whose buffer can be regrown between cycles.
pub trait BumpAllocator: Allocator {
    /// Buffer size in bytes.
    fn capacity(&self) -> usize;

    /// Sets the buffer size. Only valid while nothing is allocated.
    fn set_capacity(&mut self, capacity: usize);

    /// Resets the cursor and grows the buffer by `extra` bytes.
    fn clear_and_resize_extra(&mut self, extra: usize);
}

/// Heap fallback behind a bump allocator.
///
/// Implementations may serialize access internally; `intrusive_visit`
/// exposes the unlocked heap to a multi-step operation while that lock is
/// held, without re-entering the lock.
pub trait OverflowFallback {
    /// Allocates from the heap. Never returns null short of process OOM.
    fn alloc(&self, size: usize) -> NonNull<u8>;

    /// Frees `ptr` if it is tracked; returns whether it was.
    fn try_free(&self, ptr: NonNull<u8>) -> bool;

    /// Bytes currently tracked.
    fn size(&self) -> usize;

    /// Runs `visit` on the underlying heap under the implementation's lock.
    fn intrusive_visit<R>(&self, visit: impl FnOnce(&OverflowAllocator) -> R) -> R;
}
