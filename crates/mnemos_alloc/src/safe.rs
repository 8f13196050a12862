//! # Safe Allocator
//!
//! A bump allocator with an overflow heap behind it, and a resize policy
//! that learns the right bump size from observed overflow.
//!
//! ```text
//! cycle N:    [ bump ........ full ] + overflow: 3 blocks, k bytes
//! reserve_and_clear():  bump capacity += k, overflow cleared
//! cycle N+1:  [ bump ............................ ]   overflow: empty
//! ```
//!
//! If allocation volume is roughly stable across cycles, the bump buffer
//! converges to a size that services the whole cycle and the overflow heap
//! goes cold. Growth is by exactly the observed overflow, never by doubling.

use std::ptr::NonNull;

use crate::config::MemoryConfig;
use crate::linear::{LinearAllocator, ThreadedLinearAllocator};
use crate::overflow::{OverflowAllocator, ThreadedOverflowAllocator};
use crate::traits::{Allocator, BumpAllocator, OverflowFallback};

/// Bump allocator `B` with heap fallback `F`.
///
/// # Thread Safety
///
/// Inherits from its parts: built from [`ThreadedLinearAllocator`] and a
/// locked fallback it is `Sync`, and `alloc`/`owns` may run concurrently.
/// `clear` and `reserve_and_clear` take `&mut self` and run at a quiescent
/// point (end of frame or tick).
///
/// # Example
///
/// ```rust
/// use mnemos_alloc::SafeAllocator;
///
/// let mut alloc: SafeAllocator = SafeAllocator::with_capacity(16);
/// for _ in 0..4 {
///     let _ = alloc.alloc(8); // two fit, two overflow
/// }
/// assert_eq!(alloc.overflow_size(), 16);
///
/// alloc.reserve_and_clear();
/// assert_eq!(alloc.capacity(), 32);
/// ```
#[derive(Debug)]
pub struct SafeAllocator<B = LinearAllocator, F = OverflowAllocator> {
    /// Primary bump allocator.
    primary: B,
    /// Heap fallback for requests the bump buffer cannot fit.
    overflow: F,
}

/// Safe allocator usable from many threads at once.
pub type ThreadedSafeAllocator = SafeAllocator<ThreadedLinearAllocator, ThreadedOverflowAllocator>;

impl<B, F> SafeAllocator<B, F>
where
    B: BumpAllocator + Default,
    F: OverflowFallback + Default,
{
    /// Creates an allocator with an empty bump buffer.
    ///
    /// Everything overflows during the first cycle; the first
    /// [`SafeAllocator::reserve_and_clear`] sizes the buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(B::default(), F::default())
    }

    /// Creates an allocator with a bump buffer of `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut primary = B::default();
        primary.set_capacity(capacity);
        Self::from_parts(primary, F::default())
    }

    /// Creates an allocator sized by `config.linear.capacity`.
    #[must_use]
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::with_capacity(config.linear.capacity)
    }
}

impl<B, F> SafeAllocator<B, F>
where
    B: BumpAllocator + Default,
    F: OverflowFallback,
{
    /// Creates an allocator with an empty bump buffer falling back into
    /// `overflow` (for example a clone of a `SharedOverflowAllocator`).
    #[must_use]
    pub fn with_fallback(overflow: F) -> Self {
        Self::from_parts(B::default(), overflow)
    }
}

impl<B, F> SafeAllocator<B, F>
where
    B: BumpAllocator,
    F: OverflowFallback,
{
    /// Composes an allocator from existing parts.
    #[must_use]
    pub const fn from_parts(primary: B, overflow: F) -> Self {
        Self { primary, overflow }
    }

    /// The bump allocator.
    #[must_use]
    pub const fn primary(&self) -> &B {
        &self.primary
    }

    /// The heap fallback.
    #[must_use]
    pub const fn overflow(&self) -> &F {
        &self.overflow
    }

    /// Bump buffer size in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.primary.capacity()
    }

    /// Bytes the overflow heap is holding this cycle.
    #[must_use]
    pub fn overflow_size(&self) -> usize {
        self.overflow.size()
    }

    /// Sets the bump buffer size. Only valid while the bump is empty.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.primary.set_capacity(capacity);
    }

    /// Tries the bump buffer, then falls back to the heap. Never `None`.
    #[inline]
    pub fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        if let Some(ptr) = self.primary.alloc(size) {
            return Some(ptr);
        }
        tracing::trace!(size, "bump exhausted, allocating from overflow");
        Some(self.overflow.alloc(size))
    }

    /// Frees an overflow block. Bump memory is ignored.
    pub fn free(&self, ptr: NonNull<u8>) {
        let _ = self.overflow.try_free(ptr);
    }

    /// Whether `ptr` belongs to the bump buffer or a live overflow block.
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.primary.owns(ptr) || self.overflow.intrusive_visit(|heap| heap.owns(ptr))
    }

    /// Bump bytes used plus overflow bytes held.
    #[must_use]
    pub fn size(&self) -> usize {
        self.primary.size() + self.overflow.size()
    }

    /// Resets the bump cursor and frees every overflow block.
    pub fn clear(&mut self) {
        self.primary.clear();
        self.overflow.intrusive_visit(OverflowAllocator::release_all);
    }

    /// Grows the bump buffer by the bytes the overflow heap serviced this
    /// cycle, then clears both.
    pub fn reserve_and_clear(&mut self) {
        let primary = &mut self.primary;
        self.overflow.intrusive_visit(|heap| {
            let observed = heap.size();
            let before = primary.capacity();
            primary.clear_and_resize_extra(observed);
            if observed > 0 {
                tracing::debug!(
                    overflow = observed,
                    blocks = heap.len(),
                    from = before,
                    to = primary.capacity(),
                    "bump buffer grown from observed overflow"
                );
            }
            heap.release_all();
        });
    }

    /// Runs `visit` on the overflow heap under its lock.
    pub fn intrusive_visit<R>(&self, visit: impl FnOnce(&OverflowAllocator) -> R) -> R {
        self.overflow.intrusive_visit(visit)
    }
}

impl<B, F> Default for SafeAllocator<B, F>
where
    B: BumpAllocator + Default,
    F: OverflowFallback + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<B, F> Allocator for SafeAllocator<B, F>
where
    B: BumpAllocator,
    F: OverflowFallback,
{
    #[inline]
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        SafeAllocator::alloc(self, size)
    }

    fn free(&self, ptr: NonNull<u8>) {
        SafeAllocator::free(self, ptr);
    }

    fn owns(&self, ptr: *const u8) -> bool {
        SafeAllocator::owns(self, ptr)
    }

    fn size(&self) -> usize {
        SafeAllocator::size(self)
    }

    fn clear(&mut self) {
        SafeAllocator::clear(self);
    }
}

impl<B, F> BumpAllocator for SafeAllocator<B, F>
where
    B: BumpAllocator,
    F: OverflowFallback,
{
    fn capacity(&self) -> usize {
        SafeAllocator::capacity(self)
    }

    fn set_capacity(&mut self, capacity: usize) {
        SafeAllocator::set_capacity(self, capacity);
    }

    fn clear_and_resize_extra(&mut self, extra: usize) {
        self.primary.clear_and_resize_extra(extra);
        self.overflow.intrusive_visit(OverflowAllocator::release_all);
    }
}
