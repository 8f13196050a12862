//! # Primitive Bucket Pool
//!
//! Unbounded pool of `T` whose slot addresses survive growth.
//!
//! Storage is a list of power-of-two buckets, each its own heap block.
//! Growing appends a bucket and never moves the old ones, so every pointer
//! already issued stays valid.
//!
//! ```text
//! buckets:  [0] [1 2] [3 4 5 6] [7 .. 14]
//! free:     [14 13 12 ... 8]   <- top: next create() gets 8
//! ```
//!
//! Released indices go back on the free stack and are reused before any
//! new bucket is appended.

// SAFETY: Handles carry raw slot pointers into buckets owned by the pool.
#![allow(unsafe_code)]

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;

use crate::bucket::{bucket_size, info_from_index_skipped};
use crate::slots::Slots;

/// A live slot of a [`PrimitiveBucketPool`]: cached pointer plus logical index.
///
/// The pointer is only meaningful while the slot is allocated.
pub struct PoolHandle<T> {
    ptr: NonNull<T>,
    index: usize,
}

impl<T> PoolHandle<T> {
    /// Logical slot index. Stable for the pool's lifetime.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Cached slot pointer.
    #[inline]
    #[must_use]
    pub const fn as_ptr(&self) -> NonNull<T> {
        self.ptr
    }
}

impl<T> Clone for PoolHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PoolHandle<T> {}

impl<T> PartialEq for PoolHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.ptr == other.ptr
    }
}

impl<T> Eq for PoolHandle<T> {}

impl<T> Hash for PoolHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for PoolHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("index", &self.index)
            .field("ptr", &self.ptr)
            .finish()
    }
}

/// Growable pool of `T` with stable slot addresses.
///
/// `SKIP` starts the pool at bucket `SKIP` of the plain layout, so the
/// first bucket holds `2^SKIP` slots instead of one.
///
/// Releasing a slot does not drop or reset its value: a reused slot still
/// holds whatever was last written to it. Values are dropped with the pool.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap in a mutex.
///
/// # Example
///
/// ```rust
/// use mnemos_pool::PrimitiveBucketPool;
///
/// let mut pool: PrimitiveBucketPool<u64> = PrimitiveBucketPool::new();
/// let a = pool.create();
/// *pool.get_mut(a).unwrap() = 7;
///
/// let b = pool.create(); // appends a second bucket
/// assert_eq!(pool.get(a), Some(&7));
///
/// pool.release(a);
/// pool.release(b);
/// assert!(pool.validate_empty());
/// ```
pub struct PrimitiveBucketPool<T, const SKIP: u32 = 0> {
    /// Buckets in order; bucket `i` holds `2^(i + SKIP)` slots.
    buckets: Vec<Slots<T>>,
    /// Free-index stack. The top is the next index handed out.
    free: Vec<usize>,
    /// Per-index liveness, one entry per slot.
    live: Vec<bool>,
    /// Total slots across all buckets.
    capacity: usize,
}

impl<T: Default, const SKIP: u32> PrimitiveBucketPool<T, SKIP> {
    /// Creates an empty pool. No bucket is allocated until the first `create`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buckets: Vec::new(),
            free: Vec::new(),
            live: Vec::new(),
            capacity: 0,
        }
    }

    /// Hands out a slot, reusing released indices before growing.
    ///
    /// # Panics
    ///
    /// Panics if growing would need a bucket of `2^usize::BITS` slots or more.
    pub fn create(&mut self) -> PoolHandle<T> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => self.append_bucket(),
        };
        self.live[index] = true;
        PoolHandle {
            ptr: self.slot(index),
            index,
        }
    }

    /// Appends the next bucket and returns its first index. The rest of
    /// the bucket goes on the free stack, lowest index on top.
    fn append_bucket(&mut self) -> usize {
        let bucket_index = u32::try_from(self.buckets.len()).unwrap_or(u32::MAX);
        let size = bucket_index
            .checked_add(SKIP)
            .filter(|&level| level < usize::BITS)
            .map(bucket_size)
            .expect("bucket pool reached its last addressable bucket");
        let first = self.capacity;

        self.buckets.push(Slots::with_default(size));
        self.capacity += size;
        self.free.extend((first + 1..first + size).rev());
        self.live.resize(self.capacity, false);

        tracing::debug!(bucket = bucket_index, size, capacity = self.capacity, "bucket pool grown");
        first
    }
}

impl<T, const SKIP: u32> PrimitiveBucketPool<T, SKIP> {
    fn slot(&self, index: usize) -> NonNull<T> {
        let info = info_from_index_skipped(index, SKIP);
        self.buckets[info.bucket_index as usize].slot(info.offset)
    }

    /// Returns a slot to the free stack.
    ///
    /// Releasing a handle twice, or one from another pool, is a contract
    /// violation caught by a debug assertion.
    pub fn release(&mut self, handle: PoolHandle<T>) {
        debug_assert!(
            handle.index < self.capacity && self.slot(handle.index) == handle.ptr,
            "releasing a handle the bucket pool did not issue"
        );
        self.free_index(handle.index);
    }

    /// Returns the slot `ptr` points at, found by scanning the buckets.
    pub fn release_ptr(&mut self, ptr: NonNull<T>) {
        let index = self.index_of(ptr);
        debug_assert!(index.is_some(), "releasing a pointer the bucket pool does not own");
        if let Some(index) = index {
            self.free_index(index);
        }
    }

    fn free_index(&mut self, index: usize) {
        debug_assert!(self.live[index], "slot {index} released twice");
        self.live[index] = false;
        self.free.push(index);
    }

    fn index_of(&self, ptr: NonNull<T>) -> Option<usize> {
        let mut first = 0;
        for bucket in &self.buckets {
            if let Some(offset) = bucket.index_of(ptr.as_ptr()) {
                return Some(first + offset);
            }
            first += bucket.len();
        }
        None
    }

    /// Marks every slot free. Bucket memory is kept.
    pub fn clear(&mut self) {
        self.free.clear();
        self.free.extend((0..self.capacity).rev());
        self.live.fill(false);
    }

    /// Calls `visit` on every live slot in ascending index order.
    pub fn visit_objects(&mut self, mut visit: impl FnMut(&mut T)) {
        let mut live = self.live.iter();
        for bucket in &self.buckets {
            for offset in 0..bucket.len() {
                if live.next() == Some(&true) {
                    // SAFETY: live slots are only reachable through
                    // `&mut self` here.
                    visit(unsafe { &mut *bucket.slot(offset).as_ptr() });
                }
            }
        }
    }

    /// Shared access to a live slot. `None` if the handle is not from this
    /// pool or has been released.
    #[must_use]
    pub fn get(&self, handle: PoolHandle<T>) -> Option<&T> {
        if !self.is_live(handle) {
            return None;
        }
        // SAFETY: the pointer is this pool's slot for `handle.index`.
        Some(unsafe { &*handle.ptr.as_ptr() })
    }

    /// Exclusive access to a live slot. `None` if the handle is not from
    /// this pool or has been released.
    #[must_use]
    pub fn get_mut(&mut self, handle: PoolHandle<T>) -> Option<&mut T> {
        if !self.is_live(handle) {
            return None;
        }
        // SAFETY: as in `get`, and `&mut self` excludes other borrows.
        Some(unsafe { &mut *handle.ptr.as_ptr() })
    }

    fn is_live(&self, handle: PoolHandle<T>) -> bool {
        handle.index < self.capacity
            && self.live[handle.index]
            && self.slot(handle.index) == handle.ptr
    }

    /// Whether every slot ever issued has been released.
    #[must_use]
    pub fn validate_empty(&self) -> bool {
        self.free.len() == self.capacity
    }

    /// Same as [`PrimitiveBucketPool::validate_empty`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validate_empty()
    }

    /// Live slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.capacity - self.free.len()
    }

    /// Total slots across all buckets.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buckets allocated.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl<T: Default, const SKIP: u32> Default for PrimitiveBucketPool<T, SKIP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const SKIP: u32> fmt::Debug for PrimitiveBucketPool<T, SKIP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveBucketPool")
            .field("buckets", &self.buckets.len())
            .field("capacity", &self.capacity)
            .field("live", &self.len())
            .finish()
    }
}
