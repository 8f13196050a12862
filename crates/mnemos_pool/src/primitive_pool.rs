//! # Primitive Pool
//!
//! Fixed-capacity pool for objects that are frequently created and released.

// SAFETY: Slot pointers handed out by `create` point into `Slots`, which
// never moves until `rebuild` or drop.
#![allow(unsafe_code)]

use std::ptr::NonNull;

use mnemos_alloc::MemoryConfig;

use crate::slots::Slots;

/// A fixed-capacity pool of `T`.
///
/// All slots are allocated and default-initialized up front in one block.
/// `create` never allocates; when the pool is full it returns `None`.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap in a mutex.
///
/// # Example
///
/// ```rust
/// use mnemos_pool::PrimitivePool;
///
/// #[derive(Default)]
/// struct Particle { x: f32, y: f32, life: f32 }
///
/// let mut pool: PrimitivePool<Particle> = PrimitivePool::new(10_000);
///
/// // Create - O(1), no heap allocation
/// let particle = pool.create().unwrap();
///
/// // Release - O(1), slot reset to `Particle::default()`
/// pool.release(particle);
/// ```
pub struct PrimitivePool<T> {
    /// The storage block.
    storage: Slots<T>,
    /// Free list - indices of available slots.
    free_list: Vec<usize>,
    /// Per-slot liveness.
    live: Vec<bool>,
}

impl<T: Default> PrimitivePool<T> {
    /// Creates a pool with the specified capacity.
    ///
    /// All memory is pre-allocated upfront.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: Slots::with_default(capacity),
            // Pops 0 first.
            free_list: (0..capacity).rev().collect(),
            live: vec![false; capacity],
        }
    }

    /// Creates a pool sized by `config.pool.capacity`.
    #[must_use]
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(config.pool.capacity)
    }

    /// Hands out a free slot, or `None` if the pool is full.
    ///
    /// This is a **O(1)** operation with **zero heap allocations**.
    pub fn create(&mut self) -> Option<NonNull<T>> {
        let index = self.free_list.pop()?;
        self.live[index] = true;
        Some(self.storage.slot(index))
    }

    /// Resets the slot `ptr` points at to `T::default()` and frees it.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not point at one of this pool's slots. In debug
    /// builds, also panics if the slot is already free.
    pub fn release(&mut self, ptr: NonNull<T>) {
        let Some(index) = self.storage.index_of(ptr.as_ptr()) else {
            panic!("releasing a pointer outside the pool");
        };
        debug_assert!(self.live[index], "slot {index} released twice");
        self.live[index] = false;
        // SAFETY: `index` is in range and the slot is initialized. Assigning
        // drops the old value and leaves a default one in place.
        unsafe { *self.storage.slot(index).as_ptr() = T::default() };
        self.free_list.push(index);
    }

    /// Resets every live slot, then resizes the pool to `new_size` slots,
    /// all free.
    ///
    /// Every pointer issued before the call is invalidated.
    pub fn rebuild(&mut self, new_size: usize) {
        self.visit_objects(|value| *value = T::default());
        if new_size != self.capacity() {
            tracing::debug!(from = self.capacity(), to = new_size, "primitive pool rebuilt");
            self.storage = Slots::with_default(new_size);
        }
        self.free_list.clear();
        self.free_list.extend((0..new_size).rev());
        self.live.clear();
        self.live.resize(new_size, false);
    }
}

impl<T> PrimitivePool<T> {
    /// Returns the total capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Returns the number of live slots.
    #[inline]
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.capacity() - self.free_list.len()
    }

    /// Returns the number of free slots.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Whether `ptr` points at one of this pool's slots.
    #[must_use]
    pub fn owns(&self, ptr: *const T) -> bool {
        self.storage.index_of(ptr).is_some()
    }

    /// Calls `visit` on every live slot in ascending index order.
    pub fn visit_objects(&mut self, mut visit: impl FnMut(&mut T)) {
        for (index, &live) in self.live.iter().enumerate() {
            if live {
                // SAFETY: live slots are only reachable through `&mut self` here.
                visit(unsafe { &mut *self.storage.slot(index).as_ptr() });
            }
        }
    }
}

impl<T> std::fmt::Debug for PrimitivePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimitivePool")
            .field("capacity", &self.capacity())
            .field("allocated", &self.allocated_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_create_release() {
        let mut pool: PrimitivePool<u32> = PrimitivePool::new(10);

        let p = pool.create().unwrap();
        unsafe { *p.as_ptr() = 42 };
        assert_eq!(pool.allocated_count(), 1);

        pool.release(p);
        assert_eq!(pool.allocated_count(), 0);
        assert_eq!(unsafe { *p.as_ptr() }, 0);
    }

    #[test]
    fn test_pool_full() {
        let mut pool: PrimitivePool<u8> = PrimitivePool::new(2);

        let _ = pool.create().unwrap();
        let _ = pool.create().unwrap();
        assert!(pool.create().is_none());
    }

    #[test]
    fn test_pool_reuse() {
        let mut pool: PrimitivePool<u32> = PrimitivePool::new(1);

        let p1 = pool.create().unwrap();
        pool.release(p1);

        let p2 = pool.create().unwrap();
        assert_eq!(p1, p2); // Same slot reused
    }

    #[test]
    fn test_first_slot_first() {
        let mut pool: PrimitivePool<u64> = PrimitivePool::new(4);
        let a = pool.create().unwrap();
        let b = pool.create().unwrap();
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 8);
    }

    #[test]
    fn test_release_drops_value() {
        let marker = std::rc::Rc::new(());
        let mut pool: PrimitivePool<Option<std::rc::Rc<()>>> = PrimitivePool::new(2);
        let p = pool.create().unwrap();
        unsafe { *p.as_ptr() = Some(std::rc::Rc::clone(&marker)) };
        assert_eq!(std::rc::Rc::strong_count(&marker), 2);
        pool.release(p);
        assert_eq!(std::rc::Rc::strong_count(&marker), 1);
    }

    #[test]
    #[should_panic(expected = "outside the pool")]
    fn test_release_foreign_pointer_panics() {
        let mut pool: PrimitivePool<u32> = PrimitivePool::new(2);
        let mut other = 5_u32;
        pool.release(NonNull::from(&mut other));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "released twice")]
    fn test_double_release_panics() {
        let mut pool: PrimitivePool<u32> = PrimitivePool::new(4);
        let a = pool.create().unwrap();
        let _b = pool.create().unwrap();
        pool.release(a);
        pool.release(a);
    }

    #[test]
    fn test_release_create_cycles_stay_distinct() {
        let mut pool: PrimitivePool<u32> = PrimitivePool::new(4);
        let a = pool.create().unwrap();
        let b = pool.create().unwrap();
        pool.release(a);
        let c = pool.create().unwrap();
        let d = pool.create().unwrap();
        assert_eq!(c, a);
        assert_ne!(c, d);
        assert_ne!(d, b);
        assert_eq!(pool.allocated_count(), 3);
    }

    #[test]
    fn test_visit_objects_skips_free() {
        let mut pool: PrimitivePool<usize> = PrimitivePool::new(6);
        let ptrs: Vec<_> = (0..6).map(|_| pool.create().unwrap()).collect();
        for (i, p) in ptrs.iter().enumerate() {
            unsafe { *p.as_ptr() = i + 1 };
        }
        pool.release(ptrs[0]);
        pool.release(ptrs[4]);

        let mut seen = Vec::new();
        pool.visit_objects(|value| seen.push(*value));
        assert_eq!(seen, vec![2, 3, 4, 6]);
    }

    #[test]
    fn test_rebuild_resets_and_resizes() {
        let mut pool: PrimitivePool<u32> = PrimitivePool::new(2);
        let p = pool.create().unwrap();
        unsafe { *p.as_ptr() = 7 };

        pool.rebuild(5);
        assert_eq!(pool.capacity(), 5);
        assert_eq!(pool.free_count(), 5);

        let mut live = 0;
        pool.visit_objects(|_| live += 1);
        assert_eq!(live, 0);
        let fresh = pool.create().unwrap();
        assert_eq!(unsafe { *fresh.as_ptr() }, 0);
    }

    #[test]
    fn test_from_config() {
        let pool: PrimitivePool<u8> = PrimitivePool::from_config(&MemoryConfig::default());
        assert_eq!(pool.capacity(), 1024);
        assert!(!pool.owns(std::ptr::null()));
    }
}
