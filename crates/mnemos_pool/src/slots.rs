//! Fixed run of default-initialized slots with stable addresses.

// SAFETY: `Slots` owns a leaked `Box<[T]>` and rebuilds it on drop. Slot
// pointers are derived from the raw allocation, never from a `&mut [T]`.
#![allow(unsafe_code)]

use std::ptr::NonNull;

/// A heap run of `len` initialized `T`s whose addresses never change.
pub(crate) struct Slots<T> {
    ptr: NonNull<T>,
    len: usize,
}

impl<T: Default> Slots<T> {
    /// Allocates `len` slots holding `T::default()`.
    pub(crate) fn with_default(len: usize) -> Self {
        let boxed: Box<[T]> = (0..len).map(|_| T::default()).collect();
        let raw = Box::into_raw(boxed);
        // SAFETY: `Box::into_raw` never returns null.
        let ptr = unsafe { NonNull::new_unchecked(raw.cast::<T>()) };
        Self { ptr, len }
    }
}

impl<T> Slots<T> {
    /// Number of slots.
    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Pointer to slot `index`.
    #[inline]
    pub(crate) fn slot(&self, index: usize) -> NonNull<T> {
        debug_assert!(index < self.len, "slot {index} out of {}", self.len);
        // SAFETY: `index < len`, inside the allocation.
        unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(index)) }
    }

    /// Index of the slot `ptr` points at, if it points at the start of one.
    pub(crate) fn index_of(&self, ptr: *const T) -> Option<usize> {
        let size = std::mem::size_of::<T>();
        let base = self.ptr.as_ptr() as usize;
        let byte_offset = (ptr as usize).checked_sub(base)?;
        if size == 0 || byte_offset % size != 0 {
            return None;
        }
        let index = byte_offset / size;
        (index < self.len).then_some(index)
    }
}

impl<T> Drop for Slots<T> {
    fn drop(&mut self) {
        let raw = std::ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len);
        // SAFETY: rebuilt from the `Box::into_raw` in `with_default`.
        drop(unsafe { Box::from_raw(raw) });
    }
}

// SAFETY: `Slots<T>` owns its `T`s exactly like `Box<[T]>`.
unsafe impl<T: Send> Send for Slots<T> {}
// SAFETY: see above.
unsafe impl<T: Sync> Sync for Slots<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_default_initialized() {
        let slots: Slots<u32> = Slots::with_default(4);
        assert_eq!(slots.len(), 4);
        for index in 0..4 {
            assert_eq!(unsafe { *slots.slot(index).as_ptr() }, 0);
        }
    }

    #[test]
    fn test_index_of() {
        let slots: Slots<u64> = Slots::with_default(3);
        let second = slots.slot(1).as_ptr();
        assert_eq!(slots.index_of(second), Some(1));
        assert_eq!(slots.index_of(second.cast::<u8>().wrapping_add(1).cast()), None);
        assert_eq!(slots.index_of(second.wrapping_add(2)), None);
        assert_eq!(slots.index_of(second.wrapping_sub(2)), None);
    }

    #[test]
    fn test_drop_runs_destructors() {
        let marker = std::rc::Rc::new(());
        {
            let slots: Slots<Option<std::rc::Rc<()>>> = Slots::with_default(2);
            unsafe { *slots.slot(0).as_ptr() = Some(std::rc::Rc::clone(&marker)) };
            assert_eq!(std::rc::Rc::strong_count(&marker), 2);
        }
        assert_eq!(std::rc::Rc::strong_count(&marker), 1);
    }
}
