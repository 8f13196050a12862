//! Growable vector living in a single stack frame.

// SAFETY: Elements live in the frame's single `alloc_unique` extent,
// which starts at a fixed address for the frame's lifetime.
#![allow(unsafe_code)]

use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use super::{StackAllocator, StackAllocatorBuffer};

/// A vector whose storage is one frame of a [`StackAllocatorBuffer`].
///
/// Every `push`/`pop` resizes the frame's one live allocation with
/// [`StackAllocator::alloc_unique`], so the vector never copies its
/// elements. It cannot grow past the frame: `push` hands the value back
/// instead.
///
/// # Example
///
/// ```rust
/// use mnemos_alloc::{ScopedVec, StackAllocatorBuffer};
///
/// let buffer = StackAllocatorBuffer::with_capacity(256);
/// let mut squares = ScopedVec::new(&buffer);
/// for i in 0..4_u64 {
///     squares.push(i * i).unwrap();
/// }
/// assert_eq!(&squares[..], &[0, 1, 4, 9]);
/// ```
pub struct ScopedVec<'a, T> {
    frame: StackAllocator<'a>,
    /// Bytes skipped at the frame start to align `T`.
    padding: usize,
    len: usize,
    _marker: PhantomData<T>,
}

impl<'a, T> ScopedVec<'a, T> {
    /// Opens a new frame on `buffer` and starts an empty vector in it.
    #[must_use]
    pub fn new(buffer: &'a StackAllocatorBuffer) -> Self {
        let frame = StackAllocator::new(buffer);
        let padding = frame.data().as_ptr().align_offset(align_of::<T>());
        Self {
            frame,
            padding,
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the vector has no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements that fit in the frame as it is now.
    #[must_use]
    pub fn capacity(&self) -> usize {
        if size_of::<T>() == 0 {
            return usize::MAX;
        }
        self.frame.capacity().saturating_sub(self.padding) / size_of::<T>()
    }

    fn extent(&self, len: usize) -> Option<usize> {
        len.checked_mul(size_of::<T>())?.checked_add(self.padding)
    }

    fn base(&self) -> NonNull<T> {
        // SAFETY: `padding` bytes into the frame; only dereferenced when
        // the frame's extent covers it.
        unsafe { NonNull::new_unchecked(self.frame.data().as_ptr().wrapping_add(self.padding)) }
            .cast()
    }

    /// Appends `value`, or returns it if the frame is full.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` when the frame has no room for another element.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        let Some(extent) = self.extent(self.len + 1) else {
            return Err(value);
        };
        if self.frame.alloc_unique(extent).is_none() {
            return Err(value);
        }
        // SAFETY: the frame extent now covers slot `len`, which is aligned
        // and unoccupied.
        unsafe { self.base().as_ptr().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Removes and returns the last element.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: slot `len` was initialized and is no longer counted.
        let value = unsafe { self.base().as_ptr().add(self.len).read() };
        let extent = self.padding + self.len * size_of::<T>();
        let _ = self.frame.alloc_unique(extent);
        Some(value)
    }

    /// Drops every element and resets the frame.
    pub fn clear(&mut self) {
        let live: *mut [T] = self.as_mut_slice();
        self.len = 0;
        // SAFETY: the slice covered exactly the initialized elements.
        unsafe { std::ptr::drop_in_place(live) };
        self.frame.clear();
    }

    /// Elements as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the first `len` slots are initialized.
        unsafe { std::slice::from_raw_parts(self.base().as_ptr(), self.len) }
    }

    /// Elements as a mutable slice.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: the first `len` slots are initialized and owned by `self`.
        unsafe { std::slice::from_raw_parts_mut(self.base().as_ptr(), self.len) }
    }
}

impl<T> Deref for ScopedVec<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for ScopedVec<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T> Drop for ScopedVec<'_, T> {
    fn drop(&mut self) {
        // SAFETY: the slice covers exactly the initialized elements.
        unsafe { std::ptr::drop_in_place(self.as_mut_slice() as *mut [T]) };
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ScopedVec<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_push_pop_order() {
        let buffer = StackAllocatorBuffer::with_capacity(128);
        let mut vec = ScopedVec::new(&buffer);
        for i in 0..8_u32 {
            vec.push(i).unwrap();
        }
        assert_eq!(vec.len(), 8);
        assert_eq!(vec.last(), Some(&7));
        assert_eq!(vec.pop(), Some(7));
        assert_eq!(vec.pop(), Some(6));
        assert_eq!(vec.len(), 6);
        assert_eq!(vec[2], 2);
    }

    #[test]
    fn test_push_fails_when_frame_full() {
        let buffer = StackAllocatorBuffer::with_capacity(16);
        let mut vec = ScopedVec::new(&buffer);
        assert_eq!(vec.capacity(), 2);
        vec.push(1_u64).unwrap();
        vec.push(2_u64).unwrap();
        assert_eq!(vec.push(3_u64), Err(3));
        assert_eq!(vec.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_elements_aligned_after_parent_bytes() {
        let buffer = StackAllocatorBuffer::with_capacity(64);
        let mut parent = StackAllocator::new(&buffer);
        let _ = parent.alloc_linear(3).unwrap();
        {
            let mut vec = ScopedVec::new(&buffer);
            vec.push(0xDEAD_BEEF_u64).unwrap();
            assert_eq!(vec.as_ptr() as usize % align_of::<u64>(), 0);
            assert_eq!(vec[0], 0xDEAD_BEEF);
        }
        assert_eq!(parent.size(), 3);
    }

    #[test]
    fn test_drop_runs_element_destructors() {
        let marker = Rc::new(());
        let buffer = StackAllocatorBuffer::with_capacity(256);
        {
            let mut vec = ScopedVec::new(&buffer);
            for _ in 0..5 {
                vec.push(Rc::clone(&marker)).unwrap();
            }
            assert_eq!(Rc::strong_count(&marker), 6);
            drop(vec.pop());
            assert_eq!(Rc::strong_count(&marker), 5);
        }
        assert_eq!(Rc::strong_count(&marker), 1);
        assert!(buffer.is_idle());
    }

    #[test]
    fn test_clear_resets_frame() {
        let marker = Rc::new(());
        let buffer = StackAllocatorBuffer::with_capacity(128);
        let mut vec = ScopedVec::new(&buffer);
        vec.push(Rc::clone(&marker)).unwrap();
        vec.push(Rc::clone(&marker)).unwrap();
        vec.clear();
        assert!(vec.is_empty());
        assert_eq!(Rc::strong_count(&marker), 1);
        vec.push(Rc::clone(&marker)).unwrap();
        assert_eq!(vec.len(), 1);
    }

    #[test]
    fn test_iter_mut_through_deref() {
        let buffer = StackAllocatorBuffer::with_capacity(64);
        let mut vec = ScopedVec::new(&buffer);
        for i in 1..=4_i32 {
            vec.push(i).unwrap();
        }
        for v in vec.iter_mut() {
            *v *= 10;
        }
        assert_eq!(vec.iter().sum::<i32>(), 100);
    }
}
