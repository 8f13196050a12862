//! # Raw Byte Storage
//!
//! Owned, growable byte buffer backing the bump and stack allocators.
//!
//! Unlike `Vec<u8>`, addresses handed out from the buffer never go through
//! a `&mut [u8]`, so pointers returned to callers stay valid while the
//! owner keeps handing out more of them through `&self`.

// SAFETY: This module owns a raw heap allocation. Every unsafe block below
// touches only that allocation and is documented.
#![allow(unsafe_code)]

use std::alloc::{alloc, dealloc, handle_alloc_error, realloc, Layout};
use std::ptr::NonNull;

/// Base alignment of every buffer. Covers all primitive types.
pub(crate) const BUFFER_ALIGN: usize = 16;

/// A heap block of `len` bytes aligned to [`BUFFER_ALIGN`].
pub(crate) struct RawBuffer {
    /// Start of the block; dangling when `len == 0`.
    ptr: NonNull<u8>,
    /// Size in bytes.
    len: usize,
}

impl RawBuffer {
    /// Creates an empty buffer without allocating.
    pub(crate) const fn empty() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
        }
    }

    /// Creates a zeroed buffer of `len` bytes.
    pub(crate) fn with_len(len: usize) -> Self {
        let mut buffer = Self::empty();
        buffer.resize(len);
        buffer
    }

    /// Size in bytes.
    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Start address. Valid for `len` bytes.
    #[inline]
    pub(crate) const fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Half-open `[start, start + len)` containment.
    #[inline]
    pub(crate) fn contains(&self, ptr: *const u8) -> bool {
        let start = self.ptr.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= start && addr - start < self.len
    }

    /// Resizes the block. Existing bytes are kept, new bytes are zeroed.
    ///
    /// The block may move: callers must not hold addresses into it.
    pub(crate) fn resize(&mut self, new_len: usize) {
        if new_len == self.len {
            return;
        }
        if new_len == 0 {
            self.release();
            return;
        }

        let new_layout = layout_for(new_len);
        // SAFETY: `new_layout` has non-zero size. When `len > 0` the block
        // was allocated with `layout_for(self.len)`.
        let raw = unsafe {
            if self.len == 0 {
                alloc(new_layout)
            } else {
                realloc(self.ptr.as_ptr(), layout_for(self.len), new_len)
            }
        };
        let Some(ptr) = NonNull::new(raw) else {
            handle_alloc_error(new_layout);
        };

        if new_len > self.len {
            // SAFETY: `[len, new_len)` lies inside the fresh block.
            unsafe {
                std::ptr::write_bytes(ptr.as_ptr().add(self.len), 0, new_len - self.len);
            }
        }

        self.ptr = ptr;
        self.len = new_len;
    }

    fn release(&mut self) {
        if self.len > 0 {
            // SAFETY: allocated with exactly this layout in `resize`.
            unsafe { dealloc(self.ptr.as_ptr(), layout_for(self.len)) };
        }
        self.ptr = NonNull::dangling();
        self.len = 0;
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

// SAFETY: RawBuffer uniquely owns its block; `&RawBuffer` only exposes the
// address and length, never a reference to the bytes.
unsafe impl Send for RawBuffer {}
// SAFETY: see above.
unsafe impl Sync for RawBuffer {}

fn layout_for(len: usize) -> Layout {
    Layout::from_size_align(len, BUFFER_ALIGN).expect("buffer length exceeds isize::MAX")
}
