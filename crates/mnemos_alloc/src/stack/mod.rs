//! # Scoped Stack Allocator
//!
//! Nestable arenas for call-tree scoped allocation. One
//! [`StackAllocatorBuffer`] backs a logical call stack; every nested call
//! opens a [`StackAllocator`] frame that borrows the unused tail of its
//! parent and hands it back when dropped.
//!
//! ```text
//! buffer: [ root: used | child: used | grandchild ........... ]
//!                      ^ root capacity clamped to its cursor
//!
//! with extra_parent_space = E:
//! buffer: [ root: used | E reserved for root | child ........ ]
//! ```
//!
//! Frames form a strict LIFO per buffer. The frame records live in the
//! buffer and are addressed by depth, so frame values themselves can be
//! moved freely.
//!
//! ## Thread Safety
//!
//! Single thread only: the buffer is `!Sync`, so frames cannot be opened
//! from two threads.

// SAFETY: Frame pointers are computed inside the buffer's `RawBuffer`
// from offsets that never exceed its length.
#![allow(unsafe_code)]

mod scoped_vec;

pub use scoped_vec::ScopedVec;

use std::cell::RefCell;
use std::ptr::NonNull;

use crate::config::MemoryConfig;
use crate::raw::RawBuffer;

/// Bookkeeping for one live frame. Offsets are relative to the buffer start.
#[derive(Clone, Copy, Debug)]
struct Frame {
    /// Offset of the frame's first byte.
    start: usize,
    /// Bytes used inside the frame.
    cursor: usize,
    /// Bytes the frame may use right now.
    capacity: usize,
}

/// Backing storage for a chain of nested [`StackAllocator`] frames.
///
/// A buffer can only be resized or dropped while no frame is alive.
/// Frames borrow the buffer, so the borrow checker enforces this; the
/// `debug_assert!`s catch frames leaked with `mem::forget`.
pub struct StackAllocatorBuffer {
    storage: RawBuffer,
    /// Live frames, root first. The last entry is the head.
    frames: RefCell<Vec<Frame>>,
}

impl StackAllocatorBuffer {
    /// Creates a buffer with no storage.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            storage: RawBuffer::empty(),
            frames: RefCell::new(Vec::new()),
        }
    }

    /// Creates a buffer of `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: RawBuffer::with_len(capacity),
            frames: RefCell::new(Vec::with_capacity(8)),
        }
    }

    /// Creates a buffer sized by `config.stack.capacity`.
    #[must_use]
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::with_capacity(config.stack.capacity)
    }

    /// Total bytes shared by all frames.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of live frames.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Whether no frame is alive.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.frames.borrow().is_empty()
    }

    /// Resizes the storage. No frame may be alive.
    pub fn resize(&mut self, capacity: usize) {
        debug_assert!(
            self.frames.get_mut().is_empty(),
            "resizing a stack allocator buffer while frames are alive"
        );
        tracing::debug!(from = self.capacity(), to = capacity, "stack buffer resized");
        self.storage.resize(capacity);
    }

    fn base(&self) -> *mut u8 {
        self.storage.as_ptr()
    }
}

impl Default for StackAllocatorBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StackAllocatorBuffer {
    fn drop(&mut self) {
        debug_assert!(
            self.frames.get_mut().is_empty(),
            "stack allocator buffer dropped while frames are alive"
        );
    }
}

impl std::fmt::Debug for StackAllocatorBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackAllocatorBuffer")
            .field("capacity", &self.capacity())
            .field("frames", &self.frames.borrow())
            .finish()
    }
}

/// One frame of a [`StackAllocatorBuffer`].
///
/// Opening a frame makes it the buffer's head. While it is alive its
/// parent can only use the space reserved with `extra_parent_space`.
/// Dropping it returns its whole capacity to the parent.
///
/// # Example
///
/// ```rust
/// use mnemos_alloc::{StackAllocator, StackAllocatorBuffer};
///
/// let buffer = StackAllocatorBuffer::with_capacity(64);
/// let mut root = StackAllocator::new(&buffer);
/// let _ = root.alloc_linear(16).unwrap();
/// {
///     let mut child = StackAllocator::new(&buffer);
///     assert_eq!(child.available_size(), 48);
///     let _ = child.alloc_linear(48).unwrap();
///     assert!(root.alloc_linear(1).is_none());
/// }
/// assert_eq!(root.available_size(), 48);
/// ```
pub struct StackAllocator<'a> {
    buffer: &'a StackAllocatorBuffer,
    /// Index of this frame's record in `buffer.frames`.
    depth: usize,
}

impl<'a> StackAllocator<'a> {
    /// Opens a frame taking all of the current head's remaining space.
    #[must_use]
    pub fn new(buffer: &'a StackAllocatorBuffer) -> Self {
        Self::with_extra_parent_space(buffer, 0)
    }

    /// Opens a frame, leaving up to `extra_parent_space` bytes of the
    /// parent's remaining space reserved for the parent.
    ///
    /// The reservation is clamped to what the parent has left. For a root
    /// frame there is no parent and the value is ignored.
    #[must_use]
    pub fn with_extra_parent_space(buffer: &'a StackAllocatorBuffer, extra_parent_space: usize) -> Self {
        let mut frames = buffer.frames.borrow_mut();
        let frame = match frames.last_mut() {
            None => Frame {
                start: 0,
                cursor: 0,
                capacity: buffer.capacity(),
            },
            Some(parent) => {
                let remaining = parent.capacity.saturating_sub(parent.cursor);
                let reserved = extra_parent_space.min(remaining);
                let child = Frame {
                    start: parent.start + parent.cursor + reserved,
                    cursor: 0,
                    capacity: remaining - reserved,
                };
                parent.capacity = parent.cursor + reserved;
                child
            }
        };
        frames.push(frame);
        let depth = frames.len() - 1;
        drop(frames);

        Self { buffer, depth }
    }

    #[inline]
    fn frame(&self) -> Frame {
        self.buffer.frames.borrow()[self.depth]
    }

    #[inline]
    fn update<R>(&mut self, f: impl FnOnce(&mut Frame) -> R) -> R {
        f(&mut self.buffer.frames.borrow_mut()[self.depth])
    }

    #[inline]
    fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        // SAFETY: frame offsets never exceed the buffer length, and the
        // buffer pointer is never null.
        unsafe { NonNull::new_unchecked(self.buffer.base().add(offset)) }
    }

    /// Appends `size` bytes after the previous allocation, like a
    /// `push_back`. Returns `None` (cursor untouched) if the frame cannot
    /// fit them.
    pub fn alloc_linear(&mut self, size: usize) -> Option<NonNull<u8>> {
        let offset = self.update(|frame| {
            let end = frame.cursor.checked_add(size)?;
            if end > frame.capacity {
                return None;
            }
            let offset = frame.start + frame.cursor;
            frame.cursor = end;
            Some(offset)
        })?;
        Some(self.ptr_at(offset))
    }

    /// Treats the frame as one resizable allocation: sets the used size to
    /// `size` and returns the frame start. Calls do not accumulate.
    pub fn alloc_unique(&mut self, size: usize) -> Option<NonNull<u8>> {
        let start = self.update(|frame| {
            if size > frame.capacity {
                return None;
            }
            frame.cursor = size;
            Some(frame.start)
        })?;
        Some(self.ptr_at(start))
    }

    /// Resets the frame's cursor. The parent is not affected.
    pub fn clear(&mut self) {
        self.update(|frame| frame.cursor = 0);
    }

    /// Bytes used in this frame.
    #[must_use]
    pub fn size(&self) -> usize {
        self.frame().cursor
    }

    /// Bytes this frame may use right now.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.frame().capacity
    }

    /// `capacity() - size()`.
    #[must_use]
    pub fn available_size(&self) -> usize {
        let frame = self.frame();
        frame.capacity.saturating_sub(frame.cursor)
    }

    /// Start of the frame.
    #[must_use]
    pub fn data(&self) -> NonNull<u8> {
        self.ptr_at(self.frame().start)
    }

    /// Whether this frame is the buffer's innermost frame.
    #[must_use]
    pub fn is_head(&self) -> bool {
        self.buffer.depth() == self.depth + 1
    }
}

impl Drop for StackAllocator<'_> {
    fn drop(&mut self) {
        let mut frames = self.buffer.frames.borrow_mut();
        debug_assert_eq!(
            frames.len(),
            self.depth + 1,
            "stack frames must be dropped innermost first"
        );
        let Some(child) = frames.pop() else {
            return;
        };
        if let Some(parent) = frames.last_mut() {
            parent.capacity += child.capacity;
        }
    }
}

impl std::fmt::Debug for StackAllocator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackAllocator")
            .field("depth", &self.depth)
            .field("frame", &self.frame())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: usize = std::mem::size_of::<u32>();

    #[test]
    fn test_empty_buffer_fails() {
        let buffer = StackAllocatorBuffer::new();
        let mut frame = StackAllocator::new(&buffer);
        assert!(frame.alloc_unique(UNIT).is_none());
        assert!(frame.alloc_linear(UNIT).is_none());
        assert!(frame.alloc_linear(0).is_some());
    }

    #[test]
    fn test_linear_then_full() {
        let buffer = StackAllocatorBuffer::with_capacity(UNIT * 2);
        let mut frame = StackAllocator::new(&buffer);
        let a = frame.alloc_linear(UNIT).unwrap();
        let b = frame.alloc_linear(UNIT).unwrap();
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, UNIT);
        assert!(frame.alloc_linear(UNIT).is_none());
        assert_eq!(frame.size(), UNIT * 2);

        frame.clear();
        assert_eq!(frame.size(), 0);
    }

    #[test]
    fn test_failed_linear_keeps_cursor() {
        let buffer = StackAllocatorBuffer::with_capacity(UNIT * 2);
        let mut frame = StackAllocator::new(&buffer);
        let _ = frame.alloc_linear(UNIT).unwrap();
        assert!(frame.alloc_linear(UNIT * 3).is_none());
        assert_eq!(frame.size(), UNIT);
    }

    #[test]
    fn test_unique_does_not_accumulate() {
        let buffer = StackAllocatorBuffer::with_capacity(64);
        let mut frame = StackAllocator::new(&buffer);
        let a = frame.alloc_unique(16).unwrap();
        let b = frame.alloc_unique(40).unwrap();
        let c = frame.alloc_unique(8).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(frame.size(), 8);
        assert!(frame.alloc_unique(65).is_none());
        assert_eq!(frame.size(), 8);
    }

    #[test]
    fn test_child_borrows_parent_tail() {
        let buffer = StackAllocatorBuffer::with_capacity(UNIT * 4);
        let mut top = StackAllocator::new(&buffer);
        let _ = top.alloc_linear(UNIT).unwrap();
        {
            let mut child = StackAllocator::new(&buffer);
            assert_eq!(child.capacity(), UNIT * 3);
            assert_eq!(child.data().as_ptr() as usize - top.data().as_ptr() as usize, UNIT);
            assert!(top.alloc_linear(UNIT).is_none());
            assert_eq!(top.capacity(), UNIT);
            let _ = child.alloc_linear(UNIT * 3).unwrap();
        }
        assert_eq!(top.size(), UNIT);
        assert_eq!(top.available_size(), UNIT * 3);
        assert!(top.alloc_linear(UNIT * 3).is_some());
    }

    #[test]
    fn test_extra_parent_space_reserved() {
        let buffer = StackAllocatorBuffer::with_capacity(100);
        let mut base = StackAllocator::new(&buffer);
        let _ = base.alloc_linear(10).unwrap();
        let before = base.available_size();
        {
            let child = StackAllocator::with_extra_parent_space(&buffer, 30);
            assert_eq!(child.available_size(), before - 30);
            assert_eq!(child.data().as_ptr() as usize - base.data().as_ptr() as usize, 40);
            assert_eq!(base.available_size(), 30);
            assert!(base.alloc_linear(30).is_some());
            assert!(base.alloc_linear(1).is_none());
        }
        assert_eq!(base.size(), 40);
        assert_eq!(base.available_size(), 60);
    }

    #[test]
    fn test_extra_parent_space_clamped() {
        let buffer = StackAllocatorBuffer::with_capacity(16);
        let base = StackAllocator::new(&buffer);
        {
            let child = StackAllocator::with_extra_parent_space(&buffer, 1000);
            assert_eq!(child.available_size(), 0);
            assert_eq!(base.available_size(), 16);
        }
        assert_eq!(base.available_size(), 16);
    }

    #[test]
    fn test_depth_tracking() {
        let buffer = StackAllocatorBuffer::with_capacity(32);
        assert!(buffer.is_idle());
        let a = StackAllocator::new(&buffer);
        let b = StackAllocator::new(&buffer);
        assert_eq!(buffer.depth(), 2);
        assert!(b.is_head());
        assert!(!a.is_head());
        drop(b);
        assert!(a.is_head());
        drop(a);
        assert!(buffer.is_idle());
    }

    #[test]
    fn test_resize_when_idle() {
        let mut buffer = StackAllocatorBuffer::with_capacity(8);
        buffer.resize(128);
        let frame = StackAllocator::new(&buffer);
        assert_eq!(frame.capacity(), 128);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "innermost first")]
    fn test_out_of_order_drop_asserts() {
        // Leaked so the buffer's own drop check does not fire while unwinding.
        let buffer: &'static StackAllocatorBuffer =
            Box::leak(Box::new(StackAllocatorBuffer::with_capacity(8)));
        let outer = StackAllocator::new(buffer);
        let _inner = StackAllocator::new(buffer);
        drop(outer);
    }
}
