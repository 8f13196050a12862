//! # Abstract Pool
//!
//! Heterogeneous objects over any [`Allocator`], destroyable in bulk
//! without knowing their types.
//!
//! Every object is placed in a node behind a small header holding its
//! entry number. The pool keeps one entry per object: the block the
//! allocator returned, a type-erased drop function, and links of a doubly
//! linked list in creation order.
//!
//! ```text
//! allocator block:  [ pad | slot | value: T ]
//!                   ^ origin      ^ pointer handed out
//!
//! entries:  head -> #2 <-> #0 <-> #3 <- tail      (#1 vacant)
//! ```
//!
//! `release` reads the header to find the entry in O(1), unlinks it, drops
//! the value and frees the recorded origin. `clear` drops every entry and
//! then clears the allocator.

// SAFETY: Objects live in raw allocator blocks; every access goes through a
// node pointer recorded at creation.
#![allow(unsafe_code)]

use std::mem::{align_of, offset_of, size_of};
use std::ptr::NonNull;

use mnemos_alloc::Allocator;

/// Allocator block layout for one object.
#[repr(C)]
struct Node<T> {
    /// Entry number in `AbstractPool::entries`.
    slot: usize,
    value: T,
}

/// Drops the `Node<T>` at `node` in place.
///
/// # Safety
///
/// `node` must point at a live `Node<T>`.
unsafe fn drop_node<T>(node: NonNull<u8>) {
    // SAFETY: guaranteed by the caller.
    unsafe { std::ptr::drop_in_place(node.cast::<Node<T>>().as_ptr()) };
}

/// Bookkeeping for one live object.
#[derive(Clone, Copy)]
struct Entry {
    /// Address the allocator returned.
    origin: NonNull<u8>,
    /// Aligned node inside the block.
    node: NonNull<u8>,
    drop_node: unsafe fn(NonNull<u8>),
    prev: Option<usize>,
    next: Option<usize>,
}

enum Slot {
    Live(Entry),
    /// Next vacant slot.
    Vacant(Option<usize>),
}

/// Pairs an allocator with an intrusive list of heterogeneous objects.
///
/// # Example
///
/// ```rust
/// use mnemos_alloc::OverflowAllocator;
/// use mnemos_pool::AbstractPool;
///
/// let mut pool = AbstractPool::new(OverflowAllocator::new());
/// let name = pool.create::<String>().unwrap();
/// let count = pool.create::<u64>().unwrap();
/// assert_eq!(pool.len(), 2);
///
/// // SAFETY: both pointers came from `create` and are still live.
/// unsafe {
///     name.as_ptr().write(String::from("mnemos"));
///     pool.release(count);
/// }
/// assert_eq!(pool.len(), 1);
///
/// pool.clear(); // drops the String
/// assert_eq!(pool.size(), 0);
/// ```
pub struct AbstractPool<A: Allocator> {
    allocator: A,
    entries: Vec<Slot>,
    /// First vacant entry.
    vacant: Option<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<A: Allocator> AbstractPool<A> {
    /// Creates an empty pool drawing from `allocator`.
    #[must_use]
    pub const fn new(allocator: A) -> Self {
        Self {
            allocator,
            entries: Vec::new(),
            vacant: None,
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Creates a `T::default()` and appends it to the list.
    ///
    /// Returns `None` when the allocator is exhausted.
    pub fn create<T: Default + 'static>(&mut self) -> Option<NonNull<T>> {
        self.create_with(T::default())
    }

    /// Moves `value` into the pool and appends it to the list.
    ///
    /// Returns `None` when the allocator is exhausted; `value` is dropped.
    pub fn create_with<T: 'static>(&mut self, value: T) -> Option<NonNull<T>> {
        // The allocator guarantees no alignment, so ask for enough slack to
        // align the node by hand.
        let align = align_of::<Node<T>>();
        let origin = self.allocator.alloc(size_of::<Node<T>>() + align - 1)?;
        let pad = origin.as_ptr().align_offset(align);
        // SAFETY: `pad < align`, so the node fits in the block.
        let node = unsafe { NonNull::new_unchecked(origin.as_ptr().add(pad)) };

        let slot = self.occupy(Entry {
            origin,
            node,
            drop_node: drop_node::<T>,
            prev: self.tail,
            next: None,
        });
        let node = node.cast::<Node<T>>();
        // SAFETY: `node` is aligned and sized for `Node<T>` and unused.
        unsafe { node.as_ptr().write(Node { slot, value }) };

        // SAFETY: `value` sits inside the node just written.
        Some(unsafe { NonNull::new_unchecked(std::ptr::addr_of_mut!((*node.as_ptr()).value)) })
    }

    /// Stores `entry` in a vacant slot and links it at the tail.
    fn occupy(&mut self, entry: Entry) -> usize {
        let slot = match self.vacant {
            Some(slot) => {
                if let Slot::Vacant(next) = self.entries[slot] {
                    self.vacant = next;
                }
                self.entries[slot] = Slot::Live(entry);
                slot
            }
            None => {
                self.entries.push(Slot::Live(entry));
                self.entries.len() - 1
            }
        };

        match self.tail {
            Some(tail) => self.live_mut(tail).next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.len += 1;
        slot
    }

    fn live_mut(&mut self, slot: usize) -> &mut Entry {
        match &mut self.entries[slot] {
            Slot::Live(entry) => entry,
            Slot::Vacant(_) => unreachable!("linked entry {slot} is vacant"),
        }
    }

    /// Unlinks `slot` and marks it vacant.
    fn vacate(&mut self, slot: usize) -> Entry {
        let Slot::Live(entry) = std::mem::replace(&mut self.entries[slot], Slot::Vacant(self.vacant))
        else {
            unreachable!("releasing vacant entry {slot}");
        };
        self.vacant = Some(slot);

        match entry.prev {
            Some(prev) => self.live_mut(prev).next = entry.next,
            None => self.head = entry.next,
        }
        match entry.next {
            Some(next) => self.live_mut(next).prev = entry.prev,
            None => self.tail = entry.prev,
        }
        self.len -= 1;
        entry
    }

    /// Unlinks and drops the object at `ptr`, then frees its block.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `create`/`create_with::<T>` on this
    /// pool and not released since.
    pub unsafe fn release<T>(&mut self, ptr: NonNull<T>) {
        // SAFETY: per the contract `ptr` is the `value` field of a live node.
        let node = unsafe {
            ptr.as_ptr()
                .cast::<u8>()
                .sub(offset_of!(Node<T>, value))
                .cast::<Node<T>>()
        };
        // SAFETY: the node is live, so its header is initialized.
        let slot = unsafe { (*node).slot };
        debug_assert!(
            matches!(self.entries.get(slot), Some(Slot::Live(entry)) if entry.node.as_ptr() == node.cast()),
            "releasing a pointer the abstract pool did not create"
        );

        let entry = self.vacate(slot);
        // SAFETY: unlinked above, so nothing else will drop it.
        unsafe { std::ptr::drop_in_place(node) };
        self.allocator.free(entry.origin);
    }

    /// Drops every object in list order, then clears the allocator.
    ///
    /// The list is detached before any destructor runs. If one panics, the
    /// objects after it are leaked and the pool is left empty.
    pub fn clear(&mut self) {
        let entries = std::mem::take(&mut self.entries);
        let mut cursor = self.head.take();
        self.vacant = None;
        self.tail = None;
        self.len = 0;

        while let Some(slot) = cursor {
            let Slot::Live(entry) = &entries[slot] else {
                unreachable!("linked entry {slot} is vacant");
            };
            cursor = entry.next;
            // SAFETY: linked entries point at live nodes of the type their
            // drop function was instantiated with, and the detached list
            // visits each one once.
            unsafe { (entry.drop_node)(entry.node) };
        }
        self.allocator.clear();
    }

    /// The backing allocator.
    #[must_use]
    pub const fn allocator(&self) -> &A {
        &self.allocator
    }

    /// The backing allocator, while no object is live.
    ///
    /// Live objects would dangle if the allocator were cleared or resized
    /// under them, so this returns `None` unless the pool is empty.
    pub fn allocator_mut(&mut self) -> Option<&mut A> {
        (self.len == 0).then_some(&mut self.allocator)
    }

    /// Live objects.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no object is live.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes the allocator has handed out.
    #[must_use]
    pub fn size(&self) -> usize {
        self.allocator.size()
    }

    /// Whether `ptr` lies in memory the allocator manages.
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.allocator.owns(ptr)
    }
}

impl<A: Allocator + Default> Default for AbstractPool<A> {
    fn default() -> Self {
        Self::new(A::default())
    }
}

impl<A: Allocator> Drop for AbstractPool<A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<A: Allocator> std::fmt::Debug for AbstractPool<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbstractPool")
            .field("len", &self.len)
            .field("size", &self.size())
            .finish()
    }
}
