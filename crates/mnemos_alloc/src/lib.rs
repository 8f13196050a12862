//! # MNEMOS Allocators
//!
//! Composable allocators for software that wants allocation-free steady
//! state with a controlled fallback when capacity runs out:
//! - Tracked overflow heap (free by pointer, ownership queries)
//! - Bump arenas, single-thread and lock-free
//! - A bump + overflow composition that sizes itself from observed overflow
//! - Nested scoped arenas for call-tree lifetimes
//!
//! ## Architecture Rules
//!
//! 1. **Exhaustion is not an error** - capacity failures return `None`
//! 2. **Contracts are debug assertions** - misuse panics in debug builds only
//! 3. **Resets need `&mut`** - `clear` can only run at a quiescent point
//!
//! ## Example
//!
//! ```rust
//! use mnemos_alloc::{Allocator, SafeAllocator};
//!
//! let mut frame_alloc: SafeAllocator = SafeAllocator::with_capacity(1024);
//! let value = frame_alloc.alloc_value(42_u64).unwrap();
//! assert!(frame_alloc.owns(value.cast::<u8>().as_ptr()));
//! frame_alloc.reserve_and_clear();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod linear;
pub mod overflow;
mod raw;
pub mod safe;
pub mod stack;
pub mod traits;

pub use config::{LinearConfig, MemoryConfig, PoolConfig, StackConfig};
pub use error::{MemoryError, MemoryResult};
pub use linear::{LinearAllocator, ThreadedLinearAllocator};
pub use overflow::{OverflowAllocator, SharedOverflowAllocator, ThreadedOverflowAllocator};
pub use safe::{SafeAllocator, ThreadedSafeAllocator};
pub use stack::{ScopedVec, StackAllocator, StackAllocatorBuffer};
pub use traits::{Allocator, BumpAllocator, OverflowFallback};
