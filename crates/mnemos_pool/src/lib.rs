//! # MNEMOS Pools
//!
//! Object pools built on the allocators of `mnemos_alloc`:
//! - [`PrimitiveBucketPool`] - unbounded, pointers stable across growth
//! - [`PrimitivePool`] - fixed capacity, one contiguous block
//! - [`AbstractPool`] - heterogeneous objects over any [`mnemos_alloc::Allocator`]
//!
//! ## Architecture Rules
//!
//! 1. **Reuse before growth** - released slots are handed out before new memory
//! 2. **Addresses never move** - growing a pool never relocates a live object
//! 3. **Bulk teardown** - `clear` destroys everything without knowing types
//!
//! ## Example
//!
//! ```rust
//! use mnemos_pool::PrimitiveBucketPool;
//!
//! let mut pool: PrimitiveBucketPool<[f32; 3]> = PrimitiveBucketPool::new();
//! let handles: Vec<_> = (0..5).map(|_| pool.create()).collect();
//! assert_eq!(handles[4].index(), 4);
//! assert_eq!(pool.bucket_count(), 3);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod abstract_pool;
pub mod bucket;
pub mod bucket_pool;
pub mod primitive_pool;
mod slots;

pub use abstract_pool::AbstractPool;
pub use bucket::{bucket_size, first_element_index, info_from_index, BucketInfo};
pub use bucket_pool::{PoolHandle, PrimitiveBucketPool};
pub use primitive_pool::PrimitivePool;
