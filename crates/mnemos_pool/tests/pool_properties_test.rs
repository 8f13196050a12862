//! Integration tests for pool properties.

#![allow(unsafe_code)]

use mnemos_alloc::{MemoryConfig, OverflowAllocator, SafeAllocator};
use mnemos_pool::{
    bucket_size, info_from_index, AbstractPool, BucketInfo, PoolHandle, PrimitiveBucketPool,
    PrimitivePool,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

#[test]
fn test_five_creates_span_three_buckets() {
    let mut pool: PrimitiveBucketPool<u32> = PrimitiveBucketPool::new();
    let handles: Vec<_> = (0..5).map(|_| pool.create()).collect();

    let indices: Vec<usize> = handles.iter().map(PoolHandle::index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);

    let sizes: Vec<usize> = indices
        .iter()
        .map(|&index| bucket_size(info_from_index(index).bucket_index))
        .collect();
    assert_eq!(sizes, vec![1, 2, 2, 4, 4]);
    assert_eq!(info_from_index(4), BucketInfo { bucket_index: 2, offset: 1 });
}

#[test]
fn test_released_indices_reused_before_growth() {
    for k in 1..8_u32 {
        let full = (1_usize << k) - 1;
        let mut pool: PrimitiveBucketPool<u64> = PrimitiveBucketPool::new();
        let handles: Vec<_> = (0..full).map(|_| pool.create()).collect();
        assert_eq!(pool.capacity(), full);
        let buckets = pool.bucket_count();

        for handle in &handles {
            pool.release(*handle);
        }
        assert!(pool.validate_empty());

        let again = pool.create();
        assert!(again.index() < full);
        assert_eq!(pool.bucket_count(), buckets);
    }
}

#[test]
fn test_live_handles_never_alias() {
    let mut rng = StdRng::seed_from_u64(0xB0C4E7);
    let mut pool: PrimitiveBucketPool<usize> = PrimitiveBucketPool::new();
    let mut live: Vec<PoolHandle<usize>> = Vec::new();

    for step in 0..5_000 {
        if live.is_empty() || rng.gen_bool(0.6) {
            let handle = pool.create();
            *pool.get_mut(handle).unwrap() = step;
            live.push(handle);
        } else {
            let victim = live.swap_remove(rng.gen_range(0..live.len()));
            pool.release(victim);
        }

        if step % 500 == 0 {
            let addresses: HashSet<usize> =
                live.iter().map(|h| h.as_ptr().as_ptr() as usize).collect();
            let indices: HashSet<usize> = live.iter().map(PoolHandle::index).collect();
            assert_eq!(addresses.len(), live.len());
            assert_eq!(indices.len(), live.len());
        }
    }

    assert_eq!(pool.len(), live.len());
    let mut count = 0;
    pool.visit_objects(|_| count += 1);
    assert_eq!(count, live.len());
}

#[test]
fn test_primitive_pool_fixed_capacity() {
    let config = MemoryConfig::from_toml_str("[pool]\ncapacity = 3\n").unwrap();
    let mut pool: PrimitivePool<u32> = PrimitivePool::from_config(&config);

    let slots: Vec<_> = (0..3).map(|_| pool.create().unwrap()).collect();
    assert!(pool.create().is_none());

    pool.release(slots[1]);
    assert_eq!(pool.create(), Some(slots[1]));
}

#[test]
fn test_abstract_pool_round_trip_on_overflow() {
    let mut pool = AbstractPool::new(OverflowAllocator::new());
    let keep = pool.create::<[u64; 4]>().unwrap();
    let before = pool.size();

    let value = pool.create::<String>().unwrap();
    assert!(pool.size() > before);
    let block = value.cast::<u8>().as_ptr();
    assert!(pool.owns(block));

    unsafe { pool.release(value) };
    assert_eq!(pool.size(), before);
    assert!(!pool.owns(block));
    assert!(pool.owns(keep.cast::<u8>().as_ptr()));
}

#[test]
fn test_abstract_pool_over_safe_allocator() {
    let alloc: SafeAllocator = SafeAllocator::with_capacity(64);
    let mut pool = AbstractPool::new(alloc);
    let values: Vec<_> = (0..16_u64).map(|i| pool.create_with(i).unwrap()).collect();
    for (i, value) in values.iter().enumerate() {
        assert_eq!(unsafe { *value.as_ptr() }, i as u64);
    }

    // Everything past the bump buffer landed in the overflow heap.
    assert!(pool.allocator().overflow_size() > 0);
    pool.clear();
    assert_eq!(pool.allocator().overflow_size(), 0);
    assert!(pool.is_empty());
}
