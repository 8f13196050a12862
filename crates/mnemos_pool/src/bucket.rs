//! # Bucket Indexing
//!
//! Maps a pool's global element index onto power-of-two buckets laid out
//! one after another:
//!
//! ```text
//! bucket:   0 | 1     | 2             | 3
//! size:     1 | 2     | 4             | 8
//! indices:  0 | 1 2   | 3 4 5 6       | 7 ... 14
//! ```
//!
//! Bucket `i` starts at global index `2^i - 1`, so the bucket holding index
//! `g` is `floor(log2(g + 1))`.

/// Where a global index lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BucketInfo {
    /// Bucket number, 0-based.
    pub bucket_index: u32,
    /// Slot inside the bucket.
    pub offset: usize,
}

/// Multiplier of the 64-bit de Bruijn sequence used by [`log2`].
const DEBRUIJN_64: u64 = 0x07ED_D5E5_9A4E_28C2;

/// `DEBRUIJN_LOG2[(2^k * DEBRUIJN_64) >> 58] == k`.
const DEBRUIJN_LOG2: [u32; 64] = [
    63, 0, 58, 1, 59, 47, 53, 2, 60, 39, 48, 27, 54, 33, 42, 3, 61, 51, 37, 40, 49, 18, 28, 20, 55,
    30, 34, 11, 43, 14, 22, 4, 62, 57, 46, 52, 38, 26, 32, 41, 50, 36, 17, 19, 29, 10, 13, 21, 56,
    45, 25, 31, 35, 16, 9, 12, 44, 24, 15, 8, 23, 7, 6, 5,
];

/// `floor(log2(value))` without branches. `log2(0)` is 63.
#[inline]
#[must_use]
pub const fn log2(mut value: u64) -> u32 {
    // Smear the highest set bit downwards, then keep only that bit.
    value |= value >> 1;
    value |= value >> 2;
    value |= value >> 4;
    value |= value >> 8;
    value |= value >> 16;
    value |= value >> 32;
    let top = value - (value >> 1);
    DEBRUIJN_LOG2[(top.wrapping_mul(DEBRUIJN_64) >> 58) as usize]
}

/// Number of slots in bucket `bucket_index`.
#[inline]
#[must_use]
pub const fn bucket_size(bucket_index: u32) -> usize {
    1 << bucket_index
}

/// Global index of the first slot of bucket `bucket_index`.
#[inline]
#[must_use]
pub const fn first_element_index(bucket_index: u32) -> usize {
    (1 << bucket_index) - 1
}

/// Inverts [`first_element_index`]: which bucket holds `index`, and where.
#[inline]
#[must_use]
pub const fn info_from_index(index: usize) -> BucketInfo {
    let bucket_index = log2(index as u64 + 1);
    BucketInfo {
        bucket_index,
        offset: index - first_element_index(bucket_index),
    }
}

/// [`info_from_index`] for a pool whose first bucket is bucket `skip` of
/// the plain layout. Bucket numbers in the result are pool-local.
#[inline]
#[must_use]
pub const fn info_from_index_skipped(index: usize, skip: u32) -> BucketInfo {
    let info = info_from_index(index + first_element_index(skip));
    BucketInfo {
        bucket_index: info.bucket_index - skip,
        offset: info.offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log2_matches_ilog2() {
        for value in 1..=(1_u64 << 20) {
            assert_eq!(log2(value), value.ilog2(), "log2({value})");
        }
        for shift in 0..64 {
            let power = 1_u64 << shift;
            assert_eq!(log2(power), shift);
            assert_eq!(log2(power | (power - 1)), shift);
            if power > 1 {
                assert_eq!(log2(power - 1), shift - 1);
            }
        }
        assert_eq!(log2(u64::from(u32::MAX)), 31);
        assert_eq!(log2(u64::MAX), 63);
    }

    #[test]
    fn test_bucket_layout() {
        assert_eq!(bucket_size(0), 1);
        assert_eq!(bucket_size(3), 8);
        assert_eq!(first_element_index(0), 0);
        assert_eq!(first_element_index(1), 1);
        assert_eq!(first_element_index(2), 3);
        assert_eq!(first_element_index(3), 7);
    }

    #[test]
    fn test_info_from_index() {
        let expect = [(0, 0), (1, 0), (1, 1), (2, 0), (2, 1), (2, 2), (2, 3), (3, 0)];
        for (index, &(bucket_index, offset)) in expect.iter().enumerate() {
            assert_eq!(info_from_index(index), BucketInfo { bucket_index, offset });
        }
    }

    #[test]
    fn test_info_inverts_first_element_index() {
        for bucket_index in 0..31 {
            let first = first_element_index(bucket_index);
            let last = first + bucket_size(bucket_index) - 1;
            assert_eq!(info_from_index(first), BucketInfo { bucket_index, offset: 0 });
            assert_eq!(
                info_from_index(last),
                BucketInfo {
                    bucket_index,
                    offset: bucket_size(bucket_index) - 1
                }
            );
        }
    }

    #[test]
    fn test_skipped_layout() {
        // Skipping two buckets: local bucket 0 holds 4 slots, bucket 1 holds 8.
        assert_eq!(info_from_index_skipped(0, 2), BucketInfo { bucket_index: 0, offset: 0 });
        assert_eq!(info_from_index_skipped(3, 2), BucketInfo { bucket_index: 0, offset: 3 });
        assert_eq!(info_from_index_skipped(4, 2), BucketInfo { bucket_index: 1, offset: 0 });
        assert_eq!(info_from_index_skipped(11, 2), BucketInfo { bucket_index: 1, offset: 7 });
        assert_eq!(info_from_index_skipped(12, 2), BucketInfo { bucket_index: 2, offset: 0 });
    }
}
