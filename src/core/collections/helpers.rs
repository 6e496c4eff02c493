use rustc_hash::FxBuildHasher;

use super::{FastHashSet, RingBuffer};
use crate::core::tag::{GHOST_VERTEX, Tag};

// =============================================================================
// UTILITY FUNCTIONS
// =============================================================================

/// Empty [`FastHashSet`] with room for `capacity` keys.
///
/// # Examples
///
/// ```rust
/// use tetstar::core::collections::fast_hash_set_with_capacity;
///
/// let damaged = fast_hash_set_with_capacity::<[u64; 4]>(16);
/// assert!(damaged.capacity() >= 16);
/// ```
#[inline]
#[must_use]
pub fn fast_hash_set_with_capacity<T>(capacity: usize) -> FastHashSet<T> {
    FastHashSet::with_capacity_and_hasher(capacity, FxBuildHasher)
}

/// Rotates a cyclic tag sequence so that its smallest non-GHOST entry comes first.
///
/// Two rings hold the same cyclic sequence exactly when their canonical
/// rotations are equal, which is what the round-trip tests compare.
///
/// # Examples
///
/// ```rust
/// use tetstar::core::collections::canonical_rotation;
///
/// let ring = canonical_rotation(&[7, 3, 5]);
/// assert_eq!(ring.as_slice(), &[3, 5, 7]);
/// ```
#[must_use]
pub fn canonical_rotation(tags: &[Tag]) -> RingBuffer {
    let start = tags
        .iter()
        .enumerate()
        .filter(|&(_, &tag)| tag != GHOST_VERTEX)
        .min_by_key(|&(_, &tag)| tag)
        .map_or(0, |(index, _)| index);
    tags[start..].iter().chain(&tags[..start]).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_capacity() {
        let mut set = fast_hash_set_with_capacity::<[Tag; 3]>(50);
        assert!(set.capacity() >= 50);
        set.insert([2, 4, 6]);
        assert!(set.contains(&[2, 4, 6]));
    }

    #[test]
    fn test_canonical_rotation_skips_ghost() {
        let ring = canonical_rotation(&[GHOST_VERTEX, 9, 4, 6]);
        assert_eq!(ring.as_slice(), &[4, 6, GHOST_VERTEX, 9]);
        assert!(canonical_rotation(&[]).is_empty());
    }
}
