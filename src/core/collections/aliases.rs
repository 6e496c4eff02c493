use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::core::tag::Tag;

// =============================================================================
// HASHED SETS
// =============================================================================

/// Hash set keyed by tags or tag tuples, such as oriented boundary faces or
/// sorted tetrahedra. Tags are dense integers, so `rustc_hash` is enough.
///
/// # Examples
///
/// ```rust
/// use tetstar::core::collections::FastHashSet;
///
/// let mut faces: FastHashSet<[u64; 3]> = FastHashSet::default();
/// assert!(faces.insert([2, 6, 4]));
/// assert!(!faces.insert([2, 6, 4]));
/// ```
pub type FastHashSet<T> = FxHashSet<T>;

// =============================================================================
// STACK BUFFERS
// =============================================================================

/// Stack-first vector for the short sequences that edits decode and rebuild:
/// apex lists, atom streams, per-ring edge batches.
///
/// # Examples
///
/// ```rust
/// use tetstar::core::collections::SmallBuffer;
///
/// let ring: SmallBuffer<u64, 16> = [3, 5, 7].into_iter().collect();
/// assert!(!ring.spilled());
/// ```
pub type SmallBuffer<T, const N: usize> = SmallVec<[T; N]>;

/// Decoded contents of one link ring (GHOST entries included). Most edges
/// have fewer than eight apices.
pub type RingBuffer = SmallBuffer<Tag, 16>;

/// Raw compressed atoms of one molecule chain.
pub type AtomBuffer = SmallBuffer<u8, 64>;

/// Directed edges `c -> d` added to or removed from a single link ring.
pub type EdgeList = SmallBuffer<(Tag, Tag), 4>;

/// Decoded `(vertex, ring)` pairs of one 2D link.
pub type LinkBuffer = SmallBuffer<(Tag, Tag), 16>;
