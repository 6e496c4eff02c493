//! Tags, sentinel values, parity helpers, and the variable-length tag codec.
//!
//! A [`Tag`] is an opaque unsigned integer naming a vertex, a molecule, or a
//! link ring. Tags stored inside molecules are compressed against a nearby
//! *ground* tag: only the low-order 7-bit groups that differ from the ground
//! are written, most significant group first, and the last group carries the
//! high bit `0x80`. Two single-atom codes are reserved: `0xFF` for
//! [`GHOST_VERTEX`] and `0xFE` for [`STOP`].
//!
//! # Examples
//!
//! ```rust
//! use tetstar::core::tag::{compress, decompress, COMPRESSED_TAG_LENGTH};
//!
//! let mut atoms = [0u8; COMPRESSED_TAG_LENGTH];
//! let len = compress(1000, 1003, &mut atoms);
//! assert_eq!(len, 1);
//! assert_eq!(decompress(1000, &atoms[..len]), Some((1003, 1)));
//! ```

use serde::{Deserialize, Serialize};

/// Identifier of a vertex, molecule, or link ring.
pub type Tag = u64;

/// Allocation index used to group records that are close in space.
pub type AllocIndex = u64;

/// The ghost vertex: "no neighbour". It closes the fan of a boundary edge and
/// has odd parity.
pub const GHOST_VERTEX: Tag = !0;

/// End-of-list marker.
pub const STOP: Tag = !1;

/// Absence of a molecule, ring, or star. Numerically equal to
/// [`GHOST_VERTEX`] but only used in storage contexts.
pub const NOT_A_TAG: Tag = !0;

/// Maximum number of atoms produced by [`compress`]: enough 7-bit groups for a
/// 64-bit tag, plus one spare.
pub const COMPRESSED_TAG_LENGTH: usize = 8 * size_of::<Tag>() / 7 + 2;

/// Reserved single atom for [`GHOST_VERTEX`].
pub const GHOST_ATOM: u8 = 0xFF;

/// Reserved single atom for [`STOP`].
pub const STOP_ATOM: u8 = 0xFE;

/// Marks the last atom of a compressed tag.
pub const TERMINATOR_BIT: u8 = 0x80;

const GROUP_BITS: u32 = 7;
const GROUP_MASK: u64 = 0x7F;
/// Groups needed to hold every bit of a tag.
const MAX_GROUPS: usize = (Tag::BITS as usize).div_ceil(GROUP_BITS as usize);

/// Returns true when the tag is odd. [`GHOST_VERTEX`] is odd.
#[inline]
#[must_use]
pub const fn is_odd(tag: Tag) -> bool {
    tag & 1 == 1
}

/// Returns true when both tags have the same parity.
#[inline]
#[must_use]
pub const fn same_parity(a: Tag, b: Tag) -> bool {
    (a ^ b) & 1 == 0
}

/// Returns true when `a` is the endpoint that stores the link ring of the
/// same-parity edge `(a, b)`.
///
/// With `a < b`, the smaller endpoint owns the ring when bit 1 of `a ^ b` is
/// clear and the larger one owns it when that bit is set. Ghost edges are
/// always owned by their solid endpoint. Exactly one of `owns_edge(a, b)` and
/// `owns_edge(b, a)` is true for distinct tags.
///
/// # Examples
///
/// ```rust
/// use tetstar::core::tag::{owns_edge, GHOST_VERTEX};
///
/// assert!(owns_edge(1, 5));
/// assert!(owns_edge(3, 1));
/// assert!(owns_edge(7, GHOST_VERTEX));
/// assert!(!owns_edge(GHOST_VERTEX, 7));
/// ```
#[inline]
#[must_use]
pub const fn owns_edge(a: Tag, b: Tag) -> bool {
    if b == GHOST_VERTEX {
        return true;
    }
    if a == GHOST_VERTEX {
        return false;
    }
    (a < b) != ((a ^ b) & 2 != 0)
}

/// One side of a triangle: a real apex vertex or the ghost vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Apex {
    /// A real vertex.
    Vertex(Tag),
    /// The ghost vertex; the triangle is on the boundary on this side.
    Ghost,
}

impl Apex {
    /// Maps a raw tag (possibly [`GHOST_VERTEX`]) to an apex.
    #[inline]
    #[must_use]
    pub const fn from_tag(tag: Tag) -> Self {
        if tag == GHOST_VERTEX {
            Self::Ghost
        } else {
            Self::Vertex(tag)
        }
    }

    /// Raw tag of the apex.
    #[inline]
    #[must_use]
    pub const fn tag(self) -> Tag {
        match self {
            Self::Vertex(tag) => tag,
            Self::Ghost => GHOST_VERTEX,
        }
    }

    /// Returns true for [`Apex::Ghost`].
    #[inline]
    #[must_use]
    pub const fn is_ghost(self) -> bool {
        matches!(self, Self::Ghost)
    }
}

/// Bits of `tag` above the lowest `groups` 7-bit groups, kept in place.
#[inline]
const fn high_part(tag: Tag, groups: usize) -> Tag {
    let shift = GROUP_BITS * groups as u32;
    if shift >= Tag::BITS {
        0
    } else {
        (tag >> shift) << shift
    }
}

/// Compresses `tag` against `ground` into `out`, returning the atom count.
///
/// Emits the low-order 7-bit groups of `tag` that differ from `ground`,
/// most significant first; the final atom carries [`TERMINATOR_BIT`]. A tag
/// whose one-atom form would collide with a reserved atom is padded to two
/// atoms.
#[must_use]
pub fn compress(ground: Tag, tag: Tag, out: &mut [u8; COMPRESSED_TAG_LENGTH]) -> usize {
    if tag == GHOST_VERTEX {
        out[0] = GHOST_ATOM;
        return 1;
    }
    if tag == STOP {
        out[0] = STOP_ATOM;
        return 1;
    }

    let mut groups = 1;
    while groups < MAX_GROUPS && high_part(tag, groups) != high_part(ground, groups) {
        groups += 1;
    }
    if groups == 1 && (tag & GROUP_MASK) as u8 | TERMINATOR_BIT >= STOP_ATOM {
        groups = 2;
    }

    for (i, atom) in out.iter_mut().take(groups).enumerate() {
        let shift = GROUP_BITS * (groups - 1 - i) as u32;
        *atom = ((tag >> shift) & GROUP_MASK) as u8;
    }
    out[groups - 1] |= TERMINATOR_BIT;
    groups
}

/// Decompresses the tag at the start of `atoms` against `ground`.
///
/// Returns the tag and the number of atoms consumed, or `None` when the atoms
/// end before a terminator or run past [`COMPRESSED_TAG_LENGTH`].
#[must_use]
pub fn decompress(ground: Tag, atoms: &[u8]) -> Option<(Tag, usize)> {
    let mut decoder = TagDecoder::new(ground);
    for (i, &atom) in atoms.iter().enumerate() {
        if let Some(tag) = decoder.push(atom)? {
            return Some((tag, i + 1));
        }
    }
    None
}

/// Incremental decoder for tags whose atoms arrive one at a time, as they do
/// when a tag straddles two molecules.
#[derive(Clone, Copy, Debug)]
pub struct TagDecoder {
    ground: Tag,
    value: Tag,
    groups: usize,
}

impl TagDecoder {
    /// Creates a decoder for tags compressed against `ground`.
    #[must_use]
    pub const fn new(ground: Tag) -> Self {
        Self {
            ground,
            value: 0,
            groups: 0,
        }
    }

    /// Returns true when no partial tag is pending.
    #[must_use]
    pub const fn at_boundary(&self) -> bool {
        self.groups == 0
    }

    /// Feeds one atom.
    ///
    /// Returns `Some(Some(tag))` when the atom completes a tag, `Some(None)`
    /// when more atoms are needed, and `None` when the stream is malformed.
    pub const fn push(&mut self, atom: u8) -> Option<Option<Tag>> {
        if self.groups == 0 {
            if atom == GHOST_ATOM {
                return Some(Some(GHOST_VERTEX));
            }
            if atom == STOP_ATOM {
                return Some(Some(STOP));
            }
        }
        self.value = (self.value << GROUP_BITS) | (atom as Tag & GROUP_MASK);
        self.groups += 1;
        if atom & TERMINATOR_BIT != 0 {
            let tag = self.value | high_part(self.ground, self.groups);
            self.value = 0;
            self.groups = 0;
            return Some(Some(tag));
        }
        if self.groups >= MAX_GROUPS {
            return None;
        }
        Some(None)
    }
}

/// Appends the compressed form of `tag` to `out`.
pub(crate) fn push_compressed<E: Extend<u8>>(ground: Tag, tag: Tag, out: &mut E) {
    let mut atoms = [0u8; COMPRESSED_TAG_LENGTH];
    let len = compress(ground, tag, &mut atoms);
    out.extend(atoms[..len].iter().copied());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(ground: Tag, tag: Tag) -> usize {
        let mut atoms = [0u8; COMPRESSED_TAG_LENGTH];
        let len = compress(ground, tag, &mut atoms);
        assert_eq!(
            decompress(ground, &atoms[..len]),
            Some((tag, len)),
            "ground {ground:#x} tag {tag:#x}"
        );
        len
    }

    // =============================================================================
    // COMPRESSION TESTS
    // =============================================================================

    #[test]
    fn test_sentinels_use_reserved_atoms() {
        let mut atoms = [0u8; COMPRESSED_TAG_LENGTH];
        assert_eq!(compress(12, GHOST_VERTEX, &mut atoms), 1);
        assert_eq!(atoms[0], GHOST_ATOM);
        assert_eq!(compress(12, STOP, &mut atoms), 1);
        assert_eq!(atoms[0], STOP_ATOM);
        assert_eq!(decompress(12, &[GHOST_ATOM]), Some((GHOST_VERTEX, 1)));
        assert_eq!(decompress(12, &[STOP_ATOM]), Some((STOP, 1)));
    }

    #[test]
    fn test_near_tags_compress_to_one_atom() {
        assert_eq!(round_trip(0x1000, 0x1003), 1);
        assert_eq!(round_trip(0x1000, 0x1000), 1);
        assert_eq!(round_trip(0, 5), 1);
    }

    #[test]
    fn test_colliding_single_atoms_are_padded() {
        // Low groups 0x7E and 0x7F would encode as 0xFE and 0xFF.
        assert_eq!(round_trip(0x7E, 0x7E), 2);
        assert_eq!(round_trip(0x100, 0x17F), 2);
        assert_eq!(round_trip(0x100, 0x17D), 1);
    }

    #[test]
    fn test_far_tags_use_more_groups() {
        assert_eq!(round_trip(0, 1 << 7), 2);
        assert_eq!(round_trip(0, 1 << 14), 3);
        assert_eq!(round_trip(0, u64::MAX - 2), MAX_GROUPS);
        assert_eq!(round_trip(u64::MAX - 2, 0), MAX_GROUPS);
        assert!(MAX_GROUPS < COMPRESSED_TAG_LENGTH);
    }

    #[test]
    fn test_decoder_rejects_truncated_input() {
        assert_eq!(decompress(0, &[0x01, 0x02]), None);
        assert_eq!(decompress(0, &[]), None);
        let mut decoder = TagDecoder::new(0);
        for _ in 0..MAX_GROUPS - 1 {
            assert_eq!(decoder.push(0x01), Some(None));
        }
        assert_eq!(decoder.push(0x01), None);
    }

    #[test]
    fn test_decoder_tracks_boundaries() {
        let mut decoder = TagDecoder::new(0);
        assert!(decoder.at_boundary());
        assert_eq!(decoder.push(0x01), Some(None));
        assert!(!decoder.at_boundary());
        // Inside a tag, 0xFE is an ordinary terminal atom.
        assert_eq!(decoder.push(STOP_ATOM), Some(Some((1 << 7) | 0x7E)));
        assert!(decoder.at_boundary());
    }

    // =============================================================================
    // OWNERSHIP TESTS
    // =============================================================================

    #[test]
    fn test_exactly_one_endpoint_owns_each_edge() {
        for a in 0..64u64 {
            for b in 0..64u64 {
                if a != b && same_parity(a, b) {
                    assert_ne!(owns_edge(a, b), owns_edge(b, a), "edge ({a}, {b})");
                }
            }
            if is_odd(a) {
                assert!(owns_edge(a, GHOST_VERTEX));
                assert!(!owns_edge(GHOST_VERTEX, a));
            }
        }
    }

    #[test]
    fn test_apex_mapping() {
        assert_eq!(Apex::from_tag(GHOST_VERTEX), Apex::Ghost);
        assert_eq!(Apex::from_tag(4), Apex::Vertex(4));
        assert_eq!(Apex::Vertex(4).tag(), 4);
        assert!(Apex::Ghost.is_ghost());
        assert!(is_odd(GHOST_VERTEX));
    }
}
