//! Succinct tetrahedral complex.
//!
//! Every vertex may own a *star*: a [`Link2d`] listing the same-parity edges
//! the vertex owns (see [`owns_edge`]) and, for each, the [`LinkRing`] of
//! apices around the edge. A tetrahedron `(a, b, c, d)` with positive
//! orientation is recorded in the ring of each of its same-parity edges, so a
//! solid tetrahedron is stored two, three, or six times.
//!
//! Ghost tetrahedra (exactly one GHOST vertex) mark boundary faces. They are
//! stored explicitly in the rings of ghost edges `(x, GHOST)` with `x` odd;
//! rings of solid edges hold them implicitly as GHOST gap markers. A ghost
//! tetrahedron whose three solid vertices are all even has no ghost edge
//! ring, so its oriented boundary face is recorded in a hash set instead.
//!
//! Whole-tetrahedron edits are transactions over per-edge ring edits: every
//! ring edit is all-or-nothing, and a failing step unwinds the steps before
//! it by applying their inverses.
//!
//! # Examples
//!
//! ```rust
//! use tetstar::core::complex::TetComplex;
//! use tetstar::core::tag::Apex;
//!
//! let mut complex: TetComplex = TetComplex::default();
//! complex.insert_tet(1, 2, 3, 4).unwrap();
//! assert_eq!(complex.tet_count(), 1);
//! assert_eq!(
//!     complex.adjacencies(1, 2, 3),
//!     Some([Apex::Vertex(4), Apex::Ghost])
//! );
//! assert!(complex.insert_tet(1, 2, 3, 5).is_err());
//! complex.insert_tet(1, 2, 4, 5).unwrap();
//! assert_eq!(complex.iter_solid().count(), 2);
//! ```

mod flips;
pub mod iter;
pub mod validation;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

pub use iter::{IterMode, Tetrahedra};
pub use validation::{ConsistencyReport, Violation};

use crate::core::adjacency::link_ring::RingShape;
use crate::core::adjacency::{Link2d, Link2dCache, LinkRing, MoleculePool, RingError, RingState};
use crate::core::collections::{EdgeList, FastHashSet, LinkBuffer, RingBuffer, SmallBuffer};
use crate::core::config::ComplexConfig;
use crate::core::pool::{PoolDiscipline, TagBlocks, TieredArrayPool, VertexAllocation};
use crate::core::tag::{Apex, GHOST_VERTEX, NOT_A_TAG, Tag, is_odd, owns_edge, same_parity};

/// Four vertex tags in positive orientation.
pub type Tetrahedron = [Tag; 4];

/// Three vertex tags; an oriented triangle when taken from a tetrahedron.
pub type Triangle = [Tag; 3];

const LOG2_STARS_PER_BLOCK: u32 = 10;

/// The six vertex orderings that put each pair of a tetrahedron's vertices
/// first while preserving orientation.
const EDGE_ORDERINGS: [[usize; 4]; 6] = [
    [0, 1, 2, 3],
    [0, 2, 3, 1],
    [0, 3, 1, 2],
    [1, 2, 0, 3],
    [1, 3, 2, 0],
    [2, 3, 0, 1],
];

/// Errors reported by complex edits.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ComplexError {
    /// A tetrahedron names the same vertex twice.
    #[error("tetrahedron {tet:?} repeats vertex {vertex}")]
    DuplicateVertex {
        /// The offending tetrahedron.
        tet: Tetrahedron,
        /// The repeated vertex.
        vertex: Tag,
    },

    /// A tetrahedron has more than one GHOST vertex.
    #[error("tetrahedron {tet:?} has more than one GHOST vertex")]
    TooManyGhosts {
        /// The offending tetrahedron.
        tet: Tetrahedron,
    },

    /// The ring of an edge refused its part of the edit.
    #[error("ring of edge ({owner}, {other}) refused the edit: {source}")]
    RingRefused {
        /// Vertex that owns the ring.
        owner: Tag,
        /// Other endpoint of the edge.
        other: Tag,
        /// Why the ring refused.
        source: RingError,
    },

    /// A tetrahedron the edit replaces is not (fully) in the complex.
    #[error("tetrahedron {tet:?} is missing from {missing} rings")]
    MissingTet {
        /// The absent tetrahedron.
        tet: Tetrahedron,
        /// Number of rings lacking it.
        missing: u32,
    },

    /// A flip would create an edge that already exists.
    #[error("edge ({a}, {b}) already exists")]
    EdgeExists {
        /// First endpoint.
        a: Tag,
        /// Second endpoint.
        b: Tag,
    },

    /// A vertex that should be new already owns tetrahedra.
    #[error("vertex {vertex} already owns tetrahedra")]
    VertexInUse {
        /// The vertex.
        vertex: Tag,
    },

    /// No ring around an edge of the triangle has its third vertex.
    #[error("triangle {triangle:?} is not in the complex")]
    MissingTriangle {
        /// The absent triangle.
        triangle: Triangle,
    },

    /// GHOST was passed where a real vertex is required.
    #[error("GHOST cannot be inserted as a vertex")]
    GhostVertex,

    /// A ghost tetrahedron already sits on this side of a boundary face.
    #[error("face {face:?} already has a ghost tetrahedron on that side")]
    GhostOnFace {
        /// The face, rotated to start at its smallest tag.
        face: Triangle,
    },
}

/// Result of [`TetComplex::delete_tet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteOutcome {
    /// Every stored copy was removed.
    Deleted,
    /// Some copies were removed and some were missing; the complex is now
    /// marked inconsistent.
    Partial {
        /// Rings the tetrahedron was removed from.
        removed: u32,
        /// Rings that did not hold it.
        missing: u32,
    },
    /// No ring held the tetrahedron.
    NotFound,
}

/// Result of an ordered (non-transactional) edit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedOutcome {
    /// Ring edits that succeeded.
    pub applied: u32,
    /// Ring edits that were refused and skipped.
    pub refused: u32,
}

impl OrderedOutcome {
    /// Returns true when no ring edit was refused.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        self.refused == 0
    }
}

/// Summary counters of a complex.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexStatistics {
    /// Solid tetrahedra.
    pub tets: u64,
    /// Ghost tetrahedra.
    pub ghost_tets: u64,
    /// Vertices whose star holds at least one ring.
    pub stars: u64,
    /// Stored link rings.
    pub rings: u64,
    /// Live molecules.
    pub molecules: u64,
    /// Bytes reserved by the molecule pool and the star array.
    pub bytes: usize,
    /// Ring lookups answered by the 2D link cache.
    pub cache_hits: u64,
    /// Ring lookups that scanned a 2D link.
    pub cache_misses: u64,
}

/// Per-vertex entry of the star array: head and tail molecules of the
/// vertex's 2D link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Star {
    link_head: Tag,
    link_tail: Tag,
}

impl Default for Star {
    fn default() -> Self {
        Self {
            link_head: NOT_A_TAG,
            link_tail: NOT_A_TAG,
        }
    }
}

impl Star {
    /// Head molecule of the 2D link.
    #[must_use]
    pub const fn link_head(self) -> Tag {
        self.link_head
    }

    /// Tail molecule of the 2D link, where new pairs are appended.
    #[must_use]
    pub const fn link_tail(self) -> Tag {
        self.link_tail
    }

    /// Returns true once a 2D link has been allocated for the vertex.
    #[must_use]
    pub const fn is_allocated(self) -> bool {
        self.link_head != NOT_A_TAG
    }
}

/// One ring's share of an edit: the ring of edge `(owner, other)` loses the
/// `removed` edges and gains the `added` ones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct EdgeEdit {
    owner: Tag,
    other: Tag,
    removed: EdgeList,
    added: EdgeList,
}

impl EdgeEdit {
    fn inverse(&self) -> Self {
        Self {
            owner: self.owner,
            other: self.other,
            removed: self.added.clone(),
            added: self.removed.clone(),
        }
    }
}

/// Stored copy of a tetrahedron: the ring of `(owner, other)` holds the
/// edge `from -> to`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StoredCopy {
    owner: Tag,
    other: Tag,
    from: Tag,
    to: Tag,
}

/// Stored copies of `tet` for the orderings in `orderings`.
fn stored_copies(tet: &Tetrahedron, orderings: &[[usize; 4]]) -> SmallBuffer<StoredCopy, 6> {
    orderings
        .iter()
        .map(|&[p, q, r, s]| (tet[p], tet[q], tet[r], tet[s]))
        .filter(|&(p, q, _, _)| same_parity(p, q))
        .map(|(p, q, r, s)| {
            if owns_edge(p, q) {
                StoredCopy { owner: p, other: q, from: r, to: s }
            } else {
                StoredCopy { owner: q, other: p, from: s, to: r }
            }
        })
        .collect()
}

/// Same-parity edges of `tet`, with the ring of each at its owner.
pub(crate) fn all_copies(tet: &Tetrahedron) -> SmallBuffer<StoredCopy, 6> {
    stored_copies(tet, &EDGE_ORDERINGS)
}

/// Returns true when `tet` has a GHOST vertex.
#[inline]
#[must_use]
pub fn is_ghost(tet: &Tetrahedron) -> bool {
    tet.contains(&GHOST_VERTEX)
}

/// Solid face of a ghost tetrahedron whose solid vertices are all even,
/// oriented so that GHOST lies on its positive side and rotated to start at
/// its smallest tag. `None` for any other tetrahedron.
pub(crate) fn even_ghost_face(tet: &Tetrahedron) -> Option<Triangle> {
    let [a, b, c, d] = *tet;
    // Even permutations that move GHOST to the last slot.
    let [x, y, z] = match tet.iter().position(|&v| v == GHOST_VERTEX)? {
        0 => [d, c, b],
        1 => [c, d, a],
        2 => [b, a, d],
        _ => [a, b, c],
    };
    if is_odd(x) || is_odd(y) || is_odd(z) {
        return None;
    }
    Some(if x < y && x < z {
        [x, y, z]
    } else if y < z {
        [y, z, x]
    } else {
        [z, x, y]
    })
}

/// Faces of solid `tet` that an all-even ghost tetrahedron could claim from
/// the same side.
fn even_faces(tet: &Tetrahedron) -> SmallBuffer<Triangle, 4> {
    (0..4)
        .filter_map(|i| {
            let mut side = *tet;
            side[i] = GHOST_VERTEX;
            even_ghost_face(&side)
        })
        .collect()
}

fn validate(tet: &Tetrahedron) -> Result<(), ComplexError> {
    if tet.iter().filter(|&&v| v == GHOST_VERTEX).count() > 1 {
        return Err(ComplexError::TooManyGhosts { tet: *tet });
    }
    for i in 0..4 {
        if tet[i + 1..].contains(&tet[i]) {
            return Err(ComplexError::DuplicateVertex {
                tet: *tet,
                vertex: tet[i],
            });
        }
    }
    Ok(())
}

/// A batch of per-edge edits, grouped by ring.
#[derive(Clone, Debug, Default)]
pub(crate) struct EditPlan {
    edits: SmallBuffer<EdgeEdit, 12>,
}

impl EditPlan {
    fn entry(&mut self, owner: Tag, other: Tag) -> &mut EdgeEdit {
        let position = self
            .edits
            .iter()
            .position(|e| e.owner == owner && e.other == other)
            .unwrap_or_else(|| {
                self.edits.push(EdgeEdit {
                    owner,
                    other,
                    ..EdgeEdit::default()
                });
                self.edits.len() - 1
            });
        &mut self.edits[position]
    }

    fn remove(&mut self, copies: &[StoredCopy]) {
        for copy in copies {
            self.entry(copy.owner, copy.other)
                .removed
                .push((copy.from, copy.to));
        }
    }

    fn add(&mut self, copies: &[StoredCopy]) {
        for copy in copies {
            self.entry(copy.owner, copy.other).added.push((copy.from, copy.to));
        }
    }
}

/// A tetrahedral complex over vertex tags.
///
/// `V` supplies allocation indices for vertex tags, so that the molecules of
/// nearby vertices share minipools. Star storage is indexed by vertex tag;
/// vertex tags are expected to be compact (as handed out by a
/// [`ProximityPool`](crate::core::pool::ProximityPool)).
pub struct TetComplex<V = TagBlocks> {
    molecules: MoleculePool,
    stars: TieredArrayPool<Star>,
    vertices: V,
    cache: Link2dCache,
    config: ComplexConfig,
    /// Boundary faces of the ghost tetrahedra with all-even solid vertices.
    even_ghosts: FastHashSet<Triangle>,
    tet_count: u64,
    ghost_tet_count: u64,
    consistent: bool,
    /// One past the largest vertex tag that ever received a star.
    star_end: Tag,
}

impl Default for TetComplex<TagBlocks> {
    fn default() -> Self {
        Self::new(TagBlocks)
    }
}

impl<V: fmt::Debug> fmt::Debug for TetComplex<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TetComplex")
            .field("vertices", &self.vertices)
            .field("config", &self.config)
            .field("tet_count", &self.tet_count)
            .field("ghost_tet_count", &self.ghost_tet_count)
            .field("even_ghosts", &self.even_ghosts.len())
            .field("consistent", &self.consistent)
            .field("molecules", &self.molecules.objects())
            .finish_non_exhaustive()
    }
}

impl<V: VertexAllocation> TetComplex<V> {
    /// Creates an empty complex with [`ComplexConfig::from_env`].
    #[must_use]
    pub fn new(vertices: V) -> Self {
        Self::with_config(vertices, ComplexConfig::from_env())
    }

    /// Creates an empty complex with an explicit configuration.
    #[must_use]
    pub fn with_config(vertices: V, config: ComplexConfig) -> Self {
        Self {
            molecules: MoleculePool::new(),
            stars: TieredArrayPool::new(LOG2_STARS_PER_BLOCK, PoolDiscipline::Indexed),
            vertices,
            cache: Link2dCache::new(),
            config,
            even_ghosts: FastHashSet::default(),
            tet_count: 0,
            ghost_tet_count: 0,
            consistent: true,
            star_end: 0,
        }
    }

    /// Removes every tetrahedron, keeping the reserved memory.
    pub fn restart(&mut self) {
        self.molecules.restart();
        self.stars.restart();
        self.cache.clear();
        self.even_ghosts.clear();
        self.tet_count = 0;
        self.ghost_tet_count = 0;
        self.consistent = true;
        self.star_end = 0;
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Number of solid tetrahedra.
    #[must_use]
    pub const fn tet_count(&self) -> u64 {
        self.tet_count
    }

    /// Number of ghost tetrahedra.
    #[must_use]
    pub const fn ghost_tet_count(&self) -> u64 {
        self.ghost_tet_count
    }

    /// Bytes reserved by the molecule pool, the star array and the set of
    /// all-even boundary faces.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.molecules.bytes()
            + self.stars.bytes()
            + self.even_ghosts.capacity() * std::mem::size_of::<Triangle>()
    }

    /// False after an ordered edit or a partial deletion, until
    /// [`mark_consistent`](Self::mark_consistent) is called.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.consistent
    }

    /// Declares that a bulk rewrite with ordered primitives has restored
    /// consistency.
    pub fn mark_consistent(&mut self) {
        self.consistent = true;
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ComplexConfig {
        &self.config
    }

    /// The vertex allocation source.
    #[must_use]
    pub const fn vertex_source(&self) -> &V {
        &self.vertices
    }

    /// Mutable access to the vertex allocation source.
    pub fn vertex_source_mut(&mut self) -> &mut V {
        &mut self.vertices
    }

    /// The star of `vertex`, if one was ever allocated.
    #[must_use]
    pub fn star(&self, vertex: Tag) -> Option<Star> {
        if vertex == GHOST_VERTEX {
            return None;
        }
        self.stars.get(vertex).copied().filter(|star| star.is_allocated())
    }

    /// The star of `vertex`, allocating an empty 2D link on first use.
    ///
    /// # Panics
    ///
    /// Panics if `vertex` is GHOST, which never owns a star.
    pub fn lookup_star(&mut self, vertex: Tag) -> Star {
        assert!(vertex != GHOST_VERTEX, "GHOST has no star");
        let alloc_index = self.vertices.allocation_index(vertex);
        let star = self.stars.get_or_create(vertex);
        if !star.is_allocated() {
            let link = Link2d::new(&mut self.molecules, alloc_index, vertex);
            star.link_head = link.head();
            star.link_tail = link.head();
            self.star_end = self.star_end.max(vertex + 1);
        }
        *star
    }

    /// The 2D link of `vertex`.
    #[must_use]
    pub fn link(&self, vertex: Tag) -> Option<Link2d> {
        self.star(vertex)
            .map(|star| Link2d::from_tag(star.link_head, vertex))
    }

    /// `(neighbour, ring tag)` pairs of the 2D link of `vertex`.
    #[must_use]
    pub fn link_pairs(&self, vertex: Tag) -> LinkBuffer {
        self.link(vertex)
            .map(|link| link.pairs(&self.molecules))
            .unwrap_or_default()
    }

    /// Molecule pool backing the stars.
    #[must_use]
    pub const fn molecules(&self) -> &MoleculePool {
        &self.molecules
    }

    /// Vertices that may own a star, in tag order.
    pub(crate) fn star_vertices(&self) -> impl Iterator<Item = Tag> + '_ {
        (0..self.star_end).filter(|&v| self.star(v).is_some())
    }

    /// Stored ring of the same-parity edge `(a, b)`, wherever it lives, and
    /// whether it is stored as `(b, a)`.
    #[must_use]
    pub fn edge_ring(&self, a: Tag, b: Tag) -> Option<(LinkRing, bool)> {
        if !same_parity(a, b) || a == b {
            return None;
        }
        if owns_edge(a, b) {
            self.stored_ring(a, b).map(|ring| (ring, false))
        } else {
            self.stored_ring(b, a).map(|ring| (ring, true))
        }
    }

    /// Ring of `(owner, other)` stored at `owner`, without the cache.
    fn stored_ring(&self, owner: Tag, other: Tag) -> Option<LinkRing> {
        let link = self.link(owner)?;
        let tag = link.find_ring_uncached(&self.molecules, other)?;
        Some(LinkRing::from_tag(tag, owner))
    }

    /// Ring of `(owner, other)` stored at `owner`, through the cache when
    /// enabled.
    fn find_ring(&mut self, owner: Tag, other: Tag) -> Option<LinkRing> {
        let link = self.link(owner)?;
        let tag = if self.config.use_link_cache {
            link.find_ring(&self.molecules, &mut self.cache, other)
        } else {
            link.find_ring_uncached(&self.molecules, other)
        }?;
        Some(LinkRing::from_tag(tag, owner))
    }

    /// Decoded ring of the same-parity edge `(a, b)` as stored.
    #[must_use]
    pub fn ring_tags(&self, a: Tag, b: Tag) -> Option<RingBuffer> {
        self.edge_ring(a, b).map(|(ring, _)| ring.tags(&self.molecules))
    }

    /// Summary counters.
    #[must_use]
    pub fn statistics(&self) -> ComplexStatistics {
        let mut stats = ComplexStatistics {
            tets: self.tet_count,
            ghost_tets: self.ghost_tet_count,
            molecules: self.molecules.objects(),
            bytes: self.bytes(),
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
            ..ComplexStatistics::default()
        };
        for vertex in self.star_vertices() {
            let rings = self.link_pairs(vertex).len() as u64;
            stats.rings += rings;
            stats.stars += u64::from(rings > 0);
        }
        stats
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Apices on either side of triangle `(a, b, c)`.
    ///
    /// `[0]` is the apex `w` with `(a, b, c, w)` positively oriented and
    /// `[1]` the apex with `(a, b, w, c)` positively oriented; a side with no
    /// tetrahedron reads [`Apex::Ghost`]. Returns `None` when no tetrahedron
    /// has the triangle as a face, or for a ghost triangle on an edge whose
    /// ring has several open chains.
    pub fn adjacencies(&mut self, a: Tag, b: Tag, c: Tag) -> Option<[Apex; 2]> {
        if a == b || b == c || c == a {
            return None;
        }
        let rotations = [(a, b, c), (b, c, a), (c, a, b)];
        let usable = |&&(x, y, _): &&(Tag, Tag, Tag)| same_parity(x, y);
        let (x, y, z) = rotations
            .iter()
            .filter(usable)
            .find(|&&(_, _, z)| z != GHOST_VERTEX)
            .or_else(|| rotations.iter().find(usable))
            .copied()?;

        let (owner, other, reversed) = if owns_edge(x, y) { (x, y, false) } else { (y, x, true) };
        let ring = self.find_ring(owner, other)?;
        let [succ, pred] = if z == GHOST_VERTEX {
            match ring.shape(&self.molecules).ok()? {
                RingShape::Open(chains) if chains.len() == 1 => {
                    let chain = &chains[0];
                    [chain[0], chain[chain.len() - 1]]
                }
                _ => return None,
            }
        } else {
            ring.adjacencies(&self.molecules, z)?
        };
        let [first, second] = if reversed { [pred, succ] } else { [succ, pred] };
        Some([Apex::from_tag(first), Apex::from_tag(second)])
    }

    /// Neighbours of `c` in the ring of the same-parity edge `(a, b)`, read
    /// in the orientation of `(a, b)`: `[w1, w2]` with `(a, b, c, w1)` and
    /// `(a, b, w2, c)` positively oriented. GHOST marks an open side.
    pub fn ring_adjacencies(&mut self, a: Tag, b: Tag, c: Tag) -> Option<[Tag; 2]> {
        if !same_parity(a, b) || a == b {
            return None;
        }
        let (owner, other, reversed) = if owns_edge(a, b) { (a, b, false) } else { (b, a, true) };
        let [succ, pred] = self
            .find_ring(owner, other)?
            .adjacencies(&self.molecules, c)?;
        Some(if reversed { [pred, succ] } else { [succ, pred] })
    }

    /// Number of same-parity edges of `tet` whose ring does not hold it,
    /// plus one for an all-even ghost tetrahedron whose face is not
    /// recorded.
    #[must_use]
    pub fn missing_tet(&self, tet: &Tetrahedron) -> u32 {
        let copies = all_copies(tet);
        let missing = copies.iter().filter(|copy| {
            self.stored_ring(copy.owner, copy.other)
                .is_none_or(|ring| !ring.contains_edge(&self.molecules, copy.from, copy.to))
        });
        let unrecorded = even_ghost_face(tet).is_some_and(|face| !self.even_ghosts.contains(&face));
        u32::try_from(missing.count() + usize::from(unrecorded)).unwrap_or(u32::MAX)
    }

    /// Returns true when an all-even ghost tetrahedron is recorded on the
    /// positive side of `face`.
    #[must_use]
    pub fn has_even_ghost(&self, face: &Triangle) -> bool {
        self.even_ghosts.contains(face)
    }

    /// Recorded all-even boundary faces.
    pub(crate) fn even_ghost_faces(&self) -> impl Iterator<Item = &Triangle> + '_ {
        self.even_ghosts.iter()
    }

    /// Returns true when every same-parity edge of `tet` holds it.
    #[must_use]
    pub fn contains_tet(&self, tet: &Tetrahedron) -> bool {
        validate(tet).is_ok() && self.missing_tet(tet) == 0
    }

    /// Some tetrahedron with `vertex` as a vertex, preferring solid ones.
    ///
    /// Looks at the rings `vertex` owns first and falls back to scanning
    /// every star when it owns none.
    #[must_use]
    pub fn vertex_to_tet(&self, vertex: Tag) -> Option<Tetrahedron> {
        if vertex == GHOST_VERTEX {
            return None;
        }
        let mut ghost = None;
        for (other, ring) in self.link_pairs(vertex) {
            let tags = LinkRing::from_tag(ring, vertex).tags(&self.molecules);
            if let Some(tet) = first_explicit(vertex, other, &tags) {
                if !is_ghost(&tet) {
                    return Some(tet);
                }
                ghost.get_or_insert(tet);
            }
        }
        if ghost.is_some() {
            return ghost;
        }
        debug!("[complex] vertex {vertex} owns no rings; scanning every star");
        let mut ghost = None;
        for tet in self.iter_all() {
            if tet.contains(&vertex) {
                if !is_ghost(&tet) {
                    return Some(tet);
                }
                ghost.get_or_insert(tet);
            }
        }
        ghost
    }

    /// Some tetrahedron with edge `(a, b)`.
    #[must_use]
    pub fn edge_to_tet(&self, a: Tag, b: Tag) -> Option<Tetrahedron> {
        if a == b {
            return None;
        }
        if same_parity(a, b) {
            let (ring, reversed) = self.edge_ring(a, b)?;
            let (owner, other) = if reversed { (b, a) } else { (a, b) };
            return first_explicit(owner, other, &ring.tags(&self.molecules));
        }
        // Opposite parity: the edge shows up as a ring entry next to one of
        // its endpoints.
        for (owner, target) in [(a, b), (b, a)] {
            if owner == GHOST_VERTEX {
                continue;
            }
            for (other, ring) in self.link_pairs(owner) {
                let ring = LinkRing::from_tag(ring, owner);
                if let Some([succ, pred]) = ring.adjacencies(&self.molecules, target) {
                    if succ != GHOST_VERTEX {
                        return Some([owner, other, target, succ]);
                    }
                    if pred != GHOST_VERTEX {
                        return Some([owner, other, pred, target]);
                    }
                }
            }
        }
        self.iter_all()
            .find(|tet| tet.contains(&a) && tet.contains(&b))
    }

    // =========================================================================
    // RING EDIT ENGINE
    // =========================================================================

    /// Applies one ring's share of an edit. All-or-nothing.
    fn apply_edge_edit(&mut self, edit: &EdgeEdit) -> Result<(), ComplexError> {
        let refused = |source| ComplexError::RingRefused {
            owner: edit.owner,
            other: edit.other,
            source,
        };
        match self.find_ring(edit.owner, edit.other) {
            Some(ring) => {
                let state = ring
                    .apply_edits(&mut self.molecules, &edit.removed, &edit.added)
                    .map_err(refused)?;
                if state == RingState::Empty {
                    self.detach_ring(edit.owner, edit.other, ring);
                }
            }
            None => {
                let mut shape = RingShape::default();
                shape
                    .apply_edits(&edit.removed, &edit.added)
                    .map_err(refused)?;
                if !shape.is_empty() {
                    let ring = self.attach_ring(edit.owner, edit.other);
                    ring.write(&mut self.molecules, &shape);
                }
            }
        }
        if self.config.self_check {
            self.self_check_ring(edit.owner, edit.other);
        }
        Ok(())
    }

    /// Creates the ring of `(owner, other)` in the owner's 2D link.
    fn attach_ring(&mut self, owner: Tag, other: Tag) -> LinkRing {
        let star = self.lookup_star(owner);
        let link = Link2d::from_tag(star.link_head, owner);
        let (ring, tail, _) =
            link.find_or_insert(&mut self.molecules, &mut self.cache, star.link_tail, other);
        self.stars.get_or_create(owner).link_tail = tail;
        ring
    }

    /// Removes the emptied ring of `(owner, other)` from the owner's 2D
    /// link and frees it. The 2D link stays allocated.
    fn detach_ring(&mut self, owner: Tag, other: Tag, ring: LinkRing) {
        if let Some(link) = self.link(owner) {
            if let Some((_, tail)) = link.delete_vertex(&mut self.molecules, &mut self.cache, other) {
                self.stars.get_or_create(owner).link_tail = tail;
            }
        }
        ring.delete(&mut self.molecules);
    }

    /// Applies every edit of `plan` or none of them.
    fn apply_plan(&mut self, plan: &EditPlan) -> Result<(), ComplexError> {
        for (done, edit) in plan.edits.iter().enumerate() {
            if let Err(err) = self.apply_edge_edit(edit) {
                debug!("[complex] edit refused ({err}); rolling back {done} ring edits");
                self.rollback(&plan.edits[..done]);
                return Err(err);
            }
        }
        Ok(())
    }

    fn rollback(&mut self, applied: &[EdgeEdit]) {
        for edit in applied.iter().rev() {
            if let Err(err) = self.apply_edge_edit(&edit.inverse()) {
                error!(
                    "[complex] rollback of ring ({}, {}) failed: {err}",
                    edit.owner, edit.other
                );
                self.consistent = false;
            }
        }
    }

    /// Applies each edit independently, skipping refused ones.
    fn apply_each(&mut self, plan: &EditPlan) -> OrderedOutcome {
        let mut outcome = OrderedOutcome::default();
        for edit in &plan.edits {
            match self.apply_edge_edit(edit) {
                Ok(()) => outcome.applied += 1,
                Err(err) => {
                    debug!("[complex] ordered edit skipped: {err}");
                    outcome.refused += 1;
                }
            }
        }
        outcome
    }

    fn tally(&mut self, tet: &Tetrahedron, added: bool) {
        let counter = if is_ghost(tet) {
            &mut self.ghost_tet_count
        } else {
            &mut self.tet_count
        };
        *counter = if added {
            *counter + 1
        } else {
            counter.saturating_sub(1)
        };
    }

    /// Re-reads a just-edited ring and panics if it is malformed or the
    /// cache disagrees with the stored link.
    fn self_check_ring(&mut self, owner: Tag, other: Tag) {
        let stored = self.stored_ring(owner, other);
        if let Some(ring) = stored {
            if let Err(err) = ring.shape(&self.molecules) {
                error!("[complex] self-check: ring ({owner}, {other}) is malformed: {err}");
                panic!("self-check failed: ring ({owner}, {other}) is malformed: {err}");
            }
            if ring.is_empty(&self.molecules) {
                error!("[complex] self-check: ring ({owner}, {other}) is stored empty");
                panic!("self-check failed: ring ({owner}, {other}) is stored empty");
            }
        }
        if self.config.use_link_cache && self.find_ring(owner, other) != stored {
            error!("[complex] self-check: cache disagrees on ring ({owner}, {other})");
            panic!("self-check failed: cache disagrees on ring ({owner}, {other})");
        }
    }

    /// Runs a full consistency report after `operation` in paranoid mode.
    fn paranoid_check(&self, operation: &str) {
        if !self.config.paranoid || !self.consistent {
            return;
        }
        let report = self.consistency_report();
        if !report.is_empty() {
            error!("[complex] {operation} left the complex inconsistent:\n{report}");
            panic!("paranoid check failed after {operation}: {report}");
        }
    }

    /// Refuses `new` when one of its all-even ghosts is already recorded,
    /// or when one of its solid tetrahedra takes a face from the side a
    /// recorded all-even ghost holds. Ghosts in `old` count as gone.
    fn check_even_ghosts(
        &self,
        old: &[Tetrahedron],
        new: &[Tetrahedron],
    ) -> Result<(), ComplexError> {
        let leaving: SmallBuffer<Triangle, 4> = old.iter().filter_map(even_ghost_face).collect();
        let mut arriving: SmallBuffer<Triangle, 4> = SmallBuffer::new();
        let taken = |face: &Triangle, arriving: &[Triangle]| {
            arriving.contains(face) || (self.even_ghosts.contains(face) && !leaving.contains(face))
        };
        for face in new.iter().filter_map(even_ghost_face) {
            if taken(&face, arriving.as_slice()) {
                return Err(ComplexError::GhostOnFace { face });
            }
            arriving.push(face);
        }
        for tet in new.iter().filter(|tet| !is_ghost(tet)) {
            for face in even_faces(tet) {
                if taken(&face, arriving.as_slice()) {
                    return Err(ComplexError::GhostOnFace { face });
                }
            }
        }
        Ok(())
    }

    /// Adds or removes the face of an all-even ghost tetrahedron. Returns
    /// true when the set changed.
    fn record_even_ghost(&mut self, face: Triangle, present: bool) -> bool {
        if present {
            self.even_ghosts.insert(face)
        } else {
            self.even_ghosts.remove(&face)
        }
    }

    /// Moves the counters and the all-even ghost faces from `old` to `new`.
    fn account(&mut self, old: &[Tetrahedron], new: &[Tetrahedron]) {
        for (tets, present) in [(old, false), (new, true)] {
            for tet in tets {
                if let Some(face) = even_ghost_face(tet) {
                    self.record_even_ghost(face, present);
                }
                self.tally(tet, present);
            }
        }
    }

    // =========================================================================
    // TETRAHEDRON EDITS
    // =========================================================================

    /// Inserts the positively oriented tetrahedron `(a, b, c, d)`.
    ///
    /// # Errors
    ///
    /// Returns [`ComplexError`] when the tetrahedron is malformed, a ring
    /// refuses it (a face already claimed on that side, or a closure that
    /// conflicts with a surviving chain), or a recorded all-even ghost
    /// already holds one of its faces. The complex is unchanged on error.
    pub fn insert_tet(&mut self, a: Tag, b: Tag, c: Tag, d: Tag) -> Result<(), ComplexError> {
        let tet = [a, b, c, d];
        validate(&tet)?;
        self.check_even_ghosts(&[], &[tet])?;
        let mut plan = EditPlan::default();
        plan.add(&all_copies(&tet));
        self.apply_plan(&plan)?;
        if let Some(face) = even_ghost_face(&tet) {
            self.record_even_ghost(face, true);
        }
        self.tally(&tet, true);
        self.paranoid_check("insert_tet");
        Ok(())
    }

    /// Deletes the positively oriented tetrahedron `(a, b, c, d)` from every
    /// ring that holds it.
    ///
    /// A partial deletion marks the complex inconsistent.
    pub fn delete_tet(&mut self, a: Tag, b: Tag, c: Tag, d: Tag) -> DeleteOutcome {
        let tet = [a, b, c, d];
        if validate(&tet).is_err() {
            return DeleteOutcome::NotFound;
        }
        let face = even_ghost_face(&tet);
        if face.is_some_and(|face| !self.even_ghosts.contains(&face)) {
            return DeleteOutcome::NotFound;
        }
        let mut plan = EditPlan::default();
        plan.remove(&all_copies(&tet));
        let OrderedOutcome { applied, refused } = self.apply_each(&plan);
        let recorded = face.is_some_and(|face| self.record_even_ghost(face, false));
        if applied == 0 && !recorded {
            return DeleteOutcome::NotFound;
        }
        self.tally(&tet, false);
        if refused > 0 {
            warn!("[complex] tetrahedron {tet:?} was missing from {refused} rings");
            self.consistent = false;
            return DeleteOutcome::Partial {
                removed: applied,
                missing: refused,
            };
        }
        self.paranoid_check("delete_tet");
        DeleteOutcome::Deleted
    }

    /// Inserts `(a, b, c, d)` ring by ring without rollback. The complex is
    /// marked inconsistent until [`mark_consistent`](Self::mark_consistent).
    pub fn insert_ordered_tet(&mut self, a: Tag, b: Tag, c: Tag, d: Tag) -> OrderedOutcome {
        self.ordered(&[a, b, c, d], &EDGE_ORDERINGS, true)
    }

    /// Deletes `(a, b, c, d)` ring by ring without rollback. The complex is
    /// marked inconsistent until [`mark_consistent`](Self::mark_consistent).
    pub fn delete_ordered_tet(&mut self, a: Tag, b: Tag, c: Tag, d: Tag) -> OrderedOutcome {
        self.ordered(&[a, b, c, d], &EDGE_ORDERINGS, false)
    }

    /// Inserts `(a, b, c, d)` only into the rings of the three edges at `a`.
    /// Used when the rings of edges `(b, c)`, `(c, d)` and `(d, b)` are
    /// written by other means. Marks the complex inconsistent.
    pub fn insert_tet_on_tripod(&mut self, a: Tag, b: Tag, c: Tag, d: Tag) -> OrderedOutcome {
        self.ordered(&[a, b, c, d], &EDGE_ORDERINGS[..3], true)
    }

    fn ordered(&mut self, tet: &Tetrahedron, orderings: &[[usize; 4]], insert: bool) -> OrderedOutcome {
        if validate(tet).is_err() {
            return OrderedOutcome::default();
        }
        self.consistent = false;
        let copies = stored_copies(tet, orderings);
        let mut plan = EditPlan::default();
        if insert {
            plan.add(&copies);
        } else {
            plan.remove(&copies);
        }
        let outcome = self.apply_each(&plan);
        let counted = match even_ghost_face(tet) {
            Some(face) => self.record_even_ghost(face, insert),
            None => outcome.applied > 0 || copies.is_empty(),
        };
        if counted {
            self.tally(tet, insert);
        }
        outcome
    }

    /// Replaces the tetrahedra `old` by `new` as one transaction. Every
    /// tetrahedron of `old` must be present.
    pub(crate) fn exchange(
        &mut self,
        operation: &str,
        old: &[Tetrahedron],
        new: &[Tetrahedron],
    ) -> Result<(), ComplexError> {
        for tet in old.iter().chain(new) {
            validate(tet)?;
        }
        for tet in old {
            let missing = self.missing_tet(tet);
            if missing != 0 {
                return Err(ComplexError::MissingTet { tet: *tet, missing });
            }
        }
        self.check_even_ghosts(old, new)?;
        let mut plan = EditPlan::default();
        for tet in old {
            plan.remove(&all_copies(tet));
        }
        for tet in new {
            plan.add(&all_copies(tet));
        }
        self.apply_plan(&plan)?;
        self.account(old, new);
        debug!(
            "[complex] {operation}: -{} +{} tetrahedra over {} rings",
            old.len(),
            new.len(),
            plan.edits.len()
        );
        self.paranoid_check(operation);
        Ok(())
    }

    /// Deletes every ghost tetrahedron.
    pub fn remove_ghost_tets(&mut self) {
        let vertices: Vec<Tag> = self.star_vertices().collect();
        for vertex in vertices {
            let Some(link) = self.link(vertex) else {
                continue;
            };
            if let Some((ring, tail)) =
                link.delete_vertex(&mut self.molecules, &mut self.cache, GHOST_VERTEX)
            {
                LinkRing::from_tag(ring, vertex).delete(&mut self.molecules);
                self.stars.get_or_create(vertex).link_tail = tail;
            }
        }
        debug!("[complex] removed {} ghost tetrahedra", self.ghost_tet_count);
        self.even_ghosts.clear();
        self.ghost_tet_count = 0;
    }
}

/// First tetrahedron stored explicitly in the ring of `(owner, other)`.
fn first_explicit(owner: Tag, other: Tag, tags: &[Tag]) -> Option<Tetrahedron> {
    let n = tags.len();
    (0..n)
        .map(|i| (tags[i], tags[(i + 1) % n]))
        .find(|&(c, d)| c != GHOST_VERTEX && d != GHOST_VERTEX)
        .map(|(c, d)| [owner, other, c, d])
}

fn tag_name(tag: Tag) -> String {
    if tag == GHOST_VERTEX {
        "G".to_owned()
    } else {
        tag.to_string()
    }
}

impl<V: VertexAllocation> fmt::Display for TetComplex<V> {
    /// Dumps every non-empty star: one line per owned edge with its ring.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "TetComplex: {} tetrahedra, {} ghost tetrahedra",
            self.tet_count, self.ghost_tet_count
        )?;
        for vertex in self.star_vertices() {
            let pairs = self.link_pairs(vertex);
            if pairs.is_empty() {
                continue;
            }
            writeln!(f, "vertex {vertex}:")?;
            for (other, ring) in pairs {
                let tags = LinkRing::from_tag(ring, vertex).tags(&self.molecules);
                let names: Vec<String> = tags.iter().map(|&t| tag_name(t)).collect();
                writeln!(f, "  {} -> [{}]", tag_name(other), names.join(" "))?;
            }
        }
        if !self.even_ghosts.is_empty() {
            let mut faces: Vec<&Triangle> = self.even_ghosts.iter().collect();
            faces.sort_unstable();
            writeln!(f, "even boundary faces: {faces:?}")?;
        }
        Ok(())
    }
}
