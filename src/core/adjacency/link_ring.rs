//! Link rings: the circular sequence of apex vertices around a directed edge.
//!
//! For a ring stored for edge `(a, b)`, consecutive entries `c -> d` mean
//! that tetrahedron `(a, b, c, d)` exists with positive orientation. A GHOST
//! entry marks a gap where the fan around the edge is open. The ring is
//! therefore either *closed* (one cycle, no GHOST) or *open*: a set of
//! chains, each a maximal GHOST-free run of at least two vertices, written
//! one after another with a GHOST after each chain.
//!
//! Rings are stored as compressed tags in a [`MoleculeChain`], compressed
//! against the tag of the vertex that owns the ring (the *ground*). Edits
//! decode the ring into a chain model, apply the change there, and write the
//! canonical encoding back, rewriting only from the first byte that changed.
//! Every edit is all-or-nothing: on `Err` the stored bytes are untouched.

use std::mem;

use smallvec::smallvec;
use thiserror::Error;
use tracing::trace;

use super::molecule::{ChainTags, MoleculeChain, MoleculePool};
use crate::core::collections::{AtomBuffer, RingBuffer, SmallBuffer, canonical_rotation};
use crate::core::config::trace_enabled;
use crate::core::tag::{AllocIndex, GHOST_VERTEX, Tag, push_compressed};

/// Reasons a link ring refuses an edit.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RingError {
    /// The edge to delete is not in the ring.
    #[error("edge {from} -> {to} is not in the ring")]
    EdgeNotFound {
        /// Tail of the missing edge.
        from: Tag,
        /// Head of the missing edge.
        to: Tag,
    },

    /// An endpoint of the new edge already has a neighbour on that side, so
    /// the face is claimed by another tetrahedron.
    #[error("edge {from} -> {to} conflicts with an existing neighbour")]
    FaceClaimed {
        /// Tail of the rejected edge.
        from: Tag,
        /// Head of the rejected edge.
        to: Tag,
    },

    /// The new edge would close one chain into a cycle while other chains
    /// survive.
    #[error("edge {from} -> {to} would close a chain while {others} other chains remain")]
    ClosureConflict {
        /// Tail of the rejected edge.
        from: Tag,
        /// Head of the rejected edge.
        to: Tag,
        /// Number of surviving chains.
        others: usize,
    },

    /// The ring is a closed cycle and accepts no new edges.
    #[error("ring is closed; cannot insert {from} -> {to}")]
    RingClosed {
        /// Tail of the rejected edge.
        from: Tag,
        /// Head of the rejected edge.
        to: Tag,
    },

    /// The vertex is already in the ring, or an edge joins a vertex to itself.
    #[error("vertex {vertex} is already in the ring")]
    DuplicateVertex {
        /// The repeated vertex.
        vertex: Tag,
    },

    /// The vertex to remove is not in the ring.
    #[error("vertex {vertex} is not in the ring")]
    VertexNotFound {
        /// The absent vertex.
        vertex: Tag,
    },

    /// Both endpoints of an edge are GHOST.
    #[error("an edge cannot join GHOST to GHOST")]
    GhostEdge,

    /// The stored or supplied sequence violates the ring invariants.
    #[error("malformed ring: {reason}")]
    Malformed {
        /// Which invariant failed.
        reason: &'static str,
    },
}

/// Whether a ring still holds anything after an edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RingState {
    /// The ring holds no vertices.
    Empty,
    /// The ring holds at least one chain or cycle.
    Occupied,
}

/// Chain model of a ring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RingShape {
    Closed(RingBuffer),
    Open(SmallBuffer<RingBuffer, 4>),
}

impl Default for RingShape {
    fn default() -> Self {
        Self::Open(SmallBuffer::new())
    }
}

fn check_distinct(tags: &[Tag]) -> Result<(), RingError> {
    let mut sorted: RingBuffer = tags.iter().copied().filter(|&t| t != GHOST_VERTEX).collect();
    sorted.sort_unstable();
    match sorted.windows(2).find(|w| w[0] == w[1]) {
        Some(w) => Err(RingError::DuplicateVertex { vertex: w[0] }),
        None => Ok(()),
    }
}

impl RingShape {
    /// Parses a cyclic tag sequence, checking the ring invariants.
    pub(crate) fn from_tags(tags: &[Tag]) -> Result<Self, RingError> {
        if tags.is_empty() {
            return Ok(Self::default());
        }
        check_distinct(tags)?;
        let Some(first_ghost) = tags.iter().position(|&t| t == GHOST_VERTEX) else {
            if tags.len() < 2 {
                return Err(RingError::Malformed {
                    reason: "ring with a single vertex",
                });
            }
            return Ok(Self::Closed(tags.into()));
        };

        let mut chains = SmallBuffer::new();
        let mut current = RingBuffer::new();
        // Start right after a GHOST so that every chain ends at a GHOST.
        for &tag in tags[first_ghost + 1..].iter().chain(&tags[..=first_ghost]) {
            if tag != GHOST_VERTEX {
                current.push(tag);
                continue;
            }
            if current.is_empty() {
                return Err(RingError::Malformed {
                    reason: "consecutive GHOST entries",
                });
            }
            if current.len() < 2 {
                return Err(RingError::Malformed {
                    reason: "chain with a single vertex",
                });
            }
            chains.push(mem::take(&mut current));
        }
        Ok(Self::Open(chains))
    }

    /// Canonical cyclic encoding: closed rings start at their smallest tag,
    /// open rings list chains by their first tag, each followed by GHOST.
    pub(crate) fn to_tags(&self) -> RingBuffer {
        match self {
            Self::Closed(cycle) => canonical_rotation(cycle),
            Self::Open(chains) => {
                let mut order: SmallBuffer<&RingBuffer, 4> = chains.iter().collect();
                order.sort_unstable_by_key(|chain| chain[0]);
                let mut tags = RingBuffer::new();
                for chain in order {
                    tags.extend_from_slice(chain);
                    tags.push(GHOST_VERTEX);
                }
                tags
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, Self::Open(chains) if chains.is_empty())
    }

    fn contains(&self, vertex: Tag) -> bool {
        match self {
            Self::Closed(cycle) => cycle.contains(&vertex),
            Self::Open(chains) => chains.iter().any(|chain| chain.contains(&vertex)),
        }
    }

    fn locate(chains: &[RingBuffer], vertex: Tag) -> Option<(usize, usize)> {
        chains.iter().enumerate().find_map(|(c, chain)| {
            chain
                .iter()
                .position(|&t| t == vertex)
                .map(|i| (c, i))
        })
    }

    /// Ok when `vertex` is absent or ends a chain, i.e. `vertex -> GHOST` is
    /// implicit in the ring.
    fn has_open_end(&self, vertex: Tag) -> bool {
        match self {
            Self::Closed(cycle) => !cycle.contains(&vertex),
            Self::Open(chains) => match Self::locate(chains, vertex) {
                Some((c, i)) => i + 1 == chains[c].len(),
                None => true,
            },
        }
    }

    /// Ok when `vertex` is absent or starts a chain.
    fn has_open_start(&self, vertex: Tag) -> bool {
        match self {
            Self::Closed(cycle) => !cycle.contains(&vertex),
            Self::Open(chains) => Self::locate(chains, vertex).is_none_or(|(_, i)| i == 0),
        }
    }

    pub(crate) fn insert_edge(&mut self, from: Tag, to: Tag) -> Result<(), RingError> {
        match (from == GHOST_VERTEX, to == GHOST_VERTEX) {
            (true, true) => return Err(RingError::GhostEdge),
            _ if from == to => return Err(RingError::DuplicateVertex { vertex: from }),
            (false, true) => {
                return if self.has_open_end(from) {
                    Ok(())
                } else {
                    Err(RingError::FaceClaimed { from, to })
                };
            }
            (true, false) => {
                return if self.has_open_start(to) {
                    Ok(())
                } else {
                    Err(RingError::FaceClaimed { from, to })
                };
            }
            (false, false) => {}
        }

        let Self::Open(chains) = self else {
            return Err(RingError::RingClosed { from, to });
        };
        let at_from = Self::locate(chains, from);
        let at_to = Self::locate(chains, to);
        if at_from.is_some_and(|(c, i)| i + 1 != chains[c].len())
            || at_to.is_some_and(|(_, i)| i != 0)
        {
            return Err(RingError::FaceClaimed { from, to });
        }

        match (at_from, at_to) {
            (None, None) => chains.push(smallvec![from, to]),
            (Some((c, _)), None) => chains[c].push(to),
            (None, Some((c, _))) => chains[c].insert(0, from),
            (Some((c_from, _)), Some((c_to, _))) if c_from == c_to => {
                if chains.len() != 1 {
                    return Err(RingError::ClosureConflict {
                        from,
                        to,
                        others: chains.len() - 1,
                    });
                }
                let cycle = mem::take(&mut chains[0]);
                *self = Self::Closed(cycle);
            }
            (Some((c_from, _)), Some((c_to, _))) => {
                let tail = chains.remove(c_to);
                let c_from = if c_to < c_from { c_from - 1 } else { c_from };
                chains[c_from].extend(tail);
            }
        }
        Ok(())
    }

    /// Returns true when `vertex` is present and ends a chain.
    fn ends_chain(&self, vertex: Tag) -> bool {
        match self {
            Self::Closed(_) => false,
            Self::Open(chains) => {
                Self::locate(chains, vertex).is_some_and(|(c, i)| i + 1 == chains[c].len())
            }
        }
    }

    /// Returns true when `vertex` is present and starts a chain.
    fn starts_chain(&self, vertex: Tag) -> bool {
        match self {
            Self::Closed(_) => false,
            Self::Open(chains) => Self::locate(chains, vertex).is_some_and(|(_, i)| i == 0),
        }
    }

    /// Deletes `from -> to`. An edge with a GHOST endpoint is deleted only
    /// when its solid endpoint is in the ring next to a gap; the ring itself
    /// does not change.
    pub(crate) fn delete_edge(&mut self, from: Tag, to: Tag) -> Result<(), RingError> {
        let missing = RingError::EdgeNotFound { from, to };
        match (from == GHOST_VERTEX, to == GHOST_VERTEX) {
            (true, true) => return Err(RingError::GhostEdge),
            _ if from == to => return Err(missing),
            (false, true) => return if self.ends_chain(from) { Ok(()) } else { Err(missing) },
            (true, false) => return if self.starts_chain(to) { Ok(()) } else { Err(missing) },
            (false, false) => {}
        }

        match self {
            Self::Closed(cycle) => {
                let n = cycle.len();
                let i = (0..n)
                    .find(|&i| cycle[i] == from && cycle[(i + 1) % n] == to)
                    .ok_or(missing)?;
                // The cycle opens into one chain running from `to` to `from`.
                let chain: RingBuffer = cycle[i + 1..].iter().chain(&cycle[..=i]).copied().collect();
                *self = Self::Open(smallvec![chain]);
            }
            Self::Open(chains) => {
                let (c, i) = Self::locate(chains, from)
                    .filter(|&(c, i)| chains[c].get(i + 1) == Some(&to))
                    .ok_or(missing)?;
                let right: RingBuffer = chains[c][i + 1..].into();
                chains[c].truncate(i + 1);
                if right.len() >= 2 {
                    chains.push(right);
                }
                if chains[c].len() < 2 {
                    chains.remove(c);
                }
            }
        }
        Ok(())
    }

    /// Deletes `removed`, then inserts `added`. Edges with a GHOST endpoint
    /// are checked against the ring before any deletion (for `removed`) and
    /// after every insertion (for `added`), so the batch is order-independent.
    pub(crate) fn apply_edits(
        &mut self,
        removed: &[(Tag, Tag)],
        added: &[(Tag, Tag)],
    ) -> Result<(), RingError> {
        let is_gap = |&&(from, to): &&(Tag, Tag)| from == GHOST_VERTEX || to == GHOST_VERTEX;
        for &(from, to) in removed.iter().filter(is_gap) {
            self.delete_edge(from, to)?;
        }
        for &(from, to) in removed.iter().filter(|e| !is_gap(e)) {
            self.delete_edge(from, to)?;
        }
        for &(from, to) in added.iter().filter(|e| !is_gap(e)) {
            self.insert_edge(from, to)?;
        }
        for &(from, to) in added.iter().filter(is_gap) {
            self.insert_edge(from, to)?;
        }
        Ok(())
    }
}

/// Successor and predecessor of `search` in a cyclic tag sequence.
fn neighbours(tags: &[Tag], search: Tag) -> Option<[Tag; 2]> {
    let n = tags.len();
    let i = tags.iter().position(|&t| t == search)?;
    Some([tags[(i + 1) % n], tags[(i + n - 1) % n]])
}

/// Handle to a stored link ring: the head molecule plus the ground tag the
/// entries are compressed against.
///
/// # Examples
///
/// ```rust
/// use tetstar::core::adjacency::{LinkRing, MoleculePool};
/// use tetstar::core::tag::GHOST_VERTEX;
///
/// let mut pool = MoleculePool::new();
/// let ring = LinkRing::new(&mut pool, 0, 100);
/// ring.insert_edge(&mut pool, 101, 102).unwrap();
/// ring.insert_edge(&mut pool, 102, 103).unwrap();
/// assert_eq!(ring.tags(&pool).as_slice(), &[101, 102, 103, GHOST_VERTEX]);
/// assert_eq!(ring.adjacencies(&pool, 102), Some([103, 101]));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LinkRing {
    chain: MoleculeChain,
    ground: Tag,
}

impl LinkRing {
    /// Allocates an empty ring whose entries compress against `ground`.
    pub fn new(pool: &mut MoleculePool, alloc_index: AllocIndex, ground: Tag) -> Self {
        Self {
            chain: MoleculeChain::new(pool, alloc_index),
            ground,
        }
    }

    /// Allocates a ring holding the cyclic sequence `tags`.
    ///
    /// # Errors
    ///
    /// Returns [`RingError`] if `tags` violates the ring invariants; nothing
    /// is allocated in that case.
    pub fn new_filled(
        pool: &mut MoleculePool,
        alloc_index: AllocIndex,
        ground: Tag,
        tags: &[Tag],
    ) -> Result<Self, RingError> {
        let shape = RingShape::from_tags(tags)?;
        let ring = Self::new(pool, alloc_index, ground);
        ring.write(pool, &shape);
        Ok(ring)
    }

    /// Wraps a stored ring.
    #[must_use]
    pub const fn from_tag(tag: Tag, ground: Tag) -> Self {
        Self {
            chain: MoleculeChain::from_head(tag),
            ground,
        }
    }

    /// Tag of the ring's head molecule.
    #[must_use]
    pub const fn tag(self) -> Tag {
        self.chain.head()
    }

    /// Tag the entries are compressed against.
    #[must_use]
    pub const fn ground(self) -> Tag {
        self.ground
    }

    /// Frees every molecule of the ring.
    pub fn delete(self, pool: &mut MoleculePool) {
        self.chain.free(pool);
    }

    /// Empties the ring, keeping its head molecule.
    pub fn clear(self, pool: &mut MoleculePool) {
        self.chain.clear(pool);
    }

    /// Returns true when the ring holds no vertices.
    #[must_use]
    pub fn is_empty(self, pool: &MoleculePool) -> bool {
        self.chain.is_empty(pool)
    }

    /// Restartable iterator over the stored entries (GHOST included).
    #[must_use]
    pub fn iter(self, pool: &MoleculePool) -> ChainTags<'_> {
        ChainTags::new(pool, self.chain, self.ground)
    }

    /// Decoded entries.
    #[must_use]
    pub fn tags(self, pool: &MoleculePool) -> RingBuffer {
        self.iter(pool).collect()
    }

    /// Bytes occupied by the ring's molecules.
    #[must_use]
    pub fn bytes(self, pool: &MoleculePool) -> usize {
        self.chain.bytes(pool)
    }

    pub(crate) fn shape(self, pool: &MoleculePool) -> Result<RingShape, RingError> {
        RingShape::from_tags(&self.tags(pool))
    }

    pub(crate) fn write(self, pool: &mut MoleculePool, shape: &RingShape) -> RingState {
        let tags = shape.to_tags();
        let mut atoms = AtomBuffer::new();
        for &tag in &tags {
            push_compressed(self.ground, tag, &mut atoms);
        }
        if trace_enabled() {
            trace!("[ring] {} (ground {}) <- {:?}", self.tag(), self.ground, tags.as_slice());
        }
        self.chain.replace_content(pool, &atoms);
        if tags.is_empty() {
            RingState::Empty
        } else {
            RingState::Occupied
        }
    }

    fn edit(
        self,
        pool: &mut MoleculePool,
        edit: impl FnOnce(&mut RingShape) -> Result<(), RingError>,
    ) -> Result<RingState, RingError> {
        let mut shape = self.shape(pool)?;
        edit(&mut shape)?;
        Ok(self.write(pool, &shape))
    }

    /// Inserts the edge `from -> to`.
    ///
    /// # Errors
    ///
    /// Returns [`RingError`] when the edge conflicts with an existing
    /// neighbour, would close a chain while others remain, or the ring is
    /// closed.
    pub fn insert_edge(self, pool: &mut MoleculePool, from: Tag, to: Tag) -> Result<(), RingError> {
        self.edit(pool, |shape| shape.insert_edge(from, to)).map(|_| ())
    }

    /// Deletes the edge `from -> to` and reports whether the ring emptied.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::EdgeNotFound`] when the edge is absent.
    pub fn delete_edge(
        self,
        pool: &mut MoleculePool,
        from: Tag,
        to: Tag,
    ) -> Result<RingState, RingError> {
        self.edit(pool, |shape| shape.delete_edge(from, to))
    }

    /// Splits the edge `prev -> next` by inserting `vertex` between them.
    /// Either neighbour may be GHOST, but not both.
    ///
    /// # Errors
    ///
    /// Returns [`RingError`] when `vertex` is already present or the edge
    /// `prev -> next` is absent.
    pub fn insert_vertex(
        self,
        pool: &mut MoleculePool,
        prev: Tag,
        next: Tag,
        vertex: Tag,
    ) -> Result<(), RingError> {
        if vertex == GHOST_VERTEX {
            return Err(RingError::GhostEdge);
        }
        self.edit(pool, |shape| {
            if shape.contains(vertex) {
                return Err(RingError::DuplicateVertex { vertex });
            }
            shape.apply_edits(&[(prev, next)], &[(prev, vertex), (vertex, next)])
        })
        .map(|_| ())
    }

    /// Removes `vertex` from between `prev` and `next`, joining them.
    ///
    /// # Errors
    ///
    /// Returns [`RingError`] when `prev -> vertex -> next` is not in the ring.
    pub fn delete_vertex(
        self,
        pool: &mut MoleculePool,
        prev: Tag,
        vertex: Tag,
        next: Tag,
    ) -> Result<RingState, RingError> {
        self.edit(pool, |shape| {
            shape.apply_edits(&[(prev, vertex), (vertex, next)], &[(prev, next)])
        })
    }

    /// Removes `vertex` and its successor, joining the predecessor of
    /// `vertex` to the successor's successor. When both of those are gaps
    /// the whole chain goes.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::VertexNotFound`] when `vertex` is absent or
    /// GHOST, [`RingError::EdgeNotFound`] when its successor is a gap, and
    /// [`RingError::DuplicateVertex`] when only one vertex would remain of a
    /// closed ring.
    pub fn delete_two_vertices(
        self,
        pool: &mut MoleculePool,
        vertex: Tag,
    ) -> Result<RingState, RingError> {
        self.edit(pool, |shape| {
            let tags = shape.to_tags();
            let [next, prev] = neighbours(&tags, vertex)
                .filter(|_| vertex != GHOST_VERTEX)
                .ok_or(RingError::VertexNotFound { vertex })?;
            if next == GHOST_VERTEX {
                return Err(RingError::EdgeNotFound { from: vertex, to: next });
            }
            let [after, _] =
                neighbours(&tags, next).ok_or(RingError::VertexNotFound { vertex: next })?;
            let removed = [(prev, vertex), (vertex, next), (next, after)];
            if prev == GHOST_VERTEX && after == GHOST_VERTEX {
                shape.apply_edits(&removed, &[])
            } else {
                shape.apply_edits(&removed, &[(prev, after)])
            }
        })
    }

    /// Deletes every edge of `removed`, then inserts every edge of `added`,
    /// as one all-or-nothing batch.
    ///
    /// # Errors
    ///
    /// Returns the first [`RingError`] met; the stored ring is unchanged.
    pub fn apply_edits(
        self,
        pool: &mut MoleculePool,
        removed: &[(Tag, Tag)],
        added: &[(Tag, Tag)],
    ) -> Result<RingState, RingError> {
        self.edit(pool, |shape| shape.apply_edits(removed, added))
    }

    /// Successor and predecessor of `search` in the ring, GHOST included.
    /// Returns `None` when `search` is absent or is GHOST.
    #[must_use]
    pub fn adjacencies(self, pool: &MoleculePool, search: Tag) -> Option<[Tag; 2]> {
        if search == GHOST_VERTEX {
            return None;
        }
        neighbours(&self.tags(pool), search)
    }

    /// Returns true when `from -> to` is an edge of the ring. An edge with a
    /// GHOST endpoint is present when the solid endpoint borders a gap.
    #[must_use]
    pub fn contains_edge(self, pool: &MoleculePool, from: Tag, to: Tag) -> bool {
        let tags = self.tags(pool);
        if from != GHOST_VERTEX {
            neighbours(&tags, from).is_some_and(|[succ, _]| succ == to)
        } else {
            neighbours(&tags, to).is_some_and(|[_, pred]| pred == from)
        }
    }
}
