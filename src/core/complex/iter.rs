//! Iteration over the tetrahedra of a complex.
//!
//! Stars are visited in vertex-tag order and each owned ring is expanded into
//! the tetrahedra it stores. [`IterMode::All`] yields every stored copy. The
//! deduplicating modes keep a copy only when its edge is the *canonical* pair
//! of the tetrahedron: among the same-parity vertex pairs, the one with the
//! largest `(max, min)` tag key, where GHOST counts as the largest tag.
//!
//! Ghost tetrahedra whose solid vertices are all even have no ring copy;
//! their recorded boundary faces are yielded after the stars, once each, in
//! every mode but [`IterMode::Solid`].

use std::collections::hash_set;

use super::{TetComplex, Tetrahedron, Triangle, is_ghost};
use crate::core::adjacency::{Link2d, LinkRing};
use crate::core::collections::{LinkBuffer, SmallBuffer};
use crate::core::pool::VertexAllocation;
use crate::core::tag::{GHOST_VERTEX, Tag, same_parity};

/// What an iterator yields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IterMode {
    /// Every stored copy, duplicates included, then every recorded
    /// all-even ghost. Useful on inconsistent complexes.
    All,
    /// Every tetrahedron once, ghost tetrahedra included.
    Unique,
    /// Every solid tetrahedron once.
    Solid,
}

#[inline]
const fn pair_key(x: Tag, y: Tag) -> (Tag, Tag) {
    if x > y { (x, y) } else { (y, x) }
}

/// Key of the canonical same-parity pair of `tet`.
pub(crate) fn canonical_key(tet: &Tetrahedron) -> (Tag, Tag) {
    let mut best = (0, 0);
    for i in 0..4 {
        for j in i + 1..4 {
            if same_parity(tet[i], tet[j]) {
                best = best.max(pair_key(tet[i], tet[j]));
            }
        }
    }
    best
}

/// Iterator over the tetrahedra of a [`TetComplex`].
///
/// Created by [`TetComplex::iter`], [`TetComplex::iter_solid`] and
/// [`TetComplex::iter_all`].
#[derive(Debug)]
pub struct Tetrahedra<'a, V> {
    complex: &'a TetComplex<V>,
    mode: IterMode,
    next_vertex: Tag,
    owner: Tag,
    links: LinkBuffer,
    link_pos: usize,
    pending: SmallBuffer<Tetrahedron, 16>,
    even_ghosts: hash_set::Iter<'a, Triangle>,
}

impl<'a, V: VertexAllocation> Tetrahedra<'a, V> {
    fn new(complex: &'a TetComplex<V>, mode: IterMode) -> Self {
        Self {
            complex,
            mode,
            next_vertex: 0,
            owner: 0,
            links: LinkBuffer::new(),
            link_pos: 0,
            pending: SmallBuffer::new(),
            even_ghosts: complex.even_ghosts.iter(),
        }
    }

    /// Rewinds to the first tetrahedron.
    pub fn restart(&mut self) {
        self.next_vertex = 0;
        self.links.clear();
        self.link_pos = 0;
        self.pending.clear();
        self.even_ghosts = self.complex.even_ghosts.iter();
    }

    fn keep(&self, tet: &Tetrahedron, other: Tag) -> bool {
        match self.mode {
            IterMode::All => true,
            IterMode::Solid if is_ghost(tet) => false,
            IterMode::Unique | IterMode::Solid => canonical_key(tet) == pair_key(self.owner, other),
        }
    }

    /// Queues the tetrahedra of the ring of `(owner, other)`.
    fn expand(&mut self, other: Tag, ring: Tag) {
        let owner = self.owner;
        let tags = LinkRing::from_tag(ring, owner).tags(self.complex.molecules());
        let n = tags.len();
        for i in 0..n {
            let (c, d) = (tags[i], tags[(i + 1) % n]);
            if c != GHOST_VERTEX && d != GHOST_VERTEX {
                let tet = [owner, other, c, d];
                if self.keep(&tet, other) {
                    self.pending.push(tet);
                }
            }
        }
        self.pending.reverse();
    }
}

impl<V: VertexAllocation> Iterator for Tetrahedra<'_, V> {
    type Item = Tetrahedron;

    fn next(&mut self) -> Option<Tetrahedron> {
        loop {
            if let Some(tet) = self.pending.pop() {
                return Some(tet);
            }
            if let Some(&(other, ring)) = self.links.get(self.link_pos) {
                self.link_pos += 1;
                self.expand(other, ring);
                continue;
            }
            if self.next_vertex >= self.complex.star_end {
                if self.mode == IterMode::Solid {
                    return None;
                }
                return self.even_ghosts.next().map(|&[a, b, c]| [a, b, c, GHOST_VERTEX]);
            }
            let vertex = self.next_vertex;
            self.next_vertex += 1;
            if let Some(star) = self.complex.star(vertex) {
                self.owner = vertex;
                self.links = Link2d::from_tag(star.link_head(), vertex).pairs(self.complex.molecules());
                self.link_pos = 0;
            }
        }
    }
}

impl<V: VertexAllocation> TetComplex<V> {
    /// Every stored copy of every tetrahedron, ghost tetrahedra included.
    #[must_use]
    pub fn iter_all(&self) -> Tetrahedra<'_, V> {
        Tetrahedra::new(self, IterMode::All)
    }

    /// Every tetrahedron once, ghost tetrahedra included.
    #[must_use]
    pub fn iter(&self) -> Tetrahedra<'_, V> {
        Tetrahedra::new(self, IterMode::Unique)
    }

    /// Every solid tetrahedron once.
    #[must_use]
    pub fn iter_solid(&self) -> Tetrahedra<'_, V> {
        Tetrahedra::new(self, IterMode::Solid)
    }

    /// Iterator in the given mode.
    #[must_use]
    pub fn tetrahedra(&self, mode: IterMode) -> Tetrahedra<'_, V> {
        Tetrahedra::new(self, mode)
    }
}
