//! 2D links: the set of `(vertex, link ring)` pairs attached to one vertex.
//!
//! The 2D link of vertex `v` lists, for every edge `(v, w)` whose ring `v`
//! owns, the neighbour `w` and the tag of the ring. It is stored as a
//! molecule chain of alternating compressed tags: `w` compressed against
//! `v`, and the ring tag compressed against the link's head tag. New pairs
//! are appended at the tail molecule, whose tag the owner keeps.
//!
//! Ring lookups go through a [`Link2dCache`], a two-way set-associative
//! cache keyed by `(link head, vertex)`.

use super::link_ring::{LinkRing, RingError};
use super::molecule::{ChainTags, MoleculeChain, MoleculePool};
use crate::core::collections::{AtomBuffer, LinkBuffer};
use crate::core::tag::{AllocIndex, GHOST_VERTEX, NOT_A_TAG, Tag, push_compressed};

/// Entries in the 2D link cache.
pub const LINK2D_CACHE_SIZE: usize = 16384;

/// Multiplier of the cache hash.
pub const LINK2D_PRIME: u64 = 16_908_799;

const CACHE_SETS: usize = LINK2D_CACHE_SIZE / 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CacheEntry {
    link: Tag,
    vertex: Tag,
    ring: Tag,
}

const EMPTY_ENTRY: CacheEntry = CacheEntry {
    link: NOT_A_TAG,
    vertex: NOT_A_TAG,
    ring: NOT_A_TAG,
};

/// Two-way set-associative cache from `(link head, vertex)` to ring tag.
///
/// Within a set, slot 0 holds the most recently used entry.
#[derive(Clone, Debug)]
pub struct Link2dCache {
    entries: Box<[CacheEntry]>,
    hits: u64,
    misses: u64,
}

impl Default for Link2dCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Link2dCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: vec![EMPTY_ENTRY; LINK2D_CACHE_SIZE].into_boxed_slice(),
            hits: 0,
            misses: 0,
        }
    }

    #[inline]
    fn set_of(link: Tag, vertex: Tag) -> usize {
        let hash = link.wrapping_mul(LINK2D_PRIME).wrapping_add(vertex);
        ((hash ^ (hash >> 17)) as usize & (CACHE_SETS - 1)) * 2
    }

    /// Cached ring of `vertex` in the link headed by `link`.
    pub fn lookup(&mut self, link: Tag, vertex: Tag) -> Option<Tag> {
        let set = Self::set_of(link, vertex);
        let matches = |e: &CacheEntry| e.link == link && e.vertex == vertex;
        if matches(&self.entries[set]) {
            self.hits += 1;
            return Some(self.entries[set].ring);
        }
        if matches(&self.entries[set + 1]) {
            self.entries.swap(set, set + 1);
            self.hits += 1;
            return Some(self.entries[set].ring);
        }
        self.misses += 1;
        None
    }

    /// Records `ring` as the ring of `vertex`, evicting the older entry of
    /// the set.
    pub fn insert(&mut self, link: Tag, vertex: Tag, ring: Tag) {
        let set = Self::set_of(link, vertex);
        self.entries[set + 1] = self.entries[set];
        self.entries[set] = CacheEntry { link, vertex, ring };
    }

    /// Drops any entry for `(link, vertex)`.
    pub fn invalidate(&mut self, link: Tag, vertex: Tag) {
        let set = Self::set_of(link, vertex);
        for slot in set..set + 2 {
            let entry = &mut self.entries[slot];
            if entry.link == link && entry.vertex == vertex {
                *entry = EMPTY_ENTRY;
            }
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.fill(EMPTY_ENTRY);
    }

    /// Lookups answered from the cache.
    #[must_use]
    pub const fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that fell through to the stored link.
    #[must_use]
    pub const fn misses(&self) -> u64 {
        self.misses
    }
}

/// Handle to a stored 2D link.
///
/// # Examples
///
/// ```rust
/// use tetstar::core::adjacency::{Link2d, Link2dCache, MoleculePool};
///
/// let mut pool = MoleculePool::new();
/// let mut cache = Link2dCache::new();
/// let link = Link2d::new(&mut pool, 0, 10);
/// let tail = link.head();
/// let (ring, tail, created) = link.find_or_insert(&mut pool, &mut cache, tail, 12);
/// assert!(created);
/// assert_eq!(link.find_ring(&pool, &mut cache, 12), Some(ring.tag()));
/// assert_eq!(link.find_or_insert(&mut pool, &mut cache, tail, 12).0, ring);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Link2d {
    chain: MoleculeChain,
    ground: Tag,
}

impl Link2d {
    /// Allocates an empty link for vertex `ground`.
    pub fn new(pool: &mut MoleculePool, alloc_index: AllocIndex, ground: Tag) -> Self {
        Self {
            chain: MoleculeChain::new(pool, alloc_index),
            ground,
        }
    }

    /// Wraps a stored link.
    #[must_use]
    pub const fn from_tag(head: Tag, ground: Tag) -> Self {
        Self {
            chain: MoleculeChain::from_head(head),
            ground,
        }
    }

    /// Tag of the head molecule.
    #[must_use]
    pub const fn head(self) -> Tag {
        self.chain.head()
    }

    /// The vertex this link belongs to.
    #[must_use]
    pub const fn ground(self) -> Tag {
        self.ground
    }

    /// Returns true when the link holds no pairs.
    #[must_use]
    pub fn is_empty(self, pool: &MoleculePool) -> bool {
        self.chain.is_empty(pool)
    }

    /// Bytes occupied by the link's own molecules (rings excluded).
    #[must_use]
    pub fn bytes(self, pool: &MoleculePool) -> usize {
        self.chain.bytes(pool)
    }

    /// Iterator over `(vertex, ring tag)` pairs in stored order.
    #[must_use]
    pub fn iter(self, pool: &MoleculePool) -> Link2dIter<'_> {
        Link2dIter {
            // Unused: `next` passes a ground per tag.
            tags: ChainTags::new(pool, self.chain, 0),
            pool,
            link: self,
        }
    }

    /// Decoded `(vertex, ring tag)` pairs.
    #[must_use]
    pub fn pairs(self, pool: &MoleculePool) -> LinkBuffer {
        self.iter(pool).collect()
    }

    /// Ring of edge `(ground, vertex)`, scanning the stored link.
    #[must_use]
    pub fn find_ring_uncached(self, pool: &MoleculePool, vertex: Tag) -> Option<Tag> {
        self.iter(pool).find(|&(w, _)| w == vertex).map(|(_, ring)| ring)
    }

    /// Ring of edge `(ground, vertex)`, through the cache.
    pub fn find_ring(self, pool: &MoleculePool, cache: &mut Link2dCache, vertex: Tag) -> Option<Tag> {
        if let Some(ring) = cache.lookup(self.head(), vertex) {
            return Some(ring);
        }
        let ring = self.find_ring_uncached(pool, vertex)?;
        cache.insert(self.head(), vertex, ring);
        Some(ring)
    }

    fn encode_pair(self, vertex: Tag, ring: Tag, atoms: &mut AtomBuffer) {
        push_compressed(self.ground, vertex, atoms);
        push_compressed(self.head(), ring, atoms);
    }

    /// Appends the pair `(vertex, ring)` at the tail. Returns the new tail.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::DuplicateVertex`] when `vertex` is already in the
    /// link.
    pub fn insert_vertex(
        self,
        pool: &mut MoleculePool,
        cache: &mut Link2dCache,
        tail: Tag,
        vertex: Tag,
        ring: Tag,
    ) -> Result<Tag, RingError> {
        if self.find_ring(pool, cache, vertex).is_some() {
            return Err(RingError::DuplicateVertex { vertex });
        }
        let mut atoms = AtomBuffer::new();
        self.encode_pair(vertex, ring, &mut atoms);
        let tail = self.chain.append(pool, tail, &atoms);
        cache.insert(self.head(), vertex, ring);
        Ok(tail)
    }

    /// Returns the ring of `(ground, vertex)`, creating and appending an
    /// empty one when absent. Returns `(ring, new tail, created)`.
    pub fn find_or_insert(
        self,
        pool: &mut MoleculePool,
        cache: &mut Link2dCache,
        tail: Tag,
        vertex: Tag,
    ) -> (LinkRing, Tag, bool) {
        if let Some(ring) = self.find_ring(pool, cache, vertex) {
            return (LinkRing::from_tag(ring, self.ground), tail, false);
        }
        let alloc_index = pool.allocation_index(self.head()).unwrap_or(0);
        let ring = LinkRing::new(pool, alloc_index, self.ground);
        let mut atoms = AtomBuffer::new();
        self.encode_pair(vertex, ring.tag(), &mut atoms);
        let tail = self.chain.append(pool, tail, &atoms);
        cache.insert(self.head(), vertex, ring.tag());
        (ring, tail, true)
    }

    /// Removes the pair for `vertex`. Returns the ring it held and the new
    /// tail, or `None` when `vertex` is absent. The ring itself is not freed.
    pub fn delete_vertex(
        self,
        pool: &mut MoleculePool,
        cache: &mut Link2dCache,
        vertex: Tag,
    ) -> Option<(Tag, Tag)> {
        let pairs = self.pairs(pool);
        let position = pairs.iter().position(|&(w, _)| w == vertex)?;
        let ring = pairs[position].1;
        let mut atoms = AtomBuffer::new();
        for &(w, r) in pairs.iter().filter(|&&(w, _)| w != vertex) {
            self.encode_pair(w, r, &mut atoms);
        }
        let tail = self.chain.replace_content(pool, &atoms);
        cache.invalidate(self.head(), vertex);
        Some((ring, tail))
    }

    /// Frees the link and every ring it references.
    pub fn delete(self, pool: &mut MoleculePool, cache: &mut Link2dCache) {
        for (_, ring) in self.pairs(pool) {
            MoleculeChain::from_head(ring).free(pool);
        }
        self.chain.free(pool);
        cache.clear();
    }
}

/// Iterator over the `(vertex, ring tag)` pairs of a [`Link2d`].
#[derive(Clone, Debug)]
pub struct Link2dIter<'a> {
    tags: ChainTags<'a>,
    pool: &'a MoleculePool,
    link: Link2d,
}

impl Link2dIter<'_> {
    /// Rewinds to the first pair.
    pub fn restart(&mut self) {
        self.tags = ChainTags::new(self.pool, self.link.chain, 0);
    }
}

impl Iterator for Link2dIter<'_> {
    type Item = (Tag, Tag);

    fn next(&mut self) -> Option<(Tag, Tag)> {
        // Each tag has its own ground, so the pair is decoded from raw atoms.
        let vertex = self.tags.next_with_ground(self.link.ground)?;
        let ring = self.tags.next_with_ground(self.link.head())?;
        debug_assert!(vertex != GHOST_VERTEX || ring != GHOST_VERTEX);
        Some((vertex, ring))
    }
}
