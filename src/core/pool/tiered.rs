//! Two-level, index-addressable array of records.
//!
//! A [`TieredArrayPool`] maps a `u64` index to a record through a resizable
//! top array of blocks; each block holds `2^log2_objects_per_block` records
//! and is allocated on first touch. Records never move once their block
//! exists, so indices stay valid for the life of the pool (or until
//! [`TieredArrayPool::restart`]).

use tracing::debug;

/// Initial length of the top array.
pub const TOP_ARRAY_START_SIZE: usize = 128;

/// Growth factor of the top array.
pub const TOP_RESIZE_FACTOR: usize = 3;

/// How indices are handed out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolDiscipline {
    /// The caller chooses indices and accesses them with
    /// [`TieredArrayPool::get_or_create`].
    Indexed,
    /// The pool hands out indices with [`TieredArrayPool::allocate`] and
    /// recycles freed ones first.
    Recycling,
}

/// A growable array of blocks of `T`, addressed by `u64` index.
///
/// # Examples
///
/// ```rust
/// use tetstar::core::pool::{PoolDiscipline, TieredArrayPool};
///
/// let mut pool: TieredArrayPool<u32> = TieredArrayPool::new(4, PoolDiscipline::Indexed);
/// *pool.get_or_create(1000) = 7;
/// assert_eq!(pool.get(1000), Some(&7));
/// assert_eq!(pool.get(1001), Some(&0));
/// assert_eq!(pool.get(10), None);
/// ```
#[derive(Clone, Debug)]
pub struct TieredArrayPool<T> {
    top: Vec<Option<Box<[T]>>>,
    log2_objects_per_block: u32,
    discipline: PoolDiscipline,
    /// First index never handed out by `allocate`.
    first_virgin: u64,
    dead: Vec<u64>,
    allocated: u64,
    blocks: usize,
}

impl<T: Default> TieredArrayPool<T> {
    /// Creates an empty pool. No memory is reserved until the first access.
    ///
    /// # Panics
    ///
    /// Panics if `log2_objects_per_block` is 32 or more.
    #[must_use]
    pub fn new(log2_objects_per_block: u32, discipline: PoolDiscipline) -> Self {
        assert!(
            log2_objects_per_block < 32,
            "block size 2^{log2_objects_per_block} is too large"
        );
        Self {
            top: Vec::new(),
            log2_objects_per_block,
            discipline,
            first_virgin: 0,
            dead: Vec::new(),
            allocated: 0,
            blocks: 0,
        }
    }

    #[inline]
    const fn objects_per_block(&self) -> usize {
        1 << self.log2_objects_per_block
    }

    #[inline]
    fn split(&self, index: u64) -> (usize, usize) {
        let block = usize::try_from(index >> self.log2_objects_per_block).unwrap_or(usize::MAX);
        let offset = (index & ((1 << self.log2_objects_per_block) - 1)) as usize;
        (block, offset)
    }

    /// Discipline chosen at construction.
    #[must_use]
    pub const fn discipline(&self) -> PoolDiscipline {
        self.discipline
    }

    /// Returns the record at `index` if its block has been allocated.
    #[inline]
    #[must_use]
    pub fn get(&self, index: u64) -> Option<&T> {
        let (block, offset) = self.split(index);
        self.top.get(block)?.as_ref().map(|b| &b[offset])
    }

    /// Mutable counterpart of [`get`](Self::get).
    #[inline]
    pub fn get_mut(&mut self, index: u64) -> Option<&mut T> {
        let (block, offset) = self.split(index);
        self.top.get_mut(block)?.as_mut().map(|b| &mut b[offset])
    }

    /// Returns the record at `index`, allocating its block (and growing the
    /// top array) on first touch. Fresh records hold `T::default()`.
    ///
    /// # Panics
    ///
    /// Panics if `index` cannot be addressed on this platform.
    pub fn get_or_create(&mut self, index: u64) -> &mut T {
        let (block, offset) = self.split(index);
        assert!(block < usize::MAX, "index {index} is out of range");
        if block >= self.top.len() {
            let mut new_len = self.top.len().max(TOP_ARRAY_START_SIZE);
            while new_len <= block {
                new_len = new_len.saturating_mul(TOP_RESIZE_FACTOR);
            }
            if !self.top.is_empty() {
                debug!(
                    "[pool] growing top array from {} to {new_len} blocks",
                    self.top.len()
                );
            }
            self.top.resize_with(new_len, || None);
        }
        let per_block = self.objects_per_block();
        let slot = &mut self.top[block];
        if slot.is_none() {
            self.blocks += 1;
        }
        &mut slot.get_or_insert_with(|| (0..per_block).map(|_| T::default()).collect())[offset]
    }

    /// Returns the record at `index`, which must already be allocated.
    ///
    /// # Panics
    ///
    /// Panics if the block holding `index` was never allocated.
    #[inline]
    #[must_use]
    pub fn get_allocated(&self, index: u64) -> &T {
        match self.get(index) {
            Some(record) => record,
            None => panic!("index {index} was never allocated"),
        }
    }

    /// Mutable counterpart of [`get_allocated`](Self::get_allocated).
    ///
    /// # Panics
    ///
    /// Panics if the block holding `index` was never allocated.
    #[inline]
    pub fn get_allocated_mut(&mut self, index: u64) -> &mut T {
        match self.get_mut(index) {
            Some(record) => record,
            None => panic!("index {index} was never allocated"),
        }
    }

    /// Hands out a fresh or recycled index (recycling discipline).
    ///
    /// A recycled record keeps whatever its previous owner left in it.
    pub fn allocate(&mut self) -> (u64, &mut T) {
        debug_assert_eq!(self.discipline, PoolDiscipline::Recycling);
        let index = self.dead.pop().unwrap_or_else(|| {
            let index = self.first_virgin;
            self.first_virgin += 1;
            index
        });
        self.allocated += 1;
        (index, self.get_or_create(index))
    }

    /// Returns `index` to the free list (recycling discipline).
    pub fn free(&mut self, index: u64) {
        debug_assert_eq!(self.discipline, PoolDiscipline::Recycling);
        debug_assert!(index < self.first_virgin, "index {index} was never allocated");
        self.dead.push(index);
        self.allocated = self.allocated.saturating_sub(1);
    }

    /// Number of live indices handed out by [`allocate`](Self::allocate).
    #[must_use]
    pub const fn allocated(&self) -> u64 {
        self.allocated
    }

    /// One past the largest index [`allocate`](Self::allocate) ever returned.
    #[must_use]
    pub const fn first_virgin(&self) -> u64 {
        self.first_virgin
    }

    /// Number of allocated blocks.
    #[must_use]
    pub const fn blocks(&self) -> usize {
        self.blocks
    }

    /// Largest index covered by the top array, plus one.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        (self.top.len() as u64) << self.log2_objects_per_block
    }

    /// Bytes held by the top array and the allocated blocks.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.top.capacity() * size_of::<Option<Box<[T]>>>()
            + self.blocks * self.objects_per_block() * size_of::<T>()
    }

    /// Forgets every record but keeps the blocks for reuse. Records are reset
    /// to `T::default()`.
    pub fn restart(&mut self) {
        self.restart_with(|record| *record = T::default());
    }

    /// Forgets every record but keeps the blocks, resetting each allocated
    /// record in place with `reset`. Records that own buffers can clear them
    /// here without giving up their allocations.
    pub fn restart_with(&mut self, mut reset: impl FnMut(&mut T)) {
        for block in self.top.iter_mut().flatten() {
            block.iter_mut().for_each(&mut reset);
        }
        self.first_virgin = 0;
        self.dead.clear();
        self.allocated = 0;
    }
}
