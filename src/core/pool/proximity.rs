//! Allocator that co-locates records sharing an allocation index.
//!
//! Records live in *minipools* of [`OBJECTS_PER_MINI`] slots. Every
//! allocation index owns a *poolpool*: a free list of its minipools that
//! still have room, plus a cursor into a reserved group of
//! [`MINIS_PER_GROUP`] consecutive minipools. Records allocated with the same
//! index therefore end up in the same or neighbouring minipools, and their
//! tags (`minipool << 10 | slot`) are numerically close, which is what makes
//! tag compression effective.

use tracing::debug;

use super::tiered::{PoolDiscipline, TieredArrayPool};
use crate::core::tag::{AllocIndex, Tag};

/// Log2 of the number of records per minipool.
pub const LOG2_OBJECTS_PER_MINI: u32 = 10;

/// Records per minipool.
pub const OBJECTS_PER_MINI: usize = 1 << LOG2_OBJECTS_PER_MINI;

/// Minipools reserved at once for a single allocation index.
pub const MINIS_PER_GROUP: u64 = 8;

const LOG2_POOLPOOLS_PER_BLOCK: u32 = 8;
const LOG2_MINIS_PER_BLOCK: u32 = 6;
const LIVE_WORDS: usize = OBJECTS_PER_MINI / 64;
const SLOT_MASK: Tag = (1 << LOG2_OBJECTS_PER_MINI) - 1;
/// Minipool indices must leave room for the slot bits and the sentinels.
const MAX_MINIPOOLS: u64 = 1 << (Tag::BITS - LOG2_OBJECTS_PER_MINI - 1);

#[derive(Clone, Debug, Default)]
struct MiniHeader {
    in_use: bool,
    alloc_index: AllocIndex,
    /// Next minipool on the owning poolpool's free list.
    next_free: Option<u64>,
    /// On the free list right now.
    enqueued: bool,
    first_virgin: u16,
    free_stack: Vec<u16>,
    live: [u64; LIVE_WORDS],
    live_count: u16,
}

impl MiniHeader {
    fn is_live(&self, slot: usize) -> bool {
        self.live[slot / 64] & (1 << (slot % 64)) != 0
    }

    fn set_live(&mut self, slot: usize, live: bool) {
        if live {
            self.live[slot / 64] |= 1 << (slot % 64);
        } else {
            self.live[slot / 64] &= !(1 << (slot % 64));
        }
    }

    fn is_full(&self) -> bool {
        usize::from(self.live_count) == OBJECTS_PER_MINI
    }

    /// Returns the header to its unused state, keeping the free stack's
    /// allocation.
    fn reset(&mut self) {
        let mut free_stack = std::mem::take(&mut self.free_stack);
        free_stack.clear();
        *self = Self {
            free_stack,
            ..Self::default()
        };
    }
}

#[derive(Clone, Debug)]
struct MiniPool<T, S> {
    header: MiniHeader,
    objects: Vec<T>,
    supplementary: Vec<S>,
}

impl<T, S> Default for MiniPool<T, S> {
    fn default() -> Self {
        Self {
            header: MiniHeader::default(),
            objects: Vec::new(),
            supplementary: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct PoolPool {
    free_head: Option<u64>,
    free_tail: Option<u64>,
    /// Next unused minipool of the reserved group.
    group_cursor: Option<u64>,
}

/// Locality-grouping allocator of `T` records with optional supplementary
/// `S` records stored alongside.
///
/// # Examples
///
/// ```rust
/// use tetstar::core::pool::ProximityPool;
///
/// let mut pool: ProximityPool<[u8; 20]> = ProximityPool::new();
/// let (a, record) = pool.allocate(3);
/// record[0] = 42;
/// let (b, _) = pool.allocate(3);
/// assert_eq!(b, a + 1);
/// assert_eq!(pool.get(a).map(|r| r[0]), Some(42));
/// assert_eq!(pool.allocation_index(a), Some(3));
/// pool.free(a);
/// assert_eq!(pool.get(a), None);
/// ```
#[derive(Clone, Debug)]
pub struct ProximityPool<T, S = ()> {
    minipools: TieredArrayPool<MiniPool<T, S>>,
    poolpools: TieredArrayPool<PoolPool>,
    next_group: u64,
    objects: u64,
    max_objects: u64,
}

impl<T: Default, S: Default> Default for ProximityPool<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default, S: Default> ProximityPool<T, S> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            minipools: TieredArrayPool::new(LOG2_MINIS_PER_BLOCK, PoolDiscipline::Indexed),
            poolpools: TieredArrayPool::new(LOG2_POOLPOOLS_PER_BLOCK, PoolDiscipline::Indexed),
            next_group: 0,
            objects: 0,
            max_objects: 0,
        }
    }

    #[inline]
    const fn split(tag: Tag) -> (u64, usize) {
        (tag >> LOG2_OBJECTS_PER_MINI, (tag & SLOT_MASK) as usize)
    }

    fn live_mini(&self, mini: u64) -> Option<&MiniPool<T, S>> {
        self.minipools.get(mini).filter(|m| m.header.in_use)
    }

    fn live_mini_mut(&mut self, mini: u64) -> Option<&mut MiniPool<T, S>> {
        self.minipools.get_mut(mini).filter(|m| m.header.in_use)
    }

    fn init_minipool(&mut self, mini: u64, alloc_index: AllocIndex) {
        assert!(
            mini < MAX_MINIPOOLS,
            "proximity pool exhausted its tag space ({mini} minipools)"
        );
        let record = self.minipools.get_or_create(mini);
        record.header.reset();
        record.header.in_use = true;
        record.header.alloc_index = alloc_index;
        if record.objects.is_empty() {
            record.objects.resize_with(OBJECTS_PER_MINI, T::default);
            record.supplementary.resize_with(OBJECTS_PER_MINI, S::default);
        }
    }

    /// Appends `mini` to the tail of its poolpool's free list.
    fn enqueue(&mut self, alloc_index: AllocIndex, mini: u64) {
        let pool = *self.poolpools.get_or_create(alloc_index);
        if let Some(tail) = pool.free_tail {
            self.minipools.get_allocated_mut(tail).header.next_free = Some(mini);
        }
        let header = &mut self.minipools.get_allocated_mut(mini).header;
        header.next_free = None;
        header.enqueued = true;
        let pool = self.poolpools.get_or_create(alloc_index);
        if pool.free_head.is_none() {
            pool.free_head = Some(mini);
        }
        pool.free_tail = Some(mini);
    }

    /// Finds a minipool with room for `alloc_index`, reserving a new group
    /// when needed.
    fn minipool_with_room(&mut self, alloc_index: AllocIndex) -> u64 {
        let pool = *self.poolpools.get_or_create(alloc_index);
        if let Some(head) = pool.free_head {
            return head;
        }
        let mini = match pool.group_cursor {
            Some(mini) => mini,
            None => {
                let group = self.next_group;
                self.next_group = group
                    .checked_add(MINIS_PER_GROUP)
                    .unwrap_or_else(|| panic!("proximity pool exhausted its tag space"));
                debug!("[pool] allocation index {alloc_index} reserves minipool group at {group}");
                group
            }
        };
        let next = mini + 1;
        self.poolpools.get_or_create(alloc_index).group_cursor =
            (next % MINIS_PER_GROUP != 0).then_some(next);
        self.init_minipool(mini, alloc_index);
        self.enqueue(alloc_index, mini);
        mini
    }

    /// Allocates a record near other records of `alloc_index`.
    ///
    /// The returned record (and its supplementary record) holds
    /// `Default::default()`.
    ///
    /// # Panics
    ///
    /// Panics if the tag space is exhausted.
    pub fn allocate(&mut self, alloc_index: AllocIndex) -> (Tag, &mut T) {
        let mini = self.minipool_with_room(alloc_index);
        let record = self.minipools.get_allocated_mut(mini);
        let header = &mut record.header;
        let slot = match header.free_stack.pop() {
            Some(slot) => usize::from(slot),
            None => {
                let slot = usize::from(header.first_virgin);
                header.first_virgin += 1;
                slot
            }
        };
        header.set_live(slot, true);
        header.live_count += 1;
        let full = header.is_full();
        record.objects[slot] = T::default();
        record.supplementary[slot] = S::default();

        if full {
            // A full minipool is always the head of its free list.
            let next = record.header.next_free.take();
            record.header.enqueued = false;
            let pool = self.poolpools.get_or_create(alloc_index);
            pool.free_head = next;
            if next.is_none() {
                pool.free_tail = None;
            }
        }

        self.objects += 1;
        self.max_objects = self.max_objects.max(self.objects);
        let tag = (mini << LOG2_OBJECTS_PER_MINI) | slot as Tag;
        (tag, &mut self.minipools.get_allocated_mut(mini).objects[slot])
    }

    /// Releases the record named by `tag`.
    pub fn free(&mut self, tag: Tag) {
        let (mini, slot) = Self::split(tag);
        let Some(record) = self.live_mini_mut(mini) else {
            debug_assert!(false, "freeing tag {tag} from an unused minipool");
            return;
        };
        let header = &mut record.header;
        if !header.is_live(slot) {
            debug_assert!(false, "double free of tag {tag}");
            return;
        }
        let was_full = header.is_full();
        header.set_live(slot, false);
        header.live_count -= 1;
        // Slot indices fit in u16 because OBJECTS_PER_MINI <= 65536.
        header.free_stack.push(slot as u16);
        let alloc_index = header.alloc_index;
        let enqueued = header.enqueued;
        self.objects -= 1;
        if was_full && !enqueued {
            self.enqueue(alloc_index, mini);
        }
    }

    /// The record named by `tag`, if it is live.
    #[inline]
    #[must_use]
    pub fn get(&self, tag: Tag) -> Option<&T> {
        let (mini, slot) = Self::split(tag);
        let record = self.live_mini(mini)?;
        record.header.is_live(slot).then(|| &record.objects[slot])
    }

    /// Mutable counterpart of [`get`](Self::get).
    #[inline]
    pub fn get_mut(&mut self, tag: Tag) -> Option<&mut T> {
        let (mini, slot) = Self::split(tag);
        let record = self.live_mini_mut(mini)?;
        if record.header.is_live(slot) {
            Some(&mut record.objects[slot])
        } else {
            None
        }
    }

    /// The supplementary record stored next to `tag`.
    #[must_use]
    pub fn supplementary(&self, tag: Tag) -> Option<&S> {
        let (mini, slot) = Self::split(tag);
        let record = self.live_mini(mini)?;
        record.header.is_live(slot).then(|| &record.supplementary[slot])
    }

    /// Mutable counterpart of [`supplementary`](Self::supplementary).
    pub fn supplementary_mut(&mut self, tag: Tag) -> Option<&mut S> {
        let (mini, slot) = Self::split(tag);
        let record = self.live_mini_mut(mini)?;
        if record.header.is_live(slot) {
            Some(&mut record.supplementary[slot])
        } else {
            None
        }
    }

    /// Allocation index of the minipool that holds `tag`.
    ///
    /// Returns `None` when the minipool is not in use. A freed slot of a live
    /// minipool still reports the minipool's index.
    #[must_use]
    pub fn allocation_index(&self, tag: Tag) -> Option<AllocIndex> {
        let (mini, _) = Self::split(tag);
        self.live_mini(mini).map(|m| m.header.alloc_index)
    }

    /// Smallest live tag, if any.
    #[must_use]
    pub fn first_allocated(&self) -> Option<Tag> {
        self.scan_from(0)
    }

    /// Smallest live tag greater than `tag`.
    #[must_use]
    pub fn next_allocated(&self, tag: Tag) -> Option<Tag> {
        self.scan_from(tag.checked_add(1)?)
    }

    fn scan_from(&self, start: Tag) -> Option<Tag> {
        let (first_mini, first_slot) = Self::split(start);
        (first_mini..self.next_group).find_map(|mini| {
            let record = self.live_mini(mini)?;
            let from = if mini == first_mini { first_slot } else { 0 };
            let end = usize::from(record.header.first_virgin);
            (from..end)
                .find(|&slot| record.header.is_live(slot))
                .map(|slot| (mini << LOG2_OBJECTS_PER_MINI) | slot as Tag)
        })
    }

    /// Iterates over live `(tag, record)` pairs in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (Tag, &T)> + '_ {
        std::iter::successors(self.first_allocated(), |&tag| self.next_allocated(tag))
            .filter_map(|tag| self.get(tag).map(|record| (tag, record)))
    }

    /// Number of live records.
    #[must_use]
    pub const fn objects(&self) -> u64 {
        self.objects
    }

    /// Largest number of records that were live at the same time.
    #[must_use]
    pub const fn max_objects(&self) -> u64 {
        self.max_objects
    }

    /// Approximate bytes held by the pool.
    #[must_use]
    pub fn bytes(&self) -> usize {
        let per_mini = OBJECTS_PER_MINI * (size_of::<T>() + size_of::<S>());
        self.minipools.bytes()
            + self.poolpools.bytes()
            + self.minipools.blocks() * (1 << LOG2_MINIS_PER_BLOCK) * per_mini
    }

    /// Forgets every record. Minipools keep their record arrays, so a
    /// restarted pool refills without reallocating them.
    pub fn restart(&mut self) {
        self.minipools.restart_with(|mini| mini.header.reset());
        self.poolpools.restart();
        self.next_group = 0;
        self.objects = 0;
        self.max_objects = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_index_records_are_adjacent() {
        let mut pool: ProximityPool<u32> = ProximityPool::new();
        let tags: Vec<Tag> = (0..10).map(|_| pool.allocate(5).0).collect();
        assert!(tags.windows(2).all(|w| w[1] == w[0] + 1));

        let (other, _) = pool.allocate(6);
        assert_eq!(other >> LOG2_OBJECTS_PER_MINI, MINIS_PER_GROUP);
        assert_eq!(pool.allocation_index(other), Some(6));
        assert_eq!(pool.objects(), 11);
    }

    #[test]
    fn test_freed_slots_are_reused_first() {
        let mut pool: ProximityPool<u32> = ProximityPool::new();
        let (a, _) = pool.allocate(0);
        let (b, _) = pool.allocate(0);
        pool.free(a);
        assert_eq!(pool.objects(), 1);
        assert_eq!(pool.max_objects(), 2);
        let (c, record) = pool.allocate(0);
        assert_eq!(*record, 0);
        assert_eq!(c, a);
        assert_ne!(c, b);
    }

    #[test]
    fn test_full_minipool_moves_to_next_in_group() {
        let mut pool: ProximityPool<u8> = ProximityPool::new();
        let tags: Vec<Tag> = (0..=OBJECTS_PER_MINI).map(|_| pool.allocate(2).0).collect();
        let last = tags[OBJECTS_PER_MINI];
        assert_eq!(last >> LOG2_OBJECTS_PER_MINI, 1);

        // Freeing from the full minipool queues it behind the current one.
        pool.free(tags[17]);
        assert_eq!(pool.get(tags[17]), None);
        assert_eq!(pool.allocate(2).0 >> LOG2_OBJECTS_PER_MINI, 1);
        let rest = OBJECTS_PER_MINI - 2;
        for _ in 0..rest {
            pool.allocate(2);
        }
        assert_eq!(pool.allocate(2).0, tags[17]);
    }

    #[test]
    fn test_iteration_visits_live_records_in_order() {
        let mut pool: ProximityPool<u32, u16> = ProximityPool::new();
        let mut tags = Vec::new();
        for i in 0..6u32 {
            let (tag, record) = pool.allocate(u64::from(i % 2));
            *record = i;
            *pool.supplementary_mut(tag).unwrap() = 100 + i as u16;
            tags.push(tag);
        }
        pool.free(tags[2]);
        let mut expected: Vec<Tag> = tags.iter().copied().filter(|&t| t != tags[2]).collect();
        expected.sort_unstable();
        let visited: Vec<Tag> = pool.iter().map(|(tag, _)| tag).collect();
        assert_eq!(visited, expected);
        assert_eq!(pool.supplementary(tags[3]), Some(&103));
        assert_eq!(pool.supplementary(tags[2]), None);
    }

    #[test]
    fn test_restart_forgets_records() {
        let mut pool: ProximityPool<u32> = ProximityPool::new();
        let (tag, _) = pool.allocate(9);
        pool.restart();
        assert_eq!(pool.get(tag), None);
        assert_eq!(pool.objects(), 0);
        assert_eq!(pool.first_allocated(), None);
        assert_eq!(pool.allocate(9).0, 0);
    }

    #[test]
    fn test_restart_keeps_minipool_buffers() {
        let mut pool: ProximityPool<[u8; 20], u16> = ProximityPool::new();
        for i in 0..40 {
            pool.allocate(i % 3);
        }
        let buffers = |pool: &ProximityPool<[u8; 20], u16>, mini: u64| {
            let record = pool.minipools.get(mini).unwrap();
            (record.objects.as_ptr(), record.objects.capacity(), record.supplementary.capacity())
        };
        let before = buffers(&pool, 0);
        assert_eq!(before.1, OBJECTS_PER_MINI);
        let bytes = pool.bytes();

        pool.restart();
        assert_eq!(buffers(&pool, 0), before);
        assert!(!pool.minipools.get(0).unwrap().header.in_use);
        assert_eq!(pool.bytes(), bytes);

        let (tag, record) = pool.allocate(1);
        assert_eq!(tag, 0);
        assert_eq!(*record, [0; 20]);
        assert_eq!(buffers(&pool, 0), before);
        assert_eq!(pool.allocation_index(tag), Some(1));
    }
}
