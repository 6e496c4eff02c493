//! Index-addressable storage for stars, molecules, and vertices.
//!
//! - [`TieredArrayPool`]: a two-level array addressed by `u64` index.
//! - [`ProximityPool`]: a locality-grouping allocator that hands out compact
//!   tags and keeps records with the same allocation index together.
//! - [`VertexAllocation`]: maps a vertex tag to the allocation index that
//!   its star's molecules should use.

pub mod proximity;
pub mod tiered;

pub use proximity::{LOG2_OBJECTS_PER_MINI, MINIS_PER_GROUP, OBJECTS_PER_MINI, ProximityPool};
pub use tiered::{PoolDiscipline, TieredArrayPool};

use crate::core::tag::{AllocIndex, Tag};

/// Source of allocation indices for vertex tags.
///
/// The complex allocates the molecules of a vertex's star with the vertex's
/// allocation index, so that stars of nearby vertices share minipools.
pub trait VertexAllocation {
    /// Allocation index to use for the star of `vertex`.
    fn allocation_index(&self, vertex: Tag) -> AllocIndex;
}

impl<V: VertexAllocation + ?Sized> VertexAllocation for &V {
    fn allocation_index(&self, vertex: Tag) -> AllocIndex {
        (**self).allocation_index(vertex)
    }
}

impl<V: VertexAllocation + ?Sized> VertexAllocation for &mut V {
    fn allocation_index(&self, vertex: Tag) -> AllocIndex {
        (**self).allocation_index(vertex)
    }
}

impl<T: Default, S: Default> VertexAllocation for ProximityPool<T, S> {
    fn allocation_index(&self, vertex: Tag) -> AllocIndex {
        ProximityPool::allocation_index(self, vertex).unwrap_or(0)
    }
}

/// Derives an allocation index from the tag alone: vertices whose tags share
/// a minipool-sized block share an index. Useful when vertices are numbered
/// in spatial order by the caller.
///
/// # Examples
///
/// ```rust
/// use tetstar::core::pool::{TagBlocks, VertexAllocation};
///
/// assert_eq!(TagBlocks.allocation_index(5), 0);
/// assert_eq!(TagBlocks.allocation_index(5000), 4);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TagBlocks;

impl VertexAllocation for TagBlocks {
    fn allocation_index(&self, vertex: Tag) -> AllocIndex {
        vertex >> LOG2_OBJECTS_PER_MINI
    }
}
