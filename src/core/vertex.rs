//! Vertex records and the vertex pool.
//!
//! A [`VertexPool`] stores [`Vertex`] records in a [`ProximityPool`], so the
//! tags of vertices that are close in space are numerically close and the
//! molecules of their stars share minipools. Per-vertex attributes live in
//! the pool's supplementary records, next to the vertex they describe.
//!
//! # Examples
//!
//! ```rust
//! use tetstar::core::vertex::VertexPool;
//!
//! let points = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
//! let (pool, tags) = VertexPool::from_points(&points);
//! assert_eq!(pool.len(), 3);
//! assert_eq!(pool.coord(tags[1]), Some([1.0, 0.0, 0.0]));
//! assert_eq!(pool.vertex(tags[2]).map(|v| v.number), Some(2));
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::collections::SmallBuffer;
use crate::core::pool::{ProximityPool, VertexAllocation};
use crate::core::spatial::SpatialAllocationIndex;
use crate::core::spatial::zorder::{Point3, zorder_sorted_indices};
use crate::core::tag::{AllocIndex, Tag};

/// Points per allocation-index sample, in z-order.
pub const POINTS_PER_SAMPLE: usize = 512;

/// Per-vertex attribute values, stored beside the vertex record.
pub type Attributes = SmallBuffer<f64, 4>;

/// A vertex of a mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Position.
    pub coord: Point3,
    /// Caller-defined flags (boundary markers and the like).
    pub mark: u32,
    /// Caller-defined number, such as the vertex's position in an input file.
    pub number: u64,
}

impl Vertex {
    /// A vertex at `coord` with no mark.
    #[must_use]
    pub const fn new(coord: Point3, number: u64) -> Self {
        Self {
            coord,
            mark: 0,
            number,
        }
    }
}

/// Spatially grouped storage of [`Vertex`] records.
#[derive(Clone, Debug, Default)]
pub struct VertexPool {
    pool: ProximityPool<Vertex, Attributes>,
    samples: SpatialAllocationIndex,
    /// Insertions since the last sample was added.
    since_sample: usize,
    next_number: u64,
}

impl VertexPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-loads `points`. The points are visited in z-order and one
    /// allocation-index sample is taken every [`POINTS_PER_SAMPLE`] points,
    /// so each run of nearby points shares minipools.
    ///
    /// Returns the pool and the tag of each point, in input order. Vertex
    /// numbers are input positions.
    #[must_use]
    pub fn from_points(points: &[Point3]) -> (Self, Vec<Tag>) {
        let mut pool = Self::new();
        let mut tags = vec![0; points.len()];
        let mut alloc_index: AllocIndex = 0;
        for (rank, input) in zorder_sorted_indices(points).into_iter().enumerate() {
            let coord = points[input];
            if rank % POINTS_PER_SAMPLE == 0 {
                alloc_index = pool.samples.insert_point(&coord);
            }
            let (tag, vertex) = pool.pool.allocate(alloc_index);
            *vertex = Vertex::new(coord, input as u64);
            tags[input] = tag;
        }
        pool.since_sample = points.len() % POINTS_PER_SAMPLE;
        pool.next_number = points.len() as u64;
        debug!(
            "[vertex] loaded {} points with {} allocation samples",
            points.len(),
            pool.samples.len()
        );
        (pool, tags)
    }

    /// Adds one vertex near its spatial neighbours and returns its tag.
    /// The vertex is numbered after every vertex inserted so far.
    pub fn insert(&mut self, coord: Point3, attributes: &[f64]) -> Tag {
        let alloc_index = match self.samples.index_of(&coord) {
            Some(index) if self.since_sample < POINTS_PER_SAMPLE => index,
            _ => {
                self.since_sample = 0;
                self.samples.insert_point(&coord)
            }
        };
        self.since_sample += 1;
        let number = self.next_number;
        self.next_number += 1;
        let (tag, vertex) = self.pool.allocate(alloc_index);
        *vertex = Vertex::new(coord, number);
        if !attributes.is_empty() {
            if let Some(slot) = self.pool.supplementary_mut(tag) {
                slot.extend_from_slice(attributes);
            }
        }
        tag
    }

    /// Frees the vertex named by `tag` and returns it.
    pub fn remove(&mut self, tag: Tag) -> Option<Vertex> {
        let vertex = *self.pool.get(tag)?;
        self.pool.free(tag);
        Some(vertex)
    }

    /// The vertex named by `tag`.
    #[must_use]
    pub fn vertex(&self, tag: Tag) -> Option<&Vertex> {
        self.pool.get(tag)
    }

    /// Mutable access to the vertex named by `tag`.
    pub fn vertex_mut(&mut self, tag: Tag) -> Option<&mut Vertex> {
        self.pool.get_mut(tag)
    }

    /// Position of the vertex named by `tag`.
    #[must_use]
    pub fn coord(&self, tag: Tag) -> Option<Point3> {
        self.pool.get(tag).map(|v| v.coord)
    }

    /// Attribute values of the vertex named by `tag`.
    #[must_use]
    pub fn attributes(&self, tag: Tag) -> Option<&[f64]> {
        self.pool.get(tag)?;
        self.pool.supplementary(tag).map(|attrs| attrs.as_slice())
    }

    /// Replaces the attribute values of the vertex named by `tag`. Returns
    /// false when no such vertex exists.
    pub fn set_attributes(&mut self, tag: Tag, attributes: &[f64]) -> bool {
        if self.pool.get(tag).is_none() {
            return false;
        }
        self.pool.supplementary_mut(tag).is_some_and(|slot| {
            slot.clear();
            slot.extend_from_slice(attributes);
            true
        })
    }

    /// Allocation index shared by the vertex's neighbourhood.
    #[must_use]
    pub fn allocation_index(&self, tag: Tag) -> Option<AllocIndex> {
        self.pool.allocation_index(tag)
    }

    /// Number of live vertices.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.pool.objects()
    }

    /// Returns true when the pool holds no vertices.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pool.objects() == 0
    }

    /// Live vertices in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (Tag, &Vertex)> + '_ {
        self.pool.iter()
    }

    /// Bytes held by vertex storage and the sample tree.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.pool.bytes() + self.samples.bytes()
    }

    /// Forgets every vertex, keeping storage for reuse.
    pub fn restart(&mut self) {
        self.pool.restart();
        self.samples.restart();
        self.since_sample = 0;
        self.next_number = 0;
    }
}

impl VertexAllocation for VertexPool {
    fn allocation_index(&self, vertex: Tag) -> AllocIndex {
        self.pool.allocation_index(vertex).unwrap_or(0)
    }
}
