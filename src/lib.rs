//! # tetstar
//!
//! A succinct, cache-locality-aware representation of tetrahedral complexes
//! (3D simplicial meshes) that supports incremental topology edits and
//! adjacency queries while keeping memory close to the minimum.
//!
//! # Features
//!
//! - Per-vertex *stars*: each vertex stores the edges it owns and, for each,
//!   a compressed ring of the vertices around that edge
//! - Each tetrahedron is stored 2, 3 or 6 times rather than 12, thanks to a
//!   parity rule that decides which endpoint of an edge owns its ring
//! - Tags are delta-compressed against their owner and packed into 20-byte
//!   molecules allocated close together in memory
//! - Bistellar flips (1-4, 4-1, 2-3, 3-2), edge splits (1-2, 2-1) and a
//!   Bowyer–Watson star builder, all transactional, plus per-ring partial
//!   flips and squeezes for bulk drivers
//! - Ghost tetrahedra marking the boundary, held as gaps in the rings around
//!   them and recorded by face when no ghost edge ring can hold them
//! - A spatially grouped vertex pool and plain floating-point predicates
//! - Serialization of vertices, configuration and statistics with
//!   [serde](https://serde.rs)
//!
//! # Basic Usage
//!
//! Vertices are identified by integer tags. Tetrahedra are inserted as
//! positively oriented 4-tuples:
//!
//! ```rust
//! use tetstar::prelude::*;
//!
//! let mut complex: TetComplex = TetComplex::default();
//! complex.insert_tet(1, 2, 3, 4).unwrap();
//!
//! // Triangle (1, 2, 3) has vertex 4 on one side and nothing on the other.
//! assert_eq!(complex.adjacencies(1, 2, 3), Some([Apex::Vertex(4), Apex::Ghost]));
//!
//! // Split the tetrahedron with a new vertex, then merge it back.
//! complex.flip_14(1, 2, 3, 4, 5).unwrap();
//! assert_eq!(complex.tet_count(), 4);
//! complex.flip_41(1, 2, 3, 4, 5).unwrap();
//! assert_eq!(complex.iter_solid().count(), 1);
//! ```
//!
//! # Geometry
//!
//! The complex stores topology only. A [`VertexPool`](core::vertex::VertexPool)
//! keeps positions in spatially grouped storage and doubles as the allocation
//! source of the complex, so stars of nearby vertices share memory:
//!
//! ```rust
//! use tetstar::prelude::*;
//!
//! let points = [
//!     [0.0, 0.0, 0.0],
//!     [0.0, 1.0, 0.0],
//!     [1.0, 0.0, 0.0],
//!     [0.0, 0.0, 1.0],
//! ];
//! let (pool, tags) = VertexPool::from_points(&points);
//! let coords: Vec<_> = tags.iter().map(|&t| pool.coord(t).unwrap()).collect();
//! assert_eq!(
//!     orient3d(&coords[0], &coords[1], &coords[2], &coords[3]),
//!     Orientation::POSITIVE
//! );
//!
//! let mut complex = TetComplex::new(&pool);
//! complex.insert_tet(tags[0], tags[1], tags[2], tags[3]).unwrap();
//! assert_eq!(complex.tet_count(), 1);
//! ```
//!
//! # Consistency
//!
//! Whole-tetrahedron edits either succeed or leave the complex unchanged.
//! The per-ring "ordered" primitives trade that guarantee for speed during
//! bulk rewrites; [`consistency_report`](core::complex::TetComplex::consistency_report)
//! checks a complex afterwards. Set `TETSTAR_SELF_CHECK=1` to verify every
//! ring as it is written.

#![forbid(unsafe_code)]

#[macro_use]
extern crate derive_builder;

/// Storage layers and the tetrahedral complex.
///
/// From the bottom up: index-addressed pools, the spatial allocation index,
/// tag compression, compressed adjacency (molecules, link rings, 2D links),
/// and the complex built on them.
pub mod core {
    /// Compressed link rings and 2D links stored in molecule chains.
    pub mod adjacency;
    /// Collection aliases and small helpers
    pub mod collections;
    /// The tetrahedral complex: stars, edits, flips, iteration and validation
    pub mod complex;
    pub mod config;
    pub mod pool;
    pub mod spatial;
    pub mod tag;
    pub mod vertex;

    pub use complex::{ComplexError, DeleteOutcome, TetComplex, Tetrahedron};
    pub use config::ComplexConfig;
    pub use tag::{Apex, GHOST_VERTEX, Tag};
}

/// Geometric predicates.
pub mod geometry {
    pub mod predicates;
    pub use predicates::*;
}

/// A prelude module that re-exports commonly used types.
pub mod prelude {
    pub use crate::core::complex::{
        ComplexError, ComplexStatistics, ConsistencyReport, DeleteOutcome, IterMode,
        OrderedOutcome, TetComplex, Tetrahedron, Triangle, Violation, is_ghost,
    };
    pub use crate::core::config::{ComplexConfig, ComplexConfigBuilder, config_presets};
    pub use crate::core::pool::{ProximityPool, TagBlocks, VertexAllocation};
    pub use crate::core::spatial::{SpatialAllocationIndex, zorder::Point3};
    pub use crate::core::tag::{Apex, GHOST_VERTEX, Tag};
    pub use crate::core::vertex::{Vertex, VertexPool};

    pub use crate::core::collections::{FastHashSet, SmallBuffer};

    pub use crate::geometry::predicates::{
        FastPredicates, InSphere, Orientation, PredicateOracle, insphere, orient3d,
    };
}

/// The function `is_normal` checks that structs implement `auto` traits.
/// Traits are checked at compile time, so this function is only used for
/// testing.
#[must_use]
pub const fn is_normal<T: Sized + Send + Sync + Unpin>() -> bool {
    true
}

// =============================================================================
// TESTS
// =============================================================================
