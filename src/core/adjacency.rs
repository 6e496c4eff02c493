//! Compressed adjacency storage: molecule chains, link rings, and 2D links.
//!
//! Every vertex's star is a [`Link2d`] listing the edges it owns, and each
//! owned edge has a [`LinkRing`] of the apex vertices around it. Both are
//! streams of compressed tags packed into 20-byte molecules drawn from one
//! shared [`MoleculePool`].

pub mod link2d;
pub mod link_ring;
pub mod molecule;

pub use link_ring::{LinkRing, RingError, RingState};
pub use link2d::{LINK2D_CACHE_SIZE, LINK2D_PRIME, Link2d, Link2dCache, Link2dIter};
pub use molecule::{ChainReader, ChainTags, MOLECULE_SIZE, Molecule, MoleculeChain, MoleculePool};
