//! Whole-complex consistency checking.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{TetComplex, Tetrahedron, is_ghost};
use crate::core::adjacency::{LinkRing, RingError};
use crate::core::collections::{FastHashSet, fast_hash_set_with_capacity};
use crate::core::pool::VertexAllocation;
use crate::core::tag::Tag;

/// One problem found by [`TetComplex::consistency_report`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Violation {
    /// A stored ring does not parse.
    MalformedRing {
        /// Vertex that owns the ring.
        owner: Tag,
        /// Other endpoint of the edge.
        other: Tag,
        /// Parse failure.
        error: RingError,
    },
    /// A stored ring holds no vertices.
    EmptyRing {
        /// Vertex that owns the ring.
        owner: Tag,
        /// Other endpoint of the edge.
        other: Tag,
    },
    /// A tetrahedron is stored in some of its rings but not all.
    MissingCopies {
        /// The tetrahedron, as found in one of its rings.
        tet: Tetrahedron,
        /// Rings lacking it.
        missing: u32,
    },
    /// The solid tetrahedron counter disagrees with iteration.
    TetCount {
        /// Counter value.
        recorded: u64,
        /// Distinct solid tetrahedra found.
        counted: u64,
    },
    /// The ghost tetrahedron counter disagrees with iteration.
    GhostCount {
        /// Counter value.
        recorded: u64,
        /// Distinct ghost tetrahedra found.
        counted: u64,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRing { owner, other, error } => {
                write!(f, "ring ({owner}, {other}) is malformed: {error}")
            }
            Self::EmptyRing { owner, other } => write!(f, "ring ({owner}, {other}) is empty"),
            Self::MissingCopies { tet, missing } => {
                write!(f, "tetrahedron {tet:?} is missing from {missing} rings")
            }
            Self::TetCount { recorded, counted } => {
                write!(f, "tet counter is {recorded} but {counted} tetrahedra are stored")
            }
            Self::GhostCount { recorded, counted } => {
                write!(f, "ghost counter is {recorded} but {counted} ghost tetrahedra are stored")
            }
        }
    }
}

/// Result of a full consistency check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Problems found, in discovery order.
    pub violations: Vec<Violation>,
    /// Stored copies examined.
    pub copies: u64,
    /// Distinct solid tetrahedra.
    pub tets: u64,
    /// Distinct ghost tetrahedra.
    pub ghost_tets: u64,
}

impl ConsistencyReport {
    /// Returns true when no violation was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} violations over {} stored copies ({} tetrahedra, {} ghost tetrahedra)",
            self.violations.len(),
            self.copies,
            self.tets,
            self.ghost_tets
        )?;
        for violation in &self.violations {
            writeln!(f, "  {violation}")?;
        }
        Ok(())
    }
}

impl<V: VertexAllocation> TetComplex<V> {
    /// Checks every stored ring and every stored copy.
    ///
    /// Each ring must parse and be non-empty, each copy (recorded all-even
    /// ghosts included) must be present in all rings of its same-parity
    /// edges, and both counters must match iteration.
    #[must_use]
    pub fn consistency_report(&self) -> ConsistencyReport {
        let mut report = ConsistencyReport::default();
        for owner in self.star_vertices() {
            for (other, ring) in self.link_pairs(owner) {
                let ring = LinkRing::from_tag(ring, owner);
                if ring.is_empty(&self.molecules) {
                    report.violations.push(Violation::EmptyRing { owner, other });
                } else if let Err(error) = ring.shape(&self.molecules) {
                    report
                        .violations
                        .push(Violation::MalformedRing { owner, other, error });
                }
            }
        }
        // Every stored copy of a damaged tetrahedron sees the same gaps; report it once.
        let mut damaged: FastHashSet<Tetrahedron> = fast_hash_set_with_capacity(16);
        for tet in self.iter_all() {
            report.copies += 1;
            let missing = self.missing_tet(&tet);
            let mut key = tet;
            key.sort_unstable();
            if missing != 0 && damaged.insert(key) {
                report.violations.push(Violation::MissingCopies { tet, missing });
            }
        }
        for tet in self.iter() {
            if is_ghost(&tet) {
                report.ghost_tets += 1;
            } else {
                report.tets += 1;
            }
        }
        if report.tets != self.tet_count {
            report.violations.push(Violation::TetCount {
                recorded: self.tet_count,
                counted: report.tets,
            });
        }
        if report.ghost_tets != self.ghost_tet_count {
            report.violations.push(Violation::GhostCount {
                recorded: self.ghost_tet_count,
                counted: report.ghost_tets,
            });
        }
        report
    }
}

/// Serializable summary of a [`ConsistencyReport`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencySummary {
    /// Number of violations.
    pub violations: usize,
    /// Stored copies examined.
    pub copies: u64,
    /// Distinct solid tetrahedra.
    pub tets: u64,
    /// Distinct ghost tetrahedra.
    pub ghost_tets: u64,
}

impl From<&ConsistencyReport> for ConsistencySummary {
    fn from(report: &ConsistencyReport) -> Self {
        Self {
            violations: report.violations.len(),
            copies: report.copies,
            tets: report.tets,
            ghost_tets: report.ghost_tets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ComplexConfig;
    use crate::core::pool::TagBlocks;
    use crate::core::tag::GHOST_VERTEX;

    fn complex() -> TetComplex {
        TetComplex::with_config(TagBlocks, ComplexConfig::fast())
    }

    #[test]
    fn test_consistent_complex_reports_nothing() {
        let mut complex = complex();
        complex.insert_tet(1, 2, 3, 4).unwrap();
        complex.insert_tet(1, 2, 4, 5).unwrap();
        let report = complex.consistency_report();
        assert!(report.is_empty(), "{report}");
        assert_eq!(report.copies, 4);
        assert_eq!(report.tets, 2);
    }

    #[test]
    fn test_ordered_insert_is_flagged_until_completed() {
        let mut complex = complex();
        complex.insert_tet_on_tripod(1, 3, 5, 7);
        let report = complex.consistency_report();
        assert!(report
            .violations
            .iter()
            .any(|v| matches!(v, Violation::MissingCopies { missing: 3, .. })));

        complex.insert_ordered_tet(1, 3, 5, 7);
        let report = complex.consistency_report();
        assert!(
            !report
                .violations
                .iter()
                .any(|v| matches!(v, Violation::MissingCopies { .. })),
            "{report}"
        );
    }

    #[test]
    fn test_partial_delete_is_reported() {
        let mut complex = complex();
        complex.insert_tet(1, 3, 5, 7).unwrap();
        let outcome = complex.delete_ordered_tet(1, 3, 5, 7);
        assert_eq!(outcome.applied, 6);
        complex.insert_tet_on_tripod(1, 3, 5, 7);
        assert!(!complex.consistency_report().is_empty());
    }

    #[test]
    fn test_ghost_counter_is_checked() {
        let mut complex = complex();
        complex.insert_tet(2, 4, 6, 8).unwrap();
        complex.insert_tet(1, 3, 5, 7).unwrap();
        complex.insert_tet(2, 6, 4, GHOST_VERTEX).unwrap();
        complex.insert_tet(1, 5, 3, GHOST_VERTEX).unwrap();
        let report = complex.consistency_report();
        assert!(report.is_empty(), "{report}");
        assert_eq!(report.ghost_tets, 2);

        complex.ghost_tet_count += 1;
        let report = complex.consistency_report();
        assert_eq!(
            report.violations,
            vec![Violation::GhostCount {
                recorded: 3,
                counted: 2
            }]
        );
        assert!(report.to_string().contains("ghost counter is 3"));
    }

    #[test]
    fn test_unrecorded_even_ghost_is_missing() {
        let mut complex = complex();
        complex.insert_tet(2, 4, 6, 8).unwrap();
        // The gaps of the solid rings still admit the ghost, but nothing
        // records it.
        assert_eq!(complex.missing_tet(&[2, 6, 4, GHOST_VERTEX]), 1);
        assert!(!complex.contains_tet(&[2, 6, 4, GHOST_VERTEX]));
        complex.insert_tet(2, 6, 4, GHOST_VERTEX).unwrap();
        assert!(complex.contains_tet(&[2, 6, 4, GHOST_VERTEX]));
    }

    #[test]
    fn test_summary_serializes() {
        let mut complex = complex();
        complex.insert_tet(2, 4, 6, 8).unwrap();
        let summary = ConsistencySummary::from(&complex.consistency_report());
        let json = serde_json::to_string(&summary).unwrap();
        let back: ConsistencySummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
        assert_eq!(summary.copies, 6);
    }
}
