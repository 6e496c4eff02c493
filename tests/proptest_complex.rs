//! Property-based tests for complex invariants under random edit sequences.
//!
//! ## Invariants Tested
//!
//! - **Conservation** - counters match the deduplicating iterator after every flip
//! - **Consistency** - every stored copy is present in all of its rings
//! - **Flip inverses** - 1-4/4-1 and 2-3/3-2 pairs restore the previous tetrahedra
//! - **Round trip** - deleting and re-inserting a tetrahedron restores the stored copies
//! - **Ghost conservation** - counters match iteration through random deletes and
//!   re-inserts of solid and ghost tetrahedra, all-even ghosts included

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tetstar::prelude::*;

// =============================================================================
// TEST CONFIGURATION
// =============================================================================

const G: Tag = GHOST_VERTEX;

/// One tetrahedron with its ghost cover, refined by `splits` random 1-4 flips.
fn refined(rng: &mut StdRng, outer: Tetrahedron, splits: u64, config: ComplexConfig) -> TetComplex {
    let [a, b, c, d] = outer;
    let mut complex = TetComplex::with_config(TagBlocks, config);
    complex.insert_tet(a, b, c, d).unwrap();
    for [x, y, z] in [[a, c, b], [a, b, d], [a, d, c], [b, c, d]] {
        complex.insert_tet(x, y, z, G).unwrap();
    }
    let first = outer.iter().max().copied().unwrap_or(0) + 1;
    for v in first..first + splits {
        let tet = random_solid(&complex, rng);
        complex.flip_14(tet[0], tet[1], tet[2], tet[3], v).unwrap();
    }
    complex
}

fn random_solid(complex: &TetComplex, rng: &mut StdRng) -> Tetrahedron {
    let count = complex.iter_solid().count();
    complex.iter_solid().nth(rng.random_range(0..count)).unwrap()
}

fn unique_set(complex: &TetComplex) -> Vec<Tetrahedron> {
    let mut tets: Vec<_> = complex
        .iter()
        .map(|[a, b, c, d]| {
            let [p, q, r, s] = [[a, b, c, d], [b, a, d, c], [c, d, a, b], [d, c, b, a]]
                .into_iter()
                .min_by_key(|t| t[0])
                .unwrap();
            [[p, q, r, s], [p, r, s, q], [p, s, q, r]]
                .into_iter()
                .min()
                .unwrap()
        })
        .collect();
    tets.sort_unstable();
    tets
}

fn stored_copies(complex: &TetComplex) -> Vec<Tetrahedron> {
    let mut copies: Vec<_> = complex.iter_all().collect();
    copies.sort_unstable();
    copies
}

fn outer_tet() -> impl Strategy<Value = Tetrahedron> {
    prop_oneof![
        Just([1, 2, 3, 4]),
        Just([1, 3, 5, 7]),
        Just([2, 4, 6, 8]),
        Just([2, 4, 1, 3]),
    ]
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_flip_14_conserves_counts(seed in any::<u64>(), outer in outer_tet(), splits in 1u64..24) {
        let mut rng = StdRng::seed_from_u64(seed);
        let complex = refined(&mut rng, outer, splits, ComplexConfig::paranoid());
        prop_assert_eq!(complex.tet_count(), 1 + 3 * splits);
        prop_assert_eq!(complex.ghost_tet_count(), 4);
        prop_assert_eq!(
            complex.tet_count() + complex.ghost_tet_count(),
            complex.iter().count() as u64
        );
        let report = complex.consistency_report();
        prop_assert!(report.is_empty(), "{}", report);
    }

    #[test]
    fn prop_flip_23_then_32_restores(seed in any::<u64>(), outer in outer_tet(), splits in 2u64..16) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut complex = refined(&mut rng, outer, splits, ComplexConfig::paranoid());
        for _ in 0..8 {
            let [top, a, b, c] = random_solid(&complex, &mut rng);
            let Some([Apex::Vertex(bot), _]) = complex.adjacencies(a, b, c) else {
                continue;
            };
            if complex.edge_to_tet(top, bot).is_some() {
                continue;
            }
            let before = unique_set(&complex);
            complex.flip_23(top, a, b, c, bot).unwrap();
            prop_assert_eq!(
                complex.tet_count() + complex.ghost_tet_count(),
                complex.iter().count() as u64
            );
            complex.flip_32(top, a, b, c, bot).unwrap();
            prop_assert_eq!(unique_set(&complex), before);
        }
    }

    #[test]
    fn prop_delete_then_insert_round_trips(seed in any::<u64>(), outer in outer_tet(), splits in 1u64..16) {
        let mut rng = StdRng::seed_from_u64(seed);
        // A deleted boundary tetrahedron leaves its ghost neighbours dangling,
        // so only the end state is checked.
        let mut complex = refined(&mut rng, outer, splits, ComplexConfig::fast());
        let before = stored_copies(&complex);
        let [a, b, c, d] = random_solid(&complex, &mut rng);

        prop_assert_eq!(complex.delete_tet(a, b, c, d), DeleteOutcome::Deleted);
        prop_assert_eq!(complex.tet_count(), 3 * splits);
        prop_assert!(!complex.contains_tet(&[a, b, c, d]));
        complex.insert_tet(a, b, c, d).unwrap();

        prop_assert_eq!(stored_copies(&complex), before);
        prop_assert!(complex.consistency_report().is_empty());
    }

    #[test]
    fn prop_random_deletes_and_inserts_conserve_counts(
        seed in any::<u64>(),
        outer in outer_tet(),
        splits in 0u64..12,
        steps in 1usize..40,
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        // A ghost deleted after its solid neighbour has no gap left to leave,
        // so the complex is only consistent again once everything is back.
        let mut complex = refined(&mut rng, outer, splits, ComplexConfig::fast());
        let before = stored_copies(&complex);
        let mut removed: Vec<Tetrahedron> = Vec::new();
        for _ in 0..steps {
            let present: Vec<Tetrahedron> = complex.iter().collect();
            if !present.is_empty() && (removed.is_empty() || rng.random_bool(0.6)) {
                let [a, b, c, d] = present[rng.random_range(0..present.len())];
                prop_assert_ne!(complex.delete_tet(a, b, c, d), DeleteOutcome::NotFound);
                prop_assert!(!complex.contains_tet(&[a, b, c, d]));
                removed.push([a, b, c, d]);
            } else {
                let [a, b, c, d] = removed.swap_remove(rng.random_range(0..removed.len()));
                prop_assert_eq!(complex.insert_tet(a, b, c, d), Ok(()));
            }
            prop_assert_eq!(
                complex.tet_count() + complex.ghost_tet_count(),
                complex.iter().count() as u64
            );
        }
        for [a, b, c, d] in removed {
            prop_assert_eq!(complex.insert_tet(a, b, c, d), Ok(()));
        }
        complex.mark_consistent();
        prop_assert_eq!(stored_copies(&complex), before);
        let report = complex.consistency_report();
        prop_assert!(report.is_empty(), "{}", report);
    }

    #[test]
    fn prop_uncached_lookups_agree(seed in any::<u64>(), splits in 1u64..12) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut cached = refined(&mut rng, [1, 2, 3, 4], splits, ComplexConfig::fast());
        let mut rng = StdRng::seed_from_u64(seed);
        let mut uncached = refined(&mut rng, [1, 2, 3, 4], splits, config_presets::uncached());
        prop_assert_eq!(stored_copies(&cached), stored_copies(&uncached));
        for [a, b, c, _] in cached.iter_solid().collect::<Vec<_>>() {
            prop_assert_eq!(cached.adjacencies(a, b, c), uncached.adjacencies(a, b, c));
        }
    }
}
