//! Integration tests for whole-complex behaviour: edits, flips, ghost
//! bookkeeping, iteration and queries, exercised through the public API.

#![forbid(unsafe_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tetstar::prelude::*;

const G: Tag = GHOST_VERTEX;

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

fn paranoid() -> TetComplex {
    init_tracing();
    TetComplex::with_config(TagBlocks, ComplexConfig::paranoid())
}

/// Even permutation of `tet` starting with its smallest tag, with the other
/// three rotated into their smallest position.
fn normalize(tet: Tetrahedron) -> Tetrahedron {
    let [a, b, c, d] = tet;
    let [p, q, r, s] = [[a, b, c, d], [b, a, d, c], [c, d, a, b], [d, c, b, a]]
        .into_iter()
        .min_by_key(|t| t[0])
        .unwrap();
    [[p, q, r, s], [p, r, s, q], [p, s, q, r]]
        .into_iter()
        .min()
        .unwrap()
}

fn unique_set<V: VertexAllocation>(complex: &TetComplex<V>) -> Vec<Tetrahedron> {
    let mut tets: Vec<_> = complex.iter().map(normalize).collect();
    tets.sort_unstable();
    tets
}

fn stored_copies<V: VertexAllocation>(complex: &TetComplex<V>) -> Vec<Tetrahedron> {
    let mut copies: Vec<_> = complex.iter_all().collect();
    copies.sort_unstable();
    copies
}

/// Ghost faces of `(a, b, c, d)`, oriented with GHOST outside.
fn ghost_faces(a: Tag, b: Tag, c: Tag, d: Tag) -> [[Tag; 3]; 4] {
    [[a, c, b], [a, b, d], [a, d, c], [b, c, d]]
}

/// One tetrahedron closed off by four ghost tetrahedra.
fn closed_tet(a: Tag, b: Tag, c: Tag, d: Tag) -> TetComplex {
    closed_tet_with(ComplexConfig::paranoid(), a, b, c, d)
}

fn closed_tet_with(config: ComplexConfig, a: Tag, b: Tag, c: Tag, d: Tag) -> TetComplex {
    init_tracing();
    let mut complex = TetComplex::with_config(TagBlocks, config);
    complex.insert_tet(a, b, c, d).unwrap();
    for [x, y, z] in ghost_faces(a, b, c, d) {
        complex.insert_tet(x, y, z, G).unwrap();
    }
    complex
}

fn assert_conserved<V: VertexAllocation>(complex: &TetComplex<V>) {
    let report = complex.consistency_report();
    assert!(report.is_empty(), "{report}");
    assert_eq!(
        complex.tet_count() + complex.ghost_tet_count(),
        complex.iter().count() as u64,
        "counters disagree with iteration:\n{complex}"
    );
}

// =============================================================================
// SINGLE TETRAHEDRON
// =============================================================================

#[test]
fn test_single_tet_scenario() {
    let mut complex = paranoid();
    complex.insert_tet(1, 2, 3, 4).unwrap();

    let [near, far] = complex.adjacencies(1, 2, 3).unwrap();
    assert_eq!(near, Apex::Vertex(4));
    assert!(far.is_ghost());

    assert!(complex.insert_tet(1, 2, 3, 5).is_err());
    let before = (complex.tet_count(), complex.ghost_tet_count());
    complex.insert_tet(1, 2, 4, 5).unwrap();
    assert_eq!(complex.tet_count(), before.0 + 1);
    assert_eq!(complex.ghost_tet_count(), before.1);
}

#[test]
fn test_stored_copies_follow_parity_split() {
    let mut complex = paranoid();
    complex.insert_tet(1, 3, 5, 7).unwrap();
    assert_eq!(complex.iter_all().count(), 6);
    complex.insert_tet(2, 3, 5, 7).unwrap_err();
    complex.insert_tet(1, 5, 3, 2).unwrap();
    // Three odd vertices and one even: three copies.
    assert_eq!(complex.iter_all().count(), 6 + 3);
    complex.insert_tet(1, 2, 3, 4).unwrap();
    // Two and two: two copies.
    assert_eq!(complex.iter_all().count(), 6 + 3 + 2);
}

#[test]
fn test_insert_delete_round_trip() {
    let mut complex = closed_tet(1, 2, 3, 4);
    complex.flip_14(1, 2, 3, 4, 5).unwrap();
    let before = stored_copies(&complex);

    let extra = [1, 3, 2, 6];
    // (1, 3, 2) is a ghost face; remove its ghost tet to expose the face.
    assert_eq!(complex.delete_tet(1, 3, 2, G), DeleteOutcome::Deleted);
    complex.insert_tet(extra[0], extra[1], extra[2], extra[3]).unwrap();
    assert_eq!(complex.delete_tet(extra[0], extra[1], extra[2], extra[3]), DeleteOutcome::Deleted);
    complex.insert_tet(1, 3, 2, G).unwrap();

    assert_eq!(stored_copies(&complex), before);
    assert_conserved(&complex);
}

// =============================================================================
// FLIPS
// =============================================================================

#[test]
fn test_random_flip_14_sequence_then_undo() {
    let mut rng = StdRng::seed_from_u64(0x7e7_5ea);
    // All-even outer tetrahedron: its ghost tetrahedra are recorded by face.
    let mut complex = closed_tet(2, 4, 6, 8);
    let start = stored_copies(&complex);
    let start_dump = complex.to_string();

    let mut history = Vec::new();
    for v in 9..40 {
        let count = complex.iter_solid().count();
        let tet = complex.iter_solid().nth(rng.random_range(0..count)).unwrap();
        complex.flip_14(tet[0], tet[1], tet[2], tet[3], v).unwrap();
        history.push((tet, v));
        assert_conserved(&complex);
        assert_eq!(complex.ghost_tet_count(), 4);
    }
    assert_eq!(complex.tet_count(), 1 + 3 * 31);

    while let Some((tet, v)) = history.pop() {
        complex.flip_41(tet[0], tet[1], tet[2], tet[3], v).unwrap();
    }
    assert_eq!(stored_copies(&complex), start);
    assert_eq!(complex.to_string(), start_dump);
    assert_conserved(&complex);
}

#[test]
fn test_edge_split_on_all_even_boundary() {
    // Between two flips the ghosts of edge (2, 4) are half moved.
    let mut complex = closed_tet_with(ComplexConfig::fast(), 2, 4, 6, 8);
    let before = unique_set(&complex);
    assert!(complex.has_even_ghost(&[2, 6, 4]));

    // Ghosts first: their gaps need the solid chain of (2, 4) to border.
    let around = [[2, 4, G, 6], [2, 4, 8, G], [2, 4, 6, 8]];
    for [a, b, c, d] in around {
        complex.flip_12(a, b, c, d, 10).unwrap();
    }
    assert!(complex.edge_ring(2, 4).is_none());
    assert!(complex.has_even_ghost(&[2, 6, 10]));
    assert!(complex.has_even_ghost(&[4, 8, 10]));
    assert!(!complex.has_even_ghost(&[2, 6, 4]));
    assert_eq!((complex.tet_count(), complex.ghost_tet_count()), (2, 6));
    assert_conserved(&complex);

    for [a, b, c, d] in around {
        complex.flip_21(a, b, c, d, 10).unwrap();
    }
    assert_eq!(unique_set(&complex), before);
    assert_conserved(&complex);
}

#[test]
fn test_squeeze_after_partial_split_restores_rings() {
    let mut complex = closed_tet(1, 3, 5, 7);
    let before = stored_copies(&complex);
    let outcome = complex.flip_12_on_edge(1, 3, 5, 7, 9);
    assert!(outcome.is_complete());
    assert!(!complex.is_consistent());
    assert_eq!(complex.ring_adjacencies(5, 7, 9), Some([3, 1]));

    complex.squeeze_on_edge(5, 7, 9).unwrap();
    complex.mark_consistent();
    assert_eq!(stored_copies(&complex), before);
    assert_conserved(&complex);
}

#[test]
fn test_flip_23_32_inverse_inside_closed_mesh() {
    let mut complex = closed_tet(1, 2, 3, 4);
    complex.flip_14(1, 2, 3, 4, 5).unwrap();
    complex.flip_14(5, 2, 3, 4, 6).unwrap();
    let before = unique_set(&complex);

    // (1, 5, 3, 4) and (6, 4, 3, 5) share triangle (5, 3, 4).
    assert!(complex.contains_tet(&[1, 5, 3, 4]));
    assert!(complex.contains_tet(&[6, 4, 3, 5]));
    complex.flip_23(1, 5, 3, 4, 6).unwrap();
    assert_eq!(complex.tet_count(), 8);
    assert_conserved(&complex);

    complex.flip_32(1, 5, 3, 4, 6).unwrap();
    assert_eq!(unique_set(&complex), before);
    assert_conserved(&complex);
}

#[test]
fn test_flips_refuse_without_changes() {
    let mut complex = closed_tet(1, 2, 3, 4);
    let dump = complex.to_string();
    assert!(matches!(
        complex.flip_41(1, 2, 3, 4, 5),
        Err(ComplexError::MissingTet { .. })
    ));
    assert!(matches!(
        complex.flip_32(1, 2, 3, 4, 5),
        Err(ComplexError::MissingTet { .. })
    ));
    assert!(matches!(
        complex.flip_14(1, 2, 3, 4, 3),
        Err(ComplexError::VertexInUse { vertex: 3 })
    ));
    assert_eq!(complex.to_string(), dump);
}

// =============================================================================
// BOWYER–WATSON
// =============================================================================

#[test]
fn test_cavity_refill_matches_flip_14() {
    let mut flipped = closed_tet(1, 3, 5, 7);
    flipped.flip_14(1, 3, 5, 7, 9).unwrap();

    // The emptied cavity leaves ghost tetrahedra with no solid neighbour, so
    // the intermediate state is not checked.
    let self_check = ComplexConfigBuilder::default().self_check(true).build().unwrap();
    let mut refilled = closed_tet_with(self_check, 1, 3, 5, 7);
    assert_eq!(refilled.delete_tet(1, 3, 5, 7), DeleteOutcome::Deleted);
    assert!(!refilled.consistency_report().is_empty());
    // The cavity boundary, seen from inside.
    let cavity: Vec<[Tag; 3]> = ghost_faces(1, 3, 5, 7)
        .iter()
        .map(|&[a, b, c]| [a, c, b])
        .collect();
    refilled.build_3d_star(9, &cavity).unwrap();

    assert_eq!(refilled.tet_count(), 4);
    assert_eq!(refilled.ghost_tet_count(), 4);
    assert_eq!(unique_set(&refilled), unique_set(&flipped));
    assert_conserved(&refilled);
}

#[test]
fn test_remove_ghost_tets_leaves_solid_mesh() {
    let mut complex = closed_tet(1, 2, 3, 4);
    complex.flip_14(1, 2, 3, 4, 5).unwrap();
    complex.remove_ghost_tets();
    assert_eq!(complex.ghost_tet_count(), 0);
    assert_eq!(complex.iter().count(), 4);
    assert!(complex.iter().all(|tet| !is_ghost(&tet)));
    assert_conserved(&complex);
}

// =============================================================================
// GEOMETRY
// =============================================================================

fn positive<V: VertexAllocation>(complex: &TetComplex<V>, pool: &VertexPool) -> bool {
    complex.iter_solid().all(|[a, b, c, d]| {
        let p = |t: Tag| pool.coord(t).unwrap();
        orient3d(&p(a), &p(b), &p(c), &p(d)) == Orientation::POSITIVE
    })
}

#[test]
fn test_geometric_flips_keep_positive_orientation() {
    init_tracing();
    let points = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.25, 0.25, 1.0],
        [0.25, 0.25, -1.0],
    ];
    let (pool, tags) = VertexPool::from_points(&points);
    let [a, mut b, mut c, top, bot] = [tags[0], tags[1], tags[2], tags[3], tags[4]];
    let p = |t: Tag| pool.coord(t).unwrap();
    if orient3d(&p(top), &p(a), &p(b), &p(c)) == Orientation::NEGATIVE {
        std::mem::swap(&mut b, &mut c);
    }
    assert_eq!(orient3d(&p(top), &p(a), &p(b), &p(c)), Orientation::POSITIVE);
    assert_eq!(orient3d(&p(bot), &p(c), &p(b), &p(a)), Orientation::POSITIVE);

    let mut complex = TetComplex::with_config(&pool, ComplexConfig::paranoid());
    complex.insert_tet(top, a, b, c).unwrap();
    complex.insert_tet(bot, c, b, a).unwrap();
    assert!(positive(&complex, &pool));

    complex.flip_23(top, a, b, c, bot).unwrap();
    assert_eq!(complex.tet_count(), 3);
    assert!(positive(&complex, &pool));

    complex.flip_32(top, a, b, c, bot).unwrap();
    assert_eq!(complex.tet_count(), 2);
    assert!(positive(&complex, &pool));
}

#[test]
fn test_flip_14_at_centroid_with_owned_pool() {
    init_tracing();
    let points = [
        [0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0],
    ];
    let (pool, tags) = VertexPool::from_points(&points);
    let mut complex = TetComplex::with_config(pool, ComplexConfig::paranoid());
    let [a, b, c, d] = [tags[0], tags[1], tags[2], tags[3]];
    complex.insert_tet(a, b, c, d).unwrap();

    let v = complex.vertex_source_mut().insert([0.25, 0.25, 0.25], &[1.0]);
    complex.flip_14(a, b, c, d, v).unwrap();
    let pool = complex.vertex_source();
    assert_eq!(pool.attributes(v), Some(&[1.0][..]));
    assert!(complex.iter_solid().all(|[w, x, y, z]| {
        let p = |t: Tag| pool.coord(t).unwrap();
        orient3d(&p(w), &p(x), &p(y), &p(z)) == Orientation::POSITIVE
    }));
}

// =============================================================================
// QUERIES AND REPORTING
// =============================================================================

#[test]
fn test_vertex_and_edge_queries_find_incident_tets() {
    let mut complex = closed_tet(2, 4, 6, 8);
    for (tet, v) in [([2, 4, 6, 8], 9), ([9, 4, 6, 8], 10), ([2, 9, 6, 8], 11)] {
        complex.flip_14(tet[0], tet[1], tet[2], tet[3], v).unwrap();
    }
    for v in [2, 4, 6, 8, 9, 10, 11] {
        let tet = complex.vertex_to_tet(v).unwrap();
        assert!(tet.contains(&v));
        assert_eq!(complex.missing_tet(&tet), 0);
    }
    for (a, b) in [(2, 4), (9, 10), (2, 9), (4, 11), (10, 11)] {
        if let Some(tet) = complex.edge_to_tet(a, b) {
            assert!(tet.contains(&a) && tet.contains(&b));
        }
    }
    assert!(complex.edge_to_tet(2, 9).is_some());
    assert!(complex.vertex_to_tet(100).is_none());
}

#[test]
fn test_statistics_and_config_serialize() {
    let mut complex = closed_tet(1, 3, 5, 7);
    complex.flip_14(1, 3, 5, 7, 9).unwrap();
    let stats = complex.statistics();
    assert_eq!(stats.tets, 4);
    assert_eq!(stats.ghost_tets, 4);
    assert!(stats.bytes > 0);
    let json = serde_json::to_string(&stats).unwrap();
    let back: ComplexStatistics = serde_json::from_str(&json).unwrap();
    assert_eq!(back, stats);

    let config = *complex.config();
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(serde_json::from_str::<ComplexConfig>(&json).unwrap(), config);
}
