//! Bistellar flips, the bulk star builder, and ring-level partial edits.
//!
//! Each flip replaces a fixed set of tetrahedra by another with the same
//! boundary. All of them run as one transaction over the rings involved, so a
//! refused flip leaves the complex as it was.
//!
//! The partial flips and the squeezes edit only some of the rings a change
//! touches, for drivers that write the remaining rings by other means (an
//! edge split around a whole ring of tetrahedra, an edge contraction). They
//! mark the complex inconsistent until
//! [`mark_consistent`](TetComplex::mark_consistent).

use tracing::debug;

use super::{
    ComplexError, EDGE_ORDERINGS, EditPlan, OrderedOutcome, TetComplex, Tetrahedron, all_copies,
    stored_copies, validate,
};
use crate::core::pool::VertexAllocation;
use crate::core::tag::{GHOST_VERTEX, Tag, owns_edge, same_parity};

/// The two tetrahedra left by splitting edge `(a, b)` of `(a, b, c, d)` at `v`.
const fn split_edge(a: Tag, b: Tag, c: Tag, d: Tag, v: Tag) -> [Tetrahedron; 2] {
    [[a, v, c, d], [v, b, c, d]]
}

/// Rotations `(x, y, z)` of triangle `(a, b, c)` whose edge `(x, y)` has a
/// ring.
fn triangle_edges(a: Tag, b: Tag, c: Tag) -> impl Iterator<Item = (Tag, Tag, Tag)> {
    [(a, b, c), (b, c, a), (c, a, b)]
        .into_iter()
        .filter(|&(x, y, _)| same_parity(x, y))
}

impl<V: VertexAllocation> TetComplex<V> {
    /// 1-4 flip: splits `(a, b, c, d)` into four tetrahedra around the new
    /// vertex `v`.
    ///
    /// # Errors
    ///
    /// Fails when `(a, b, c, d)` is not in the complex, `v` is GHOST or
    /// already owns tetrahedra, or a ring refuses the edit.
    pub fn flip_14(&mut self, a: Tag, b: Tag, c: Tag, d: Tag, v: Tag) -> Result<(), ComplexError> {
        self.check_new_vertex(v)?;
        self.exchange(
            "flip 1-4",
            &[[a, b, c, d]],
            &[[v, b, c, d], [a, v, c, d], [a, b, v, d], [a, b, c, v]],
        )
    }

    /// 4-1 flip: merges the four tetrahedra around `v` back into
    /// `(a, b, c, d)`. Inverse of [`flip_14`](Self::flip_14).
    ///
    /// # Errors
    ///
    /// Fails when any of the four tetrahedra is missing or a ring refuses
    /// the edit.
    pub fn flip_41(&mut self, a: Tag, b: Tag, c: Tag, d: Tag, v: Tag) -> Result<(), ComplexError> {
        if v == GHOST_VERTEX {
            return Err(ComplexError::GhostVertex);
        }
        self.exchange(
            "flip 4-1",
            &[[v, b, c, d], [a, v, c, d], [a, b, v, d], [a, b, c, v]],
            &[[a, b, c, d]],
        )
    }

    /// 2-3 flip: replaces `(top, a, b, c)` and `(bot, c, b, a)`, which share
    /// triangle `(a, b, c)`, by three tetrahedra around the new edge
    /// `(top, bot)`.
    ///
    /// # Errors
    ///
    /// Fails when either tetrahedron is missing, edge `(top, bot)` already
    /// has a ring, or a ring refuses the edit.
    pub fn flip_23(
        &mut self,
        top: Tag,
        a: Tag,
        b: Tag,
        c: Tag,
        bot: Tag,
    ) -> Result<(), ComplexError> {
        if same_parity(top, bot) && self.edge_ring(top, bot).is_some() {
            return Err(ComplexError::EdgeExists { a: top, b: bot });
        }
        self.exchange(
            "flip 2-3",
            &[[top, a, b, c], [bot, c, b, a]],
            &[[top, a, b, bot], [top, b, c, bot], [top, c, a, bot]],
        )
    }

    /// 3-2 flip: removes edge `(top, bot)` by replacing its three
    /// tetrahedra with `(top, a, b, c)` and `(bot, c, b, a)`. Inverse of
    /// [`flip_23`](Self::flip_23).
    ///
    /// # Errors
    ///
    /// Fails when any of the three tetrahedra is missing or a ring refuses
    /// the edit.
    pub fn flip_32(
        &mut self,
        top: Tag,
        a: Tag,
        b: Tag,
        c: Tag,
        bot: Tag,
    ) -> Result<(), ComplexError> {
        self.exchange(
            "flip 3-2",
            &[[top, a, b, bot], [top, b, c, bot], [top, c, a, bot]],
            &[[top, a, b, c], [bot, c, b, a]],
        )
    }

    /// Bowyer–Watson star construction: fills an emptied cavity around the
    /// new vertex `v`.
    ///
    /// Each triangle `(a, b, c)` of `triangles` is a face of the cavity
    /// boundary, oriented so that `v` lies on its positive side; the
    /// tetrahedron `(a, b, c, v)` is created for each. A triangle with a
    /// GHOST vertex yields a ghost tetrahedron. Every ring is rewritten once,
    /// however many of the new tetrahedra it holds.
    ///
    /// # Errors
    ///
    /// Fails when `v` is GHOST or a ring refuses the edit; the complex is
    /// unchanged on error.
    pub fn build_3d_star(&mut self, v: Tag, triangles: &[[Tag; 3]]) -> Result<(), ComplexError> {
        if v == GHOST_VERTEX {
            return Err(ComplexError::GhostVertex);
        }
        let new: Vec<Tetrahedron> = triangles.iter().map(|&[a, b, c]| [a, b, c, v]).collect();
        self.exchange("build 3D star", &[], &new)
    }

    /// 1-2 flip: splits edge `(a, b)` of `(a, b, c, d)` at `v`, leaving
    /// `(a, v, c, d)` and `(v, b, c, d)`. An edge split flips every
    /// tetrahedron around the edge in turn, so `v` may already own
    /// tetrahedra; `c` or `d` may be GHOST.
    ///
    /// # Errors
    ///
    /// Fails when `a`, `b` or `v` is GHOST, `(a, b, c, d)` is missing, or a
    /// ring refuses the edit.
    pub fn flip_12(&mut self, a: Tag, b: Tag, c: Tag, d: Tag, v: Tag) -> Result<(), ComplexError> {
        if [a, b, v].contains(&GHOST_VERTEX) {
            return Err(ComplexError::GhostVertex);
        }
        self.exchange("flip 1-2", &[[a, b, c, d]], &split_edge(a, b, c, d, v))
    }

    /// 2-1 flip: merges `(a, v, c, d)` and `(v, b, c, d)` back into
    /// `(a, b, c, d)`. Inverse of [`flip_12`](Self::flip_12).
    ///
    /// # Errors
    ///
    /// Fails when `a`, `b` or `v` is GHOST, either tetrahedron is missing,
    /// or a ring refuses the edit.
    pub fn flip_21(&mut self, a: Tag, b: Tag, c: Tag, d: Tag, v: Tag) -> Result<(), ComplexError> {
        if [a, b, v].contains(&GHOST_VERTEX) {
            return Err(ComplexError::GhostVertex);
        }
        self.exchange("flip 2-1", &split_edge(a, b, c, d, v), &[[a, b, c, d]])
    }

    // =========================================================================
    // PARTIAL FLIPS
    // =========================================================================

    /// [`flip_12`](Self::flip_12) applied to the rings of the six edges of
    /// `(a, b, c, d)` only. The rings of the edges at `v` are not written.
    /// The counters follow the flip once any ring edit lands.
    pub fn flip_12_on_6_edges(&mut self, a: Tag, b: Tag, c: Tag, d: Tag, v: Tag) -> OrderedOutcome {
        let edges = [(a, b), (a, c), (a, d), (b, c), (b, d), (c, d)];
        let outcome = self.partial_split("flip 1-2 on 6 edges", [a, b, c, d], v, &edges);
        if outcome.applied > 0 {
            self.account(&[[a, b, c, d]], &split_edge(a, b, c, d, v));
        }
        outcome
    }

    /// [`flip_12`](Self::flip_12) applied to the rings of edges `(b, c)`,
    /// `(b, d)` and `(c, d)` only, for drivers that rewrite the rings at `a`
    /// themselves. The counters are not touched.
    pub fn flip_12_on_3_edges(&mut self, a: Tag, b: Tag, c: Tag, d: Tag, v: Tag) -> OrderedOutcome {
        self.partial_split("flip 1-2 on 3 edges", [a, b, c, d], v, &[(b, c), (b, d), (c, d)])
    }

    /// [`flip_12`](Self::flip_12) applied to the ring of the opposite edge
    /// `(c, d)` only, where `a -> b` becomes `a -> v -> b`. The counters are
    /// not touched.
    pub fn flip_12_on_edge(&mut self, a: Tag, b: Tag, c: Tag, d: Tag, v: Tag) -> OrderedOutcome {
        self.partial_split("flip 1-2 on edge", [a, b, c, d], v, &[(c, d)])
    }

    /// 2-1 flip on the ring of `(a, b)` alone: `v` leaves the ring and its
    /// two neighbours are joined. Inverse of
    /// [`flip_12_on_edge`](Self::flip_12_on_edge). Refused unless both
    /// neighbours of `v` are solid and distinct. The counters are not
    /// touched.
    pub fn flip_21_on_edge(&mut self, a: Tag, b: Tag, v: Tag) -> OrderedOutcome {
        let refused = OrderedOutcome { applied: 0, refused: 1 };
        let Some([next, prev]) = self.ring_adjacencies(a, b, v) else {
            return refused;
        };
        if next == GHOST_VERTEX || prev == GHOST_VERTEX || next == prev {
            return refused;
        }
        self.partial_exchange(
            "flip 2-1 on edge",
            &[[a, b, prev, v], [a, b, v, next]],
            &[[a, b, prev, next]],
            &[(a, b)],
        )
    }

    fn partial_split(
        &mut self,
        operation: &str,
        tet: Tetrahedron,
        v: Tag,
        edges: &[(Tag, Tag)],
    ) -> OrderedOutcome {
        let [a, b, c, d] = tet;
        if [a, b, v].contains(&GHOST_VERTEX) {
            return OrderedOutcome::default();
        }
        self.partial_exchange(operation, &[tet], &split_edge(a, b, c, d, v), edges)
    }

    /// Replaces `old` by `new` in the rings of `edges` only, ring by ring.
    fn partial_exchange(
        &mut self,
        operation: &str,
        old: &[Tetrahedron],
        new: &[Tetrahedron],
        edges: &[(Tag, Tag)],
    ) -> OrderedOutcome {
        if old.iter().chain(new).any(|tet| validate(tet).is_err()) {
            return OrderedOutcome::default();
        }
        self.consistent = false;
        let mut plan = EditPlan::default();
        for tet in old {
            plan.remove(&all_copies(tet));
        }
        for tet in new {
            plan.add(&all_copies(tet));
        }
        plan.edits.retain(|edit| {
            let edge = (edit.owner, edit.other);
            edges.iter().any(|&(x, y)| edge == (x, y) || edge == (y, x))
        });
        let outcome = self.apply_each(&plan);
        debug!(
            "[complex] {operation}: {} ring edits applied, {} refused",
            outcome.applied, outcome.refused
        );
        outcome
    }

    // =========================================================================
    // SQUEEZES
    // =========================================================================

    /// Removes apex `c` from the ring of edge `(a, b)` and joins its
    /// neighbours: `(a, b, w2, c)` and `(a, b, c, w1)` become
    /// `(a, b, w2, w1)` in that ring alone. Next to a gap, `c` just leaves
    /// the end of its chain. The counters are not touched.
    ///
    /// # Errors
    ///
    /// Returns [`ComplexError::MissingTriangle`] when the ring of `(a, b)`
    /// lacks `c`, and [`ComplexError::RingRefused`] when the join would
    /// leave a single apex; the complex is unchanged on error.
    pub fn squeeze_on_edge(&mut self, a: Tag, b: Tag, c: Tag) -> Result<(), ComplexError> {
        let mut plan = EditPlan::default();
        self.plan_apex_removal(&mut plan, a, b, c, true)?;
        self.apply_ring_plan("squeeze on edge", &plan)
    }

    /// [`squeeze_on_edge`](Self::squeeze_on_edge) for the ring of `(a, b)`
    /// stored at `a`. Returns `Ok(false)` without touching anything when
    /// `b` owns the ring.
    ///
    /// # Errors
    ///
    /// As [`squeeze_on_edge`](Self::squeeze_on_edge).
    pub fn squeeze_on_half_edge(&mut self, a: Tag, b: Tag, c: Tag) -> Result<bool, ComplexError> {
        if !owns_edge(a, b) {
            return Ok(false);
        }
        self.squeeze_on_edge(a, b, c).map(|()| true)
    }

    /// Squeezes triangle `(a, b, c)` out of the ring of each of its
    /// same-parity edges, as one transaction.
    ///
    /// # Errors
    ///
    /// As [`squeeze_on_edge`](Self::squeeze_on_edge), for any of the rings.
    pub fn squeeze_triangle(&mut self, a: Tag, b: Tag, c: Tag) -> Result<(), ComplexError> {
        let mut plan = EditPlan::default();
        for (x, y, z) in triangle_edges(a, b, c) {
            self.plan_apex_removal(&mut plan, x, y, z, true)?;
        }
        self.apply_ring_plan("squeeze triangle", &plan)
    }

    /// Deletes both tetrahedra on triangle `(a, b, c)` from the rings of its
    /// same-parity edges, leaving a gap where the triangle's apex was. The
    /// rings of the other edges of those tetrahedra, and the counters, are
    /// not touched.
    ///
    /// # Errors
    ///
    /// Returns [`ComplexError::MissingTriangle`] when a ring lacks the
    /// triangle; the complex is unchanged on error.
    pub fn delete_triangle(&mut self, a: Tag, b: Tag, c: Tag) -> Result<(), ComplexError> {
        let mut plan = EditPlan::default();
        for (x, y, z) in triangle_edges(a, b, c) {
            self.plan_apex_removal(&mut plan, x, y, z, false)?;
        }
        self.apply_ring_plan("delete triangle", &plan)
    }

    /// Adds to `plan` the removal of apex `c` from the ring of `(a, b)`,
    /// joining its neighbours when `join` is set.
    fn plan_apex_removal(
        &mut self,
        plan: &mut EditPlan,
        a: Tag,
        b: Tag,
        c: Tag,
        join: bool,
    ) -> Result<(), ComplexError> {
        let [next, prev] = self
            .ring_adjacencies(a, b, c)
            .ok_or(ComplexError::MissingTriangle { triangle: [a, b, c] })?;
        let on_edge = |from: Tag, to: Tag| stored_copies(&[a, b, from, to], &EDGE_ORDERINGS[..1]);
        plan.remove(&on_edge(prev, c));
        plan.remove(&on_edge(c, next));
        if join && !(prev == GHOST_VERTEX && next == GHOST_VERTEX) {
            plan.add(&on_edge(prev, next));
        }
        Ok(())
    }

    fn apply_ring_plan(&mut self, operation: &str, plan: &EditPlan) -> Result<(), ComplexError> {
        self.apply_plan(plan)?;
        self.consistent = false;
        debug!("[complex] {operation}: {} rings edited", plan.edits.len());
        Ok(())
    }

    fn check_new_vertex(&self, v: Tag) -> Result<(), ComplexError> {
        if v == GHOST_VERTEX {
            return Err(ComplexError::GhostVertex);
        }
        if !self.link_pairs(v).is_empty() {
            return Err(ComplexError::VertexInUse { vertex: v });
        }
        Ok(())
    }
}
