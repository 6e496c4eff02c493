//! Reflective z-order over finite points in three dimensions.
//!
//! Points are first split by octant, using `x < 0.0` so that `-0.0` joins the
//! positive side. Octants are visited in a Gray-code sequence, so consecutive
//! octants share a face. Inside an octant, the IEEE-754 bit patterns of the
//! absolute coordinates are compared by their most significant differing
//! bit, which interleaves exponent and mantissa bits exactly without any
//! quantization. The order is reversed in every second octant.
//!
//! ## Scope
//! - Pure ordering primitives; no pools or trees.

use std::cmp::Ordering;

/// A point in three dimensions.
pub type Point3 = [f64; 3];

/// Position of each octant code `(z<0)<<2 | (y<0)<<1 | (x<0)` in the Gray
/// sequence `000, 001, 011, 010, 110, 111, 101, 100`.
const OCTANT_RANK: [u8; 8] = [0, 1, 3, 2, 7, 6, 4, 5];

#[inline]
fn octant(p: &Point3) -> usize {
    usize::from(p[0] < 0.0) | (usize::from(p[1] < 0.0) << 1) | (usize::from(p[2] < 0.0) << 2)
}

/// True when the most significant set bit of `a` is below that of `b`.
#[inline]
const fn less_msb(a: u64, b: u64) -> bool {
    a < b && a < (a ^ b)
}

/// Returns true when `p` strictly precedes `q` in the reflective z-order.
///
/// Exactly one of `zorder_before(p, q)` and `zorder_before(q, p)` holds for
/// numerically distinct finite points; neither holds for equal points.
///
/// # Examples
///
/// ```rust
/// use tetstar::core::spatial::zorder::zorder_before;
///
/// let p = [0.25, 0.5, 0.75];
/// let q = [0.25, 0.5, -0.75];
/// assert!(zorder_before(&p, &q) != zorder_before(&q, &p));
/// assert!(!zorder_before(&p, &p));
/// ```
#[must_use]
pub fn zorder_before(p: &Point3, q: &Point3) -> bool {
    let (octant_p, octant_q) = (octant(p), octant(q));
    let (rank_p, rank_q) = (OCTANT_RANK[octant_p], OCTANT_RANK[octant_q]);
    if rank_p != rank_q {
        return rank_p < rank_q;
    }

    let bits_p = p.map(|c| c.abs().to_bits());
    let bits_q = q.map(|c| c.abs().to_bits());

    // Ties on the leading bit go to z, then y, then x.
    let mut axis = 2;
    let mut leading = bits_p[2] ^ bits_q[2];
    for candidate in [1, 0] {
        let diff = bits_p[candidate] ^ bits_q[candidate];
        if less_msb(leading, diff) {
            axis = candidate;
            leading = diff;
        }
    }
    if leading == 0 {
        return false;
    }

    let before = bits_p[axis] < bits_q[axis];
    if rank_p % 2 == 1 { !before } else { before }
}

/// Total ordering wrapper around [`zorder_before`] for use with `sort_by`.
///
/// # Examples
///
/// ```rust
/// use tetstar::core::spatial::zorder::zorder_cmp;
///
/// let mut points = vec![[1.0, 1.0, 1.0], [0.0, 0.0, 0.0], [0.5, 0.0, 0.0]];
/// points.sort_by(zorder_cmp);
/// assert_eq!(points[0], [0.0, 0.0, 0.0]);
/// ```
#[must_use]
pub fn zorder_cmp(p: &Point3, q: &Point3) -> Ordering {
    if zorder_before(p, q) {
        Ordering::Less
    } else if zorder_before(q, p) {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

/// Returns the indices of `points` sorted by z-order.
#[must_use]
pub fn zorder_sorted_indices(points: &[Point3]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..points.len()).collect();
    indices.sort_by(|&a, &b| zorder_cmp(&points[a], &points[b]));
    indices
}

/// Squared Euclidean distance.
#[inline]
#[must_use]
pub fn distance_squared(p: &Point3, q: &Point3) -> f64 {
    p.iter().zip(q).map(|(a, b)| (a - b) * (a - b)).sum()
}
