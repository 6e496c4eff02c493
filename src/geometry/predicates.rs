//! Orientation and insphere predicates for points in 3D.
//!
//! A tetrahedron `(a, b, c, d)` of a [`TetComplex`](crate::core::complex::TetComplex)
//! is *positively oriented* when [`orient3d`] returns
//! [`Orientation::POSITIVE`] for its vertex positions, i.e. when `d` lies
//! below the plane through `a`, `b` and `c` with those three appearing
//! counterclockwise from above.
//!
//! The complex itself never evaluates geometry; the predicates are provided
//! for callers that decide where to flip, through the [`PredicateOracle`]
//! trait.

use std::fmt;

use crate::core::spatial::zorder::Point3;

/// Represents the position of a point relative to a circumsphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InSphere {
    /// The point is outside the circumsphere
    OUTSIDE,
    /// The point is on the circumsphere (within tolerance)
    BOUNDARY,
    /// The point is inside the circumsphere
    INSIDE,
}

impl fmt::Display for InSphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OUTSIDE => write!(f, "OUTSIDE"),
            Self::BOUNDARY => write!(f, "BOUNDARY"),
            Self::INSIDE => write!(f, "INSIDE"),
        }
    }
}

/// Represents the orientation of a tetrahedron.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Negative orientation (determinant < 0)
    NEGATIVE,
    /// Coplanar points (determinant ≈ 0)
    DEGENERATE,
    /// Positive orientation (determinant > 0)
    POSITIVE,
}

impl Orientation {
    /// The orientation of the mirrored tetrahedron.
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::NEGATIVE => Self::POSITIVE,
            Self::DEGENERATE => Self::DEGENERATE,
            Self::POSITIVE => Self::NEGATIVE,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NEGATIVE => write!(f, "NEGATIVE"),
            Self::DEGENERATE => write!(f, "DEGENERATE"),
            Self::POSITIVE => write!(f, "POSITIVE"),
        }
    }
}

/// Geometric tests used to drive flips.
pub trait PredicateOracle {
    /// Orientation of the tetrahedron `(a, b, c, d)`.
    fn orient3d(&self, a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> Orientation;

    /// Position of `e` relative to the circumsphere of `(a, b, c, d)`. The
    /// answer does not depend on the orientation of `(a, b, c, d)`; a
    /// degenerate tetrahedron reports [`InSphere::BOUNDARY`].
    fn insphere(&self, a: &Point3, b: &Point3, c: &Point3, d: &Point3, e: &Point3) -> InSphere;
}

/// Plain floating-point predicates with a relative tolerance.
///
/// Results near zero are reported as [`Orientation::DEGENERATE`] or
/// [`InSphere::BOUNDARY`] rather than guessed. Not exact: nearly degenerate
/// inputs may be misclassified by a tolerance-sized margin.
///
/// # Examples
///
/// ```rust
/// use tetstar::geometry::predicates::{FastPredicates, InSphere, Orientation, PredicateOracle};
///
/// let oracle = FastPredicates::default();
/// let a = [0.0, 0.0, 0.0];
/// let b = [1.0, 0.0, 0.0];
/// let c = [0.0, 1.0, 0.0];
/// let d = [0.0, 0.0, 1.0];
/// assert_eq!(oracle.orient3d(&a, &b, &c, &d), Orientation::NEGATIVE);
/// assert_eq!(oracle.orient3d(&a, &c, &b, &d), Orientation::POSITIVE);
/// assert_eq!(oracle.insphere(&a, &b, &c, &d, &[0.2, 0.2, 0.2]), InSphere::INSIDE);
/// assert_eq!(oracle.insphere(&a, &b, &c, &d, &[2.0, 2.0, 2.0]), InSphere::OUTSIDE);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FastPredicates {
    /// Results whose magnitude is below this fraction of the operands'
    /// magnitude count as zero.
    pub relative_tolerance: f64,
}

impl Default for FastPredicates {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-12,
        }
    }
}

impl PredicateOracle for FastPredicates {
    fn orient3d(&self, a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> Orientation {
        let (det, magnitude) = orient3d_det(a, b, c, d);
        let tolerance = self.relative_tolerance * magnitude;
        if det > tolerance {
            Orientation::POSITIVE
        } else if det < -tolerance {
            Orientation::NEGATIVE
        } else {
            Orientation::DEGENERATE
        }
    }

    fn insphere(&self, a: &Point3, b: &Point3, c: &Point3, d: &Point3, e: &Point3) -> InSphere {
        let orientation = self.orient3d(a, b, c, d);
        if orientation == Orientation::DEGENERATE {
            return InSphere::BOUNDARY;
        }
        let (mut det, magnitude) = insphere_det(a, b, c, d, e);
        if orientation == Orientation::NEGATIVE {
            det = -det;
        }
        let tolerance = self.relative_tolerance * magnitude;
        if det > tolerance {
            InSphere::INSIDE
        } else if det < -tolerance {
            InSphere::OUTSIDE
        } else {
            InSphere::BOUNDARY
        }
    }
}

#[inline]
fn sub(p: &Point3, q: &Point3) -> Point3 {
    [p[0] - q[0], p[1] - q[1], p[2] - q[2]]
}

/// `det [a - d; b - d; c - d]` and the matching permanent of magnitudes.
fn orient3d_det(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> (f64, f64) {
    let [ax, ay, az] = sub(a, d);
    let [bx, by, bz] = sub(b, d);
    let [cx, cy, cz] = sub(c, d);
    let det = az * (bx * cy - by * cx) + bz * (cx * ay - cy * ax) + cz * (ax * by - ay * bx);
    let permanent = az.abs() * ((bx * cy).abs() + (by * cx).abs())
        + bz.abs() * ((cx * ay).abs() + (cy * ax).abs())
        + cz.abs() * ((ax * by).abs() + (ay * bx).abs());
    (det, permanent)
}

/// Lifted determinant: positive when `e` is inside the sphere through a
/// positively oriented `(a, b, c, d)`.
fn insphere_det(a: &Point3, b: &Point3, c: &Point3, d: &Point3, e: &Point3) -> (f64, f64) {
    let rows = [sub(a, e), sub(b, e), sub(c, e), sub(d, e)];
    let lift = |p: &Point3| p[0] * p[0] + p[1] * p[1] + p[2] * p[2];
    let mut det = 0.0;
    let mut magnitude = 0.0;
    for (i, row) in rows.iter().enumerate() {
        let others: Vec<&Point3> = rows
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(_, r)| r)
            .collect();
        let (minor, minor_magnitude) = det3(others[0], others[1], others[2]);
        // Cofactor sign of column 3, row i.
        let sign = if i % 2 == 0 { -1.0 } else { 1.0 };
        det += sign * lift(row) * minor;
        magnitude += lift(row) * minor_magnitude;
    }
    (det, magnitude)
}

fn det3(p: &Point3, q: &Point3, r: &Point3) -> (f64, f64) {
    let terms = [
        p[0] * (q[1] * r[2] - q[2] * r[1]),
        p[1] * (q[2] * r[0] - q[0] * r[2]),
        p[2] * (q[0] * r[1] - q[1] * r[0]),
    ];
    let magnitude = p[0].abs() * ((q[1] * r[2]).abs() + (q[2] * r[1]).abs())
        + p[1].abs() * ((q[2] * r[0]).abs() + (q[0] * r[2]).abs())
        + p[2].abs() * ((q[0] * r[1]).abs() + (q[1] * r[0]).abs());
    (terms.iter().sum(), magnitude)
}

/// [`FastPredicates::orient3d`] with the default tolerance.
#[must_use]
pub fn orient3d(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> Orientation {
    FastPredicates::default().orient3d(a, b, c, d)
}

/// [`FastPredicates::insphere`] with the default tolerance.
#[must_use]
pub fn insphere(a: &Point3, b: &Point3, c: &Point3, d: &Point3, e: &Point3) -> InSphere {
    FastPredicates::default().insphere(a, b, c, d, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const A: Point3 = [1.0, 0.0, 0.0];
    const B: Point3 = [0.0, 1.0, 0.0];
    const C: Point3 = [0.0, 0.0, 1.0];
    const D: Point3 = [-1.0, 0.0, 0.0];

    #[test]
    fn test_orientation_flips_with_swapped_vertices() {
        assert_eq!(orient3d(&A, &B, &C, &D), Orientation::POSITIVE);
        assert_eq!(orient3d(&B, &A, &C, &D), Orientation::NEGATIVE);
        // Even permutations keep the sign.
        assert_eq!(orient3d(&B, &C, &A, &D), Orientation::POSITIVE);
        assert_eq!(orient3d(&C, &D, &A, &B), Orientation::POSITIVE);
        assert_eq!(
            orient3d(&A, &B, &[1.0, 1.0, 0.0], &[2.0, -1.0, 0.0]),
            Orientation::DEGENERATE
        );
    }

    #[test]
    fn test_orient3d_determinant_is_six_volumes() {
        let (det, _) = orient3d_det(&A, &B, &C, &D);
        // Volume of (A, B, C, D) is 1/3.
        assert_relative_eq!(det, 2.0);
    }

    #[test]
    fn test_insphere_is_orientation_independent() {
        let origin = [0.0, 0.0, 0.0];
        assert_eq!(insphere(&A, &B, &C, &D, &origin), InSphere::INSIDE);
        assert_eq!(insphere(&B, &A, &C, &D, &origin), InSphere::INSIDE);
        assert_eq!(insphere(&A, &B, &C, &D, &[0.0, -1.0, 0.0]), InSphere::BOUNDARY);
        assert_eq!(insphere(&A, &B, &C, &D, &[0.0, 0.0, -3.0]), InSphere::OUTSIDE);
        assert_eq!(insphere(&B, &A, &C, &D, &[0.0, 0.0, -3.0]), InSphere::OUTSIDE);
    }

    #[test]
    fn test_degenerate_tetrahedron_reports_boundary() {
        let flat = [0.5, 0.5, 0.0];
        assert_eq!(
            insphere(&A, &B, &flat, &[0.0, 0.0, 0.0], &[9.0, 9.0, 9.0]),
            InSphere::BOUNDARY
        );
    }

    #[test]
    fn test_display_and_reverse() {
        assert_eq!(Orientation::POSITIVE.to_string(), "POSITIVE");
        assert_eq!(Orientation::NEGATIVE.reversed(), Orientation::POSITIVE);
        assert_eq!(Orientation::DEGENERATE.reversed(), Orientation::DEGENERATE);
        assert_eq!(InSphere::BOUNDARY.to_string(), "BOUNDARY");
    }
}
