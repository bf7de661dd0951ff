//! Geometry oracle: the numeric intersection primitives the Boolean
//! pipeline consumes.
//!
//! Every answer is verified against the inputs before it is returned; a
//! result that is non-finite or misses its own residual bound is reported
//! as [`OracleError::NoConvergence`] instead of being trusted.

use nalgebra::Matrix3;
use thiserror::Error;

use super::curves::{Line3d, Segment};
use super::point::{Point3d, is_finite};
use super::surfaces::Plane;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OracleError {
    #[error("{query} did not converge (residual {residual:.3e})")]
    NoConvergence { query: &'static str, residual: f64 },

    #[error("{query} received degenerate input: {reason}")]
    Degenerate { query: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentSegment {
    Disjoint,
    /// Single crossing, with arc-length parameters on each segment.
    Point { point: Point3d, t_a: f64, t_b: f64 },
    /// Collinear overlap, as parameter ranges on each segment.
    Overlap { a: (f64, f64), b: (f64, f64) },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentPlane {
    Disjoint,
    Point { point: Point3d, t: f64 },
    /// The whole segment lies in the plane.
    InPlane,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlanePlane {
    Parallel,
    /// Same supporting plane; `same_sense` compares the normals.
    Coincident { same_sense: bool },
    Line(Line3d),
}

/// Numeric intersection primitives for the supported geometry.
pub trait GeometryOracle: Sync {
    fn segment_segment(&self, a: &Segment, b: &Segment, tol: f64) -> Result<SegmentSegment, OracleError>;

    fn segment_plane(&self, s: &Segment, plane: &Plane, tol: f64) -> Result<SegmentPlane, OracleError>;

    fn plane_plane(&self, p: &Plane, q: &Plane, tol: f64, angular: f64) -> Result<PlanePlane, OracleError>;
}

/// Closed-form oracle for planes and straight segments.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarOracle;

fn check_segment(query: &'static str, s: &Segment, tol: f64) -> Result<f64, OracleError> {
    let len = s.length();
    if !len.is_finite() || !is_finite(&s.start) {
        return Err(OracleError::NoConvergence { query, residual: f64::INFINITY });
    }
    if len <= tol {
        return Err(OracleError::Degenerate {
            query,
            reason: format!("segment length {len:.3e} below tolerance {tol:.3e}"),
        });
    }
    Ok(len)
}

impl GeometryOracle for PlanarOracle {
    fn segment_segment(&self, a: &Segment, b: &Segment, tol: f64) -> Result<SegmentSegment, OracleError> {
        const QUERY: &str = "segment/segment";
        let len_a = check_segment(QUERY, a, tol)?;
        let len_b = check_segment(QUERY, b, tol)?;
        let da = a.direction();
        let db = b.direction();
        let r = a.start - b.start;

        // Collinear when both ends of `b` sit on the line of `a`.
        let line_a = a.line();
        if line_a.distance_to_point(&b.start) <= tol && line_a.distance_to_point(&b.end) <= tol {
            let s0 = a.parameter_of(&b.start);
            let s1 = a.parameter_of(&b.end);
            let (lo, hi) = if s0 <= s1 { (s0, s1) } else { (s1, s0) };
            let lo = lo.max(0.0);
            let hi = hi.min(len_a);
            if hi - lo <= tol {
                // Touching end to end is a point contact.
                if hi - lo >= -tol {
                    let t_a = 0.5 * (lo + hi);
                    let point = a.point_at(t_a.clamp(0.0, len_a));
                    let t_b = b.parameter_of(&point).clamp(0.0, len_b);
                    return Ok(SegmentSegment::Point { point, t_a: t_a.clamp(0.0, len_a), t_b });
                }
                return Ok(SegmentSegment::Disjoint);
            }
            let b0 = b.parameter_of(&a.point_at(lo)).clamp(0.0, len_b);
            let b1 = b.parameter_of(&a.point_at(hi)).clamp(0.0, len_b);
            return Ok(SegmentSegment::Overlap { a: (lo, hi), b: (b0, b1) });
        }

        // Closest points of the two lines.
        let d = da.dot(&db);
        let e = da.dot(&r);
        let f = db.dot(&r);
        let denom = 1.0 - d * d;
        let (t_a, t_b) = if denom.abs() < 1e-14 {
            // Parallel but not collinear.
            return Ok(SegmentSegment::Disjoint);
        } else {
            ((d * f - e) / denom, (f - d * e) / denom)
        };
        if !t_a.is_finite() || !t_b.is_finite() {
            return Err(OracleError::NoConvergence { query: QUERY, residual: f64::INFINITY });
        }
        if t_a < -tol || t_a > len_a + tol || t_b < -tol || t_b > len_b + tol {
            return Ok(SegmentSegment::Disjoint);
        }
        let t_a = t_a.clamp(0.0, len_a);
        let t_b = t_b.clamp(0.0, len_b);
        let pa = a.point_at(t_a);
        let pb = b.point_at(t_b);
        if (pa - pb).norm() > tol {
            return Ok(SegmentSegment::Disjoint);
        }
        Ok(SegmentSegment::Point {
            point: nalgebra::center(&pa, &pb),
            t_a,
            t_b,
        })
    }

    fn segment_plane(&self, s: &Segment, plane: &Plane, tol: f64) -> Result<SegmentPlane, OracleError> {
        const QUERY: &str = "segment/plane";
        let len = check_segment(QUERY, s, tol)?;
        let d0 = plane.signed_distance(&s.start);
        let d1 = plane.signed_distance(&s.end);
        if !d0.is_finite() || !d1.is_finite() {
            return Err(OracleError::NoConvergence { query: QUERY, residual: f64::INFINITY });
        }
        if d0.abs() <= tol && d1.abs() <= tol {
            return Ok(SegmentPlane::InPlane);
        }
        if (d0 > tol && d1 > tol) || (d0 < -tol && d1 < -tol) {
            return Ok(SegmentPlane::Disjoint);
        }
        // An endpoint within tolerance is the answer; interpolating toward it
        // only adds rounding.
        if d0.abs() <= tol {
            return Ok(SegmentPlane::Point { point: s.start, t: 0.0 });
        }
        if d1.abs() <= tol {
            return Ok(SegmentPlane::Point { point: s.end, t: len });
        }
        let t = len * d0 / (d0 - d1);
        let (point, t) = if t <= 0.0 {
            (s.start, 0.0)
        } else if t >= len {
            (s.end, len)
        } else {
            (s.point_at(t), t)
        };
        let residual = plane.distance_to_point(&point);
        if !residual.is_finite() || residual > tol {
            return Err(OracleError::NoConvergence { query: QUERY, residual });
        }
        Ok(SegmentPlane::Point { point, t })
    }

    fn plane_plane(&self, p: &Plane, q: &Plane, tol: f64, angular: f64) -> Result<PlanePlane, OracleError> {
        const QUERY: &str = "plane/plane";
        let dir = p.normal.cross(&q.normal);
        let sin = dir.norm();
        if !sin.is_finite() {
            return Err(OracleError::NoConvergence { query: QUERY, residual: f64::INFINITY });
        }
        if sin <= angular {
            if q.distance_to_point(&p.origin) <= tol {
                return Ok(PlanePlane::Coincident {
                    same_sense: p.normal.dot(&q.normal) > 0.0,
                });
            }
            return Ok(PlanePlane::Parallel);
        }
        let dir = dir / sin;
        let m = Matrix3::from_rows(&[
            p.normal.transpose(),
            q.normal.transpose(),
            dir.transpose(),
        ]);
        let rhs = nalgebra::Vector3::new(
            p.normal.dot(&p.origin.coords),
            q.normal.dot(&q.origin.coords),
            dir.dot(&p.origin.coords),
        );
        let origin = m
            .lu()
            .solve(&rhs)
            .map(Point3d::from)
            .ok_or(OracleError::NoConvergence { query: QUERY, residual: f64::INFINITY })?;
        let residual = p.distance_to_point(&origin).max(q.distance_to_point(&origin));
        if !is_finite(&origin) || residual > tol {
            return Err(OracleError::NoConvergence { query: QUERY, residual });
        }
        Ok(PlanePlane::Line(Line3d { origin, direction: dir }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Vec3;

    const TOL: f64 = 1e-9;

    fn seg(a: [f64; 3], b: [f64; 3]) -> Segment {
        Segment::new(Point3d::new(a[0], a[1], a[2]), Point3d::new(b[0], b[1], b[2]))
    }

    #[test]
    fn test_crossing_segments() {
        let r = PlanarOracle
            .segment_segment(&seg([0.0, 0.0, 0.0], [2.0, 0.0, 0.0]), &seg([1.0, -1.0, 0.0], [1.0, 1.0, 0.0]), TOL)
            .unwrap();
        match r {
            SegmentSegment::Point { point, t_a, t_b } => {
                assert!((point - Point3d::new(1.0, 0.0, 0.0)).norm() < 1e-12);
                assert!((t_a - 1.0).abs() < 1e-12);
                assert!((t_b - 1.0).abs() < 1e-12);
            }
            other => panic!("expected a point, got {other:?}"),
        }
    }

    #[test]
    fn test_skew_segments_are_disjoint() {
        let r = PlanarOracle
            .segment_segment(&seg([0.0, 0.0, 0.0], [2.0, 0.0, 0.0]), &seg([1.0, -1.0, 1.0], [1.0, 1.0, 1.0]), TOL)
            .unwrap();
        assert_eq!(r, SegmentSegment::Disjoint);
    }

    #[test]
    fn test_collinear_overlap() {
        let r = PlanarOracle
            .segment_segment(&seg([0.0, 0.0, 0.0], [2.0, 0.0, 0.0]), &seg([3.0, 0.0, 0.0], [1.0, 0.0, 0.0]), TOL)
            .unwrap();
        match r {
            SegmentSegment::Overlap { a, b } => {
                assert!((a.0 - 1.0).abs() < 1e-12 && (a.1 - 2.0).abs() < 1e-12);
                assert!((b.0 - 2.0).abs() < 1e-12 && (b.1 - 1.0).abs() < 1e-12);
            }
            other => panic!("expected overlap, got {other:?}"),
        }
    }

    #[test]
    fn test_degenerate_segment_is_reported() {
        let r = PlanarOracle.segment_segment(&seg([0.0; 3], [0.0; 3]), &seg([0.0; 3], [1.0, 0.0, 0.0]), TOL);
        assert!(matches!(r, Err(OracleError::Degenerate { .. })));
    }

    #[test]
    fn test_segment_plane() {
        let plane = Plane::new(Point3d::new(0.0, 0.0, 1.0), Vec3::z());
        let r = PlanarOracle.segment_plane(&seg([0.0, 0.0, 0.0], [0.0, 0.0, 4.0]), &plane, TOL).unwrap();
        assert!(matches!(r, SegmentPlane::Point { t, .. } if (t - 1.0).abs() < 1e-12));
        let r = PlanarOracle.segment_plane(&seg([0.0, 0.0, 1.0], [3.0, 0.0, 1.0]), &plane, TOL).unwrap();
        assert_eq!(r, SegmentPlane::InPlane);
        let r = PlanarOracle.segment_plane(&seg([0.0, 0.0, 2.0], [3.0, 0.0, 5.0]), &plane, TOL).unwrap();
        assert_eq!(r, SegmentPlane::Disjoint);
    }

    #[test]
    fn test_endpoint_at_tolerance_is_returned_exactly() {
        let plane = Plane::new(Point3d::new(0.5, 0.5, 1.0), Vec3::z());
        let s = seg([0.5 + 2e-7, 0.5, 2e-7], [0.5 + 2e-7, 0.5, 1.0 - 2e-7]);
        let tol = plane.distance_to_point(&s.end);
        match PlanarOracle.segment_plane(&s, &plane, tol).unwrap() {
            SegmentPlane::Point { point, t } => {
                assert_eq!(point, s.end);
                assert_eq!(t, s.length());
            }
            other => panic!("expected the end point, got {other:?}"),
        }

        let reversed = Segment::new(s.end, s.start);
        match PlanarOracle.segment_plane(&reversed, &plane, tol).unwrap() {
            SegmentPlane::Point { point, t } => {
                assert_eq!(point, reversed.start);
                assert_eq!(t, 0.0);
            }
            other => panic!("expected the start point, got {other:?}"),
        }
    }

    #[test]
    fn test_plane_plane_line() {
        let p = Plane::new(Point3d::new(1.0, 0.0, 0.0), Vec3::x());
        let q = Plane::new(Point3d::new(0.0, 2.0, 0.0), Vec3::y());
        match PlanarOracle.plane_plane(&p, &q, TOL, 1e-12).unwrap() {
            PlanePlane::Line(line) => {
                assert!(p.distance_to_point(&line.origin) < 1e-12);
                assert!(q.distance_to_point(&line.origin) < 1e-12);
                assert!((line.direction.z.abs() - 1.0).abs() < 1e-12);
            }
            other => panic!("expected a line, got {other:?}"),
        }
    }

    #[test]
    fn test_plane_plane_coincident_and_parallel() {
        let p = Plane::new(Point3d::origin(), Vec3::z());
        let same = Plane::new(Point3d::new(5.0, 5.0, 0.0), Vec3::z());
        let opposite = same.flipped();
        let lifted = Plane::new(Point3d::new(0.0, 0.0, 1.0), Vec3::z());
        assert_eq!(
            PlanarOracle.plane_plane(&p, &same, TOL, 1e-12).unwrap(),
            PlanePlane::Coincident { same_sense: true }
        );
        assert_eq!(
            PlanarOracle.plane_plane(&p, &opposite, TOL, 1e-12).unwrap(),
            PlanePlane::Coincident { same_sense: false }
        );
        assert_eq!(PlanarOracle.plane_plane(&p, &lifted, TOL, 1e-12).unwrap(), PlanePlane::Parallel);
    }
}
