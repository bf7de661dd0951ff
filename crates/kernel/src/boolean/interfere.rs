//! Interference detection between shapes of the two operands.
//!
//! Candidate pairs come from the BVH; each pair is checked by dimension
//! (vertex/vertex up to face/face) through the geometry oracle. A pair is
//! always evaluated in canonical order, lower `(kind, index)` first, and the
//! records are swapped back afterwards, so the answer never depends on which
//! side asked.

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::bvh::Bvh;
use super::error::{BooleanError, CancelToken, WarningCode, WarningLog};
use super::index::{Operand, ShapeGeometry, ShapeIndexMap, ShapeKind};
use crate::config::BooleanConfig;
use crate::geometry::bbox::BoundingBox;
use crate::geometry::curves::{Line3d, Segment};
use crate::geometry::oracle::{GeometryOracle, OracleError, PlanePlane, SegmentPlane, SegmentSegment};
use crate::geometry::point::{distance, midpoint, Point2d, Point3d, Vec2, Vec3};
use crate::geometry::polygon::{Location, PlanarRegion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InterferenceKind {
    VertexVertex,
    VertexEdge,
    VertexFace,
    EdgeEdge,
    EdgeFace,
    FaceFace,
}

impl InterferenceKind {
    fn of(a: ShapeKind, b: ShapeKind) -> Self {
        use ShapeKind::*;
        match (a.min(b), a.max(b)) {
            (Vertex, Vertex) => Self::VertexVertex,
            (Vertex, Edge) => Self::VertexEdge,
            (Vertex, Face) => Self::VertexFace,
            (Edge, Edge) => Self::EdgeEdge,
            (Edge, Face) => Self::EdgeFace,
            _ => Self::FaceFace,
        }
    }
}

/// Where two shapes meet. Edge parameters are arc lengths; `None` marks a
/// side that is not an edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Locus {
    Point {
        point: Point3d,
        first: Option<f64>,
        second: Option<f64>,
    },
    /// A stretch of the first shape (an edge) lying on the second.
    Range { first: (f64, f64), second: Option<(f64, f64)> },
    /// Section segment of two crossing faces, clipped to both.
    Segment { start: Point3d, end: Point3d },
    Coplanar { same_sense: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interference {
    pub first: usize,
    pub second: usize,
    pub kind: InterferenceKind,
    pub locus: Locus,
    /// Sum of the two shape tolerances.
    pub tolerance: f64,
}

impl Interference {
    /// The same record seen from the other shape.
    pub fn swapped(&self) -> Self {
        let locus = match self.locus {
            Locus::Point { point, first, second } => Locus::Point {
                point,
                first: second,
                second: first,
            },
            Locus::Range { first, second } => match second {
                Some(second) => Locus::Range {
                    first: second,
                    second: Some(first),
                },
                None => self.locus,
            },
            other => other,
        };
        Self {
            first: self.second,
            second: self.first,
            kind: self.kind,
            locus,
            tolerance: self.tolerance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectError {
    /// One element of the pair is degenerate; the pair is skipped.
    #[error("degenerate pair ({first}, {second}): {reason}")]
    Degenerate { first: usize, second: usize, reason: String },

    #[error("unresolved pair ({first}, {second}): {source}")]
    Unresolved {
        first: usize,
        second: usize,
        source: OracleError,
    },
}

/// Evaluate one candidate pair.
pub fn detect(
    index: &ShapeIndexMap,
    i: usize,
    j: usize,
    oracle: &dyn GeometryOracle,
    config: &BooleanConfig,
) -> Result<Vec<Interference>, DetectError> {
    let (lo, hi) = canonical(index, i, j);
    let swap = lo != i;
    let found = detect_ordered(index, lo, hi, oracle, config)?;
    Ok(if swap {
        found.iter().map(Interference::swapped).collect()
    } else {
        found
    })
}

/// The pair in evaluation order: lower `(kind, index)` first.
pub fn canonical(index: &ShapeIndexMap, i: usize, j: usize) -> (usize, usize) {
    if (index.get(j).kind(), j) < (index.get(i).kind(), i) { (j, i) } else { (i, j) }
}

fn detect_ordered(
    index: &ShapeIndexMap,
    lo: usize,
    hi: usize,
    oracle: &dyn GeometryOracle,
    config: &BooleanConfig,
) -> Result<Vec<Interference>, DetectError> {
    let (a, b) = (index.get(lo), index.get(hi));
    let tol = a.tolerance + b.tolerance;
    let kind = InterferenceKind::of(a.kind(), b.kind());
    let unresolved = |e: OracleError| match e {
        OracleError::Degenerate { reason, .. } => DetectError::Degenerate {
            first: lo,
            second: hi,
            reason,
        },
        source => DetectError::Unresolved {
            first: lo,
            second: hi,
            source,
        },
    };
    let record = |locus| Interference {
        first: lo,
        second: hi,
        kind,
        locus,
        tolerance: tol,
    };

    let mut out = Vec::new();
    match (&a.geometry, &b.geometry) {
        (ShapeGeometry::Vertex(p), ShapeGeometry::Vertex(q)) => {
            if distance(p, q) <= tol {
                out.push(record(Locus::Point {
                    point: midpoint(p, q),
                    first: None,
                    second: None,
                }));
            }
        }
        (ShapeGeometry::Vertex(p), ShapeGeometry::Edge(e)) => {
            let t = e.segment.parameter_of(p);
            let len = e.segment.length();
            if t >= -tol && t <= len + tol && e.segment.distance_to_point(p) <= tol {
                out.push(record(Locus::Point {
                    point: *p,
                    first: None,
                    second: Some(t.clamp(0.0, len)),
                }));
            }
        }
        (ShapeGeometry::Vertex(p), ShapeGeometry::Face(f)) => {
            if f.region.locate(p, tol) == Location::Inside {
                out.push(record(Locus::Point {
                    point: *p,
                    first: None,
                    second: None,
                }));
            }
        }
        (ShapeGeometry::Edge(ea), ShapeGeometry::Edge(eb)) => {
            match oracle.segment_segment(&ea.segment, &eb.segment, tol).map_err(unresolved)? {
                SegmentSegment::Disjoint => {}
                SegmentSegment::Point { point, t_a, t_b } => out.push(record(Locus::Point {
                    point,
                    first: Some(t_a),
                    second: Some(t_b),
                })),
                SegmentSegment::Overlap { a, b } => out.push(record(Locus::Range {
                    first: a,
                    second: Some(b),
                })),
            }
        }
        (ShapeGeometry::Edge(e), ShapeGeometry::Face(f)) => {
            match oracle.segment_plane(&e.segment, &f.region.plane, tol).map_err(unresolved)? {
                SegmentPlane::Disjoint => {}
                SegmentPlane::Point { point, t } => {
                    if f.region.locate(&point, tol) == Location::Inside {
                        out.push(record(Locus::Point {
                            point,
                            first: Some(t),
                            second: None,
                        }));
                    }
                }
                SegmentPlane::InPlane => {
                    for range in clip_segment(&e.segment, &f.region, tol) {
                        out.push(record(Locus::Range { first: range, second: None }));
                    }
                }
            }
        }
        (ShapeGeometry::Face(fa), ShapeGeometry::Face(fb)) => {
            let on = tol.max(config.tolerance.on_distance);
            let planes = oracle
                .plane_plane(&fa.region.plane, &fb.region.plane, on, config.tolerance.angular)
                .map_err(unresolved)?;
            match planes {
                PlanePlane::Parallel => {}
                PlanePlane::Coincident { same_sense } => out.push(record(Locus::Coplanar { same_sense })),
                PlanePlane::Line(line) => {
                    for (s, e) in section_intervals(&line, &fa.region, &fb.region, tol) {
                        out.push(record(Locus::Segment {
                            start: line.evaluate(s),
                            end: line.evaluate(e),
                        }));
                    }
                }
            }
        }
        // Canonical order puts the lower dimension first.
        _ => {}
    }
    Ok(out)
}

/// In-plane direction of a 3D unit vector in a region's frame.
fn frame_direction(region: &PlanarRegion, origin: &Point3d, direction: &Vec3) -> (Point2d, Vec2) {
    let o = region.plane.project(origin);
    let d = Vec2::new(direction.dot(&region.plane.u_axis), direction.dot(&region.plane.v_axis));
    let n = d.norm();
    (o, if n > 0.0 { d / n } else { d })
}

/// Sub-ranges of an in-plane segment strictly inside the region.
fn clip_segment(segment: &Segment, region: &PlanarRegion, tol: f64) -> Vec<(f64, f64)> {
    let (o, d) = frame_direction(region, &segment.start, &segment.direction());
    let len = segment.length();
    region
        .region
        .clip_line(&o, &d, tol, false)
        .into_iter()
        .map(|(s, e)| (s.max(0.0), e.min(len)))
        .filter(|(s, e)| e - s > tol)
        .collect()
}

/// Stretches of the line lying in both regions, boundaries included.
fn section_intervals(line: &Line3d, a: &PlanarRegion, b: &PlanarRegion, tol: f64) -> Vec<(f64, f64)> {
    let clip = |region: &PlanarRegion| {
        let (o, d) = frame_direction(region, &line.origin, &line.direction);
        region.region.clip_line(&o, &d, tol, true)
    };
    let on_a = clip(a);
    if on_a.is_empty() {
        return Vec::new();
    }
    let on_b = clip(b);
    let mut out = Vec::new();
    for &(a0, a1) in &on_a {
        for &(b0, b1) in &on_b {
            let (s, e) = (a0.max(b0), a1.min(b1));
            if e - s > tol {
                out.push((s, e));
            }
        }
    }
    out.sort_by(|x, y| x.0.total_cmp(&y.0));
    out
}

/// Pairs `(a, b)` with `a` from operand A and `b` from operand B whose boxes
/// overlap, sorted.
#[instrument(skip_all)]
pub fn candidate_pairs(index: &ShapeIndexMap, config: &BooleanConfig) -> Vec<(usize, usize)> {
    let boxes = |operand: Operand| -> Vec<(usize, BoundingBox)> {
        index
            .iter()
            .filter(|(_, s)| s.operand == operand)
            .map(|(i, s)| (i, s.bbox))
            .collect()
    };
    let bvh = Bvh::build(&boxes(Operand::B), config.bvh_leaf_size);
    let queries = boxes(Operand::A);
    let query = |(i, bbox): &(usize, BoundingBox)| -> Vec<(usize, usize)> {
        bvh.query(bbox).into_iter().map(|j| (*i, j)).collect()
    };
    let pairs: Vec<(usize, usize)> = if config.parallel {
        queries.par_iter().flat_map_iter(query).collect()
    } else {
        queries.iter().flat_map(query).collect()
    };
    debug!(pairs = pairs.len(), "candidate pairs");
    pairs
}

#[derive(Default)]
struct Buffer {
    found: Vec<Interference>,
    errors: Vec<DetectError>,
}

impl Buffer {
    fn absorb(mut self, result: Result<Vec<Interference>, DetectError>) -> Self {
        match result {
            Ok(found) => self.found.extend(found),
            Err(e) => self.errors.push(e),
        }
        self
    }

    fn append(mut self, other: Buffer) -> Self {
        self.found.extend(other.found);
        self.errors.extend(other.errors);
        self
    }
}

/// Detect every interference between the operands. Records come back in
/// canonical order.
///
/// Degenerate pairs become warnings and are skipped. An oracle failure on
/// any pair aborts with `UnresolvedIntersection` for the lowest such pair,
/// after every skip has been logged.
#[instrument(skip_all)]
pub fn detect_all(
    index: &ShapeIndexMap,
    oracle: &dyn GeometryOracle,
    config: &BooleanConfig,
    cancel: &CancelToken,
    warnings: &mut WarningLog,
) -> Result<Vec<Interference>, BooleanError> {
    let pairs = candidate_pairs(index, config);
    let batch = config.pair_batch_size.max(1);
    let mut total = Buffer::default();
    for chunk in pairs.chunks(batch) {
        cancel.check()?;
        let run = |&(i, j): &(usize, usize)| {
            let (lo, hi) = canonical(index, i, j);
            detect_ordered(index, lo, hi, oracle, config)
        };
        let part = if config.parallel {
            chunk
                .par_iter()
                .fold(Buffer::default, |buf, pair| buf.absorb(run(pair)))
                .reduce(Buffer::default, Buffer::append)
        } else {
            chunk.iter().fold(Buffer::default(), |buf, pair| buf.absorb(run(pair)))
        };
        total = total.append(part);
    }

    // Skipped pairs are reported before the first unresolved one aborts.
    let mut unresolved = None;
    for error in total.errors {
        match error {
            DetectError::Degenerate { first, second, reason } => warnings.push(
                WarningCode::GeometricDegeneracy,
                format!("{} / {}: {reason}; pair skipped", index.describe(first), index.describe(second)),
            ),
            DetectError::Unresolved { first, second, source } => {
                if unresolved.as_ref().is_none_or(|&(f, s, _)| (first, second) < (f, s)) {
                    unresolved = Some((first, second, source));
                }
            }
        }
    }
    if let Some((first, second, source)) = unresolved {
        return Err(BooleanError::UnresolvedIntersection {
            first: index.describe(first),
            second: index.describe(second),
            reason: source.to_string(),
        });
    }

    let mut found = total.found;
    found.sort_by_key(|r| (r.first.min(r.second), r.first.max(r.second), r.kind));
    info!(
        pairs = pairs.len(),
        interferences = found.len(),
        "interference detection complete"
    );
    Ok(found)
}
