//! Planar polygon regions: containment, line clipping, interior points and
//! ray hits, all in a face's 2D frame.

use serde::{Deserialize, Serialize};

use super::bbox::BoundingBox;
use super::curves::Ray;
use super::point::{cross2, Point2d, Point3d, Vec2};
use super::surfaces::Plane;

/// Where a point sits relative to a closed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    Inside,
    Boundary,
    Outside,
}

/// Shoelace area; positive for counter-clockwise loops.
pub fn signed_area(poly: &[Point2d]) -> f64 {
    let n = poly.len();
    let mut sum = 0.0;
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }
    0.5 * sum
}

/// Even-odd point-in-polygon test by horizontal ray casting.
pub fn point_in_polygon(p: &Point2d, poly: &[Point2d]) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (poly[i], poly[j]);
        if (pi.y > p.y) != (pj.y > p.y) && p.x < (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

pub fn distance_to_segment(p: &Point2d, a: &Point2d, b: &Point2d) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 == 0.0 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// True when the two segments cross at a single interior point. Touching
/// and collinear contact do not count.
pub fn segments_cross(a0: &Point2d, a1: &Point2d, b0: &Point2d, b1: &Point2d, tol: f64) -> bool {
    let side = |p: &Point2d, q: &Point2d, r: &Point2d| {
        let d = q - p;
        let len = d.norm();
        if len == 0.0 { 0.0 } else { cross2(&d, &(r - p)) / len }
    };
    let strictly_apart = |x: f64, y: f64| (x > tol && y < -tol) || (x < -tol && y > tol);
    strictly_apart(side(a0, a1, b0), side(a0, a1, b1)) && strictly_apart(side(b0, b1, a0), side(b0, b1, a1))
}

/// A polygon with holes. The outer loop runs counter-clockwise, holes clockwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub outer: Vec<Point2d>,
    pub holes: Vec<Vec<Point2d>>,
}

impl Region {
    pub fn new(outer: Vec<Point2d>, holes: Vec<Vec<Point2d>>) -> Self {
        Self { outer, holes }
    }

    pub fn loops(&self) -> impl Iterator<Item = &[Point2d]> + '_ {
        std::iter::once(self.outer.as_slice()).chain(self.holes.iter().map(|h| h.as_slice()))
    }

    /// Every boundary edge of every loop.
    pub fn edges(&self) -> impl Iterator<Item = (Point2d, Point2d)> + '_ {
        self.loops().flat_map(|l| (0..l.len()).map(move |i| (l[i], l[(i + 1) % l.len()])))
    }

    pub fn area(&self) -> f64 {
        self.loops().map(signed_area).sum()
    }

    /// True when two boundary edges cross each other.
    pub fn self_intersects(&self, tol: f64) -> bool {
        let edges: Vec<(Point2d, Point2d)> = self.edges().collect();
        for i in 0..edges.len() {
            for j in (i + 1)..edges.len() {
                if segments_cross(&edges[i].0, &edges[i].1, &edges[j].0, &edges[j].1, tol) {
                    return true;
                }
            }
        }
        false
    }

    pub fn distance_to_boundary(&self, p: &Point2d) -> f64 {
        self.edges()
            .map(|(a, b)| distance_to_segment(p, &a, &b))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn locate(&self, p: &Point2d, tol: f64) -> Location {
        if self.distance_to_boundary(p) <= tol {
            return Location::Boundary;
        }
        if !point_in_polygon(p, &self.outer) || self.holes.iter().any(|h| point_in_polygon(p, h)) {
            return Location::Outside;
        }
        Location::Inside
    }

    /// Parameter intervals of the line `origin + s * dir` (unit `dir`) that
    /// lie in the region. With `include_boundary` false, stretches running
    /// along the boundary are dropped.
    pub fn clip_line(
        &self,
        origin: &Point2d,
        dir: &Vec2,
        tol: f64,
        include_boundary: bool,
    ) -> Vec<(f64, f64)> {
        let mut params = Vec::new();
        for (a, b) in self.edges() {
            let da = cross2(dir, &(a - origin));
            let db = cross2(dir, &(b - origin));
            if da.abs() <= tol && db.abs() <= tol {
                params.push((a - origin).dot(dir));
                params.push((b - origin).dot(dir));
                continue;
            }
            if (da > tol && db > tol) || (da < -tol && db < -tol) {
                continue;
            }
            let s = (da / (da - db)).clamp(0.0, 1.0);
            let hit = a + (b - a) * s;
            params.push((hit - origin).dot(dir));
        }
        params.sort_by(f64::total_cmp);
        params.dedup_by(|next, prev| (*next - *prev).abs() <= tol);

        let mut out: Vec<(f64, f64)> = Vec::new();
        for w in params.windows(2) {
            if w[1] - w[0] <= tol {
                continue;
            }
            let mid = origin + dir * (0.5 * (w[0] + w[1]));
            let keep = match self.locate(&mid, tol) {
                Location::Inside => true,
                Location::Boundary => include_boundary,
                Location::Outside => false,
            };
            if !keep {
                continue;
            }
            match out.last_mut() {
                Some(last) if (w[0] - last.1).abs() <= tol => last.1 = w[1],
                _ => out.push((w[0], w[1])),
            }
        }
        out
    }

    /// A point well inside the region, found on a scanline halfway between
    /// two vertex heights. Picks the candidate with the largest clearance.
    pub fn interior_point(&self, tol: f64) -> Option<Point2d> {
        let mut ys: Vec<f64> = self.loops().flat_map(|l| l.iter().map(|p| p.y)).collect();
        ys.sort_by(f64::total_cmp);
        ys.dedup();

        let mut best: Option<(f64, Point2d)> = None;
        for w in ys.windows(2) {
            if w[1] - w[0] <= tol {
                continue;
            }
            let y = 0.5 * (w[0] + w[1]);
            let mut xs: Vec<f64> = self
                .edges()
                .filter(|(a, b)| (a.y > y) != (b.y > y))
                .map(|(a, b)| a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y))
                .collect();
            xs.sort_by(f64::total_cmp);
            for pair in xs.chunks_exact(2) {
                if pair[1] - pair[0] <= tol {
                    continue;
                }
                let p = Point2d::new(0.5 * (pair[0] + pair[1]), y);
                let clearance = self.distance_to_boundary(&p);
                if best.is_none_or(|(c, _)| clearance > c) {
                    best = Some((clearance, p));
                }
            }
        }
        best.filter(|(c, _)| *c > tol).map(|(_, p)| p)
    }
}

/// Outcome of shooting a ray at a planar region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RayHit {
    Miss,
    Hit(f64),
    /// The ray touches the boundary, runs in the plane, or starts on the
    /// region. Parity is unreliable; try another direction.
    Grazing,
}

/// A region embedded in 3D by its supporting plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanarRegion {
    pub plane: Plane,
    pub region: Region,
    pub bbox: BoundingBox,
}

impl PlanarRegion {
    pub fn new(plane: Plane, region: Region) -> Self {
        let corners: Vec<Point3d> = region.loops().flat_map(|l| l.iter()).map(|p| plane.lift(p)).collect();
        let bbox = BoundingBox::from_points(&corners);
        Self { plane, region, bbox }
    }

    /// Project 3D loops onto `plane` and build the region.
    pub fn from_loops(plane: Plane, outer: &[Point3d], holes: &[Vec<Point3d>]) -> Self {
        let project = |l: &[Point3d]| l.iter().map(|p| plane.project(p)).collect::<Vec<_>>();
        let region = Region::new(project(outer), holes.iter().map(|h| project(h)).collect());
        Self::new(plane, region)
    }

    pub fn locate(&self, p: &Point3d, tol: f64) -> Location {
        if self.plane.distance_to_point(p) > tol {
            return Location::Outside;
        }
        self.region.locate(&self.plane.project(p), tol)
    }

    pub fn ray_hit(&self, ray: &Ray, tol: f64) -> RayHit {
        let denom = self.plane.normal.dot(&ray.direction);
        let dist = self.plane.signed_distance(&ray.origin);
        if denom.abs() < 1e-9 {
            return if dist.abs() <= tol && self.bbox.expanded(tol).ray_entry(ray).is_some() {
                RayHit::Grazing
            } else {
                RayHit::Miss
            };
        }
        let t = -dist / denom;
        if t < -tol {
            return RayHit::Miss;
        }
        let hit = ray.at(t);
        match self.region.locate(&self.plane.project(&hit), tol) {
            Location::Outside => RayHit::Miss,
            Location::Boundary => RayHit::Grazing,
            Location::Inside if t <= tol => RayHit::Grazing,
            Location::Inside => RayHit::Hit(t),
        }
    }
}
