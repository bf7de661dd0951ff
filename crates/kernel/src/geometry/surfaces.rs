use serde::{Deserialize, Serialize};

use super::point::{Point2d, Point3d, Vec3};

/// An oriented infinite plane with a right-handed in-plane frame
/// (`u_axis × v_axis == normal`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub origin: Point3d,
    pub normal: Vec3,
    pub u_axis: Vec3,
    pub v_axis: Vec3,
}

impl Plane {
    pub fn new(origin: Point3d, normal: Vec3) -> Self {
        let normal = normal.normalize();
        let u_axis = if normal.x.abs() < 0.9 {
            Vec3::x().cross(&normal).normalize()
        } else {
            Vec3::y().cross(&normal).normalize()
        };
        let v_axis = normal.cross(&u_axis);
        Self {
            origin,
            normal,
            u_axis,
            v_axis,
        }
    }

    /// Best-fit plane of a closed polygon using Newell's method.
    ///
    /// The normal follows the polygon's winding (counter-clockwise seen from
    /// the normal side). Returns `None` for polygons with no area.
    pub fn from_polygon(points: &[Point3d]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }
        let mut normal = Vec3::zeros();
        let mut centroid = Vec3::zeros();
        for (i, p) in points.iter().enumerate() {
            let q = points[(i + 1) % points.len()];
            normal.x += (p.y - q.y) * (p.z + q.z);
            normal.y += (p.z - q.z) * (p.x + q.x);
            normal.z += (p.x - q.x) * (p.y + q.y);
            centroid += p.coords;
        }
        let len = normal.norm();
        if !len.is_finite() || len < 1e-300 {
            return None;
        }
        let centroid = Point3d::from(centroid / points.len() as f64);
        Some(Self::new(centroid, normal / len))
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        self.origin + self.u_axis * u + self.v_axis * v
    }

    /// In-plane coordinates of the orthogonal projection of `p`.
    pub fn project(&self, p: &Point3d) -> Point2d {
        let d = p - self.origin;
        Point2d::new(d.dot(&self.u_axis), d.dot(&self.v_axis))
    }

    pub fn lift(&self, p: &Point2d) -> Point3d {
        self.evaluate(p.x, p.y)
    }

    pub fn signed_distance(&self, p: &Point3d) -> f64 {
        (p - self.origin).dot(&self.normal)
    }

    pub fn distance_to_point(&self, p: &Point3d) -> f64 {
        self.signed_distance(p).abs()
    }

    /// Same plane with the opposite orientation.
    pub fn flipped(&self) -> Self {
        Self {
            origin: self.origin,
            normal: -self.normal,
            u_axis: self.u_axis,
            v_axis: -self.v_axis,
        }
    }
}
