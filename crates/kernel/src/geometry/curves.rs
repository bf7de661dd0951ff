use serde::{Deserialize, Serialize};

use super::point::{Point3d, Vec3};

/// An infinite line through `origin` along a unit `direction`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line3d {
    pub origin: Point3d,
    pub direction: Vec3,
}

impl Line3d {
    pub fn new(origin: Point3d, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.origin + self.direction * t
    }

    /// Parameter of the orthogonal projection of `p`.
    pub fn parameter_of(&self, p: &Point3d) -> f64 {
        (p - self.origin).dot(&self.direction)
    }

    pub fn distance_to_point(&self, p: &Point3d) -> f64 {
        let t = self.parameter_of(p);
        (p - self.evaluate(t)).norm()
    }
}

/// A bounded straight edge, parametrised by arc length on `[0, length]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point3d,
    pub end: Point3d,
}

impl Segment {
    pub fn new(start: Point3d, end: Point3d) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// Unit direction. Zero-length segments yield a non-finite vector.
    pub fn direction(&self) -> Vec3 {
        (self.end - self.start) / self.length()
    }

    pub fn line(&self) -> Line3d {
        Line3d {
            origin: self.start,
            direction: self.direction(),
        }
    }

    pub fn point_at(&self, t: f64) -> Point3d {
        self.start + self.direction() * t
    }

    pub fn parameter_of(&self, p: &Point3d) -> f64 {
        (p - self.start).dot(&self.direction())
    }

    /// Distance from `p` to the closest point of the bounded segment.
    pub fn distance_to_point(&self, p: &Point3d) -> f64 {
        let t = self.parameter_of(p).clamp(0.0, self.length());
        (p - self.point_at(t)).norm()
    }

    pub fn reversed(&self) -> Self {
        Self {
            start: self.end,
            end: self.start,
        }
    }
}

/// A half-line used for parity classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Point3d,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Point3d, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn at(&self, t: f64) -> Point3d {
        self.origin + self.direction * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_evaluate_and_project() {
        let l = Line3d::new(Point3d::origin(), Vec3::new(2.0, 0.0, 0.0));
        assert!((l.evaluate(5.0) - Point3d::new(5.0, 0.0, 0.0)).norm() < 1e-12);
        let p = Point3d::new(5.0, 3.0, 0.0);
        assert!((l.parameter_of(&p) - 5.0).abs() < 1e-12);
        assert!((l.distance_to_point(&p) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_segment_arc_length_parameter() {
        let s = Segment::new(Point3d::new(1.0, 1.0, 1.0), Point3d::new(1.0, 1.0, 4.0));
        assert!((s.length() - 3.0).abs() < 1e-12);
        assert!((s.point_at(2.0) - Point3d::new(1.0, 1.0, 3.0)).norm() < 1e-12);
        assert!((s.parameter_of(&Point3d::new(0.0, 0.0, 2.0)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_segment_distance_clamps_to_ends() {
        let s = Segment::new(Point3d::origin(), Point3d::new(1.0, 0.0, 0.0));
        assert!((s.distance_to_point(&Point3d::new(2.0, 0.0, 0.0)) - 1.0).abs() < 1e-12);
        assert!((s.distance_to_point(&Point3d::new(0.5, 0.5, 0.0)) - 0.5).abs() < 1e-12);
    }
}
