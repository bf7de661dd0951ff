//! Point and vector types.
//!
//! Thin aliases over nalgebra so every stage shares one set of
//! arithmetic, plus the handful of helpers nalgebra lacks.

use nalgebra::{Point2, Point3, Vector2, Vector3};

/// A point in 3D Euclidean space.
pub type Point3d = Point3<f64>;

/// A displacement in 3D space.
pub type Vec3 = Vector3<f64>;

/// A point in a face's 2D parameter plane.
pub type Point2d = Point2<f64>;

/// A displacement in 2D space.
pub type Vec2 = Vector2<f64>;

/// Euclidean distance between two points.
pub fn distance(a: &Point3d, b: &Point3d) -> f64 {
    (a - b).norm()
}

/// Midpoint of two points.
pub fn midpoint(a: &Point3d, b: &Point3d) -> Point3d {
    nalgebra::center(a, b)
}

/// The z component of the 2D cross product.
pub fn cross2(a: &Vec2, b: &Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// True when every coordinate is finite.
pub fn is_finite(p: &Point3d) -> bool {
    p.coords.iter().all(|c| c.is_finite())
}

/// A unit vector perpendicular to `n`.
///
/// Picks the world axis least aligned with `n` so the cross product stays
/// well conditioned.
pub fn any_perpendicular(n: &Vec3) -> Vec3 {
    let ax = n.x.abs();
    let ay = n.y.abs();
    let az = n.z.abs();
    let axis = if ax <= ay && ax <= az {
        Vec3::x()
    } else if ay <= az {
        Vec3::y()
    } else {
        Vec3::z()
    };
    n.cross(&axis).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_and_midpoint() {
        let a = Point3d::new(0.0, 0.0, 0.0);
        let b = Point3d::new(3.0, 4.0, 0.0);
        assert_relative_eq!(distance(&a, &b), 5.0);
        assert_relative_eq!(midpoint(&a, &b), Point3d::new(1.5, 2.0, 0.0));
    }

    #[test]
    fn test_cross2_sign() {
        assert!(cross2(&Vec2::new(1.0, 0.0), &Vec2::new(0.0, 1.0)) > 0.0);
        assert!(cross2(&Vec2::new(0.0, 1.0), &Vec2::new(1.0, 0.0)) < 0.0);
    }

    #[test]
    fn test_any_perpendicular() {
        for n in [Vec3::x(), Vec3::y(), Vec3::z(), Vec3::new(1.0, 2.0, -3.0).normalize()] {
            let p = any_perpendicular(&n);
            assert!(p.dot(&n).abs() < 1e-12);
            assert_relative_eq!(p.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_is_finite() {
        assert!(is_finite(&Point3d::new(1.0, 2.0, 3.0)));
        assert!(!is_finite(&Point3d::new(f64::NAN, 0.0, 0.0)));
    }
}
