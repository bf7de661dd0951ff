use std::f64::consts::PI;

use tracing::{info, instrument};

use super::brep::*;
use super::builder::SolidBuilder;
use crate::geometry::point::Point3d;

/// Tolerance given to primitive vertices, edges and faces.
pub const PRIMITIVE_TOLERANCE: f64 = 1e-7;

/// Build a box solid directly from corner coordinates.
/// The box is axis-aligned with one corner at (x0,y0,z0) and opposite at (x1,y1,z1).
#[instrument(skip(store))]
pub fn make_box(store: &mut EntityStore, x0: f64, y0: f64, z0: f64, x1: f64, y1: f64, z1: f64) -> SolidId {
    info!(
        min = ?[x0, y0, z0],
        max = ?[x1, y1, z1],
        "creating box primitive"
    );
    let corners = [
        Point3d::new(x0, y0, z0),
        Point3d::new(x1, y0, z0),
        Point3d::new(x1, y1, z0),
        Point3d::new(x0, y1, z0),
        Point3d::new(x0, y0, z1),
        Point3d::new(x1, y0, z1),
        Point3d::new(x1, y1, z1),
        Point3d::new(x0, y1, z1),
    ];
    // Counter-clockwise seen from outside.
    let faces: [[usize; 4]; 6] = [
        [0, 3, 2, 1], // z = z0
        [4, 5, 6, 7], // z = z1
        [0, 1, 5, 4], // y = y0
        [3, 7, 6, 2], // y = y1
        [0, 4, 7, 3], // x = x0
        [1, 2, 6, 5], // x = x1
    ];

    let mut b = SolidBuilder::new(store);
    let shell = b.add_shell(ShellOrientation::Outward);
    let v: Vec<VertexId> = corners.iter().map(|p| b.add_vertex(*p, PRIMITIVE_TOLERANCE)).collect();
    for f in &faces {
        let ring: Vec<VertexId> = f.iter().map(|&i| v[i]).collect();
        b.add_face(shell, &[ring], None, PRIMITIVE_TOLERANCE);
    }
    b.finish()
}

/// Extrude a planar profile, counter-clockwise seen from +Z, upward by `height`.
#[instrument(skip(store, profile), fields(points = profile.len()))]
pub fn make_prism(store: &mut EntityStore, profile: &[Point3d], height: f64) -> SolidId {
    info!(height, "creating prism primitive");
    let n = profile.len();
    let mut b = SolidBuilder::new(store);
    let shell = b.add_shell(ShellOrientation::Outward);
    let bottom: Vec<VertexId> = profile.iter().map(|p| b.add_vertex(*p, PRIMITIVE_TOLERANCE)).collect();
    let top: Vec<VertexId> = profile
        .iter()
        .map(|p| b.add_vertex(Point3d::new(p.x, p.y, p.z + height), PRIMITIVE_TOLERANCE))
        .collect();

    let mut floor = bottom.clone();
    floor.reverse();
    b.add_face(shell, &[floor], None, PRIMITIVE_TOLERANCE);
    b.add_face(shell, &[top.clone()], None, PRIMITIVE_TOLERANCE);
    for i in 0..n {
        let j = (i + 1) % n;
        b.add_face(shell, &[vec![bottom[i], bottom[j], top[j], top[i]]], None, PRIMITIVE_TOLERANCE);
    }
    b.finish()
}

/// Build a faceted cylinder standing on `center` along +Z.
#[instrument(skip(store), fields(center = ?[center.x, center.y, center.z]))]
pub fn make_cylinder(store: &mut EntityStore, center: Point3d, radius: f64, height: f64, num_segments: usize) -> SolidId {
    info!(radius, height, num_segments, "creating cylinder primitive");
    let profile: Vec<Point3d> = (0..num_segments)
        .map(|i| {
            let theta = 2.0 * PI * (i as f64 / num_segments as f64);
            Point3d::new(center.x + radius * theta.cos(), center.y + radius * theta.sin(), center.z)
        })
        .collect();
    make_prism(store, &profile, height)
}

/// Build a faceted UV sphere: triangle fans at the poles, planar
/// trapezoids between parallels.
#[instrument(skip(store), fields(center = ?[center.x, center.y, center.z]))]
pub fn make_sphere(store: &mut EntityStore, center: Point3d, radius: f64, num_meridians: usize, num_parallels: usize) -> SolidId {
    info!(radius, num_meridians, num_parallels, "creating sphere primitive");
    let mut b = SolidBuilder::new(store);
    let shell = b.add_shell(ShellOrientation::Outward);

    let north = b.add_vertex(Point3d::new(center.x, center.y, center.z + radius), PRIMITIVE_TOLERANCE);
    let south = b.add_vertex(Point3d::new(center.x, center.y, center.z - radius), PRIMITIVE_TOLERANCE);

    let mut rings: Vec<Vec<VertexId>> = Vec::new();
    for j in 1..num_parallels {
        let phi = PI * (j as f64 / num_parallels as f64);
        let ring = (0..num_meridians)
            .map(|i| {
                let theta = 2.0 * PI * (i as f64 / num_meridians as f64);
                let p = Point3d::new(
                    center.x + radius * phi.sin() * theta.cos(),
                    center.y + radius * phi.sin() * theta.sin(),
                    center.z + radius * phi.cos(),
                );
                b.add_vertex(p, PRIMITIVE_TOLERANCE)
            })
            .collect();
        rings.push(ring);
    }

    let m = num_meridians;
    for i in 0..m {
        let next = (i + 1) % m;
        b.add_face(shell, &[vec![north, rings[0][i], rings[0][next]]], None, PRIMITIVE_TOLERANCE);
    }
    for band in rings.windows(2) {
        let (upper, lower) = (&band[0], &band[1]);
        for i in 0..m {
            let next = (i + 1) % m;
            let quad = vec![upper[i], lower[i], lower[next], upper[next]];
            b.add_face(shell, &[quad], None, PRIMITIVE_TOLERANCE);
        }
    }
    let last = &rings[rings.len() - 1];
    for i in 0..m {
        let next = (i + 1) % m;
        b.add_face(shell, &[vec![south, last[next], last[i]]], None, PRIMITIVE_TOLERANCE);
    }
    b.finish()
}
