//! Mass properties of polyhedral solids.
//!
//! Volumes come from the divergence theorem: each planar loop contributes
//! `q · A / 3`, where `A` is its vector area and `q` any point on it.
//! Inward shells are stored with inward normals, so their volume is
//! negative and subtracts from the enclosing shell.

use super::brep::*;
use crate::geometry::point::{Point3d, Vec3};

/// Vector area of a closed polygon (normal times area).
pub fn vector_area(points: &[Point3d]) -> Vec3 {
    let n = points.len();
    let mut sum = Vec3::zeros();
    for i in 0..n {
        sum += points[i].coords.cross(&points[(i + 1) % n].coords);
    }
    sum * 0.5
}

/// Signed volume enclosed between the origin and a closed polygon.
pub fn cone_volume(points: &[Point3d]) -> f64 {
    match points.first() {
        Some(q) => q.coords.dot(&vector_area(points)) / 3.0,
        None => 0.0,
    }
}

pub fn face_area(store: &EntityStore, face_id: FaceId) -> f64 {
    let normal = store.faces[face_id].plane.normal;
    store
        .face_loops(face_id)
        .map(|l| vector_area(&store.loop_points(l)).dot(&normal))
        .sum()
}

pub fn shell_signed_volume(store: &EntityStore, shell_id: ShellId) -> f64 {
    store.shells[shell_id]
        .faces
        .iter()
        .flat_map(|&f| store.face_loops(f).collect::<Vec<_>>())
        .map(|l| cone_volume(&store.loop_points(l)))
        .sum()
}

pub fn solid_volume(store: &EntityStore, solid_id: SolidId) -> f64 {
    store.solids[solid_id]
        .shells
        .iter()
        .map(|&s| shell_signed_volume(store, s))
        .sum()
}

pub fn solid_area(store: &EntityStore, solid_id: SolidId) -> f64 {
    store.solid_faces(solid_id).into_iter().map(|f| face_area(store, f)).sum()
}
