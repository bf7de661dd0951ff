//! Edge incidence: which faces of a solid use each edge.

use std::collections::HashMap;

use crate::topology::brep::*;

/// Faces using each edge of `solid_id`, each face listed once.
pub fn edge_face_map(store: &EntityStore, solid_id: SolidId) -> HashMap<EdgeId, Vec<FaceId>> {
    let mut edge_faces: HashMap<EdgeId, Vec<FaceId>> = HashMap::new();
    for face_id in store.solid_faces(solid_id) {
        for loop_id in store.face_loops(face_id) {
            for &he_id in &store.loops[loop_id].half_edges {
                let faces = edge_faces.entry(store.half_edges[he_id].edge).or_default();
                if !faces.contains(&face_id) {
                    faces.push(face_id);
                }
            }
        }
    }
    edge_faces
}

/// Edges bounding a single face (open boundary).
pub fn free_edges(edge_faces: &HashMap<EdgeId, Vec<FaceId>>) -> Vec<EdgeId> {
    edge_faces.iter().filter(|(_, f)| f.len() == 1).map(|(&e, _)| e).collect()
}

/// Edges shared by more than two faces.
pub fn non_manifold_edges(edge_faces: &HashMap<EdgeId, Vec<FaceId>>) -> Vec<(EdgeId, usize)> {
    edge_faces
        .iter()
        .filter(|(_, f)| f.len() > 2)
        .map(|(&e, f)| (e, f.len()))
        .collect()
}
