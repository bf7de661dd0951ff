use std::fmt;

use tracing::{info, instrument};

use super::spatial::{edge_face_map, free_edges, non_manifold_edges};
use crate::topology::brep::*;

/// One structural defect found in a solid.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditIssue {
    /// Consecutive half-edges of a loop do not meet, or the loop has fewer
    /// than three sides.
    OpenLoop { face: FaceId },
    /// A half-edge's twin is on another edge or does not link back.
    TwinMismatch { half_edge: HalfEdgeId },
    /// Both uses of a manifold edge run the same direction.
    OrientationMismatch { edge: EdgeId },
    FreeEdge { edge: EdgeId },
    NonManifoldEdge { edge: EdgeId, faces: usize },
    VertexOffPlane { face: FaceId, vertex: VertexId, distance: f64 },
}

impl fmt::Display for AuditIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditIssue::OpenLoop { face } => write!(f, "face {face:?} has an open loop"),
            AuditIssue::TwinMismatch { half_edge } => write!(f, "half-edge {half_edge:?} has a broken twin link"),
            AuditIssue::OrientationMismatch { edge } => {
                write!(f, "edge {edge:?} is used twice in the same direction")
            }
            AuditIssue::FreeEdge { edge } => write!(f, "edge {edge:?} bounds a single face"),
            AuditIssue::NonManifoldEdge { edge, faces } => write!(f, "edge {edge:?} is shared by {faces} faces"),
            AuditIssue::VertexOffPlane { face, vertex, distance } => {
                write!(f, "vertex {vertex:?} is {distance:.3e} off the plane of face {face:?}")
            }
        }
    }
}

/// Entity counts of one shell. `euler` is V - E + F - H, where H counts the
/// inner loops; it is 2 for a closed genus-0 shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellStats {
    pub shell: ShellId,
    pub vertices: usize,
    pub edges: usize,
    pub faces: usize,
    pub holes: usize,
    pub euler: i64,
}

#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    pub issues: Vec<AuditIssue>,
    pub shells: Vec<ShellStats>,
}

impl AuditReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn findings(&self) -> impl Iterator<Item = String> + '_ {
        self.issues.iter().map(ToString::to_string)
    }
}

/// Check the topology of `solid_id`. Euler characteristics are reported,
/// never flagged: shells with through holes are legitimate.
#[instrument(skip(store))]
pub fn audit_solid(store: &EntityStore, solid_id: SolidId) -> AuditReport {
    let mut report = AuditReport::default();

    for face_id in store.solid_faces(solid_id) {
        let face = &store.faces[face_id];
        let mut closed = true;
        for loop_id in store.face_loops(face_id) {
            let half_edges = &store.loops[loop_id].half_edges;
            closed &= half_edges.len() >= 3;
            for (i, &he_id) in half_edges.iter().enumerate() {
                let he = &store.half_edges[he_id];
                let next = &store.half_edges[half_edges[(i + 1) % half_edges.len()]];
                closed &= he.end_vertex == next.start_vertex;
                check_twin(store, he_id, &mut report.issues);

                let vertex = &store.vertices[he.start_vertex];
                let distance = face.plane.distance_to_point(&vertex.point);
                if distance > face.tolerance.max(vertex.tolerance) {
                    report.issues.push(AuditIssue::VertexOffPlane {
                        face: face_id,
                        vertex: he.start_vertex,
                        distance,
                    });
                }
            }
        }
        if !closed {
            report.issues.push(AuditIssue::OpenLoop { face: face_id });
        }
    }

    let edge_faces = edge_face_map(store, solid_id);
    for edge in free_edges(&edge_faces) {
        report.issues.push(AuditIssue::FreeEdge { edge });
    }
    for (edge, faces) in non_manifold_edges(&edge_faces) {
        report.issues.push(AuditIssue::NonManifoldEdge { edge, faces });
    }

    for &shell_id in &store.solids[solid_id].shells {
        let (vertices, edges, faces) = store.count_topology(shell_id);
        let holes: usize = store.shells[shell_id]
            .faces
            .iter()
            .map(|&f| store.faces[f].inner_loops.len())
            .sum();
        report.shells.push(ShellStats {
            shell: shell_id,
            vertices,
            edges,
            faces,
            holes,
            euler: vertices as i64 - edges as i64 + faces as i64 - holes as i64,
        });
    }

    info!(
        issues = report.issues.len(),
        shells = report.shells.len(),
        "solid audit complete"
    );
    report
}

fn check_twin(store: &EntityStore, he_id: HalfEdgeId, issues: &mut Vec<AuditIssue>) {
    let he = &store.half_edges[he_id];
    let Some(twin) = store.half_edges.get(he.twin) else {
        issues.push(AuditIssue::TwinMismatch { half_edge: he_id });
        return;
    };
    if twin.edge != he.edge {
        issues.push(AuditIssue::TwinMismatch { half_edge: he_id });
        return;
    }
    let radial = &store.edges[he.edge].half_edges;
    // Manifold edges are reported once, from their forward use.
    if radial.len() == 2 && he.forward {
        if twin.twin != he_id {
            issues.push(AuditIssue::TwinMismatch { half_edge: he_id });
        } else if twin.forward {
            issues.push(AuditIssue::OrientationMismatch { edge: he.edge });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::topology::builder::SolidBuilder;
    use crate::topology::primitives::{make_box, make_cylinder};

    #[test]
    fn test_box_passes_audit() {
        let mut store = EntityStore::new();
        let solid_id = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0);
        let report = audit_solid(&store, solid_id);
        assert!(report.is_valid(), "{:?}", report.issues);
        assert_eq!(report.shells.len(), 1);
        let stats = report.shells[0];
        assert_eq!((stats.vertices, stats.edges, stats.faces), (8, 12, 6));
        assert_eq!(stats.euler, 2);
    }

    #[test]
    fn test_cylinder_passes_audit() {
        let mut store = EntityStore::new();
        let solid_id = make_cylinder(&mut store, Point3d::origin(), 1.0, 2.0, 16);
        let report = audit_solid(&store, solid_id);
        assert!(report.is_valid(), "{:?}", report.issues);
        assert_eq!(report.shells[0].euler, 2);
    }

    #[test]
    fn test_open_shell_reports_free_edges() {
        let mut store = EntityStore::new();
        let mut builder = SolidBuilder::new(&mut store);
        let shell = builder.add_shell(ShellOrientation::Outward);
        let v: Vec<VertexId> = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
            .iter()
            .map(|&(x, y)| builder.add_vertex(Point3d::new(x, y, 0.0), 1e-7))
            .collect();
        builder.add_face(shell, &[v], None, 1e-7);
        let solid = builder.finish();

        let report = audit_solid(&store, solid);
        let free = report
            .issues
            .iter()
            .filter(|i| matches!(i, AuditIssue::FreeEdge { .. }))
            .count();
        assert_eq!(free, 4);
        assert_eq!(report.findings().count(), report.issues.len());
    }

    #[test]
    fn test_same_direction_uses_are_flagged() {
        let mut store = EntityStore::new();
        let mut builder = SolidBuilder::new(&mut store);
        let shell = builder.add_shell(ShellOrientation::Outward);
        let p = [(0.0, 0.0, 0.0), (1.0, 0.0, 0.0), (0.0, 1.0, 0.0), (0.0, -1.0, 0.0)];
        let v: Vec<VertexId> = p
            .iter()
            .map(|&(x, y, z)| builder.add_vertex(Point3d::new(x, y, z), 1e-7))
            .collect();
        // Both triangles run v0 -> v1.
        builder.add_face(shell, &[vec![v[0], v[1], v[2]]], None, 1e-7);
        builder.add_face(shell, &[vec![v[0], v[1], v[3]]], None, 1e-7);
        let solid = builder.finish();

        let report = audit_solid(&store, solid);
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, AuditIssue::OrientationMismatch { .. })));
    }
}
