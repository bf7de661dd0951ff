use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::geometry::bbox::BoundingBox;
use crate::geometry::curves::{Line3d, Segment};
use crate::geometry::point::{Point3d, Vec3};
use crate::geometry::surfaces::Plane;

// ─── Entity Keys ─────────────────────────────────────────────────────────────

new_key_type! {
    pub struct VertexId;
    pub struct EdgeId;
    pub struct HalfEdgeId;
    pub struct LoopId;
    pub struct FaceId;
    pub struct ShellId;
    pub struct SolidId;
}

// ─── Topological Entities ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vertex {
    pub point: Point3d,
    pub tolerance: f64,
}

/// A straight edge from `start_vertex` to `end_vertex`, parametrised by arc
/// length on `[0, length]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub curve: Line3d,
    pub length: f64,
    pub start_vertex: VertexId,
    pub end_vertex: VertexId,
    pub tolerance: f64,
    /// Radial list of the half-edges using this edge.
    pub half_edges: Vec<HalfEdgeId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HalfEdge {
    pub edge: EdgeId,
    /// Next half-edge around the edge. For a manifold edge this is the
    /// opposite use; a free edge is its own twin.
    pub twin: HalfEdgeId,
    pub face: FaceId,
    pub loop_id: LoopId,
    pub start_vertex: VertexId,
    pub end_vertex: VertexId,
    /// true if this half-edge runs from the edge's start to its end.
    pub forward: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loop {
    pub half_edges: Vec<HalfEdgeId>,
    pub face: FaceId,
}

/// A planar face. The plane normal is the outward face normal; the outer
/// loop runs counter-clockwise around it, inner loops clockwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Face {
    pub plane: Plane,
    pub outer_loop: LoopId,
    pub inner_loops: Vec<LoopId>,
    pub shell: ShellId,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShellOrientation {
    /// Outer shell (normals point outward).
    Outward,
    /// Void shell (normals point into the cavity).
    Inward,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shell {
    pub faces: Vec<FaceId>,
    pub orientation: ShellOrientation,
    pub solid: SolidId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solid {
    pub shells: Vec<ShellId>,
}

// ─── Entity Store ────────────────────────────────────────────────────────────

/// Arena-based storage for all topological entities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityStore {
    pub vertices: SlotMap<VertexId, Vertex>,
    pub edges: SlotMap<EdgeId, Edge>,
    pub half_edges: SlotMap<HalfEdgeId, HalfEdge>,
    pub loops: SlotMap<LoopId, Loop>,
    pub faces: SlotMap<FaceId, Face>,
    pub shells: SlotMap<ShellId, Shell>,
    pub solids: SlotMap<SolidId, Solid>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count topological entities for a shell: (vertices, edges, faces).
    pub fn count_topology(&self, shell_id: ShellId) -> (usize, usize, usize) {
        let shell = &self.shells[shell_id];
        let mut edges = HashSet::new();
        let mut vertices = HashSet::new();
        for &face_id in &shell.faces {
            for loop_id in self.face_loops(face_id) {
                for &he_id in &self.loops[loop_id].half_edges {
                    let he = &self.half_edges[he_id];
                    edges.insert(he.edge);
                    vertices.insert(he.start_vertex);
                    vertices.insert(he.end_vertex);
                }
            }
        }
        (vertices.len(), edges.len(), shell.faces.len())
    }

    /// Outer loop first, then the holes.
    pub fn face_loops(&self, face_id: FaceId) -> impl Iterator<Item = LoopId> + '_ {
        let face = &self.faces[face_id];
        std::iter::once(face.outer_loop).chain(face.inner_loops.iter().copied())
    }

    /// All faces of a solid, shell by shell.
    pub fn solid_faces(&self, solid_id: SolidId) -> Vec<FaceId> {
        self.solids[solid_id]
            .shells
            .iter()
            .flat_map(|&s| self.shells[s].faces.iter().copied())
            .collect()
    }

    /// Vertex positions around a loop, in traversal order.
    pub fn loop_points(&self, loop_id: LoopId) -> Vec<Point3d> {
        self.loops[loop_id]
            .half_edges
            .iter()
            .map(|&he| self.vertices[self.half_edges[he].start_vertex].point)
            .collect()
    }

    pub fn edge_segment(&self, edge_id: EdgeId) -> Segment {
        let edge = &self.edges[edge_id];
        Segment::new(
            self.vertices[edge.start_vertex].point,
            self.vertices[edge.end_vertex].point,
        )
    }

    pub fn face_bounding_box(&self, face_id: FaceId) -> BoundingBox {
        let face = &self.faces[face_id];
        BoundingBox::from_points(&self.loop_points(face.outer_loop))
    }

    /// Compute axis-aligned bounding box for a solid.
    pub fn solid_bounding_box(&self, solid_id: SolidId) -> BoundingBox {
        self.solid_faces(solid_id)
            .into_iter()
            .map(|f| self.face_bounding_box(f))
            .fold(BoundingBox::empty(), |acc, bb| acc.union(&bb))
    }

    /// Outward normal of a face.
    pub fn face_normal(&self, face_id: FaceId) -> Vec3 {
        self.faces[face_id].plane.normal
    }
}
