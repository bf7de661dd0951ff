//! Construction collaborator: assembles vertices, edges, loops, faces,
//! shells and solids into an [`EntityStore`].
//!
//! Edges are shared by vertex pair. Every half-edge that uses an edge joins
//! its radial list, and `twin` walks that list, so two faces on an edge
//! become mutual twins and a free edge points at itself.

use std::collections::HashMap;

use tracing::warn;

use super::brep::*;
use crate::geometry::curves::Line3d;
use crate::geometry::point::{Point3d, Vec3};
use crate::geometry::surfaces::Plane;

pub struct SolidBuilder<'a> {
    store: &'a mut EntityStore,
    solid: SolidId,
    edges: HashMap<(VertexId, VertexId), EdgeId>,
}

impl<'a> SolidBuilder<'a> {
    pub fn new(store: &'a mut EntityStore) -> Self {
        let solid = store.solids.insert(Solid { shells: vec![] });
        Self {
            store,
            solid,
            edges: HashMap::new(),
        }
    }

    pub fn solid(&self) -> SolidId {
        self.solid
    }

    pub fn add_vertex(&mut self, point: Point3d, tolerance: f64) -> VertexId {
        self.store.vertices.insert(Vertex { point, tolerance })
    }

    pub fn add_shell(&mut self, orientation: ShellOrientation) -> ShellId {
        let shell = self.store.shells.insert(Shell {
            faces: vec![],
            orientation,
            solid: self.solid,
        });
        self.store.solids[self.solid].shells.push(shell);
        shell
    }

    /// Add a face bounded by `loops` (outer first). Without an explicit plane
    /// the outer loop's Newell plane is used.
    pub fn add_face(
        &mut self,
        shell: ShellId,
        loops: &[Vec<VertexId>],
        plane: Option<Plane>,
        tolerance: f64,
    ) -> FaceId {
        let plane = plane.unwrap_or_else(|| self.fit_plane(loops.first().map(Vec::as_slice).unwrap_or(&[])));
        let face = self.store.faces.insert(Face {
            plane,
            outer_loop: LoopId::default(),
            inner_loops: vec![],
            shell,
            tolerance,
        });
        for (i, verts) in loops.iter().enumerate() {
            let loop_id = self.add_loop(face, verts, tolerance);
            if i == 0 {
                self.store.faces[face].outer_loop = loop_id;
            } else {
                self.store.faces[face].inner_loops.push(loop_id);
            }
        }
        self.store.shells[shell].faces.push(face);
        face
    }

    pub fn finish(self) -> SolidId {
        self.solid
    }

    fn fit_plane(&self, verts: &[VertexId]) -> Plane {
        let points: Vec<Point3d> = verts.iter().map(|&v| self.store.vertices[v].point).collect();
        match Plane::from_polygon(&points) {
            Some(plane) => plane,
            None => {
                warn!(vertices = verts.len(), "face loop has no area, using a placeholder plane");
                Plane::new(points.first().copied().unwrap_or_else(Point3d::origin), Vec3::z())
            }
        }
    }

    fn add_loop(&mut self, face: FaceId, verts: &[VertexId], tolerance: f64) -> LoopId {
        let loop_id = self.store.loops.insert(Loop {
            half_edges: vec![],
            face,
        });
        for i in 0..verts.len() {
            let start = verts[i];
            let end = verts[(i + 1) % verts.len()];
            let edge = self.edge_between(start, end, tolerance);
            let forward = self.store.edges[edge].start_vertex == start;
            let he = self.store.half_edges.insert_with_key(|key| HalfEdge {
                edge,
                twin: key,
                face,
                loop_id,
                start_vertex: start,
                end_vertex: end,
                forward,
            });
            self.store.loops[loop_id].half_edges.push(he);
            self.store.edges[edge].half_edges.push(he);
            self.relink_radial(edge);
        }
        loop_id
    }

    fn edge_between(&mut self, start: VertexId, end: VertexId, tolerance: f64) -> EdgeId {
        let key = if start < end { (start, end) } else { (end, start) };
        if let Some(&edge) = self.edges.get(&key) {
            return edge;
        }
        let a = &self.store.vertices[start];
        let b = &self.store.vertices[end];
        let edge = self.store.edges.insert(Edge {
            curve: Line3d::new(a.point, b.point - a.point),
            length: (b.point - a.point).norm(),
            start_vertex: start,
            end_vertex: end,
            tolerance: tolerance.max(a.tolerance).max(b.tolerance),
            half_edges: vec![],
        });
        self.edges.insert(key, edge);
        edge
    }

    fn relink_radial(&mut self, edge: EdgeId) {
        let radial = &self.store.edges[edge].half_edges;
        let n = radial.len();
        let pairs: Vec<(HalfEdgeId, HalfEdgeId)> = (0..n).map(|k| (radial[k], radial[(k + 1) % n])).collect();
        for (he, next) in pairs {
            self.store.half_edges[he].twin = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_face_edges_are_free() {
        let mut store = EntityStore::new();
        let mut b = SolidBuilder::new(&mut store);
        let shell = b.add_shell(ShellOrientation::Outward);
        let vs: Vec<VertexId> = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]
            .iter()
            .map(|&(x, y)| b.add_vertex(Point3d::new(x, y, 0.0), 1e-7))
            .collect();
        let face = b.add_face(shell, &[vs], None, 1e-7);
        let _solid = b.finish();

        assert!((store.faces[face].plane.normal - Vec3::z()).norm() < 1e-12);
        for (id, he) in &store.half_edges {
            assert_eq!(he.twin, id);
        }
    }

    #[test]
    fn test_shared_edge_links_twins() {
        let mut store = EntityStore::new();
        let mut b = SolidBuilder::new(&mut store);
        let shell = b.add_shell(ShellOrientation::Outward);
        let p = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        let v: Vec<VertexId> = p.iter().map(|&(x, y)| b.add_vertex(Point3d::new(x, y, 0.0), 1e-7)).collect();
        b.add_face(shell, &[vec![v[0], v[1], v[2]]], None, 1e-7);
        b.add_face(shell, &[vec![v[0], v[2], v[3]]], None, 1e-7);
        b.finish();

        assert_eq!(store.edges.len(), 5);
        let diagonal = store.edges.values().find(|e| e.half_edges.len() == 2).unwrap();
        let (h0, h1) = (diagonal.half_edges[0], diagonal.half_edges[1]);
        assert_eq!(store.half_edges[h0].twin, h1);
        assert_eq!(store.half_edges[h1].twin, h0);
        assert_ne!(store.half_edges[h0].forward, store.half_edges[h1].forward);
    }
}
