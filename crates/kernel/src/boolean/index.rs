//! Shape index map: a dense, operand-ranked numbering of every vertex, edge
//! and face taking part in an operation.
//!
//! Later stages never touch the entity store. Everything they need
//! (segments, face regions, boxes, tolerances) is copied in here once.
//! Keys include the operand, so one solid can be passed as both operands.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::error::{BooleanError, WarningCode, WarningLog};
use crate::config::BooleanConfig;
use crate::geometry::bbox::BoundingBox;
use crate::geometry::curves::Segment;
use crate::geometry::point::Point3d;
use crate::geometry::polygon::{signed_area, PlanarRegion};
use crate::topology::brep::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operand {
    A,
    B,
}

impl Operand {
    pub fn other(self) -> Self {
        match self {
            Operand::A => Operand::B,
            Operand::B => Operand::A,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::A => write!(f, "A"),
            Operand::B => write!(f, "B"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKey {
    Vertex(VertexId),
    Edge(EdgeId),
    Face(FaceId),
}

/// Shape dimension. The ordering fixes which side of a pair comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeKind {
    Vertex,
    Edge,
    Face,
}

#[derive(Debug, Clone)]
pub struct EdgeShape {
    pub segment: Segment,
    /// Shape indices of the end vertices.
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct FaceShape {
    pub region: PlanarRegion,
    /// Per loop, outer first: (edge index, traversed start to end).
    pub boundary: Vec<Vec<(usize, bool)>>,
}

#[derive(Debug, Clone)]
pub enum ShapeGeometry {
    Vertex(Point3d),
    Edge(EdgeShape),
    Face(FaceShape),
}

#[derive(Debug, Clone)]
pub struct ShapeInfo {
    pub key: ShapeKey,
    pub operand: Operand,
    /// Bounding box already inflated by `tolerance`.
    pub bbox: BoundingBox,
    pub tolerance: f64,
    pub geometry: ShapeGeometry,
}

impl ShapeInfo {
    pub fn kind(&self) -> ShapeKind {
        match self.geometry {
            ShapeGeometry::Vertex(_) => ShapeKind::Vertex,
            ShapeGeometry::Edge(_) => ShapeKind::Edge,
            ShapeGeometry::Face(_) => ShapeKind::Face,
        }
    }

    pub fn as_edge(&self) -> Option<&EdgeShape> {
        match &self.geometry {
            ShapeGeometry::Edge(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_face(&self) -> Option<&FaceShape> {
        match &self.geometry {
            ShapeGeometry::Face(f) => Some(f),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShapeIndexMap {
    shapes: Vec<ShapeInfo>,
    lookup: HashMap<(Operand, ShapeKey), usize>,
}

/// One validated face before numbering.
struct PendingFace {
    id: FaceId,
    loops: Vec<Vec<(EdgeId, bool)>>,
    region: PlanarRegion,
    tolerance: f64,
}

impl ShapeIndexMap {
    /// Number the shapes of both operands: A's vertices, edges and faces,
    /// then B's. Input faces are checked on the way in.
    #[instrument(skip(store, config, warnings))]
    pub fn build(
        store: &EntityStore,
        a: &[SolidId],
        b: &[SolidId],
        config: &BooleanConfig,
        warnings: &mut WarningLog,
    ) -> Result<Self, BooleanError> {
        let mut map = Self::default();
        for (operand, solids) in [(Operand::A, a), (Operand::B, b)] {
            map.add_operand(store, operand, solids, config, warnings)?;
        }
        debug!(shapes = map.shapes.len(), "shape index built");
        Ok(map)
    }

    fn add_operand(
        &mut self,
        store: &EntityStore,
        operand: Operand,
        solids: &[SolidId],
        config: &BooleanConfig,
        warnings: &mut WarningLog,
    ) -> Result<(), BooleanError> {
        if solids.is_empty() {
            return Err(BooleanError::InvalidInput {
                reason: format!("operand {operand} has no solids"),
            });
        }
        let linear = config.tolerance.linear;

        let mut faces = Vec::new();
        for &solid_id in solids {
            let solid = store.solids.get(solid_id).ok_or_else(|| BooleanError::InvalidInput {
                reason: format!("operand {operand} references a missing solid"),
            })?;
            if solid.shells.is_empty() {
                return Err(BooleanError::InvalidInput {
                    reason: format!("operand {operand} has a solid without shells"),
                });
            }
            for &shell_id in &solid.shells {
                let shell = store.shells.get(shell_id).ok_or_else(|| BooleanError::InvalidInput {
                    reason: format!("operand {operand} references a missing shell"),
                })?;
                faces.extend(shell.faces.iter().copied());
            }
        }

        let mut pending = Vec::new();
        for face_id in faces {
            if let Some(face) = validate_face(store, operand, face_id, linear, warnings)? {
                pending.push(face);
            }
        }

        let mut vertex_order = Vec::new();
        let mut edge_order = Vec::new();
        let mut seen_v = HashSet::new();
        let mut seen_e = HashSet::new();
        for face in &pending {
            for &(edge_id, _) in face.loops.iter().flatten() {
                let edge = &store.edges[edge_id];
                for v in [edge.start_vertex, edge.end_vertex] {
                    if seen_v.insert(v) {
                        vertex_order.push(v);
                    }
                }
                if seen_e.insert(edge_id) {
                    edge_order.push(edge_id);
                }
            }
        }

        for v in vertex_order {
            let vertex = &store.vertices[v];
            let tolerance = vertex.tolerance + linear;
            self.push(ShapeInfo {
                key: ShapeKey::Vertex(v),
                operand,
                bbox: BoundingBox::from_points([&vertex.point]).expanded(tolerance),
                tolerance,
                geometry: ShapeGeometry::Vertex(vertex.point),
            });
        }
        for e in edge_order {
            let edge = &store.edges[e];
            let segment = store.edge_segment(e);
            let tolerance = edge.tolerance + linear;
            // Every operand edge bounds a face, so one too short to carry a
            // pave cannot be skipped.
            let length = segment.length();
            if length <= tolerance {
                return Err(BooleanError::GeometricDegeneracy {
                    shape: format!("{operand}/{e:?}"),
                    reason: format!("edge length {length:.3e} is not above its tolerance {tolerance:.3e}"),
                });
            }
            let start = self.lookup[&(operand, ShapeKey::Vertex(edge.start_vertex))];
            let end = self.lookup[&(operand, ShapeKey::Vertex(edge.end_vertex))];
            self.push(ShapeInfo {
                key: ShapeKey::Edge(e),
                operand,
                bbox: BoundingBox::from_points([&segment.start, &segment.end]).expanded(tolerance),
                tolerance,
                geometry: ShapeGeometry::Edge(EdgeShape { segment, start, end }),
            });
        }
        for face in pending {
            let boundary = face
                .loops
                .iter()
                .map(|l| l.iter().map(|&(e, fwd)| (self.lookup[&(operand, ShapeKey::Edge(e))], fwd)).collect())
                .collect();
            self.push(ShapeInfo {
                key: ShapeKey::Face(face.id),
                operand,
                bbox: face.region.bbox.expanded(face.tolerance),
                tolerance: face.tolerance,
                geometry: ShapeGeometry::Face(FaceShape {
                    region: face.region,
                    boundary,
                }),
            });
        }
        Ok(())
    }

    fn push(&mut self, info: ShapeInfo) {
        self.lookup.insert((info.operand, info.key), self.shapes.len());
        self.shapes.push(info);
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn get(&self, index: usize) -> &ShapeInfo {
        &self.shapes[index]
    }

    pub fn index_of(&self, operand: Operand, key: ShapeKey) -> Option<usize> {
        self.lookup.get(&(operand, key)).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ShapeInfo)> {
        self.shapes.iter().enumerate()
    }

    /// Indices of one operand's shapes of one kind, in index order.
    pub fn indices(&self, operand: Operand, kind: ShapeKind) -> Vec<usize> {
        self.iter()
            .filter(|(_, s)| s.operand == operand && s.kind() == kind)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn edge(&self, index: usize) -> Option<&EdgeShape> {
        self.shapes.get(index).and_then(ShapeInfo::as_edge)
    }

    pub fn face(&self, index: usize) -> Option<&FaceShape> {
        self.shapes.get(index).and_then(ShapeInfo::as_face)
    }

    /// Human-readable label for diagnostics, e.g. `B/face#17`.
    pub fn describe(&self, index: usize) -> String {
        match self.shapes.get(index) {
            Some(s) => {
                let kind = match s.kind() {
                    ShapeKind::Vertex => "vertex",
                    ShapeKind::Edge => "edge",
                    ShapeKind::Face => "face",
                };
                format!("{}/{}#{}", s.operand, kind, index)
            }
            None => format!("shape#{index}"),
        }
    }
}

fn validate_face(
    store: &EntityStore,
    operand: Operand,
    face_id: FaceId,
    linear: f64,
    warnings: &mut WarningLog,
) -> Result<Option<PendingFace>, BooleanError> {
    let invalid = |what: &str| BooleanError::InvalidInput {
        reason: format!("operand {operand}: face {face_id:?} {what}"),
    };
    let face = store.faces.get(face_id).ok_or_else(|| invalid("is missing"))?;
    let tolerance = face.tolerance + linear;

    let mut loops = Vec::new();
    let mut points = Vec::new();
    for loop_id in store.face_loops(face_id) {
        let lp = store.loops.get(loop_id).ok_or_else(|| invalid("references a missing loop"))?;
        if lp.half_edges.len() < 3 {
            return Err(invalid("has a loop with fewer than three edges"));
        }
        let mut uses = Vec::with_capacity(lp.half_edges.len());
        let mut pts = Vec::with_capacity(lp.half_edges.len());
        for (i, &he_id) in lp.half_edges.iter().enumerate() {
            let he = store.half_edges.get(he_id).ok_or_else(|| invalid("references a missing half-edge"))?;
            let next = lp.half_edges[(i + 1) % lp.half_edges.len()];
            let next_start = store.half_edges.get(next).map(|n| n.start_vertex);
            if next_start != Some(he.end_vertex) {
                return Err(invalid("has an open loop"));
            }
            if !store.edges.contains_key(he.edge) {
                return Err(invalid("references a missing edge"));
            }
            let vertex = store.vertices.get(he.start_vertex).ok_or_else(|| invalid("references a missing vertex"))?;
            uses.push((he.edge, he.forward));
            pts.push(vertex.point);
        }
        loops.push(uses);
        points.push(pts);
    }

    for p in points.iter().flatten() {
        let off = face.plane.distance_to_point(p);
        if off > tolerance.max(1e-9) {
            return Err(invalid(&format!("has a vertex {off:.3e} off its plane")));
        }
    }

    let region = PlanarRegion::from_loops(face.plane, &points[0], &points[1..]);
    let outer_area = signed_area(&region.region.outer);
    if outer_area.abs() <= tolerance * tolerance {
        warnings.push(
            WarningCode::SkippedFace,
            format!("operand {operand}: face {face_id:?} has no area and was skipped"),
        );
        return Ok(None);
    }
    if outer_area < 0.0 {
        return Err(invalid("has an outer loop wound against its normal"));
    }
    if region.region.self_intersects(tolerance) {
        return Err(BooleanError::GeometricDegeneracy {
            shape: format!("{operand}/{face_id:?}"),
            reason: "face boundary intersects itself".into(),
        });
    }

    Ok(Some(PendingFace {
        id: face_id,
        loops,
        region,
        tolerance,
    }))
}
