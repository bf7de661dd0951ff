//! Pave filler: turns interferences into split edges.
//!
//! Runs detection, merges every vertex and intersection point, places paves,
//! freezes the pave blocks and cuts each edge into split edges. Section
//! segments of crossing faces are cut at every vertex lying on them. Split
//! edges are keyed by their (representative) end points, so two edges that
//! overlap share one split edge and a section along an existing edge reuses
//! it.
//!
//! The result also records, per face, which split edges bound it (`on`), lie
//! in its interior (`inside`) or cross it as sections (`sections`).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::error::{BooleanError, CancelToken, WarningCode, WarningLog};
use super::index::{Operand, ShapeGeometry, ShapeIndexMap, ShapeKind};
use super::interfere::{detect_all, Interference, InterferenceKind, Locus};
use super::merge::{MergeConflict, Origin, PointId, VertexMerger};
use super::paves::{PaveBlockManager, PaveError};
use crate::config::BooleanConfig;
use crate::geometry::curves::Segment;
use crate::geometry::oracle::GeometryOracle;
use crate::geometry::point::Point3d;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SplitEdgeId(pub usize);

/// Where a split edge came from on one input edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeOrigin {
    pub edge: usize,
    pub range: (f64, f64),
}

/// Piece of an input edge or of a section, between two merged points.
/// `start < end` by point id.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitEdge {
    pub start: PointId,
    pub end: PointId,
    /// Input edges this piece lies on; more than one for a common block.
    pub origins: Vec<EdgeOrigin>,
    /// Created by a face/face section rather than cut from an input edge.
    pub section: bool,
    pub tolerance: f64,
}

/// One piece of an input edge, in edge order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSplit {
    pub id: SplitEdgeId,
    /// Split edge runs the same way as the input edge.
    pub forward: bool,
    pub range: (f64, f64),
}

/// Split-edge bookkeeping for one face.
#[derive(Debug, Clone, Default)]
pub struct FaceInfo {
    /// Boundary loops, outer first, as (split edge, traversed start to end).
    pub on: Vec<Vec<(SplitEdgeId, bool)>>,
    /// Split edges of the other operand lying inside the face.
    pub inside: BTreeSet<SplitEdgeId>,
    pub sections: BTreeSet<SplitEdgeId>,
    /// Faces of the other operand on the same plane, with normal agreement.
    pub coplanar: Vec<(usize, bool)>,
    pub vertices_in: BTreeSet<PointId>,
}

impl FaceInfo {
    pub fn is_on(&self, id: SplitEdgeId) -> bool {
        self.on.iter().flatten().any(|&(e, _)| e == id)
    }

    /// True when the face needs to be cut.
    pub fn is_touched(&self) -> bool {
        !self.inside.is_empty() || !self.sections.is_empty()
    }
}

/// Everything the face builder and classifier need.
#[derive(Debug, Clone)]
pub struct Filled {
    pub merger: VertexMerger,
    pub paves: PaveBlockManager,
    pub interferences: Vec<Interference>,
    pub split_edges: Vec<SplitEdge>,
    /// Input edge shape index -> its pieces in edge order.
    pub edge_splits: HashMap<usize, Vec<EdgeSplit>>,
    /// Face shape index -> face info.
    pub faces: BTreeMap<usize, FaceInfo>,
}

impl Filled {
    pub fn split_edge(&self, id: SplitEdgeId) -> &SplitEdge {
        &self.split_edges[id.0]
    }

    pub fn position(&self, id: PointId) -> Point3d {
        self.merger.position(id)
    }

    /// Geometry of a split edge, start to end.
    pub fn segment(&self, id: SplitEdgeId) -> Segment {
        let e = &self.split_edges[id.0];
        Segment::new(self.merger.position(e.start), self.merger.position(e.end))
    }

    /// End points of a directed use of a split edge.
    pub fn endpoints(&self, id: SplitEdgeId, forward: bool) -> (PointId, PointId) {
        let e = &self.split_edges[id.0];
        if forward { (e.start, e.end) } else { (e.end, e.start) }
    }

    /// Operands whose input edges this split edge lies on.
    pub fn operands(&self, index: &ShapeIndexMap, id: SplitEdgeId) -> BTreeSet<Operand> {
        self.split_edges[id.0]
            .origins
            .iter()
            .map(|o| index.get(o.edge).operand)
            .collect()
    }
}

struct Section {
    faces: (usize, usize),
    start: PointId,
    end: PointId,
    tolerance: f64,
}

#[derive(Default)]
struct SplitEdgeTable {
    edges: Vec<SplitEdge>,
    lookup: HashMap<(PointId, PointId), SplitEdgeId>,
}

impl SplitEdgeTable {
    /// Existing split edge between `a` and `b`, or a new one. The flag tells
    /// whether the use runs start to end.
    fn get_or_insert(&mut self, a: PointId, b: PointId, tolerance: f64) -> (SplitEdgeId, bool, bool) {
        let key = if a < b { (a, b) } else { (b, a) };
        let forward = key.0 == a;
        if let Some(&id) = self.lookup.get(&key) {
            let e = &mut self.edges[id.0];
            e.tolerance = e.tolerance.max(tolerance);
            return (id, forward, false);
        }
        let id = SplitEdgeId(self.edges.len());
        self.edges.push(SplitEdge {
            start: key.0,
            end: key.1,
            origins: Vec::new(),
            section: false,
            tolerance,
        });
        self.lookup.insert(key, id);
        (id, forward, true)
    }
}

/// Paves are only added to registered, unfrozen edges; anything else is a
/// bookkeeping bug.
fn pave_failure(e: PaveError) -> BooleanError {
    BooleanError::Internal {
        stage: "pave filling".into(),
        reason: e.to_string(),
    }
}

fn computed(record: usize, slot: u64) -> Origin {
    Origin::Computed(((record as u64) << 2) | slot)
}

/// Run the intersection part of the pipeline.
#[instrument(skip_all)]
pub fn fill(
    index: &ShapeIndexMap,
    oracle: &dyn GeometryOracle,
    config: &BooleanConfig,
    cancel: &CancelToken,
    warnings: &mut WarningLog,
) -> Result<Filled, BooleanError> {
    let interferences = detect_all(index, oracle, config, cancel, warnings)?;
    cancel.check()?;

    let max_tolerance = config.tolerance.max_tolerance;
    let mut merger = VertexMerger::new(max_tolerance);
    let mut vertex_points: HashMap<usize, PointId> = HashMap::new();
    for (i, shape) in index.iter() {
        if let ShapeGeometry::Vertex(p) = &shape.geometry {
            let id = match merger.merge(*p, shape.tolerance, Origin::Input(i)) {
                Ok(id) => id,
                Err(conflict) => {
                    warnings.push(
                        WarningCode::ToleranceConflict,
                        format!("{} kept apart: {conflict}", index.describe(i)),
                    );
                    merger.insert_isolated(*p, shape.tolerance, Origin::Input(i))
                }
            };
            vertex_points.insert(i, id);
        }
    }

    let mut paves = PaveBlockManager::new();
    for (i, shape) in index.iter() {
        if let ShapeGeometry::Edge(e) = &shape.geometry {
            paves.register_edge(
                i,
                e.segment.length(),
                shape.tolerance,
                vertex_points[&e.start],
                vertex_points[&e.end],
            );
        }
    }

    let mut faces: BTreeMap<usize, FaceInfo> = index
        .iter()
        .filter(|(_, s)| s.kind() == ShapeKind::Face)
        .map(|(i, _)| (i, FaceInfo::default()))
        .collect();

    let mut pending_inside: Vec<(usize, usize, (f64, f64))> = Vec::new();
    let mut pending_sections: Vec<(usize, usize, Point3d, Point3d, f64)> = Vec::new();

    for (k, r) in interferences.iter().enumerate() {
        let required = |merger: &mut VertexMerger, point: Point3d, slot: u64| {
            merger
                .merge(point, r.tolerance, computed(k, slot))
                .map_err(|c| BooleanError::ToleranceConflict {
                    shape: format!("{} / {}", index.describe(r.first), index.describe(r.second)),
                    required: c.required,
                    max: c.max,
                })
        };
        match (r.kind, r.locus) {
            // Input vertices were merged above.
            (InterferenceKind::VertexVertex, _) => {}
            (InterferenceKind::VertexEdge, Locus::Point { second: Some(t), .. }) => {
                paves.add_pave(r.second, t, vertex_points[&r.first]).map_err(pave_failure)?;
            }
            (InterferenceKind::VertexFace, Locus::Point { .. }) => {
                if let Some(info) = faces.get_mut(&r.second) {
                    info.vertices_in.insert(vertex_points[&r.first]);
                }
            }
            (InterferenceKind::EdgeEdge, Locus::Point { point, first: Some(ta), second: Some(tb) }) => {
                let id = required(&mut merger, point, 0)?;
                paves.add_pave(r.first, ta, id).map_err(pave_failure)?;
                paves.add_pave(r.second, tb, id).map_err(pave_failure)?;
            }
            // Overlap ends are vertex/edge records of their own.
            (InterferenceKind::EdgeEdge, Locus::Range { .. }) => {}
            (InterferenceKind::EdgeFace, Locus::Point { point, first: Some(t), .. }) => {
                let id = required(&mut merger, point, 0)?;
                paves.add_pave(r.first, t, id).map_err(pave_failure)?;
                if let Some(info) = faces.get_mut(&r.second) {
                    info.vertices_in.insert(id);
                }
            }
            (InterferenceKind::EdgeFace, Locus::Range { first, .. }) => {
                pending_inside.push((r.first, r.second, first));
            }
            (InterferenceKind::FaceFace, Locus::Coplanar { same_sense }) => {
                if let Some(info) = faces.get_mut(&r.first) {
                    info.coplanar.push((r.second, same_sense));
                }
                if let Some(info) = faces.get_mut(&r.second) {
                    info.coplanar.push((r.first, same_sense));
                }
            }
            (InterferenceKind::FaceFace, Locus::Segment { start, end }) => {
                pending_sections.push((r.first, r.second, start, end, r.tolerance));
            }
            _ => debug!(kind = ?r.kind, "interference without a pave effect"),
        }
    }

    // Section ends are merged before freezing so they can reach other classes.
    let mut sections = Vec::with_capacity(pending_sections.len());
    let base = interferences.len();
    for (s, (f1, f2, start, end, tolerance)) in pending_sections.into_iter().enumerate() {
        let conflict = |c: MergeConflict| BooleanError::ToleranceConflict {
            shape: format!("section of {} / {}", index.describe(f1), index.describe(f2)),
            required: c.required,
            max: c.max,
        };
        let a = merger.merge(start, tolerance, computed(base + s, 1)).map_err(conflict)?;
        let b = merger.merge(end, tolerance, computed(base + s, 2)).map_err(conflict)?;
        sections.push(Section {
            faces: (f1, f2),
            start: a,
            end: b,
            tolerance,
        });
    }

    cancel.check()?;
    paves.freeze_all(&merger, cancel, config.parallel)?;
    paves
        .unite_merged(&mut merger)
        .map_err(|(edge, c)| BooleanError::ToleranceConflict {
            shape: format!("paves of {}", index.describe(edge)),
            required: c.required,
            max: c.max,
        })?;

    let mut table = SplitEdgeTable::default();
    let mut edge_splits: HashMap<usize, Vec<EdgeSplit>> = HashMap::new();
    for (edge, block) in paves.blocks() {
        let mut pieces = Vec::new();
        for (p0, p1) in block.ranges() {
            if p0.vertex == p1.vertex {
                warnings.push(
                    WarningCode::GeometricDegeneracy,
                    format!(
                        "{} collapses between {:.6} and {:.6}; piece dropped",
                        index.describe(edge),
                        p0.parameter,
                        p1.parameter
                    ),
                );
                continue;
            }
            let (id, forward, _) = table.get_or_insert(p0.vertex, p1.vertex, block.tolerance());
            let range = (p0.parameter, p1.parameter);
            table.edges[id.0].origins.push(EdgeOrigin { edge, range });
            pieces.push(EdgeSplit { id, forward, range });
        }
        edge_splits.insert(edge, pieces);
    }

    for (&f, info) in faces.iter_mut() {
        let Some(face) = index.face(f) else { continue };
        info.on = face
            .boundary
            .iter()
            .map(|lp| {
                let mut uses = Vec::new();
                for &(edge, fwd) in lp {
                    let pieces = edge_splits.get(&edge).map(Vec::as_slice).unwrap_or(&[]);
                    if fwd {
                        uses.extend(pieces.iter().map(|p| (p.id, p.forward)));
                    } else {
                        uses.extend(pieces.iter().rev().map(|p| (p.id, !p.forward)));
                    }
                }
                uses
            })
            .collect();
    }

    for (edge, face, (lo, hi)) in pending_inside {
        let Some(info) = faces.get_mut(&face) else { continue };
        for piece in edge_splits.get(&edge).map(Vec::as_slice).unwrap_or(&[]) {
            let mid = 0.5 * (piece.range.0 + piece.range.1);
            if mid > lo && mid < hi && !info.is_on(piece.id) {
                info.inside.insert(piece.id);
            }
        }
    }

    let mut section_edges = 0usize;
    for section in &sections {
        let (f1, f2) = section.faces;
        let chain = section_chain(index, &merger, &paves, &faces, section);
        for w in chain.windows(2) {
            if merger.same_class(w[0], w[1]) {
                continue;
            }
            let (id, _, created) = table.get_or_insert(w[0], w[1], section.tolerance);
            if created {
                table.edges[id.0].section = true;
                section_edges += 1;
            }
            for f in [f1, f2] {
                if let Some(info) = faces.get_mut(&f) {
                    if !info.is_on(id) {
                        info.sections.insert(id);
                    }
                }
            }
        }
    }

    info!(
        points = merger.len(),
        classes = merger.class_count(),
        split_edges = table.edges.len(),
        section_edges,
        "pave filling complete"
    );
    Ok(Filled {
        merger,
        paves,
        interferences,
        split_edges: table.edges,
        edge_splits,
        faces,
    })
}

/// Points on a section segment in order: its ends plus every pave or
/// in-face vertex of either face lying on it.
fn section_chain(
    index: &ShapeIndexMap,
    merger: &VertexMerger,
    paves: &PaveBlockManager,
    faces: &BTreeMap<usize, FaceInfo>,
    section: &Section,
) -> Vec<PointId> {
    let start = merger.find(section.start);
    let end = merger.find(section.end);
    let segment = Segment::new(merger.position(start), merger.position(end));
    let len = segment.length();
    let tol = section.tolerance;
    if len <= tol {
        return vec![start, end];
    }

    let mut candidates: BTreeSet<PointId> = BTreeSet::new();
    for f in [section.faces.0, section.faces.1] {
        if let Some(info) = faces.get(&f) {
            candidates.extend(info.vertices_in.iter().map(|&p| merger.find(p)));
        }
        if let Some(face) = index.face(f) {
            for &(edge, _) in face.boundary.iter().flatten() {
                if let Some(block) = paves.block(edge) {
                    candidates.extend(block.paves().iter().map(|p| p.vertex));
                }
            }
        }
    }

    let mut inner: Vec<(f64, PointId)> = candidates
        .into_iter()
        .filter(|&c| c != start && c != end)
        .filter_map(|c| {
            let q = merger.position(c);
            let t = segment.parameter_of(&q);
            let reach = tol + merger.tolerance(c);
            (t > reach && t < len - reach && segment.distance_to_point(&q) <= reach).then_some((t, c))
        })
        .collect();
    inner.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut chain = vec![start];
    chain.extend(inner.into_iter().map(|(_, c)| c));
    chain.push(end);
    chain.dedup();
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::oracle::PlanarOracle;
    use crate::topology::brep::EntityStore;
    use crate::topology::primitives::make_box;

    fn fill_boxes(a: [f64; 6], b: [f64; 6]) -> (ShapeIndexMap, Filled, WarningLog) {
        let mut store = EntityStore::new();
        let sa = make_box(&mut store, a[0], a[1], a[2], a[3], a[4], a[5]);
        let sb = make_box(&mut store, b[0], b[1], b[2], b[3], b[4], b[5]);
        let config = BooleanConfig::default();
        let mut warnings = WarningLog::new();
        let index = ShapeIndexMap::build(&store, &[sa], &[sb], &config, &mut warnings).unwrap();
        let filled = fill(&index, &PlanarOracle, &config, &CancelToken::new(), &mut warnings).unwrap();
        (index, filled, warnings)
    }

    fn solid_edges(store: &EntityStore, solid: crate::topology::brep::SolidId) -> Vec<crate::topology::brep::EdgeId> {
        let mut out = Vec::new();
        for f in store.solid_faces(solid) {
            for &he in &store.loops[store.faces[f].outer_loop].half_edges {
                let e = store.half_edges[he].edge;
                if !out.contains(&e) {
                    out.push(e);
                }
            }
        }
        out
    }

    fn fill_store(store: &EntityStore, a: crate::topology::brep::SolidId, b: crate::topology::brep::SolidId) -> (Result<Filled, BooleanError>, WarningLog) {
        let config = BooleanConfig::default();
        let mut warnings = WarningLog::new();
        let index = ShapeIndexMap::build(store, &[a], &[b], &config, &mut warnings).unwrap();
        let filled = fill(&index, &PlanarOracle, &config, &CancelToken::new(), &mut warnings);
        (filled, warnings)
    }

    #[test]
    fn test_oversized_input_vertex_is_kept_apart() {
        let mut store = EntityStore::new();
        let a = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0);
        let b = make_box(&mut store, 3.0, 0.0, 0.0, 4.0, 1.0, 1.0);
        let edge = solid_edges(&store, b)[0];
        let vertex = store.edges[edge].start_vertex;
        store.vertices[vertex].tolerance = 5e-3;

        let (filled, warnings) = fill_store(&store, a, b);
        let filled = filled.unwrap();
        assert_eq!(warnings.count(WarningCode::ToleranceConflict), 1);
        assert_eq!(filled.merger.class_count(), 16);
        assert_eq!(filled.split_edges.len(), 24);
    }

    #[test]
    fn test_refused_intersection_point_is_fatal() {
        let mut store = EntityStore::new();
        let a = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0);
        let b = make_box(&mut store, 0.5, 0.5, 0.5, 1.5, 1.5, 1.5);
        for edge in solid_edges(&store, b) {
            store.edges[edge].tolerance = 2e-3;
        }

        let (filled, warnings) = fill_store(&store, a, b);
        match filled {
            Err(BooleanError::ToleranceConflict { required, max, .. }) => {
                assert!(required > max);
                assert_eq!(max, BooleanConfig::default().tolerance.max_tolerance);
            }
            other => panic!("expected a tolerance conflict, got {:?}", other.map(|f| f.split_edges.len())),
        }
        assert!(!warnings.contains(WarningCode::ToleranceConflict));
    }

    #[test]
    fn test_pave_bookkeeping_errors_are_internal() {
        let err = pave_failure(PaveError::Frozen { edge: 4 });
        assert_eq!(
            err,
            BooleanError::Internal {
                stage: "pave filling".into(),
                reason: "edge 4 is already split".into(),
            }
        );
        assert!(!err.to_string().contains("invalid input"));
    }

    #[test]
    fn test_disjoint_boxes_keep_their_edges() {
        let (index, filled, warnings) = fill_boxes([0.0, 0.0, 0.0, 1.0, 1.0, 1.0], [3.0, 0.0, 0.0, 4.0, 1.0, 1.0]);
        assert_eq!(filled.split_edges.len(), 24);
        assert_eq!(filled.merger.class_count(), 16);
        assert!(filled.faces.values().all(|f| !f.is_touched()));
        for f in index.indices(Operand::A, ShapeKind::Face) {
            assert_eq!(filled.faces[&f].on[0].len(), 4);
        }
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_offset_boxes_cut_edges_and_faces() {
        let (index, filled, _) = fill_boxes([0.0, 0.0, 0.0, 1.0, 1.0, 1.0], [0.5, 0.5, 0.5, 1.5, 1.5, 1.5]);
        let sections = filled.split_edges.iter().filter(|e| e.section).count();
        assert_eq!(sections, 6);
        let cut_edges = filled.edge_splits.values().filter(|s| s.len() == 2).count();
        assert_eq!(cut_edges, 6);
        let touched = filled.faces.iter().filter(|(_, f)| f.is_touched()).count();
        assert_eq!(touched, 6);
        for (&f, info) in &filled.faces {
            // Boundary loops stay closed after splitting.
            for lp in &info.on {
                for (k, &(id, fwd)) in lp.iter().enumerate() {
                    let (_, end) = filled.endpoints(id, fwd);
                    let (next, nfwd) = lp[(k + 1) % lp.len()];
                    assert_eq!(end, filled.endpoints(next, nfwd).0, "face {}", index.describe(f));
                }
            }
        }
    }

    #[test]
    fn test_shared_face_edges_form_common_blocks() {
        let (index, filled, _) = fill_boxes([0.0, 0.0, 0.0, 1.0, 1.0, 1.0], [1.0, 0.0, 0.0, 2.0, 1.0, 1.0]);
        let common = (0..filled.split_edges.len())
            .filter(|&i| filled.operands(&index, SplitEdgeId(i)).len() == 2)
            .count();
        assert_eq!(common, 4);
        assert_eq!(filled.merger.class_count(), 12);
    }

    #[test]
    fn test_coplanar_faces_share_inside_edges() {
        let (_, filled, _) = fill_boxes([0.0, 0.0, 0.0, 2.0, 2.0, 1.0], [0.5, 0.5, 0.0, 1.5, 1.5, 1.0]);
        let with_inside = filled.faces.values().filter(|f| f.inside.len() == 4).count();
        assert_eq!(with_inside, 2);
        assert!(filled.faces.values().any(|f| !f.coplanar.is_empty()));
    }
}
