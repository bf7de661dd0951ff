//! Result builder: turns the selected fragments into shells and solids.
//!
//! Fragments are grouped into shells through the split edges they share.
//! Orientation is made consistent by a breadth-first walk (a manifold edge
//! must be used once in each direction), every shell's signed volume picks
//! it as an outer shell or a void, and each void goes into the smallest
//! outer shell that contains it. One solid is emitted per outer shell.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::classify::ray_direction;
use super::error::{BooleanError, WarningCode, WarningLog};
use super::filler::{Filled, SplitEdgeId};
use super::index::{Operand, ShapeIndexMap, ShapeKey};
use super::merge::PointId;
use super::split::{EdgeUse, Fragment};
use crate::config::BooleanConfig;
use crate::geometry::curves::Ray;
use crate::geometry::point::Point3d;
use crate::geometry::polygon::{PlanarRegion, RayHit};
use crate::topology::brep::{EntityStore, FaceId, ShellOrientation, SolidId, VertexId};
use crate::topology::builder::SolidBuilder;
use crate::topology::properties::cone_volume;
use crate::validation::audit_solid;

/// Shape produced by a successful operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultShape {
    Solid(SolidId),
    /// Several disconnected solids.
    Compound(Vec<SolidId>),
}

impl ResultShape {
    pub fn solids(&self) -> Vec<SolidId> {
        match self {
            ResultShape::Solid(s) => vec![*s],
            ResultShape::Compound(v) => v.clone(),
        }
    }
}

/// Which result faces each input face turned into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceHistory {
    modified: HashMap<Operand, HashMap<FaceId, Vec<FaceId>>>,
}

impl FaceHistory {
    fn record(&mut self, operand: Operand, input: FaceId, output: FaceId) {
        self.modified.entry(operand).or_default().entry(input).or_default().push(output);
    }

    /// Result faces that came from `face` of `operand`. Empty when the face
    /// did not survive.
    pub fn modified(&self, operand: Operand, face: FaceId) -> &[FaceId] {
        self.modified
            .get(&operand)
            .and_then(|m| m.get(&face))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_deleted(&self, operand: Operand, face: FaceId) -> bool {
        self.modified(operand, face).is_empty()
    }

    pub fn len(&self) -> usize {
        self.modified.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub shape: Option<ResultShape>,
    pub history: FaceHistory,
}

/// A selected fragment with its final orientation.
struct Piece<'f> {
    fragment: &'f Fragment,
    reversed: bool,
}

impl Piece<'_> {
    /// Loops in result orientation.
    fn loops(&self) -> Vec<Vec<EdgeUse>> {
        self.fragment
            .loops
            .iter()
            .map(|l| {
                if self.reversed {
                    l.iter().rev().map(|&(e, fwd)| (e, !fwd)).collect()
                } else {
                    l.clone()
                }
            })
            .collect()
    }

    fn uses(&self, id: SplitEdgeId) -> Option<bool> {
        self.fragment
            .loops
            .iter()
            .flatten()
            .find(|&&(e, _)| e == id)
            .map(|&(_, fwd)| fwd != self.reversed)
    }

    fn polygon(&self) -> &PlanarRegion {
        &self.fragment.polygon
    }
}

/// Assemble the selected fragments into solids in `store`.
#[instrument(skip_all, fields(selected = selected.len()))]
pub fn build_result(
    store: &mut EntityStore,
    index: &ShapeIndexMap,
    filled: &Filled,
    selected: &[(&Fragment, bool)],
    config: &BooleanConfig,
    warnings: &mut WarningLog,
) -> Result<BuildOutput, BooleanError> {
    let mut history = FaceHistory::default();
    if selected.is_empty() {
        return Ok(BuildOutput { shape: None, history });
    }
    let mut pieces: Vec<Piece> = selected
        .iter()
        .map(|&(fragment, reversed)| Piece { fragment, reversed })
        .collect();

    let mut users: BTreeMap<SplitEdgeId, Vec<usize>> = BTreeMap::new();
    for (i, piece) in pieces.iter().enumerate() {
        for id in piece.fragment.edges() {
            let list = users.entry(id).or_default();
            if !list.contains(&i) {
                list.push(i);
            }
        }
    }
    check_manifold(&users, config, warnings)?;

    orient(&mut pieces, &users, warnings);
    let shells = components(pieces.len(), &users);

    let volumes: Vec<f64> = shells.iter().map(|s| shell_volume(filled, &pieces, s)).collect();
    let mut outers: Vec<usize> = Vec::new();
    let mut voids: Vec<usize> = Vec::new();
    for (s, &v) in volumes.iter().enumerate() {
        if v > 0.0 {
            outers.push(s);
        } else {
            voids.push(s);
        }
    }
    if outers.is_empty() {
        // Nothing encloses these shells; they are solids turned inside out.
        for &s in &voids {
            warnings.push(
                WarningCode::InvertedShell,
                format!("shell of {} faces has negative volume {:.6e}; flipped", shells[s].len(), volumes[s]),
            );
            for &p in &shells[s] {
                pieces[p].reversed = !pieces[p].reversed;
            }
        }
        outers = std::mem::take(&mut voids);
    }

    let mut hosted: BTreeMap<usize, Vec<usize>> = outers.iter().map(|&o| (o, Vec::new())).collect();
    for &v in &voids {
        let host = outers
            .iter()
            .copied()
            .filter(|&o| shell_contains(&pieces, &shells[o], &shells[v], config))
            .min_by(|&x, &y| volumes[x].total_cmp(&volumes[y]));
        match host {
            Some(o) => hosted.entry(o).or_default().push(v),
            None => warnings.push(
                WarningCode::OrphanVoid,
                format!("void shell of {} faces lies in no outer shell; dropped", shells[v].len()),
            ),
        }
    }

    let mut solids = Vec::new();
    for (&outer, inner) in &hosted {
        let mut builder = SolidBuilder::new(store);
        let mut vertices: HashMap<PointId, VertexId> = HashMap::new();
        for (s, orientation) in std::iter::once((outer, ShellOrientation::Outward))
            .chain(inner.iter().map(|&v| (v, ShellOrientation::Inward)))
        {
            let shell = builder.add_shell(orientation);
            for &p in &shells[s] {
                let piece = &pieces[p];
                let loops: Vec<Vec<VertexId>> = piece
                    .loops()
                    .iter()
                    .map(|l| {
                        l.iter()
                            .map(|&(e, fwd)| {
                                let point = filled.endpoints(e, fwd).0;
                                *vertices.entry(point).or_insert_with(|| {
                                    builder.add_vertex(filled.position(point), filled.merger.tolerance(point))
                                })
                            })
                            .collect()
                    })
                    .collect();
                let plane = if piece.reversed {
                    piece.polygon().plane.flipped()
                } else {
                    piece.polygon().plane
                };
                let tolerance = piece
                    .fragment
                    .edges()
                    .map(|e| filled.split_edge(e).tolerance)
                    .fold(index.get(piece.fragment.face).tolerance, f64::max);
                let face = builder.add_face(shell, &loops, Some(plane), tolerance);
                if let ShapeKey::Face(input) = index.get(piece.fragment.face).key {
                    history.record(piece.fragment.operand, input, face);
                }
            }
        }
        solids.push(builder.finish());
    }

    if config.audit_result {
        for &solid in &solids {
            let report = audit_solid(store, solid);
            for finding in report.findings() {
                warnings.push(WarningCode::AuditFinding, finding);
            }
        }
    }

    info!(solids = solids.len(), voids = voids.len(), "result built");
    let shape = match solids.len() {
        0 => None,
        1 => Some(ResultShape::Solid(solids[0])),
        _ => Some(ResultShape::Compound(solids)),
    };
    Ok(BuildOutput { shape, history })
}

fn check_manifold(
    users: &BTreeMap<SplitEdgeId, Vec<usize>>,
    config: &BooleanConfig,
    warnings: &mut WarningLog,
) -> Result<(), BooleanError> {
    let non_manifold = users.values().filter(|u| u.len() > 2).count();
    let free = users.values().filter(|u| u.len() == 1).count();
    if non_manifold > 0 {
        if config.fatal_non_manifold {
            return Err(BooleanError::NonManifoldResult { edges: non_manifold });
        }
        warnings.push(
            WarningCode::NonManifold,
            format!("{non_manifold} edge(s) shared by more than two faces"),
        );
    }
    if free > 0 {
        if config.fatal_open_shell {
            return Err(BooleanError::OpenShellResult { edges: free });
        }
        warnings.push(WarningCode::OpenShell, format!("{free} edge(s) bound a single face"));
    }
    Ok(())
}

/// Flip pieces until every manifold edge is used once in each direction.
fn orient(pieces: &mut [Piece], users: &BTreeMap<SplitEdgeId, Vec<usize>>, warnings: &mut WarningLog) {
    let mut neighbours: Vec<Vec<(usize, SplitEdgeId)>> = vec![Vec::new(); pieces.len()];
    for (&id, list) in users {
        if let [a, b] = list[..] {
            neighbours[a].push((b, id));
            neighbours[b].push((a, id));
        }
    }
    let mut visited = vec![false; pieces.len()];
    let mut flips = 0usize;
    let mut conflicts = 0usize;
    for seed in 0..pieces.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut queue = VecDeque::from([seed]);
        while let Some(p) = queue.pop_front() {
            for &(q, id) in &neighbours[p] {
                let agree = pieces[p].uses(id) == pieces[q].uses(id);
                if !visited[q] {
                    visited[q] = true;
                    if agree {
                        pieces[q].reversed = !pieces[q].reversed;
                        flips += 1;
                    }
                    queue.push_back(q);
                } else if agree {
                    conflicts += 1;
                }
            }
        }
    }
    if flips > 0 || conflicts > 0 {
        warnings.push(
            WarningCode::InconsistentOrientation,
            format!("{flips} face(s) flipped, {} edge(s) left inconsistent", conflicts / 2),
        );
    }
}

/// Connected groups of pieces, joined through any shared split edge.
fn components(count: usize, users: &BTreeMap<SplitEdgeId, Vec<usize>>) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..count).collect();
    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }
    for list in users.values() {
        for w in list.windows(2) {
            let (a, b) = (root(&mut parent, w[0]), root(&mut parent, w[1]));
            if a != b {
                parent[a.max(b)] = a.min(b);
            }
        }
    }
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..count {
        let r = root(&mut parent, i);
        groups.entry(r).or_default().push(i);
    }
    groups.into_values().collect()
}

fn shell_volume(filled: &Filled, pieces: &[Piece], shell: &[usize]) -> f64 {
    shell
        .iter()
        .flat_map(|&p| pieces[p].loops())
        .map(|l| {
            let points: Vec<Point3d> = l.iter().map(|&(e, fwd)| filled.position(filled.endpoints(e, fwd).0)).collect();
            cone_volume(&points)
        })
        .sum()
}

/// Ray parity test of a point of `inner` against the faces of `outer`.
fn shell_contains(pieces: &[Piece], outer: &[usize], inner: &[usize], config: &BooleanConfig) -> bool {
    let tol = config.tolerance.on_distance;
    let Some(origin) = inner.iter().find_map(|&p| {
        let polygon = pieces[p].polygon();
        polygon.region.interior_point(tol).map(|q| polygon.plane.lift(&q))
    }) else {
        return false;
    };
    for attempt in 0..config.max_ray_attempts.max(1) {
        let ray = Ray::new(origin, ray_direction(attempt));
        let mut crossings = 0usize;
        let mut clean = true;
        for &p in outer {
            match pieces[p].polygon().ray_hit(&ray, tol) {
                RayHit::Miss => {}
                RayHit::Hit(_) => crossings += 1,
                RayHit::Grazing => {
                    clean = false;
                    break;
                }
            }
        }
        if clean {
            debug!(attempt, crossings, "void containment ray");
            return crossings % 2 == 1;
        }
    }
    false
}
