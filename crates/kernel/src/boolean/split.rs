//! Face builder: cuts every touched face into fragments along its split
//! edges.
//!
//! Works in the face's 2D frame. Boundary split edges are used once in the
//! direction the face traverses them; interior edges (sections and edges of
//! the other operand lying in the face) are used once in each direction.
//! Loops are traced by always taking the sharpest left turn, so each traced
//! loop has its region on the left: counter-clockwise loops are fragment
//! outers, clockwise loops are holes.

use std::collections::{BTreeSet, HashMap};
use std::f64::consts::TAU;

use rayon::prelude::*;
use tracing::{debug, instrument};

use super::error::{BooleanError, CancelToken, WarningCode, WarningLog};
use super::filler::{FaceInfo, Filled, SplitEdgeId};
use super::index::{Operand, ShapeIndexMap};
use super::merge::PointId;
use crate::config::BooleanConfig;
use crate::geometry::point::{Point2d, Vec2};
use crate::geometry::polygon::{point_in_polygon, signed_area, PlanarRegion, Region};
use crate::geometry::surfaces::Plane;

/// A directed use of a split edge.
pub type EdgeUse = (SplitEdgeId, bool);

/// A piece of one input face, bounded by split edges.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Face shape index.
    pub face: usize,
    pub operand: Operand,
    /// Outer loop first, then holes.
    pub loops: Vec<Vec<EdgeUse>>,
    pub polygon: PlanarRegion,
}

impl Fragment {
    pub fn edges(&self) -> impl Iterator<Item = SplitEdgeId> + '_ {
        self.loops.iter().flatten().map(|&(e, _)| e)
    }
}

/// Fragments of every face of both operands, in face order.
#[instrument(skip_all)]
pub fn build_fragments(
    index: &ShapeIndexMap,
    filled: &Filled,
    config: &BooleanConfig,
    cancel: &CancelToken,
    warnings: &mut WarningLog,
) -> Result<Vec<Fragment>, BooleanError> {
    let faces: Vec<(usize, &FaceInfo)> = filled.faces.iter().map(|(&f, info)| (f, info)).collect();
    let run = |&(f, info): &(usize, &FaceInfo)| -> Result<(Vec<Fragment>, Vec<(WarningCode, String)>), BooleanError> {
        cancel.check()?;
        Ok(split_face(index, filled, f, info, config))
    };
    let per_face: Vec<(Vec<Fragment>, Vec<(WarningCode, String)>)> = if config.parallel {
        faces.par_iter().map(run).collect::<Result<_, _>>()?
    } else {
        faces.iter().map(run).collect::<Result<_, _>>()?
    };

    let mut fragments = Vec::new();
    for (frags, notes) in per_face {
        for (code, message) in notes {
            warnings.push(code, message);
        }
        fragments.extend(frags);
    }
    debug!(fragments = fragments.len(), "faces split");
    Ok(fragments)
}

struct Directed {
    id: SplitEdgeId,
    forward: bool,
    from: PointId,
    to: PointId,
}

fn split_face(
    index: &ShapeIndexMap,
    filled: &Filled,
    face: usize,
    info: &FaceInfo,
    config: &BooleanConfig,
) -> (Vec<Fragment>, Vec<(WarningCode, String)>) {
    let mut notes = Vec::new();
    let Some(shape) = index.face(face) else {
        return (Vec::new(), notes);
    };
    let operand = index.get(face).operand;
    let plane = shape.region.plane;
    let tol = index.get(face).tolerance + config.tolerance.linear;

    if !info.is_touched() {
        let loops: Vec<Vec<EdgeUse>> = info.on.iter().filter(|l| !l.is_empty()).cloned().collect();
        if loops.is_empty() {
            return (Vec::new(), notes);
        }
        let polygon = loops_region(filled, &plane, &loops);
        return (
            vec![Fragment {
                face,
                operand,
                loops,
                polygon,
            }],
            notes,
        );
    }

    // Directed edge set.
    let boundary: Vec<EdgeUse> = info.on.iter().flatten().copied().collect();
    let boundary_ids: BTreeSet<SplitEdgeId> = boundary.iter().map(|&(e, _)| e).collect();
    let mut internal: BTreeSet<SplitEdgeId> = info
        .inside
        .iter()
        .chain(info.sections.iter())
        .copied()
        .filter(|e| !boundary_ids.contains(e))
        .collect();

    // Drop dangling internal edges until every vertex has degree two or more.
    loop {
        let mut degree: HashMap<PointId, usize> = HashMap::new();
        for id in boundary_ids.iter().chain(internal.iter()) {
            let e = filled.split_edge(*id);
            *degree.entry(e.start).or_default() += 1;
            *degree.entry(e.end).or_default() += 1;
        }
        let dangling: Vec<SplitEdgeId> = internal
            .iter()
            .copied()
            .filter(|id| {
                let e = filled.split_edge(*id);
                degree[&e.start] < 2 || degree[&e.end] < 2
            })
            .collect();
        if dangling.is_empty() {
            break;
        }
        for id in dangling {
            internal.remove(&id);
            notes.push((
                WarningCode::DanglingSection,
                format!("{}: split edge {} ends inside the face; ignored", index.describe(face), id.0),
            ));
        }
    }

    let mut directed: Vec<Directed> = Vec::new();
    for &(id, forward) in &boundary {
        let (from, to) = filled.endpoints(id, forward);
        directed.push(Directed { id, forward, from, to });
    }
    for &id in &internal {
        for forward in [true, false] {
            let (from, to) = filled.endpoints(id, forward);
            directed.push(Directed { id, forward, from, to });
        }
    }

    let uv = |p: PointId| -> Point2d { plane.project(&filled.position(p)) };
    let angle = |d: &Directed| {
        let v = uv(d.to) - uv(d.from);
        v.y.atan2(v.x)
    };
    let mut outgoing: HashMap<PointId, Vec<usize>> = HashMap::new();
    for (k, d) in directed.iter().enumerate() {
        outgoing.entry(d.from).or_default().push(k);
    }
    let angles: Vec<f64> = directed.iter().map(angle).collect();

    let mut used = vec![false; directed.len()];
    let mut outers: Vec<Vec<usize>> = Vec::new();
    let mut holes: Vec<Vec<usize>> = Vec::new();
    for seed in 0..directed.len() {
        if used[seed] {
            continue;
        }
        let mut cycle = vec![seed];
        used[seed] = true;
        let mut current = seed;
        let mut closed = false;
        for _ in 0..directed.len() {
            let back = angles[current] + std::f64::consts::PI;
            let next = outgoing
                .get(&directed[current].to)
                .into_iter()
                .flatten()
                .copied()
                .filter(|&k| !used[k] || k == seed)
                .min_by(|&x, &y| turn(back, angles[x]).total_cmp(&turn(back, angles[y])));
            let Some(next) = next else { break };
            if next == seed {
                closed = true;
                break;
            }
            used[next] = true;
            cycle.push(next);
            current = next;
        }
        if !closed {
            notes.push((
                WarningCode::DanglingSection,
                format!("{}: open chain of {} split edge(s) dropped", index.describe(face), cycle.len()),
            ));
            continue;
        }
        let pts: Vec<Point2d> = cycle.iter().map(|&k| uv(directed[k].from)).collect();
        let area = signed_area(&pts);
        if area.abs() <= tol * tol {
            continue;
        }
        if area > 0.0 {
            outers.push(cycle);
        } else {
            holes.push(cycle);
        }
    }

    let points = |cycle: &Vec<usize>| -> Vec<Point2d> { cycle.iter().map(|&k| uv(directed[k].from)).collect() };
    let outer_pts: Vec<Vec<Point2d>> = outers.iter().map(|c| points(c)).collect();
    let mut assigned: Vec<Vec<usize>> = vec![Vec::new(); outers.len()];
    for (h, hole) in holes.iter().enumerate() {
        let first = &directed[hole[0]];
        let (a, b) = (uv(first.from), uv(first.to));
        let dir = b - a;
        let len = dir.norm();
        let left = Vec2::new(-dir.y, dir.x) / len;
        let probe = nalgebra::center(&a, &b) + left * (len * 1e-3).max(tol * 10.0);
        let host = outer_pts
            .iter()
            .enumerate()
            .filter(|(_, poly)| point_in_polygon(&probe, poly))
            .min_by(|(_, p), (_, q)| signed_area(p).total_cmp(&signed_area(q)))
            .map(|(i, _)| i);
        match host {
            Some(i) => assigned[i].push(h),
            None => notes.push((
                WarningCode::OrphanVoid,
                format!("{}: hole loop without an enclosing fragment dropped", index.describe(face)),
            )),
        }
    }

    let to_uses = |cycle: &Vec<usize>| -> Vec<EdgeUse> { cycle.iter().map(|&k| (directed[k].id, directed[k].forward)).collect() };
    let fragments = outers
        .iter()
        .zip(assigned)
        .map(|(outer, hole_ids)| {
            let mut loops = vec![to_uses(outer)];
            loops.extend(hole_ids.iter().map(|&h| to_uses(&holes[h])));
            let region = Region::new(points(outer), hole_ids.iter().map(|&h| points(&holes[h])).collect());
            Fragment {
                face,
                operand,
                loops,
                polygon: PlanarRegion::new(plane, region),
            }
        })
        .collect();
    (fragments, notes)
}

/// Clockwise turn from the reversed incoming direction to `out`, in (0, 2π].
fn turn(back: f64, out: f64) -> f64 {
    let t = (back - out).rem_euclid(TAU);
    if t <= 1e-12 { TAU } else { t }
}

fn loops_region(filled: &Filled, plane: &Plane, loops: &[Vec<EdgeUse>]) -> PlanarRegion {
    let project = |l: &Vec<EdgeUse>| -> Vec<Point2d> {
        l.iter()
            .map(|&(id, fwd)| plane.project(&filled.position(filled.endpoints(id, fwd).0)))
            .collect()
    };
    let outer = project(&loops[0]);
    let holes = loops[1..].iter().map(project).collect();
    PlanarRegion::new(*plane, Region::new(outer, holes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::filler::fill;
    use crate::geometry::oracle::PlanarOracle;
    use crate::topology::brep::EntityStore;
    use crate::topology::primitives::make_box;

    fn fragments_of(a: [f64; 6], b: [f64; 6]) -> (ShapeIndexMap, Vec<Fragment>, WarningLog) {
        let mut store = EntityStore::new();
        let sa = make_box(&mut store, a[0], a[1], a[2], a[3], a[4], a[5]);
        let sb = make_box(&mut store, b[0], b[1], b[2], b[3], b[4], b[5]);
        let config = BooleanConfig::default();
        let mut warnings = WarningLog::new();
        let index = ShapeIndexMap::build(&store, &[sa], &[sb], &config, &mut warnings).unwrap();
        let cancel = CancelToken::new();
        let filled = fill(&index, &PlanarOracle, &config, &cancel, &mut warnings).unwrap();
        let fragments = build_fragments(&index, &filled, &config, &cancel, &mut warnings).unwrap();
        (index, fragments, warnings)
    }

    fn area_of(fragments: &[Fragment], face: usize) -> f64 {
        fragments.iter().filter(|f| f.face == face).map(|f| f.polygon.region.area()).sum()
    }

    #[test]
    fn test_turn_prefers_left() {
        // Arriving along +x, the way back points at angle π.
        let back = std::f64::consts::PI;
        assert!(turn(back, std::f64::consts::FRAC_PI_2) < turn(back, -std::f64::consts::FRAC_PI_2));
        assert_eq!(turn(back, back), TAU);
    }

    #[test]
    fn test_untouched_faces_stay_whole() {
        let (_, fragments, warnings) = fragments_of([0.0, 0.0, 0.0, 1.0, 1.0, 1.0], [3.0, 0.0, 0.0, 4.0, 1.0, 1.0]);
        assert_eq!(fragments.len(), 12);
        assert!(fragments.iter().all(|f| f.loops.len() == 1 && f.loops[0].len() == 4));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_crossed_faces_split_in_two() {
        let (index, fragments, _) = fragments_of([0.0, 0.0, 0.0, 1.0, 1.0, 1.0], [0.5, 0.5, 0.5, 1.5, 1.5, 1.5]);
        // Three faces of each box are cut by two sections into two pieces.
        assert_eq!(fragments.len(), 12 + 6);
        for face in index.indices(Operand::A, crate::boolean::index::ShapeKind::Face) {
            assert!((area_of(&fragments, face) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_island_becomes_hole() {
        let (index, fragments, _) = fragments_of([0.0, 0.0, 0.0, 2.0, 2.0, 1.0], [0.5, 0.5, 0.0, 1.5, 1.5, 1.0]);
        let a_faces = index.indices(Operand::A, crate::boolean::index::ShapeKind::Face);
        let holed: Vec<&Fragment> = fragments
            .iter()
            .filter(|f| a_faces.contains(&f.face) && f.loops.len() == 2)
            .collect();
        assert_eq!(holed.len(), 2);
        for f in holed {
            assert!((f.polygon.region.area() - 3.0).abs() < 1e-9);
            assert!((area_of(&fragments, f.face) - 4.0).abs() < 1e-9);
        }
    }
}
