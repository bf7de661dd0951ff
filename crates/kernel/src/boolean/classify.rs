//! Fragment classification against the other operand, and the selection
//! table that decides which fragments survive an operation.
//!
//! ON is decided per fragment from the coplanar face records. IN/OUT comes
//! from ray parity against the other operand's faces and is shared across a
//! connexity block: fragments of one operand joined by split edges that the
//! other operand never touches.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::bvh::Bvh;
use super::engine::BoolOp;
use super::error::BooleanError;
use super::filler::{Filled, SplitEdgeId};
use super::index::{Operand, ShapeIndexMap, ShapeKind};
use super::split::Fragment;
use crate::config::BooleanConfig;
use crate::geometry::curves::Ray;
use crate::geometry::point::{Point3d, Vec3};
use crate::geometry::polygon::{Location, RayHit};

/// Position of a fragment relative to the other operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    In,
    Out,
    /// On a face of the other operand with the same orientation.
    OnSame,
    /// On a face of the other operand with the opposite orientation.
    OnOpposite,
    Unknown,
}

/// Skewed directions, tried in order until one ray crosses cleanly.
const RAY_DIRECTIONS: [[f64; 3]; 8] = [
    [0.5377, 0.3121, 0.7832],
    [-0.6613, 0.5429, 0.5175],
    [0.2146, -0.8803, 0.4232],
    [0.7071, 0.4142, -0.5731],
    [-0.3433, -0.4714, -0.8125],
    [0.9182, -0.1273, 0.3751],
    [-0.1189, 0.9357, -0.3322],
    [-0.8466, -0.2887, 0.4472],
];

pub(crate) fn ray_direction(attempt: usize) -> Vec3 {
    let [x, y, z] = RAY_DIRECTIONS[attempt % RAY_DIRECTIONS.len()];
    // Later rounds tilt the table so repeated attempts never repeat a ray.
    let round = (attempt / RAY_DIRECTIONS.len()) as f64;
    Vec3::new(x + 0.137 * round, y - 0.071 * round, z + 0.029 * round).normalize()
}

pub struct Classifier<'a> {
    index: &'a ShapeIndexMap,
    filled: &'a Filled,
    config: &'a BooleanConfig,
    faces_a: Bvh,
    faces_b: Bvh,
}

impl<'a> Classifier<'a> {
    pub fn new(index: &'a ShapeIndexMap, filled: &'a Filled, config: &'a BooleanConfig) -> Self {
        let faces = |operand| {
            let items: Vec<_> = index
                .indices(operand, ShapeKind::Face)
                .into_iter()
                .map(|f| (f, index.get(f).bbox))
                .collect();
            Bvh::build(&items, config.bvh_leaf_size)
        };
        Self {
            index,
            filled,
            config,
            faces_a: faces(Operand::A),
            faces_b: faces(Operand::B),
        }
    }

    fn tolerance(&self, fragment: &Fragment) -> f64 {
        self.index.get(fragment.face).tolerance.max(self.config.tolerance.on_distance)
    }

    /// A point strictly inside the fragment.
    pub fn interior_point(&self, fragment: &Fragment) -> Option<Point3d> {
        let p = fragment.polygon.region.interior_point(self.tolerance(fragment))?;
        Some(fragment.polygon.plane.lift(&p))
    }

    /// ON test against the coplanar faces of the other operand.
    ///
    /// A pair was recorded coplanar within the sum of both face tolerances,
    /// so the fragment is located against the other face with that same
    /// reach.
    pub fn classify_on(&self, fragment: &Fragment) -> Option<Verdict> {
        let info = self.filled.faces.get(&fragment.face)?;
        if info.coplanar.is_empty() {
            return None;
        }
        let p = self.interior_point(fragment)?;
        let own = self.index.get(fragment.face).tolerance;
        let on = &self.config.tolerance;
        info.coplanar.iter().find_map(|&(other, same_sense)| {
            let face = self.index.face(other)?;
            let tol = (own + self.index.get(other).tolerance).max(on.on_distance) + on.angular;
            (face.region.locate(&p, tol) == Location::Inside).then_some(if same_sense {
                Verdict::OnSame
            } else {
                Verdict::OnOpposite
            })
        })
    }

    /// Ray parity against the other operand. Returns the verdict and the
    /// number of rays cast.
    pub fn classify_ray(&self, fragment: &Fragment) -> (Verdict, usize) {
        let Some(origin) = self.interior_point(fragment) else {
            return (Verdict::Unknown, 0);
        };
        let bvh = match fragment.operand.other() {
            Operand::A => &self.faces_a,
            Operand::B => &self.faces_b,
        };
        let tol = self.tolerance(fragment);
        let attempts = self.config.max_ray_attempts.max(1);
        'rays: for attempt in 0..attempts {
            let ray = Ray::new(origin, ray_direction(attempt));
            let mut crossings = 0usize;
            for f in bvh.query_ray(&ray) {
                let Some(face) = self.index.face(f) else { continue };
                match face.region.ray_hit(&ray, tol) {
                    RayHit::Miss => {}
                    RayHit::Hit(_) => crossings += 1,
                    RayHit::Grazing => continue 'rays,
                }
            }
            let verdict = if crossings % 2 == 1 { Verdict::In } else { Verdict::Out };
            return (verdict, attempt + 1);
        }
        (Verdict::Unknown, attempts)
    }

    /// Full classification of one fragment.
    pub fn classify(&self, fragment: &Fragment) -> Verdict {
        self.classify_on(fragment).unwrap_or_else(|| self.classify_ray(fragment).0)
    }

    /// Classify every fragment. Fragments in one connexity block share the
    /// first verdict any of them yields.
    #[instrument(skip_all, fields(fragments = fragments.len()))]
    pub fn classify_all(&self, fragments: &[Fragment]) -> Result<Vec<Verdict>, BooleanError> {
        let mut verdicts: Vec<Option<Verdict>> = fragments.iter().map(|f| self.classify_on(f)).collect();
        let blocks = self.connexity_blocks(fragments, &verdicts);

        let solve = |block: &Vec<usize>| -> Result<(Verdict, usize), BooleanError> {
            let mut attempts = 0;
            for &i in block {
                let (verdict, cast) = self.classify_ray(&fragments[i]);
                attempts += cast;
                if verdict != Verdict::Unknown {
                    return Ok((verdict, attempts));
                }
            }
            Err(BooleanError::UnclassifiedFragment {
                face: self.index.describe(fragments[block[0]].face),
                attempts,
            })
        };
        let solved: Vec<(Verdict, usize)> = if self.config.parallel {
            blocks.par_iter().map(solve).collect::<Result<_, _>>()?
        } else {
            blocks.iter().map(solve).collect::<Result<_, _>>()?
        };

        let mut rays = 0;
        for (block, (verdict, attempts)) in blocks.iter().zip(solved) {
            rays += attempts;
            for &i in block {
                verdicts[i] = Some(verdict);
            }
        }
        debug!(blocks = blocks.len(), rays, "fragments classified");
        Ok(verdicts.into_iter().map(|v| v.unwrap_or(Verdict::Unknown)).collect())
    }

    /// Groups of unclassified fragments of one operand, joined across split
    /// edges the other operand does not touch. Each group is sorted.
    fn connexity_blocks(&self, fragments: &[Fragment], verdicts: &[Option<Verdict>]) -> Vec<Vec<usize>> {
        let touched: Vec<bool> = (0..self.filled.split_edges.len())
            .map(|i| self.is_touched(SplitEdgeId(i)))
            .collect();
        let mut parent: Vec<usize> = (0..fragments.len()).collect();
        fn root(parent: &mut [usize], mut i: usize) -> usize {
            while parent[i] != i {
                parent[i] = parent[parent[i]];
                i = parent[i];
            }
            i
        }

        let mut first_user: HashMap<(Operand, SplitEdgeId), usize> = HashMap::new();
        for (i, fragment) in fragments.iter().enumerate() {
            if verdicts[i].is_some() {
                continue;
            }
            for edge in fragment.edges() {
                if touched[edge.0] {
                    continue;
                }
                match first_user.get(&(fragment.operand, edge)) {
                    Some(&j) => {
                        let (ri, rj) = (root(&mut parent, i), root(&mut parent, j));
                        if ri != rj {
                            parent[ri.max(rj)] = ri.min(rj);
                        }
                    }
                    None => {
                        first_user.insert((fragment.operand, edge), i);
                    }
                }
            }
        }

        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..fragments.len() {
            if verdicts[i].is_none() {
                let r = root(&mut parent, i);
                groups.entry(r).or_default().push(i);
            }
        }
        let mut blocks: Vec<Vec<usize>> = groups.into_values().collect();
        blocks.sort_by_key(|b| b[0]);
        blocks
    }

    /// A split edge the other operand reaches: a section, an edge lying in
    /// a face, or a piece shared by both operands.
    fn is_touched(&self, id: SplitEdgeId) -> bool {
        let edge = self.filled.split_edge(id);
        edge.section
            || self.filled.operands(self.index, id).len() > 1
            || self.filled.faces.values().any(|f| f.inside.contains(&id) || f.sections.contains(&id))
    }
}

/// Whether a fragment survives `op`, and if so whether it is reversed.
pub fn select(op: BoolOp, operand: Operand, verdict: Verdict) -> Option<bool> {
    use Verdict::*;
    match (op, operand, verdict) {
        (BoolOp::Union, _, Out) => Some(false),
        (BoolOp::Union, Operand::A, OnSame) => Some(false),
        (BoolOp::Intersection, _, In) => Some(false),
        (BoolOp::Intersection, Operand::A, OnSame) => Some(false),
        (BoolOp::Difference, Operand::A, Out) => Some(false),
        (BoolOp::Difference, Operand::B, In) => Some(true),
        (BoolOp::Difference, Operand::A, OnOpposite) => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::error::{CancelToken, WarningLog};
    use crate::boolean::filler::fill;
    use crate::boolean::split::build_fragments;
    use crate::geometry::oracle::PlanarOracle;
    use crate::topology::brep::EntityStore;
    use crate::topology::primitives::make_box;

    fn verdicts(a: [f64; 6], b: [f64; 6]) -> Vec<(Operand, Verdict)> {
        let mut store = EntityStore::new();
        let sa = make_box(&mut store, a[0], a[1], a[2], a[3], a[4], a[5]);
        let sb = make_box(&mut store, b[0], b[1], b[2], b[3], b[4], b[5]);
        let config = BooleanConfig::default();
        let mut warnings = WarningLog::new();
        let cancel = CancelToken::new();
        let index = ShapeIndexMap::build(&store, &[sa], &[sb], &config, &mut warnings).unwrap();
        let filled = fill(&index, &PlanarOracle, &config, &cancel, &mut warnings).unwrap();
        let fragments = build_fragments(&index, &filled, &config, &cancel, &mut warnings).unwrap();
        let classifier = Classifier::new(&index, &filled, &config);
        let v = classifier.classify_all(&fragments).unwrap();
        fragments.iter().map(|f| f.operand).zip(v).collect()
    }

    #[test]
    fn test_ray_directions_are_unit_and_distinct() {
        for k in 0..20 {
            assert!((ray_direction(k).norm() - 1.0).abs() < 1e-12);
        }
        assert!((ray_direction(0) - ray_direction(8)).norm() > 1e-3);
    }

    #[test]
    fn test_disjoint_solids_are_all_out() {
        let v = verdicts([0.0, 0.0, 0.0, 1.0, 1.0, 1.0], [3.0, 0.0, 0.0, 4.0, 1.0, 1.0]);
        assert_eq!(v.len(), 12);
        assert!(v.iter().all(|(_, verdict)| *verdict == Verdict::Out));
    }

    #[test]
    fn test_identical_solids_are_all_on_same() {
        let v = verdicts([0.0, 0.0, 0.0, 1.0, 1.0, 1.0], [0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(v.len(), 12);
        assert!(v.iter().all(|(_, verdict)| *verdict == Verdict::OnSame));
    }

    #[test]
    fn test_contained_box_is_in() {
        let v = verdicts([0.0, 0.0, 0.0, 3.0, 3.0, 3.0], [1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
        for (operand, verdict) in v {
            match operand {
                Operand::A => assert_eq!(verdict, Verdict::Out),
                Operand::B => assert_eq!(verdict, Verdict::In),
            }
        }
    }

    #[test]
    fn test_offset_boxes_mix_in_and_out() {
        let v = verdicts([0.0, 0.0, 0.0, 1.0, 1.0, 1.0], [0.5, 0.5, 0.5, 1.5, 1.5, 1.5]);
        let count = |operand: Operand, verdict: Verdict| v.iter().filter(|x| **x == (operand, verdict)).count();
        assert_eq!(count(Operand::A, Verdict::In), 3);
        assert_eq!(count(Operand::A, Verdict::Out), 6);
        assert_eq!(count(Operand::B, Verdict::In), 3);
        assert_eq!(count(Operand::B, Verdict::Out), 6);
    }

    #[test]
    fn test_faces_apart_within_pair_tolerance_are_on() {
        // Farther apart than one face tolerance, within the sum of both.
        let v = verdicts([0.0, 0.0, 0.0, 1.0, 1.0, 1.0], [0.5, 0.5, 1.0 + 1.5e-7, 1.5, 1.5, 2.0]);
        let on = |operand: Operand| v.iter().filter(|x| **x == (operand, Verdict::OnOpposite)).count();
        assert_eq!(on(Operand::A), 1);
        assert_eq!(on(Operand::B), 1);
        assert!(v.iter().all(|(_, verdict)| *verdict != Verdict::In));
    }

    #[test]
    fn test_selection_table() {
        assert_eq!(select(BoolOp::Union, Operand::B, Verdict::Out), Some(false));
        assert_eq!(select(BoolOp::Union, Operand::B, Verdict::OnSame), None);
        assert_eq!(select(BoolOp::Intersection, Operand::A, Verdict::OnSame), Some(false));
        assert_eq!(select(BoolOp::Difference, Operand::B, Verdict::In), Some(true));
        assert_eq!(select(BoolOp::Difference, Operand::A, Verdict::OnSame), None);
        assert_eq!(select(BoolOp::Difference, Operand::A, Verdict::OnOpposite), Some(false));
    }
}
