//! Vertex/point merger.
//!
//! Points whose tolerance spheres touch end up in one equivalence class
//! (union-find, transitive). Candidates come from a uniform hash grid whose
//! cell is twice the maximum tolerance, so the 27 cells around a point hold
//! every possible partner.
//!
//! A class is represented by its member with the lowest [`Origin`]: input
//! vertices rank before computed points, each ordered by its key. Neither
//! the partition nor the representative depends on arrival order. The class
//! tolerance covers every member: `max(distance(rep, m) + tol(m))`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::point::{distance, is_finite, Point3d};

/// Handle to one merged point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointId(pub usize);

/// Provenance of a point; also its rank when choosing representatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Origin {
    /// An operand vertex, keyed by its shape index.
    Input(usize),
    /// A computed intersection point, keyed by its producer.
    Computed(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("merged tolerance {required:.3e} would exceed the maximum {max:.3e}")]
pub struct MergeConflict {
    pub required: f64,
    pub max: f64,
}

#[derive(Debug, Clone)]
struct MergePoint {
    position: Point3d,
    tolerance: f64,
    origin: Origin,
}

#[derive(Debug, Clone)]
struct Class {
    members: Vec<usize>,
    rep: usize,
    tolerance: f64,
}

#[derive(Debug, Clone)]
pub struct VertexMerger {
    points: Vec<MergePoint>,
    parent: Vec<usize>,
    /// Indexed by root.
    classes: HashMap<usize, Class>,
    grid: HashMap<[i64; 3], Vec<usize>>,
    cell: f64,
    max_tolerance: f64,
}

impl VertexMerger {
    pub fn new(max_tolerance: f64) -> Self {
        Self {
            points: Vec::new(),
            parent: Vec::new(),
            classes: HashMap::new(),
            grid: HashMap::new(),
            cell: (2.0 * max_tolerance).max(1e-12),
            max_tolerance,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn max_tolerance(&self) -> f64 {
        self.max_tolerance
    }

    /// Add a point, joining every class it touches.
    ///
    /// Refused without side effects when the joined class would need a
    /// tolerance above the maximum.
    pub fn merge(&mut self, position: Point3d, tolerance: f64, origin: Origin) -> Result<PointId, MergeConflict> {
        let conflict = |required| MergeConflict {
            required,
            max: self.max_tolerance,
        };
        if !is_finite(&position) || !tolerance.is_finite() {
            return Err(conflict(f64::INFINITY));
        }
        let tolerance = tolerance.max(0.0);
        if tolerance > self.max_tolerance {
            return Err(conflict(tolerance));
        }

        let mut roots: Vec<usize> = Vec::new();
        for j in self.neighbours(&position) {
            let other = &self.points[j];
            if distance(&position, &other.position) <= tolerance + other.tolerance {
                let r = self.root(j);
                if !roots.contains(&r) {
                    roots.push(r);
                }
            }
        }

        let new_index = self.points.len();
        let candidate = MergePoint { position, tolerance, origin };
        let mut members: Vec<usize> = roots.iter().flat_map(|r| self.classes[r].members.iter().copied()).collect();
        let rep = members
            .iter()
            .copied()
            .min_by_key(|&m| self.points[m].origin)
            .filter(|&m| self.points[m].origin <= origin);
        let rep_point = rep.map_or(&candidate, |m| &self.points[m]);
        let required = members
            .iter()
            .map(|&m| &self.points[m])
            .chain(std::iter::once(&candidate))
            .map(|p| distance(&rep_point.position, &p.position) + p.tolerance)
            .fold(0.0, f64::max);
        if required > self.max_tolerance {
            return Err(conflict(required));
        }

        let cell = self.cell_of(&position);
        self.points.push(candidate);
        self.parent.push(new_index);
        self.grid.entry(cell).or_default().push(new_index);
        members.push(new_index);

        // Union by size: the largest existing class keeps its root.
        let root = roots
            .iter()
            .copied()
            .max_by_key(|r| (self.classes[r].members.len(), std::cmp::Reverse(*r)))
            .unwrap_or(new_index);
        for &r in &roots {
            if r != root {
                self.classes.remove(&r);
                self.parent[r] = root;
            }
        }
        self.parent[new_index] = root;
        self.classes.insert(
            root,
            Class {
                members,
                rep: rep.unwrap_or(new_index),
                tolerance: required,
            },
        );
        Ok(PointId(new_index))
    }

    /// Add a point as its own class without looking for partners. Used when
    /// a merge was refused but the point must still exist.
    pub fn insert_isolated(&mut self, position: Point3d, tolerance: f64, origin: Origin) -> PointId {
        let index = self.points.len();
        self.points.push(MergePoint { position, tolerance, origin });
        self.parent.push(index);
        if is_finite(&position) {
            let cell = self.cell_of(&position);
            self.grid.entry(cell).or_default().push(index);
        }
        self.classes.insert(
            index,
            Class {
                members: vec![index],
                rep: index,
                tolerance,
            },
        );
        PointId(index)
    }

    /// Join the classes of `a` and `b` and return the new representative.
    ///
    /// Refused without side effects when the joined class would need a
    /// tolerance above the maximum.
    pub fn unite(&mut self, a: PointId, b: PointId) -> Result<PointId, MergeConflict> {
        let (ra, rb) = (self.root(a.0), self.root(b.0));
        if ra == rb {
            return Ok(self.find(a));
        }
        let (big, small) = if self.classes[&ra].members.len() >= self.classes[&rb].members.len() {
            (ra, rb)
        } else {
            (rb, ra)
        };
        let members: Vec<usize> = self.classes[&big]
            .members
            .iter()
            .chain(self.classes[&small].members.iter())
            .copied()
            .collect();
        let rep = members
            .iter()
            .copied()
            .min_by_key(|&m| self.points[m].origin)
            .unwrap_or(self.classes[&big].rep);
        let rep_position = self.points[rep].position;
        let required = members
            .iter()
            .map(|&m| distance(&rep_position, &self.points[m].position) + self.points[m].tolerance)
            .fold(0.0, f64::max);
        if required > self.max_tolerance {
            return Err(MergeConflict {
                required,
                max: self.max_tolerance,
            });
        }

        self.classes.remove(&small);
        self.parent[small] = big;
        self.classes.insert(
            big,
            Class {
                members,
                rep,
                tolerance: required,
            },
        );
        Ok(PointId(rep))
    }

    /// Representative of the class containing `id`.
    pub fn find(&self, id: PointId) -> PointId {
        PointId(self.class(id).rep)
    }

    /// Position of the class representative.
    pub fn position(&self, id: PointId) -> Point3d {
        self.points[self.class(id).rep].position
    }

    pub fn tolerance(&self, id: PointId) -> f64 {
        self.class(id).tolerance
    }

    pub fn origin(&self, id: PointId) -> Origin {
        self.points[id.0].origin
    }

    pub fn same_class(&self, a: PointId, b: PointId) -> bool {
        self.root(a.0) == self.root(b.0)
    }

    /// Members of the class containing `id`, sorted.
    pub fn members(&self, id: PointId) -> Vec<PointId> {
        let mut m: Vec<PointId> = self.class(id).members.iter().map(|&i| PointId(i)).collect();
        m.sort();
        m
    }

    /// Every class as (representative, sorted members), ordered by representative origin.
    pub fn classes(&self) -> Vec<(PointId, Vec<PointId>)> {
        let mut out: Vec<(PointId, Vec<PointId>)> = self
            .classes
            .values()
            .map(|c| {
                let mut m: Vec<PointId> = c.members.iter().map(|&i| PointId(i)).collect();
                m.sort();
                (PointId(c.rep), m)
            })
            .collect();
        out.sort_by_key(|(rep, _)| self.points[rep.0].origin);
        out
    }

    fn class(&self, id: PointId) -> &Class {
        &self.classes[&self.root(id.0)]
    }

    fn root(&self, mut i: usize) -> usize {
        while self.parent[i] != i {
            i = self.parent[i];
        }
        i
    }

    fn cell_of(&self, p: &Point3d) -> [i64; 3] {
        [
            (p.x / self.cell).floor() as i64,
            (p.y / self.cell).floor() as i64,
            (p.z / self.cell).floor() as i64,
        ]
    }

    fn neighbours(&self, p: &Point3d) -> Vec<usize> {
        let c = self.cell_of(p);
        let mut out = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = [c[0].saturating_add(dx), c[1].saturating_add(dy), c[2].saturating_add(dz)];
                    if let Some(list) = self.grid.get(&key) {
                        out.extend_from_slice(list);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-6;

    #[test]
    fn test_close_points_share_a_class() {
        let mut m = VertexMerger::new(1e-3);
        let a = m.merge(Point3d::new(0.0, 0.0, 0.0), TOL, Origin::Input(3)).unwrap();
        let b = m.merge(Point3d::new(1e-6, 0.0, 0.0), TOL, Origin::Computed(0)).unwrap();
        let c = m.merge(Point3d::new(1.0, 0.0, 0.0), TOL, Origin::Computed(1)).unwrap();
        assert!(m.same_class(a, b));
        assert!(!m.same_class(a, c));
        assert_eq!(m.find(b), a);
        assert_eq!(m.position(b), Point3d::new(0.0, 0.0, 0.0));
        assert!((m.tolerance(a) - (1e-6 + TOL)).abs() < 1e-15);
        assert_eq!(m.class_count(), 2);
    }

    #[test]
    fn test_merging_is_transitive() {
        let mut m = VertexMerger::new(1e-3);
        let a = m.merge(Point3d::new(0.0, 0.0, 0.0), TOL, Origin::Computed(0)).unwrap();
        let c = m.merge(Point3d::new(3e-6, 0.0, 0.0), TOL, Origin::Computed(2)).unwrap();
        assert!(!m.same_class(a, c));
        let b = m.merge(Point3d::new(1.5e-6, 0.0, 0.0), TOL, Origin::Computed(1)).unwrap();
        assert!(m.same_class(a, b) && m.same_class(b, c));
        assert_eq!(m.find(c), a);
    }

    #[test]
    fn test_input_vertex_wins_representative() {
        let mut m = VertexMerger::new(1e-3);
        let computed = m.merge(Point3d::new(0.0, 0.0, 0.0), TOL, Origin::Computed(0)).unwrap();
        let input = m.merge(Point3d::new(5e-7, 0.0, 0.0), TOL, Origin::Input(7)).unwrap();
        assert_eq!(m.find(computed), input);
        assert_eq!(m.position(computed), Point3d::new(5e-7, 0.0, 0.0));
    }

    #[test]
    fn test_conflict_leaves_merger_unchanged() {
        let mut m = VertexMerger::new(2e-6);
        m.merge(Point3d::new(0.0, 0.0, 0.0), 1e-6, Origin::Computed(0)).unwrap();
        let err = m.merge(Point3d::new(1.9e-6, 0.0, 0.0), 1e-6, Origin::Computed(1)).unwrap_err();
        assert!(err.required > err.max);
        assert_eq!(m.len(), 1);
        let iso = m.insert_isolated(Point3d::new(1.9e-6, 0.0, 0.0), 1e-6, Origin::Computed(1));
        assert_eq!(m.class_count(), 2);
        assert_eq!(m.find(iso), iso);
    }

    #[test]
    fn test_oversized_tolerance_is_refused() {
        let mut m = VertexMerger::new(1e-6);
        assert!(m.merge(Point3d::origin(), 1e-3, Origin::Computed(0)).is_err());
        assert!(m.merge(Point3d::new(f64::NAN, 0.0, 0.0), 1e-9, Origin::Computed(1)).is_err());
    }

    #[test]
    fn test_partition_ignores_arrival_order() {
        let pts: Vec<(Point3d, Origin)> = vec![
            (Point3d::new(0.0, 0.0, 0.0), Origin::Input(0)),
            (Point3d::new(1.5e-6, 0.0, 0.0), Origin::Computed(4)),
            (Point3d::new(3e-6, 0.0, 0.0), Origin::Computed(2)),
            (Point3d::new(1.0, 1.0, 1.0), Origin::Computed(9)),
            (Point3d::new(1.0, 1.0, 1.0 + 5e-7), Origin::Input(5)),
        ];
        let summarize = |order: &[usize]| {
            let mut m = VertexMerger::new(1e-3);
            let ids: Vec<PointId> = order.iter().map(|&i| m.merge(pts[i].0, TOL, pts[i].1).unwrap()).collect();
            let mut by_input = vec![PointId(0); pts.len()];
            for (k, &i) in order.iter().enumerate() {
                by_input[i] = ids[k];
            }
            by_input.iter().map(|&id| m.origin(m.find(id))).collect::<Vec<_>>()
        };
        let forward = summarize(&[0, 1, 2, 3, 4]);
        let backward = summarize(&[4, 3, 2, 1, 0]);
        let shuffled = summarize(&[2, 4, 0, 3, 1]);
        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
        assert_eq!(forward[2], Origin::Input(0));
        assert_eq!(forward[3], Origin::Input(5));
    }

    #[test]
    fn test_unite_joins_distant_classes() {
        let mut m = VertexMerger::new(1e-2);
        let p = m.merge(Point3d::new(0.5, 0.0, 0.0), 1e-7, Origin::Computed(3)).unwrap();
        let q = m.merge(Point3d::new(0.5005, 0.0, 0.0), 1e-7, Origin::Computed(1)).unwrap();
        assert!(!m.same_class(p, q));
        let rep = m.unite(p, q).unwrap();
        assert!(m.same_class(p, q));
        assert_eq!(rep, q);
        assert_eq!(m.find(p), q);
        assert!((m.tolerance(p) - (5e-4 + 1e-7)).abs() < 1e-12);
        assert_eq!(m.class_count(), 1);
        assert_eq!(m.unite(q, p).unwrap(), q);
    }

    #[test]
    fn test_unite_refuses_oversized_class() {
        let mut m = VertexMerger::new(1e-3);
        let p = m.merge(Point3d::new(0.0, 0.0, 0.0), 1e-7, Origin::Computed(0)).unwrap();
        let q = m.merge(Point3d::new(0.5, 0.0, 0.0), 1e-7, Origin::Computed(1)).unwrap();
        let err = m.unite(p, q).unwrap_err();
        assert!(err.required > err.max);
        assert!(!m.same_class(p, q));
        assert_eq!(m.class_count(), 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut m = VertexMerger::new(1e-3);
        let a = m.merge(Point3d::new(2.0, 0.0, 0.0), TOL, Origin::Input(0)).unwrap();
        let tol = m.tolerance(a);
        let again = m.merge(Point3d::new(2.0, 0.0, 0.0), TOL, Origin::Input(0)).unwrap();
        assert!(m.same_class(a, again));
        assert_eq!(m.tolerance(a), tol);
        assert_eq!(m.class_count(), 1);
    }
}
