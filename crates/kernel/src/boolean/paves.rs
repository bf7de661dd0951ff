//! Pave blocks: the ordered split points of every edge.
//!
//! Each edge moves through three states. It starts `Unsplit`, collects paves
//! while interferences are processed (`Splitting`), and is frozen once into
//! an immutable [`PaveBlock`] (`Split`). Freezing is the only place paves
//! are sorted and merged. Paves folded together remember both vertices, and
//! [`PaveBlockManager::unite_merged`] joins their classes afterwards so no
//! vertex silently leaves its edge.

use std::collections::BTreeMap;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, instrument};

use super::error::{BooleanError, CancelToken};
use super::merge::{MergeConflict, PointId, VertexMerger};

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum PaveError {
    #[error("edge {edge} is already split")]
    Frozen { edge: usize },

    #[error("edge {edge} is not registered")]
    UnknownEdge { edge: usize },
}

/// A vertex placed on an edge at an arc-length parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pave {
    pub parameter: f64,
    pub vertex: PointId,
}

/// Frozen paves of one edge. Parameters strictly increase, the first and
/// last paves sit on the edge's own end vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct PaveBlock {
    paves: Vec<Pave>,
    tolerance: f64,
    /// (kept, dropped) vertices of paves folded together while freezing.
    merged: Vec<(PointId, PointId)>,
}

impl PaveBlock {
    pub fn paves(&self) -> &[Pave] {
        &self.paves
    }

    /// Edge tolerance after growing to cover the merged pave vertices.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Vertices folded into a neighbouring pave while freezing, as
    /// (kept, dropped). Their classes still have to be joined in the merger.
    pub fn merged(&self) -> &[(PointId, PointId)] {
        &self.merged
    }

    /// Consecutive pave pairs, one per split edge.
    pub fn ranges(&self) -> impl Iterator<Item = (Pave, Pave)> + '_ {
        self.paves.windows(2).map(|w| (w[0], w[1]))
    }
}

#[derive(Debug, Clone)]
enum EdgeState {
    Unsplit,
    Splitting(Vec<Pave>),
    Split(PaveBlock),
}

#[derive(Debug, Clone)]
struct EdgeSlot {
    length: f64,
    tolerance: f64,
    start: PointId,
    end: PointId,
    state: EdgeState,
}

/// Per-edge pave bookkeeping, keyed by edge shape index.
#[derive(Debug, Clone, Default)]
pub struct PaveBlockManager {
    edges: BTreeMap<usize, EdgeSlot>,
}

impl PaveBlockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an edge with its end vertices. Registering twice keeps the
    /// first entry.
    pub fn register_edge(&mut self, edge: usize, length: f64, tolerance: f64, start: PointId, end: PointId) {
        self.edges.entry(edge).or_insert(EdgeSlot {
            length,
            tolerance,
            start,
            end,
            state: EdgeState::Unsplit,
        });
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn add_pave(&mut self, edge: usize, parameter: f64, vertex: PointId) -> Result<(), PaveError> {
        let slot = self.edges.get_mut(&edge).ok_or(PaveError::UnknownEdge { edge })?;
        let pave = Pave { parameter, vertex };
        match &mut slot.state {
            EdgeState::Unsplit => slot.state = EdgeState::Splitting(vec![pave]),
            EdgeState::Splitting(paves) => paves.push(pave),
            EdgeState::Split(_) => return Err(PaveError::Frozen { edge }),
        }
        Ok(())
    }

    /// Freeze one edge. Freezing a split edge again returns its block.
    pub fn freeze(&mut self, edge: usize, merger: &VertexMerger) -> Result<&PaveBlock, PaveError> {
        let slot = self.edges.get_mut(&edge).ok_or(PaveError::UnknownEdge { edge })?;
        freeze_slot(slot, merger);
        match &slot.state {
            EdgeState::Split(block) => Ok(block),
            _ => Err(PaveError::UnknownEdge { edge }),
        }
    }

    /// Freeze every registered edge, one edge per worker.
    #[instrument(skip_all, fields(edges = self.edges.len()))]
    pub fn freeze_all(&mut self, merger: &VertexMerger, cancel: &CancelToken, parallel: bool) -> Result<(), BooleanError> {
        if parallel {
            self.edges.par_iter_mut().try_for_each(|(_, slot)| {
                cancel.check()?;
                freeze_slot(slot, merger);
                Ok(())
            })?;
        } else {
            for slot in self.edges.values_mut() {
                cancel.check()?;
                freeze_slot(slot, merger);
            }
        }
        let split = self.edges.values().filter(|s| s.pave_count() > 2).count();
        debug!(split, "pave blocks frozen");
        Ok(())
    }

    pub fn block(&self, edge: usize) -> Option<&PaveBlock> {
        match &self.edges.get(&edge)?.state {
            EdgeState::Split(block) => Some(block),
            _ => None,
        }
    }

    /// Frozen blocks in edge order.
    pub fn blocks(&self) -> impl Iterator<Item = (usize, &PaveBlock)> + '_ {
        self.edges.iter().filter_map(|(&e, slot)| match &slot.state {
            EdgeState::Split(block) => Some((e, block)),
            _ => None,
        })
    }

    pub fn is_frozen(&self, edge: usize) -> bool {
        self.block(edge).is_some()
    }

    /// Join the classes of every pave pair folded during freezing, then
    /// point all blocks at the resulting representatives. Returns the number
    /// of classes joined, or the edge whose fold could not be merged.
    #[instrument(skip_all)]
    pub fn unite_merged(&mut self, merger: &mut VertexMerger) -> Result<usize, (usize, MergeConflict)> {
        let mut joined = 0;
        for (&edge, slot) in &self.edges {
            let EdgeState::Split(block) = &slot.state else { continue };
            for &(kept, dropped) in &block.merged {
                if !merger.same_class(kept, dropped) {
                    merger.unite(kept, dropped).map_err(|c| (edge, c))?;
                    joined += 1;
                }
            }
        }
        if joined > 0 {
            for slot in self.edges.values_mut() {
                if let EdgeState::Split(block) = &mut slot.state {
                    for pave in &mut block.paves {
                        pave.vertex = merger.find(pave.vertex);
                    }
                    block.tolerance = block.paves.iter().map(|p| merger.tolerance(p.vertex)).fold(block.tolerance, f64::max);
                }
            }
        }
        debug!(joined, "folded paves merged");
        Ok(joined)
    }
}

impl EdgeSlot {
    fn pave_count(&self) -> usize {
        match &self.state {
            EdgeState::Unsplit => 2,
            EdgeState::Splitting(p) => p.len() + 2,
            EdgeState::Split(b) => b.paves.len(),
        }
    }
}

fn freeze_slot(slot: &mut EdgeSlot, merger: &VertexMerger) {
    let extra = match std::mem::replace(&mut slot.state, EdgeState::Unsplit) {
        EdgeState::Split(block) => {
            slot.state = EdgeState::Split(block);
            return;
        }
        EdgeState::Splitting(paves) => paves,
        EdgeState::Unsplit => Vec::new(),
    };
    let block = build_block(slot, extra, merger);
    slot.state = EdgeState::Split(block);
}

fn build_block(slot: &EdgeSlot, extra: Vec<Pave>, merger: &VertexMerger) -> PaveBlock {
    let length = slot.length;
    let tol = slot.tolerance;
    let start = Pave {
        parameter: 0.0,
        vertex: merger.find(slot.start),
    };
    let end = Pave {
        parameter: length,
        vertex: merger.find(slot.end),
    };

    let mut inner: Vec<Pave> = extra
        .into_iter()
        .filter(|p| p.parameter.is_finite())
        .map(|p| Pave {
            parameter: p.parameter.clamp(0.0, length),
            vertex: merger.find(p.vertex),
        })
        .collect();
    inner.sort_by(|a, b| a.parameter.total_cmp(&b.parameter).then(a.vertex.cmp(&b.vertex)));

    let mut merged = Vec::new();
    let mut record = |kept: PointId, dropped: PointId| {
        if kept != dropped && !merged.contains(&(kept, dropped)) {
            merged.push((kept, dropped));
        }
    };
    let mut paves = vec![start];
    for pave in inner {
        let last = paves.len() - 1;
        let prev = paves[last];
        let close = pave.parameter - prev.parameter < tol || pave.vertex == prev.vertex;
        if !close {
            paves.push(pave);
            continue;
        }
        // Endpoint paves win; otherwise keep the lower-ranked representative.
        if last > 0 && merger.origin(pave.vertex) < merger.origin(prev.vertex) {
            paves[last] = Pave {
                parameter: prev.parameter,
                vertex: pave.vertex,
            };
            record(pave.vertex, prev.vertex);
        } else {
            record(prev.vertex, pave.vertex);
        }
    }
    let last = paves.len() - 1;
    if last > 0 && (length - paves[last].parameter < tol || paves[last].vertex == end.vertex) {
        record(end.vertex, paves[last].vertex);
        paves[last] = end;
    } else {
        paves.push(end);
    }

    let tolerance = paves.iter().map(|p| merger.tolerance(p.vertex)).fold(tol, f64::max);
    PaveBlock { paves, tolerance, merged }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::boolean::merge::Origin;

    const TOL: f64 = 1e-7;

    fn setup() -> (VertexMerger, PaveBlockManager, PointId, PointId) {
        let mut merger = VertexMerger::new(1e-3);
        let a = merger.merge(Point3d::new(0.0, 0.0, 0.0), TOL, Origin::Input(0)).unwrap();
        let b = merger.merge(Point3d::new(4.0, 0.0, 0.0), TOL, Origin::Input(1)).unwrap();
        let mut paves = PaveBlockManager::new();
        paves.register_edge(2, 4.0, TOL, a, b);
        (merger, paves, a, b)
    }

    #[test]
    fn test_unsplit_edge_freezes_to_endpoints() {
        let (merger, mut paves, a, b) = setup();
        let block = paves.freeze(2, &merger).unwrap();
        assert_eq!(block.paves().len(), 2);
        assert_eq!(block.paves()[0].vertex, a);
        assert_eq!(block.paves()[1].vertex, b);
        assert_eq!(block.paves()[1].parameter, 4.0);
    }

    #[test]
    fn test_paves_sorted_on_freeze() {
        let (mut merger, mut paves, _, _) = setup();
        let p3 = merger.merge(Point3d::new(3.0, 0.0, 0.0), TOL, Origin::Computed(0)).unwrap();
        let p1 = merger.merge(Point3d::new(1.0, 0.0, 0.0), TOL, Origin::Computed(1)).unwrap();
        paves.add_pave(2, 3.0, p3).unwrap();
        paves.add_pave(2, 1.0, p1).unwrap();
        let block = paves.freeze(2, &merger).unwrap();
        let params: Vec<f64> = block.paves().iter().map(|p| p.parameter).collect();
        assert_eq!(params, vec![0.0, 1.0, 3.0, 4.0]);
        assert_eq!(block.ranges().count(), 3);
    }

    #[test]
    fn test_near_endpoint_pave_merges_into_endpoint() {
        let (mut merger, mut paves, a, b) = setup();
        let near_start = merger.merge(Point3d::new(0.5, 0.0, 0.0), TOL, Origin::Computed(0)).unwrap();
        let near_end = merger.merge(Point3d::new(3.5, 0.0, 0.0), TOL, Origin::Computed(1)).unwrap();
        paves.register_edge(7, 4.0, 1.0, a, b);
        paves.add_pave(7, 0.5, near_start).unwrap();
        paves.add_pave(7, 3.5, near_end).unwrap();
        let block = paves.freeze(7, &merger).unwrap();
        assert_eq!(block.paves().len(), 2);
        assert_eq!(block.paves()[0].vertex, a);
        assert_eq!(block.paves()[1].vertex, b);
    }

    #[test]
    fn test_duplicate_vertex_paves_collapse() {
        let (mut merger, mut paves, _, _) = setup();
        let p = merger.merge(Point3d::new(2.0, 0.0, 0.0), TOL, Origin::Computed(0)).unwrap();
        let q = merger.merge(Point3d::new(2.0, 0.0, 5e-8), TOL, Origin::Computed(1)).unwrap();
        assert!(merger.same_class(p, q));
        paves.add_pave(2, 2.0, q).unwrap();
        paves.add_pave(2, 2.0, p).unwrap();
        let block = paves.freeze(2, &merger).unwrap();
        assert_eq!(block.paves().len(), 3);
        assert_eq!(block.paves()[1].vertex, p);
        assert!(block.tolerance() >= merger.tolerance(p));
    }

    #[test]
    fn test_folded_pave_joins_the_kept_class() {
        let mut merger = VertexMerger::new(1e-2);
        let a = merger.merge(Point3d::new(0.0, 0.0, 0.0), TOL, Origin::Input(0)).unwrap();
        let b = merger.merge(Point3d::new(1.0, 0.0, 0.0), TOL, Origin::Input(1)).unwrap();
        let p = merger.merge(Point3d::new(0.5, 0.0, 0.0), TOL, Origin::Computed(0)).unwrap();
        let q = merger.merge(Point3d::new(0.5005, 0.0, 0.0), TOL, Origin::Computed(1)).unwrap();
        assert!(!merger.same_class(p, q));

        let mut paves = PaveBlockManager::new();
        paves.register_edge(0, 1.0, 1e-3, a, b);
        paves.add_pave(0, 0.5005, q).unwrap();
        paves.add_pave(0, 0.5, p).unwrap();
        let block = paves.freeze(0, &merger).unwrap();
        assert_eq!(block.paves().iter().map(|p| p.vertex).collect::<Vec<_>>(), vec![a, p, b]);
        assert_eq!(block.merged(), &[(p, q)]);

        assert_eq!(paves.unite_merged(&mut merger), Ok(1));
        assert!(merger.same_class(p, q));
        let block = paves.block(0).unwrap();
        assert_eq!(block.paves()[1].vertex, merger.find(q));
        assert!(block.tolerance() >= merger.tolerance(q));
        assert_eq!(paves.unite_merged(&mut merger), Ok(0));
    }

    #[test]
    fn test_fold_beyond_max_tolerance_is_reported() {
        let mut merger = VertexMerger::new(1e-3);
        let a = merger.merge(Point3d::new(0.0, 0.0, 0.0), TOL, Origin::Input(0)).unwrap();
        let b = merger.merge(Point3d::new(4.0, 0.0, 0.0), TOL, Origin::Input(1)).unwrap();
        let p = merger.merge(Point3d::new(2.0, 0.0, 0.0), TOL, Origin::Computed(0)).unwrap();
        let q = merger.merge(Point3d::new(2.4, 0.0, 0.0), TOL, Origin::Computed(1)).unwrap();
        let mut paves = PaveBlockManager::new();
        paves.register_edge(5, 4.0, 0.5, a, b);
        paves.add_pave(5, 2.0, p).unwrap();
        paves.add_pave(5, 2.4, q).unwrap();
        paves.freeze_all(&merger, &CancelToken::new(), false).unwrap();
        let (edge, conflict) = paves.unite_merged(&mut merger).unwrap_err();
        assert_eq!(edge, 5);
        assert!(conflict.required > conflict.max);
        assert!(!merger.same_class(p, q));
    }

    #[test]
    fn test_add_after_freeze_is_refused() {
        let (merger, mut paves, a, _) = setup();
        paves.freeze(2, &merger).unwrap();
        assert_eq!(paves.add_pave(2, 1.0, a), Err(PaveError::Frozen { edge: 2 }));
        assert_eq!(paves.add_pave(9, 1.0, a), Err(PaveError::UnknownEdge { edge: 9 }));
    }

    #[test]
    fn test_freeze_all_respects_cancel() {
        let (merger, mut paves, _, _) = setup();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(paves.freeze_all(&merger, &cancel, false), Err(BooleanError::Cancelled));
        assert!(!paves.is_frozen(2));
        let cancel = CancelToken::new();
        paves.freeze_all(&merger, &cancel, true).unwrap();
        assert!(paves.is_frozen(2));
        assert_eq!(paves.blocks().count(), 1);
    }
}
