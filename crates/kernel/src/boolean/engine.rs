//! Operation entry points: run the pipeline for one pair of operands and
//! package the outcome with its warnings and face history.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::build::{build_result, BuildOutput, FaceHistory, ResultShape};
use super::classify::{select, Classifier};
use super::error::{BooleanError, CancelToken, WarningLog};
use super::filler::fill;
use super::index::ShapeIndexMap;
use super::split::{build_fragments, Fragment};
use crate::config::BooleanConfig;
use crate::geometry::oracle::{GeometryOracle, PlanarOracle};
use crate::topology::brep::{EntityStore, SolidId};

/// Boolean operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolOp {
    Union,
    Intersection,
    /// A minus B.
    Difference,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Shape(ResultShape),
    /// The operation succeeded and nothing is left.
    Empty,
    Failed(BooleanError),
}

#[derive(Debug, Clone)]
pub struct BooleanResult {
    pub outcome: Outcome,
    pub warnings: WarningLog,
    pub history: FaceHistory,
}

impl BooleanResult {
    fn failed(error: BooleanError, warnings: WarningLog) -> Self {
        Self {
            outcome: Outcome::Failed(error),
            warnings,
            history: FaceHistory::default(),
        }
    }

    pub fn shape(&self) -> Option<&ResultShape> {
        match &self.outcome {
            Outcome::Shape(shape) => Some(shape),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outcome == Outcome::Empty
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }

    /// `Ok(None)` for an empty result.
    pub fn into_result(self) -> Result<Option<ResultShape>, BooleanError> {
        match self.outcome {
            Outcome::Shape(shape) => Ok(Some(shape)),
            Outcome::Empty => Ok(None),
            Outcome::Failed(error) => Err(error),
        }
    }
}

/// Combine two solids with the planar oracle and no cancellation.
pub fn perform(store: &mut EntityStore, a: SolidId, b: SolidId, op: BoolOp, config: &BooleanConfig) -> BooleanResult {
    perform_with(store, &[a], &[b], op, config, &PlanarOracle, &CancelToken::new())
}

/// Combine two operands, each a set of solids treated as one shape.
///
/// The input solids are only read; the result is appended to `store`.
#[instrument(skip_all, fields(op = ?op, a = a.len(), b = b.len()))]
pub fn perform_with(
    store: &mut EntityStore,
    a: &[SolidId],
    b: &[SolidId],
    op: BoolOp,
    config: &BooleanConfig,
    oracle: &dyn GeometryOracle,
    cancel: &CancelToken,
) -> BooleanResult {
    let mut warnings = WarningLog::new();
    match run(store, a, b, op, config, oracle, cancel, &mut warnings) {
        Ok(BuildOutput { shape: Some(shape), history }) => {
            info!(solids = shape.solids().len(), warnings = warnings.len(), "boolean succeeded");
            BooleanResult {
                outcome: Outcome::Shape(shape),
                warnings,
                history,
            }
        }
        Ok(BuildOutput { shape: None, history }) => {
            info!(warnings = warnings.len(), "boolean result is empty");
            BooleanResult {
                outcome: Outcome::Empty,
                warnings,
                history,
            }
        }
        Err(error) => {
            info!(%error, warnings = warnings.len(), "boolean failed");
            BooleanResult::failed(error, warnings)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    store: &mut EntityStore,
    a: &[SolidId],
    b: &[SolidId],
    op: BoolOp,
    config: &BooleanConfig,
    oracle: &dyn GeometryOracle,
    cancel: &CancelToken,
    warnings: &mut WarningLog,
) -> Result<BuildOutput, BooleanError> {
    cancel.check()?;
    let index = ShapeIndexMap::build(store, a, b, config, warnings)?;
    let filled = fill(&index, oracle, config, cancel, warnings)?;
    let fragments = build_fragments(&index, &filled, config, cancel, warnings)?;
    cancel.check()?;

    let verdicts = Classifier::new(&index, &filled, config).classify_all(&fragments)?;
    let selected: Vec<(&Fragment, bool)> = fragments
        .iter()
        .zip(verdicts)
        .filter_map(|(fragment, verdict)| select(op, fragment.operand, verdict).map(|reversed| (fragment, reversed)))
        .collect();
    cancel.check()?;
    build_result(store, &index, &filled, &selected, config, warnings)
}

/// Union of any number of solids, folded left to right. Intermediate
/// compounds are carried forward as a single operand.
#[instrument(skip_all, fields(solids = solids.len()))]
pub fn fuse_all(store: &mut EntityStore, solids: &[SolidId], config: &BooleanConfig) -> BooleanResult {
    let Some((&first, rest)) = solids.split_first() else {
        return BooleanResult::failed(
            BooleanError::InvalidInput {
                reason: "nothing to fuse".into(),
            },
            WarningLog::new(),
        );
    };
    let mut warnings = WarningLog::new();
    let mut acc = vec![first];
    let cancel = CancelToken::new();
    for &next in rest {
        let step = perform_with(store, &acc, &[next], BoolOp::Union, config, &PlanarOracle, &cancel);
        warnings.extend(step.warnings);
        match step.outcome {
            Outcome::Shape(shape) => acc = shape.solids(),
            Outcome::Empty => acc = vec![next],
            Outcome::Failed(error) => return BooleanResult::failed(error, warnings),
        }
    }
    let shape = if acc.len() == 1 {
        ResultShape::Solid(acc[0])
    } else {
        ResultShape::Compound(acc)
    };
    BooleanResult {
        outcome: Outcome::Shape(shape),
        warnings,
        history: FaceHistory::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::error::WarningCode;
    use crate::boolean::index::Operand;
    use crate::geometry::curves::Segment;
    use crate::geometry::oracle::{OracleError, PlanePlane, SegmentPlane, SegmentSegment};
    use crate::geometry::surfaces::Plane;
    use crate::topology::primitives::make_box;
    use crate::topology::properties::solid_volume;
    use approx::assert_relative_eq;

    fn volume(store: &EntityStore, result: &BooleanResult) -> f64 {
        result
            .shape()
            .map(|s| s.solids().iter().map(|&id| solid_volume(store, id)).sum())
            .unwrap_or(0.0)
    }

    #[test]
    fn test_boolean_union_overlapping_boxes() {
        let mut store = EntityStore::new();
        let a = make_box(&mut store, 0.0, 0.0, 0.0, 2.0, 2.0, 2.0);
        let b = make_box(&mut store, 1.0, 1.0, 1.0, 3.0, 3.0, 3.0);
        let result = perform(&mut store, a, b, BoolOp::Union, &BooleanConfig::default());
        assert!(matches!(result.shape(), Some(ResultShape::Solid(_))), "{:?}", result.outcome);
        assert_relative_eq!(volume(&store, &result), 15.0, epsilon = 1e-9);
    }

    #[test]
    fn test_boolean_intersection_overlapping_boxes() {
        let mut store = EntityStore::new();
        let a = make_box(&mut store, 0.0, 0.0, 0.0, 2.0, 2.0, 2.0);
        let b = make_box(&mut store, 1.0, 1.0, 1.0, 3.0, 3.0, 3.0);
        let result = perform(&mut store, a, b, BoolOp::Intersection, &BooleanConfig::default());
        assert_relative_eq!(volume(&store, &result), 1.0, epsilon = 1e-9);
        assert_eq!(store.solid_faces(result.shape().unwrap().solids()[0]).len(), 6);
    }

    #[test]
    fn test_boolean_difference_overlapping_boxes() {
        let mut store = EntityStore::new();
        let a = make_box(&mut store, 0.0, 0.0, 0.0, 2.0, 2.0, 2.0);
        let b = make_box(&mut store, 1.0, 1.0, 1.0, 3.0, 3.0, 3.0);
        let result = perform(&mut store, a, b, BoolOp::Difference, &BooleanConfig::default());
        assert_relative_eq!(volume(&store, &result), 7.0, epsilon = 1e-9);
    }

    #[test]
    fn test_boolean_union_non_overlapping() {
        let mut store = EntityStore::new();
        let a = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0);
        let b = make_box(&mut store, 5.0, 5.0, 5.0, 6.0, 6.0, 6.0);
        let result = perform(&mut store, a, b, BoolOp::Union, &BooleanConfig::default());
        match result.shape() {
            Some(ResultShape::Compound(solids)) => assert_eq!(solids.len(), 2),
            other => panic!("expected compound, got {other:?}"),
        }
        assert_relative_eq!(volume(&store, &result), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_boolean_intersection_no_overlap_is_empty() {
        let mut store = EntityStore::new();
        let a = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0);
        let b = make_box(&mut store, 5.0, 5.0, 5.0, 6.0, 6.0, 6.0);
        let result = perform(&mut store, a, b, BoolOp::Intersection, &BooleanConfig::default());
        assert!(result.is_empty());
        assert_eq!(result.into_result(), Ok(None));
    }

    #[test]
    fn test_difference_with_itself_is_empty() {
        let mut store = EntityStore::new();
        let a = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0);
        let result = perform(&mut store, a, a, BoolOp::Difference, &BooleanConfig::default());
        assert!(result.is_empty(), "{:?}", result.outcome);
    }

    #[test]
    fn test_missing_solid_fails() {
        let mut store = EntityStore::new();
        let a = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0);
        let result = perform_with(
            &mut store,
            &[a],
            &[],
            BoolOp::Union,
            &BooleanConfig::default(),
            &PlanarOracle,
            &CancelToken::new(),
        );
        assert!(matches!(result.outcome, Outcome::Failed(BooleanError::InvalidInput { .. })));
    }

    #[test]
    fn test_cancelled_before_start() {
        let mut store = EntityStore::new();
        let a = make_box(&mut store, 0.0, 0.0, 0.0, 2.0, 2.0, 2.0);
        let b = make_box(&mut store, 1.0, 1.0, 1.0, 3.0, 3.0, 3.0);
        let solids_before = store.solids.len();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = perform_with(&mut store, &[a], &[b], BoolOp::Union, &BooleanConfig::default(), &PlanarOracle, &cancel);
        assert_eq!(result.outcome, Outcome::Failed(BooleanError::Cancelled));
        assert_eq!(store.solids.len(), solids_before);
    }

    /// Edge/edge queries are refused as degenerate, edge/plane queries never
    /// converge.
    struct Unsettled;

    impl GeometryOracle for Unsettled {
        fn segment_segment(&self, _: &Segment, _: &Segment, _: f64) -> Result<SegmentSegment, OracleError> {
            Err(OracleError::Degenerate {
                query: "segment/segment",
                reason: "refused".into(),
            })
        }

        fn segment_plane(&self, _: &Segment, _: &Plane, _: f64) -> Result<SegmentPlane, OracleError> {
            Err(OracleError::NoConvergence {
                query: "segment/plane",
                residual: 1.0,
            })
        }

        fn plane_plane(&self, p: &Plane, q: &Plane, tol: f64, angular: f64) -> Result<PlanePlane, OracleError> {
            PlanarOracle.plane_plane(p, q, tol, angular)
        }
    }

    #[test]
    fn test_unresolved_intersection_fails_and_keeps_warnings() {
        let mut store = EntityStore::new();
        let a = make_box(&mut store, 0.0, 0.0, 0.0, 2.0, 2.0, 2.0);
        let b = make_box(&mut store, 1.0, 1.0, 1.0, 3.0, 3.0, 3.0);
        let solids_before = store.solids.len();
        let result = perform_with(&mut store, &[a], &[b], BoolOp::Union, &BooleanConfig::default(), &Unsettled, &CancelToken::new());
        match &result.outcome {
            Outcome::Failed(BooleanError::UnresolvedIntersection { reason, .. }) => {
                assert!(reason.contains("segment/plane"), "{reason}");
            }
            other => panic!("expected an unresolved intersection, got {other:?}"),
        }
        assert!(result.warnings.count(WarningCode::GeometricDegeneracy) > 0);
        assert!(result.history.is_empty());
        assert_eq!(store.solids.len(), solids_before);
    }

    #[test]
    fn test_edge_ending_at_tolerance_from_a_face_resolves() {
        let mut store = EntityStore::new();
        let a = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0);
        let b = make_box(&mut store, 0.5 + 2e-7, 0.5, 2e-7, 1.5, 1.5, 1.0 - 2e-7);
        for op in [BoolOp::Union, BoolOp::Intersection, BoolOp::Difference] {
            let result = perform(&mut store, a, b, op, &BooleanConfig::default());
            assert!(
                !matches!(result.outcome, Outcome::Failed(BooleanError::UnresolvedIntersection { .. })),
                "{op:?}: {:?}",
                result.outcome
            );
        }
    }

    #[test]
    fn test_strict_config_rejects_edge_touching_union() {
        let mut store = EntityStore::new();
        let a = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0);
        let b = make_box(&mut store, 1.0, 1.0, 0.0, 2.0, 2.0, 1.0);

        let lenient = perform(&mut store, a, b, BoolOp::Union, &BooleanConfig::default());
        assert!(lenient.warnings.contains(WarningCode::NonManifold), "{:?}", lenient.warnings);

        let strict = perform(&mut store, a, b, BoolOp::Union, &BooleanConfig::strict());
        assert!(
            matches!(strict.outcome, Outcome::Failed(BooleanError::NonManifoldResult { edges }) if edges >= 1),
            "{:?}",
            strict.outcome
        );
    }

    #[test]
    fn test_strict_config_rejects_open_result() {
        let mut store = EntityStore::new();
        let a = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0);
        let b = make_box(&mut store, 5.0, 0.0, 0.0, 6.0, 1.0, 1.0);
        let lid = store.solid_faces(a)[0];
        let shell = store.faces[lid].shell;
        store.shells[shell].faces.retain(|&f| f != lid);

        let lenient = perform(&mut store, a, b, BoolOp::Union, &BooleanConfig::default());
        assert!(lenient.warnings.contains(WarningCode::OpenShell), "{:?}", lenient.warnings);

        let strict = perform(&mut store, a, b, BoolOp::Union, &BooleanConfig::strict());
        assert_eq!(strict.outcome, Outcome::Failed(BooleanError::OpenShellResult { edges: 4 }));
    }

    #[test]
    fn test_history_tracks_split_faces() {
        let mut store = EntityStore::new();
        let a = make_box(&mut store, 0.0, 0.0, 0.0, 2.0, 2.0, 2.0);
        let b = make_box(&mut store, 1.0, 1.0, 1.0, 3.0, 3.0, 3.0);
        let faces_a = store.solid_faces(a);
        let result = perform(&mut store, a, b, BoolOp::Union, &BooleanConfig::default());
        assert!(result.shape().is_some());
        let survived = faces_a.iter().filter(|&&f| !result.history.is_deleted(Operand::A, f)).count();
        assert_eq!(survived, 6);
    }

    #[test]
    fn test_fuse_all_three_boxes() {
        let mut store = EntityStore::new();
        let boxes = [
            make_box(&mut store, 0.0, 0.0, 0.0, 2.0, 2.0, 2.0),
            make_box(&mut store, 1.0, 1.0, 1.0, 3.0, 3.0, 3.0),
            make_box(&mut store, 10.0, 0.0, 0.0, 11.0, 1.0, 1.0),
        ];
        let result = fuse_all(&mut store, &boxes, &BooleanConfig::default());
        assert_relative_eq!(volume(&store, &result), 16.0, epsilon = 1e-9);
        assert!(fuse_all(&mut store, &[], &BooleanConfig::default()).is_failed());
    }
}
