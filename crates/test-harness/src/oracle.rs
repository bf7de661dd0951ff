//! Verification oracles: pure functions returning pass/fail verdicts.
//!
//! Each oracle returns an `OracleVerdict` with diagnostic detail, not panics.
//! This lets a scenario collect all failures in one pass.

use boolean_kernel::topology::brep::{EntityStore, SolidId};
use boolean_kernel::validation::spatial::{edge_face_map, free_edges, non_manifold_edges};
use boolean_kernel::validation::audit_solid;
use boolean_kernel::{BooleanResult, ResultShape, WarningCode};

use crate::helpers::shape_volume;

/// The result of a single oracle check.
#[derive(Debug, Clone)]
pub struct OracleVerdict {
    pub oracle_name: String,
    pub passed: bool,
    pub detail: String,
    pub value: Option<f64>,
}

impl OracleVerdict {
    fn pass(name: &str, detail: String) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: true,
            detail,
            value: None,
        }
    }

    fn pass_val(name: &str, detail: String, value: f64) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: true,
            detail,
            value: Some(value),
        }
    }

    fn fail(name: &str, detail: String) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: false,
            detail,
            value: None,
        }
    }

    fn fail_val(name: &str, detail: String, value: f64) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: false,
            detail,
            value: Some(value),
        }
    }
}

// ── Topology Oracles ────────────────────────────────────────────────────────

/// Check V - E + F - H = 2(1 - genus) for every shell of the solid.
pub fn check_euler_characteristic(store: &EntityStore, solid: SolidId, genus: i64) -> OracleVerdict {
    let report = audit_solid(store, solid);
    let expected = 2 * (1 - genus);
    let wrong: Vec<i64> = report.shells.iter().map(|s| s.euler).filter(|&e| e != expected).collect();
    if wrong.is_empty() {
        OracleVerdict::pass_val(
            "euler_characteristic",
            format!("{} shell(s) with V-E+F-H = {}", report.shells.len(), expected),
            expected as f64,
        )
    } else {
        OracleVerdict::fail_val(
            "euler_characteristic",
            format!("shells with V-E+F-H = {:?} (expected {})", wrong, expected),
            wrong[0] as f64,
        )
    }
}

/// Check that every edge has exactly 2 adjacent faces.
pub fn check_manifold_edges(store: &EntityStore, solid: SolidId) -> OracleVerdict {
    let map = edge_face_map(store, solid);
    let free = free_edges(&map);
    let non_manifold = non_manifold_edges(&map);

    if free.is_empty() && non_manifold.is_empty() {
        OracleVerdict::pass(
            "manifold_edges",
            format!("all {} edges have exactly 2 faces", map.len()),
        )
    } else {
        OracleVerdict::fail(
            "manifold_edges",
            format!(
                "{} free and {} non-manifold edges out of {}",
                free.len(),
                non_manifold.len(),
                map.len()
            ),
        )
    }
}

/// Check the structural audit: closed loops, twin links, vertices on planes.
pub fn check_audit(store: &EntityStore, solid: SolidId) -> OracleVerdict {
    let report = audit_solid(store, solid);
    if report.is_valid() {
        OracleVerdict::pass("audit", format!("{} shell(s), no issues", report.shells.len()))
    } else {
        let findings: Vec<String> = report.findings().take(5).collect();
        OracleVerdict::fail(
            "audit",
            format!("{} issue(s), first: {:?}", report.issues.len(), findings),
        )
    }
}

// ── Measurement Oracles ─────────────────────────────────────────────────────

/// Check the net volume of a shape against an expected value.
pub fn check_volume(store: &EntityStore, shape: &ResultShape, expected: f64, rel_tol: f64) -> OracleVerdict {
    let actual = shape_volume(store, shape);
    let error = (actual - expected).abs() / expected.abs().max(f64::MIN_POSITIVE);
    if error <= rel_tol {
        OracleVerdict::pass_val(
            "volume",
            format!("volume {:.6} within {:.2}% of {:.6}", actual, rel_tol * 100.0, expected),
            actual,
        )
    } else {
        OracleVerdict::fail_val(
            "volume",
            format!(
                "volume {:.6} is {:.3}% off {:.6} (allowed {:.2}%)",
                actual,
                error * 100.0,
                expected,
                rel_tol * 100.0
            ),
            actual,
        )
    }
}

/// Check that every solid of the shape encloses positive volume.
pub fn check_positive_volume(store: &EntityStore, shape: &ResultShape) -> OracleVerdict {
    let volumes: Vec<f64> = shape
        .solids()
        .iter()
        .map(|&s| shape_volume(store, &ResultShape::Solid(s)))
        .collect();
    if volumes.iter().all(|&v| v > 0.0) {
        OracleVerdict::pass("positive_volume", format!("{} solid(s), volumes {:?}", volumes.len(), volumes))
    } else {
        OracleVerdict::fail("positive_volume", format!("non-positive volume among {:?}", volumes))
    }
}

// ── Outcome Oracles ─────────────────────────────────────────────────────────

/// Check that the result carries none of the given warning codes.
pub fn check_no_warnings(result: &BooleanResult, codes: &[WarningCode]) -> OracleVerdict {
    let hits: Vec<String> = result
        .warnings
        .iter()
        .filter(|w| codes.contains(&w.code))
        .map(|w| format!("{:?}: {}", w.code, w.message))
        .collect();
    if hits.is_empty() {
        OracleVerdict::pass("no_warnings", format!("{} warning(s), none of {:?}", result.warnings.len(), codes))
    } else {
        OracleVerdict::fail("no_warnings", format!("unexpected warnings: {:?}", hits))
    }
}

/// Run the structural oracles on every solid of a shape.
pub fn check_shape(store: &EntityStore, shape: &ResultShape) -> Vec<OracleVerdict> {
    let mut verdicts = vec![check_positive_volume(store, shape)];
    for solid in shape.solids() {
        verdicts.push(check_manifold_edges(store, solid));
        verdicts.push(check_audit(store, solid));
    }
    verdicts
}

/// Names and details of the failed verdicts.
pub fn failures(verdicts: &[OracleVerdict]) -> Vec<String> {
    verdicts
        .iter()
        .filter(|v| !v.passed)
        .map(|v| format!("{}: {}", v.oracle_name, v.detail))
        .collect()
}
