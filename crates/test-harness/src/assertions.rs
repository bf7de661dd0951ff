//! Assertion helpers with diagnostic output.
//!
//! Every failure names the context, the expected and actual values, and the
//! warnings the operation produced.

use boolean_kernel::topology::brep::EntityStore;
use boolean_kernel::{BooleanResult, Outcome};

use crate::helpers::{outcome_label, require_shape, shape_face_count, HarnessError};
use crate::oracle::{check_shape, check_volume, failures};

fn warnings_summary(result: &BooleanResult) -> String {
    if result.warnings.is_empty() {
        return "no warnings".to_string();
    }
    let items: Vec<String> = result
        .warnings
        .iter()
        .take(5)
        .map(|w| format!("{:?}: {}", w.code, w.message))
        .collect();
    format!("{} warning(s): {}", result.warnings.len(), items.join("; "))
}

/// Assert the net volume of the result within a relative tolerance.
pub fn assert_volume(
    store: &EntityStore,
    result: &BooleanResult,
    expected: f64,
    rel_tol: f64,
    ctx: &str,
) -> Result<(), HarnessError> {
    let shape = require_shape(result, ctx)?;
    let verdict = check_volume(store, shape, expected, rel_tol);
    if verdict.passed {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed {
            detail: format!("[{}] {} ({})", ctx, verdict.detail, warnings_summary(result)),
        })
    }
}

/// Assert the total face count over all result solids.
pub fn assert_face_count(
    store: &EntityStore,
    result: &BooleanResult,
    expected: usize,
    ctx: &str,
) -> Result<(), HarnessError> {
    let shape = require_shape(result, ctx)?;
    let actual = shape_face_count(store, shape);
    if actual == expected {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed {
            detail: format!("[{}] expected {} faces, got {}", ctx, expected, actual),
        })
    }
}

/// Assert that the result is closed, manifold and passes the audit.
pub fn assert_valid_solid(store: &EntityStore, result: &BooleanResult, ctx: &str) -> Result<(), HarnessError> {
    let shape = require_shape(result, ctx)?;
    let failed = failures(&check_shape(store, shape));
    if failed.is_empty() {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed {
            detail: format!("[{}] {} ({})", ctx, failed.join("; "), warnings_summary(result)),
        })
    }
}

/// Assert that the operation succeeded with nothing left.
pub fn assert_empty(result: &BooleanResult, ctx: &str) -> Result<(), HarnessError> {
    if result.outcome == Outcome::Empty {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed {
            detail: format!("[{}] expected an empty result, got {}", ctx, outcome_label(&result.outcome)),
        })
    }
}

/// Assert the number of disconnected solids in the result.
pub fn assert_solid_count(result: &BooleanResult, expected: usize, ctx: &str) -> Result<(), HarnessError> {
    let actual = require_shape(result, ctx)?.solids().len();
    if actual == expected {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed {
            detail: format!("[{}] expected {} solid(s), got {}", ctx, expected, actual),
        })
    }
}
