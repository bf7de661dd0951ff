//! Helpers shared by oracles, assertions and scenarios.

use std::f64::consts::PI;

use boolean_kernel::topology::brep::EntityStore;
use boolean_kernel::topology::properties::solid_volume;
use boolean_kernel::{BooleanError, BooleanResult, Outcome, ResultShape};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("[{context}] expected a shape, got {outcome}")]
    NoShape { context: String, outcome: String },

    #[error("assertion failed: {detail}")]
    AssertionFailed { detail: String },

    #[error("boolean failed: {0}")]
    Boolean(#[from] BooleanError),

    #[error("report serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Short label for an outcome, used in diagnostics.
pub fn outcome_label(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Shape(ResultShape::Solid(_)) => "solid".to_string(),
        Outcome::Shape(ResultShape::Compound(s)) => format!("compound of {}", s.len()),
        Outcome::Empty => "empty".to_string(),
        Outcome::Failed(e) => format!("failure ({e})"),
    }
}

/// The result shape, or a diagnostic error naming what came back instead.
pub fn require_shape<'r>(result: &'r BooleanResult, context: &str) -> Result<&'r ResultShape, HarnessError> {
    result.shape().ok_or_else(|| HarnessError::NoShape {
        context: context.to_string(),
        outcome: outcome_label(&result.outcome),
    })
}

/// Net volume of a shape: outer shells minus voids, summed over solids.
pub fn shape_volume(store: &EntityStore, shape: &ResultShape) -> f64 {
    shape.solids().iter().map(|&s| solid_volume(store, s)).sum()
}

pub fn shape_face_count(store: &EntityStore, shape: &ResultShape) -> usize {
    shape.solids().iter().map(|&s| store.solid_faces(s).len()).sum()
}

/// Volume of the lens shared by two spheres of radius `r` whose centres are
/// `d` apart.
pub fn lens_volume(r: f64, d: f64) -> f64 {
    if d >= 2.0 * r {
        return 0.0;
    }
    PI * (4.0 * r + d) * (2.0 * r - d).powi(2) / 12.0
}

/// Volume of a regular `n`-gon prism inscribed in a cylinder.
pub fn faceted_cylinder_volume(radius: f64, height: f64, n: usize) -> f64 {
    let area = 0.5 * n as f64 * radius * radius * (2.0 * PI / n as f64).sin();
    area * height
}

/// Volume of the faceted UV sphere built by `make_sphere`: pole fans plus
/// planar bands, each a cone from the centre over its facets.
pub fn faceted_sphere_volume(radius: f64, meridians: usize, parallels: usize) -> f64 {
    let dtheta = 2.0 * PI / meridians as f64;
    let ring = |j: usize| {
        let phi = PI * j as f64 / parallels as f64;
        (radius * phi.sin(), radius * phi.cos())
    };
    // Each band between parallels j and j+1 is a frustum of an m-gon.
    let polygon = |rho: f64| 0.5 * meridians as f64 * rho * rho * dtheta.sin();
    (0..parallels)
        .map(|j| {
            let (r0, z0) = ring(j);
            let (r1, z1) = ring(j + 1);
            let (a0, a1) = (polygon(r0), polygon(r1));
            (z0 - z1) * (a0 + a1 + (a0 * a1).sqrt()) / 3.0
        })
        .sum()
}
