//! Canned operand pairs with known answers.
//!
//! Each scenario builds its operands in a fresh store, runs one operation
//! and returns everything a test needs to check the result.

use boolean_kernel::geometry::point::{Point3d, Vec3};
use boolean_kernel::topology::brep::{EntityStore, SolidId};
use boolean_kernel::topology::primitives::{make_box, make_cylinder, make_sphere};
use boolean_kernel::{perform, BoolOp, BooleanConfig, BooleanResult};
use tracing::info;

use crate::helpers::{faceted_cylinder_volume, lens_volume};

/// Operands and the expected answer.
pub struct Scenario {
    pub name: &'static str,
    pub store: EntityStore,
    pub a: SolidId,
    pub b: SolidId,
    pub op: BoolOp,
    /// Expected net volume and the relative tolerance on it; `None` when the
    /// result should be empty.
    pub expected_volume: Option<(f64, f64)>,
    /// Genus of every result solid.
    pub genus: i64,
}

pub struct ScenarioRun {
    pub name: &'static str,
    pub store: EntityStore,
    pub a: SolidId,
    pub b: SolidId,
    pub result: BooleanResult,
    pub expected_volume: Option<(f64, f64)>,
    pub genus: i64,
}

impl Scenario {
    pub fn run(self, config: &BooleanConfig) -> ScenarioRun {
        let Scenario {
            name,
            mut store,
            a,
            b,
            op,
            expected_volume,
            genus,
        } = self;
        let result = perform(&mut store, a, b, op, config);
        info!(name, ?op, warnings = result.warnings.len(), "scenario finished");
        ScenarioRun {
            name,
            store,
            a,
            b,
            result,
            expected_volume,
            genus,
        }
    }

    /// Same operands with A and B exchanged.
    pub fn swapped(self) -> Self {
        Self {
            a: self.b,
            b: self.a,
            ..self
        }
    }
}

/// Two unit cubes offset by half a unit along every axis.
pub fn offset_cubes(op: BoolOp) -> Scenario {
    let mut store = EntityStore::new();
    let a = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0);
    let b = make_box(&mut store, 0.5, 0.5, 0.5, 1.5, 1.5, 1.5);
    let volume = match op {
        BoolOp::Union => 1.875,
        BoolOp::Intersection => 0.125,
        BoolOp::Difference => 0.875,
    };
    Scenario {
        name: "offset_cubes",
        store,
        a,
        b,
        op,
        expected_volume: Some((volume, 1e-9)),
        genus: 0,
    }
}

/// Radius used by [`sphere_lens`] and the facet counts of its spheres.
pub const LENS_RADIUS: f64 = 1.0;
pub const LENS_DISTANCE: f64 = 0.5;
pub const LENS_MERIDIANS: usize = 48;
pub const LENS_PARALLELS: usize = 24;

/// Intersection of two faceted spheres whose centres are half a radius
/// apart along a skew direction, so no facets line up.
pub fn sphere_lens() -> Scenario {
    let mut store = EntityStore::new();
    let offset = Vec3::new(0.3, 0.2, 0.36).normalize() * LENS_DISTANCE;
    let a = make_sphere(&mut store, Point3d::origin(), LENS_RADIUS, LENS_MERIDIANS, LENS_PARALLELS);
    let b = make_sphere(&mut store, Point3d::origin() + offset, LENS_RADIUS, LENS_MERIDIANS, LENS_PARALLELS);
    Scenario {
        name: "sphere_lens",
        store,
        a,
        b,
        op: BoolOp::Intersection,
        expected_volume: Some((lens_volume(LENS_RADIUS, LENS_DISTANCE), 5e-2)),
        genus: 0,
    }
}

/// One solid used as both operands.
pub fn identical(op: BoolOp) -> Scenario {
    let mut store = EntityStore::new();
    let a = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0);
    Scenario {
        name: "identical",
        store,
        a,
        b: a,
        op,
        expected_volume: match op {
            BoolOp::Difference => None,
            _ => Some((1.0, 1e-9)),
        },
        genus: 0,
    }
}

/// A 2-unit box with a unit box floating inside it.
pub fn nested_boxes(op: BoolOp) -> Scenario {
    let mut store = EntityStore::new();
    let a = make_box(&mut store, 0.0, 0.0, 0.0, 2.0, 2.0, 2.0);
    let b = make_box(&mut store, 0.5, 0.5, 0.5, 1.5, 1.5, 1.5);
    let volume = match op {
        BoolOp::Union => 8.0,
        BoolOp::Intersection => 1.0,
        BoolOp::Difference => 7.0,
    };
    Scenario {
        name: "nested_boxes",
        store,
        a,
        b,
        op,
        expected_volume: Some((volume, 1e-9)),
        genus: 0,
    }
}

pub const DRILL_SEGMENTS: usize = 16;

/// A 16-sided cylinder passing all the way through a 2-unit box.
pub fn drilled_box() -> Scenario {
    let mut store = EntityStore::new();
    let a = make_box(&mut store, 0.0, 0.0, 0.0, 2.0, 2.0, 2.0);
    let b = make_cylinder(&mut store, Point3d::new(1.03, 0.98, -1.0), 0.5, 4.0, DRILL_SEGMENTS);
    let hole = faceted_cylinder_volume(0.5, 2.0, DRILL_SEGMENTS);
    Scenario {
        name: "drilled_box",
        store,
        a,
        b,
        op: BoolOp::Difference,
        expected_volume: Some((8.0 - hole, 1e-9)),
        genus: 1,
    }
}

/// Two unit cubes sharing the face x = 1.
pub fn face_touching(op: BoolOp) -> Scenario {
    let mut store = EntityStore::new();
    let a = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0);
    let b = make_box(&mut store, 1.0, 0.0, 0.0, 2.0, 1.0, 1.0);
    Scenario {
        name: "face_touching",
        store,
        a,
        b,
        op,
        expected_volume: match op {
            BoolOp::Union => Some((2.0, 1e-9)),
            BoolOp::Intersection => None,
            BoolOp::Difference => Some((1.0, 1e-9)),
        },
        genus: 0,
    }
}

/// A unit cube with a second one resting on its top face, shifted half a
/// unit in x and y and lifted by `gap`. Gaps up to the sum of the face
/// tolerances count as touching.
pub fn stacked_boxes(gap: f64, op: BoolOp) -> Scenario {
    let mut store = EntityStore::new();
    let a = make_box(&mut store, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0);
    let b = make_box(&mut store, 0.5, 0.5, 1.0 + gap, 1.5, 1.5, 2.0);
    let b_volume = 1.0 - gap;
    Scenario {
        name: "stacked_boxes",
        store,
        a,
        b,
        op,
        expected_volume: match op {
            BoolOp::Union => Some((1.0 + b_volume, 1e-6)),
            BoolOp::Intersection => None,
            BoolOp::Difference => Some((1.0, 1e-6)),
        },
        genus: 0,
    }
}
