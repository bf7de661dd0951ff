//! Boolean operations on polyhedral solids.
//!
//! The pipeline runs in stages, each in its own module:
//! [`index`] numbers the operand shapes, [`interfere`] finds every pair of
//! shapes that touch (candidates from [`bvh`]), [`filler`] merges the
//! intersection points ([`merge`]), splits edges into pave blocks
//! ([`paves`]) and records section edges, [`split`] cuts faces into
//! fragments, [`classify`] decides where each fragment lies relative to
//! the other operand, and [`build`] assembles the kept fragments into
//! solids.

pub mod build;
pub mod bvh;
pub mod classify;
pub mod engine;
pub mod error;
pub mod filler;
pub mod index;
pub mod interfere;
pub mod merge;
pub mod paves;
pub mod split;

pub use build::{FaceHistory, ResultShape};
pub use engine::{fuse_all, perform, perform_with, BoolOp, BooleanResult, Outcome};
pub use error::{BooleanError, CancelToken, Warning, WarningCode, WarningLog};
pub use index::Operand;

use crate::config::BooleanConfig;
use crate::geometry::oracle::PlanarOracle;
use crate::topology::brep::{EntityStore, SolidId};

/// Trait for Boolean operations on B-Rep solids.
///
/// Implement this trait to provide alternative Boolean backends or mock
/// implementations.
pub trait BooleanEngine {
    /// Compute the union of two solids.
    fn union(&self, store: &mut EntityStore, a: SolidId, b: SolidId) -> BooleanResult;

    /// Subtract solid `b` from solid `a`.
    fn subtract(&self, store: &mut EntityStore, a: SolidId, b: SolidId) -> BooleanResult;

    /// Compute the intersection of two solids.
    fn intersect(&self, store: &mut EntityStore, a: SolidId, b: SolidId) -> BooleanResult;
}

/// Planar-oracle engine with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct DefaultBooleanEngine {
    pub config: BooleanConfig,
    pub cancel: CancelToken,
}

impl DefaultBooleanEngine {
    pub fn new(config: BooleanConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    fn run(&self, store: &mut EntityStore, a: SolidId, b: SolidId, op: BoolOp) -> BooleanResult {
        perform_with(store, &[a], &[b], op, &self.config, &PlanarOracle, &self.cancel)
    }
}

impl BooleanEngine for DefaultBooleanEngine {
    fn union(&self, store: &mut EntityStore, a: SolidId, b: SolidId) -> BooleanResult {
        self.run(store, a, b, BoolOp::Union)
    }

    fn subtract(&self, store: &mut EntityStore, a: SolidId, b: SolidId) -> BooleanResult {
        self.run(store, a, b, BoolOp::Difference)
    }

    fn intersect(&self, store: &mut EntityStore, a: SolidId, b: SolidId) -> BooleanResult {
        self.run(store, a, b, BoolOp::Intersection)
    }
}
