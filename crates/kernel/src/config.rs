//! Configuration for the Boolean pipeline.
//!
//! Every stage receives the config explicitly; nothing is read from global
//! state. Both structs round-trip through serde so callers can keep them in
//! JSON next to their models.

use serde::{Deserialize, Serialize};

/// Tolerance thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    /// Fuzzy value added to every shape tolerance (model units).
    pub linear: f64,
    /// Sine of the largest angle still treated as parallel.
    pub angular: f64,
    /// Ceiling for any merged-vertex tolerance. A merge that would need more
    /// is a tolerance conflict.
    pub max_tolerance: f64,
    /// Two faces closer than this and parallel within `angular` lie on one
    /// plane; fragments inside such a pair classify ON rather than IN/OUT.
    pub on_distance: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            linear: 0.0,
            angular: 1e-9,
            max_tolerance: 1e-3,
            on_distance: 1e-7,
        }
    }
}

/// Configuration controlling one Boolean operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BooleanConfig {
    pub tolerance: ToleranceConfig,
    /// Maximum number of shapes in a BVH leaf.
    pub bvh_leaf_size: usize,
    /// Run detection, pave freezing, face splitting and classification on
    /// the rayon pool.
    pub parallel: bool,
    /// Candidate pairs handled between two cancellation checks.
    pub pair_batch_size: usize,
    /// Ray directions tried before a fragment is declared unclassified.
    pub max_ray_attempts: usize,
    /// Treat edges shared by more than two result faces as a hard failure.
    pub fatal_non_manifold: bool,
    /// Treat free edges in the result as a hard failure.
    pub fatal_open_shell: bool,
    /// Audit the constructed result and report findings as warnings.
    pub audit_result: bool,
}

impl Default for BooleanConfig {
    fn default() -> Self {
        Self {
            tolerance: ToleranceConfig::default(),
            bvh_leaf_size: 4,
            parallel: true,
            pair_batch_size: 256,
            max_ray_attempts: 8,
            fatal_non_manifold: false,
            fatal_open_shell: false,
            audit_result: true,
        }
    }
}

impl BooleanConfig {
    /// Invalid results are failures, not warnings.
    pub fn strict() -> Self {
        Self {
            fatal_non_manifold: true,
            fatal_open_shell: true,
            ..Self::default()
        }
    }

    /// Looser tolerances for imported or approximated geometry.
    pub fn relaxed() -> Self {
        Self {
            tolerance: ToleranceConfig {
                linear: 1e-6,
                max_tolerance: 1e-2,
                on_distance: 1e-5,
                ..ToleranceConfig::default()
            },
            max_ray_attempts: 16,
            ..Self::default()
        }
    }

    /// Single-threaded run; useful for reproducing issues under a debugger.
    pub fn serial() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg = BooleanConfig::from_json(r#"{ "parallel": false, "tolerance": { "max_tolerance": 0.5 } }"#).unwrap();
        assert!(!cfg.parallel);
        assert_eq!(cfg.tolerance.max_tolerance, 0.5);
        assert_eq!(cfg.tolerance.angular, ToleranceConfig::default().angular);
        assert_eq!(cfg.max_ray_attempts, 8);
    }

    #[test]
    fn test_presets_roundtrip() {
        for cfg in [BooleanConfig::strict(), BooleanConfig::relaxed(), BooleanConfig::serial()] {
            let back = BooleanConfig::from_json(&cfg.to_json().unwrap()).unwrap();
            assert_eq!(back, cfg);
        }
    }
}
