//! Structured summaries of a Boolean result.
//!
//! `to_text` is for reading in test output; `to_json` is for keeping next to
//! a failing model.

use std::collections::HashSet;

use boolean_kernel::topology::brep::{EntityStore, SolidId};
use boolean_kernel::topology::properties::solid_volume;
use boolean_kernel::BooleanResult;
use serde::Serialize;

use crate::helpers::{outcome_label, HarnessError};
use crate::oracle::{check_shape, OracleVerdict};

#[derive(Debug, Clone, Serialize)]
pub struct SolidSummary {
    pub shells: usize,
    pub vertices: usize,
    pub edges: usize,
    pub faces: usize,
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerdictEntry {
    pub oracle: String,
    pub passed: bool,
    pub detail: String,
}

impl From<&OracleVerdict> for VerdictEntry {
    fn from(v: &OracleVerdict) -> Self {
        Self {
            oracle: v.oracle_name.clone(),
            passed: v.passed,
            detail: v.detail.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultReport {
    pub name: String,
    pub outcome: String,
    pub solids: Vec<SolidSummary>,
    pub warnings: Vec<String>,
    pub oracle_results: Vec<VerdictEntry>,
}

fn summarize(store: &EntityStore, solid: SolidId) -> SolidSummary {
    let mut vertices = HashSet::new();
    let mut edges = HashSet::new();
    let faces = store.solid_faces(solid);
    for &face in &faces {
        for loop_id in store.face_loops(face) {
            for &he in &store.loops[loop_id].half_edges {
                let he = &store.half_edges[he];
                edges.insert(he.edge);
                vertices.insert(he.start_vertex);
            }
        }
    }
    SolidSummary {
        shells: store.solids[solid].shells.len(),
        vertices: vertices.len(),
        edges: edges.len(),
        faces: faces.len(),
        volume: solid_volume(store, solid),
    }
}

impl ResultReport {
    pub fn new(name: &str, store: &EntityStore, result: &BooleanResult) -> Self {
        let (solids, oracle_results) = match result.shape() {
            Some(shape) => (
                shape.solids().iter().map(|&s| summarize(store, s)).collect(),
                check_shape(store, shape).iter().map(VerdictEntry::from).collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        Self {
            name: name.to_string(),
            outcome: outcome_label(&result.outcome),
            solids,
            warnings: result
                .warnings
                .iter()
                .map(|w| format!("{:?}: {}", w.code, w.message))
                .collect(),
            oracle_results,
        }
    }

    pub fn passed(&self) -> bool {
        self.oracle_results.iter().all(|v| v.passed)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("=== Boolean Report: {} ===\n\n", self.name));
        out.push_str(&format!("Outcome: {}\n", self.outcome));

        out.push_str(&format!("Solids ({}):\n", self.solids.len()));
        for (i, s) in self.solids.iter().enumerate() {
            out.push_str(&format!(
                "  [{}] shells={} V={} E={} F={} volume={:.6}\n",
                i, s.shells, s.vertices, s.edges, s.faces, s.volume,
            ));
        }

        if self.warnings.is_empty() {
            out.push_str("Warnings: none\n");
        } else {
            out.push_str(&format!("Warnings ({}):\n", self.warnings.len()));
            for w in &self.warnings {
                out.push_str(&format!("  {}\n", w));
            }
        }

        if !self.oracle_results.is_empty() {
            out.push_str("Oracles:\n");
            for v in &self.oracle_results {
                let status = if v.passed { "PASS" } else { "FAIL" };
                out.push_str(&format!("  [{}] {}: {}\n", status, v.oracle, v.detail));
            }
        }
        out
    }

    pub fn to_json(&self) -> Result<String, HarnessError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
