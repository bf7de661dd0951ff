use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Structured failure information for Boolean operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BooleanError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("geometric degeneracy at {shape}: {reason}")]
    GeometricDegeneracy { shape: String, reason: String },

    #[error("tolerance conflict at {shape}: merge needs {required:.3e}, maximum is {max:.3e}")]
    ToleranceConflict { shape: String, required: f64, max: f64 },

    #[error("unresolved intersection between {first} and {second}: {reason}")]
    UnresolvedIntersection { first: String, second: String, reason: String },

    #[error("non-manifold result: {edges} edge(s) shared by more than two faces")]
    NonManifoldResult { edges: usize },

    #[error("open shell in result: {edges} edge(s) bound a single face")]
    OpenShellResult { edges: usize },

    #[error("fragment of {face} could not be classified after {attempts} ray(s)")]
    UnclassifiedFragment { face: String, attempts: usize },

    #[error("operation cancelled")]
    Cancelled,

    /// A pipeline invariant was broken; not caused by the operands.
    #[error("internal error in {stage}: {reason}")]
    Internal { stage: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningCode {
    GeometricDegeneracy,
    ToleranceConflict,
    SkippedFace,
    DanglingSection,
    NonManifold,
    OpenShell,
    InconsistentOrientation,
    InvertedShell,
    OrphanVoid,
    AuditFinding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
}

/// Non-fatal findings gathered during one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarningLog {
    entries: Vec<Warning>,
}

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, code: WarningCode, message: impl Into<String>) {
        let message = message.into();
        warn!(?code, %message, "boolean warning");
        self.entries.push(Warning { code, message });
    }

    pub fn extend(&mut self, other: WarningLog) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, code: WarningCode) -> bool {
        self.entries.iter().any(|w| w.code == code)
    }

    pub fn count(&self, code: WarningCode) -> usize {
        self.entries.iter().filter(|w| w.code == code).count()
    }
}

/// Cooperative cancellation flag, checked between pipeline batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<(), BooleanError> {
        if self.is_cancelled() {
            Err(BooleanError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_log_counts() {
        let mut log = WarningLog::new();
        log.push(WarningCode::OpenShell, "edge 3 is free");
        log.push(WarningCode::OpenShell, "edge 4 is free");
        log.push(WarningCode::NonManifold, "edge 9");
        assert_eq!(log.len(), 3);
        assert_eq!(log.count(WarningCode::OpenShell), 2);
        assert!(!log.contains(WarningCode::OrphanVoid));
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert_eq!(token.check(), Err(BooleanError::Cancelled));
    }

    #[test]
    fn test_error_messages() {
        let e = BooleanError::NonManifoldResult { edges: 2 };
        assert_eq!(e.to_string(), "non-manifold result: 2 edge(s) shared by more than two faces");
    }
}
