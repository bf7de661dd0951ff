//! Post-build checks on solids: closed loops, twin links, edge incidence,
//! vertices on their face planes, and per-shell Euler characteristic.

pub mod audit;
pub mod spatial;

pub use audit::{audit_solid, AuditIssue, AuditReport, ShellStats};
