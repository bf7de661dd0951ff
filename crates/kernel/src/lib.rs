pub mod config;
pub mod geometry;
pub mod topology;
pub mod boolean;
pub mod validation;

// Re-export the operation surface at crate root for convenience.
pub use boolean::{
    fuse_all, perform, perform_with, BoolOp, BooleanEngine, BooleanError, BooleanResult, CancelToken,
    DefaultBooleanEngine, Outcome, ResultShape, WarningCode, WarningLog,
};
pub use config::{BooleanConfig, ToleranceConfig};
pub use validation::{audit_solid, AuditReport};
