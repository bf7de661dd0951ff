//! Scenario harness for the Boolean kernel.
//!
//! Runs whole operations on small models and checks the results with
//! independent oracles: signed volume, edge incidence and Euler
//! characteristic. Failures are collected as verdicts instead of panics so a
//! scenario reports everything wrong with a result in one pass.
//!
//! # Key Components
//!
//! - [`scenarios`]: Canned operand pairs with their expected volumes
//! - [`oracle`]: Verification functions returning pass/fail verdicts
//! - [`report`]: Text and JSON summaries of a result
//! - [`helpers`]: Volume and face-count helpers, analytic reference volumes
//! - [`assertions`]: Assertion helpers with diagnostics

pub mod assertions;
pub mod helpers;
pub mod oracle;
pub mod report;
pub mod scenarios;

pub use helpers::HarnessError;
pub use oracle::OracleVerdict;
pub use report::ResultReport;
pub use scenarios::{Scenario, ScenarioRun};
