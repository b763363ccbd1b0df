//! stackcheck core: Model, Analyzer Trait, Reporter and Runner
//!
//! Immutable build/topology model, the single analyzer contract, and the
//! deterministic merge of analyzer output into an ordered report.

pub mod analyzer;
pub mod diagnostic;
pub mod error;
pub mod model;
pub mod report;
pub mod runner;

pub use analyzer::{AnalysisInput, Analyzer};
pub use diagnostic::{Diagnostic, RuleId, Severity};
pub use error::{AnalysisError, MalformedInputError, RefKind};
pub use model::{
    BuildModel, BuildStep, EnvSource, MountKind, PortBinding, ServiceSpec, StepKind, Topology,
    VolumeBinding, DEFAULT_NETWORK, IMPLICIT_ROOT,
};
pub use report::{Report, Reporter, SeverityCounts};
pub use runner::AnalysisRunner;

/// Engine version
pub const STACKCHECK_VERSION: &str = "1.0.0";
