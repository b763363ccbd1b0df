//! stackcheck: static analysis of container builds and topologies
//!
//! Loads an image build and/or a compose-style topology, runs the image
//! layer, topology and runtime contract analyzers over the immutable model,
//! and returns one ordered [`Report`].
//!
//! # Example
//!
//! ```
//! use stackcheck::{CheckRequest, Checker};
//!
//! let checker = Checker::default();
//! let request = CheckRequest::new()
//!     .with_build("FROM node:20\nCOPY . .\nRUN npm install\n")
//!     .with_topology("services:\n  web:\n    ports: [\"3000:3000\"]\n    x-listen-port: 8080\n");
//!
//! let report = checker.check(&request).unwrap();
//! assert!(report.has_errors());
//! assert_eq!(report.diagnostics[0].rule.code(), "SC-RUN-001");
//! ```

use stackcheck_analyzers::runner_for;
use stackcheck_core::AnalysisRunner;
use stackcheck_load::load_input;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub use stackcheck_core::{
    AnalysisError, AnalysisInput, Diagnostic, MalformedInputError, Report, RuleId, Severity,
    SeverityCounts,
};
pub use stackcheck_load::{BuildFormat, LoadOptions};
pub use stackcheck_rules::{RuleError, RuleProfile};

#[derive(Error, Debug)]
pub enum CheckError {
    #[error(transparent)]
    Malformed(#[from] MalformedInputError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Profile(#[from] RuleError),
}

/// Raw inputs for one check
#[derive(Debug, Clone, Default)]
pub struct CheckRequest {
    pub build: Option<String>,
    pub topology: Option<String>,
    pub options: LoadOptions,
}

impl CheckRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_build(mut self, text: impl Into<String>) -> Self {
        self.build = Some(text.into());
        self
    }

    pub fn with_topology(mut self, text: impl Into<String>) -> Self {
        self.topology = Some(text.into());
        self
    }

    /// Component name the build is reported under
    pub fn with_build_name(mut self, name: impl Into<String>) -> Self {
        self.options = self.options.with_build_name(name);
        self
    }

    pub fn with_build_format(mut self, format: BuildFormat) -> Self {
        self.options = self.options.with_build_format(format);
        self
    }

    pub fn with_env_file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.options = self.options.with_env_file(path, contents);
        self
    }

    fn load(&self) -> Result<AnalysisInput, MalformedInputError> {
        load_input(&self.options, self.build.as_deref(), self.topology.as_deref())
    }
}

/// A rule profile and the runner built from it. Reusable across checks.
pub struct Checker {
    profile: RuleProfile,
    runner: AnalysisRunner,
}

impl Checker {
    pub fn new(profile: RuleProfile) -> Self {
        let runner = runner_for(&profile);
        Self { profile, runner }
    }

    /// Built-in profile by name (`default@1.0`, `lenient@1.0`)
    pub fn with_profile_name(name: &str) -> Self {
        Self::new(RuleProfile::for_name(name))
    }

    pub fn from_profile_yaml(yaml: &str) -> Result<Self, CheckError> {
        Ok(Self::new(RuleProfile::from_yaml(yaml)?))
    }

    pub fn profile(&self) -> &RuleProfile {
        &self.profile
    }

    /// Load and analyze on the calling thread
    pub fn check(&self, request: &CheckRequest) -> Result<Report, MalformedInputError> {
        let input = request.load()?;
        debug!(profile = %self.profile.name, "checking");
        Ok(self.runner.run_blocking(&input))
    }

    /// Load, then run each analyzer as its own blocking task
    pub async fn check_async(&self, request: &CheckRequest) -> Result<Report, CheckError> {
        let input = Arc::new(request.load()?);
        debug!(profile = %self.profile.name, "checking concurrently");
        Ok(self.runner.run(input).await?)
    }

    /// Analyze an already loaded model
    pub fn check_input(&self, input: &AnalysisInput) -> Report {
        self.runner.run_blocking(input)
    }
}

impl Default for Checker {
    fn default() -> Self {
        Self::new(RuleProfile::standard())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_input_aborts() {
        let request = CheckRequest::new().with_topology("services:\n  - image: redis\n");
        let err = Checker::default().check(&request).unwrap_err();
        assert_eq!(err.field(), "services[0].name");
    }

    #[test]
    fn test_empty_request_is_clean() {
        let report = Checker::default().check(&CheckRequest::new()).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn test_profile_errors_convert() {
        let err = Checker::from_profile_yaml("name: x\ntables:\n  nope: {}\n").err().unwrap();
        assert!(matches!(err, CheckError::Profile(RuleError::UnknownTable(_))));
    }

    #[tokio::test]
    async fn test_async_check() {
        let request = CheckRequest::new().with_build("FROM alpine\nRUN true\n");
        let report = Checker::default().check_async(&request).await.unwrap();
        assert_eq!(report.counts.warnings, 1);
    }
}
