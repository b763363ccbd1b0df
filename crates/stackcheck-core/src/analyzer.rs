//! Analyzer Trait: single contract for every checker
use crate::diagnostic::Diagnostic;
use crate::model::{BuildModel, Topology};

/// Read-only input shared by all analyzers of one run
#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
    pub build: Option<BuildModel>,
    pub topology: Option<Topology>,
}

impl AnalysisInput {
    pub fn new(build: Option<BuildModel>, topology: Option<Topology>) -> Self {
        Self { build, topology }
    }

    pub fn build(build: BuildModel) -> Self {
        Self::new(Some(build), None)
    }

    pub fn topology(topology: Topology) -> Self {
        Self::new(None, Some(topology))
    }

    pub fn is_empty(&self) -> bool {
        self.build.is_none() && self.topology.is_none()
    }
}

/// A pure checker over an immutable model.
///
/// Implementations must be deterministic: the same input yields the same
/// diagnostics in the same order. They never fail; a model they have nothing
/// to say about yields an empty list.
pub trait Analyzer: Send + Sync {
    /// Unique analyzer id (e.g. "image.layers.v1")
    fn id(&self) -> &'static str;

    fn analyze(&self, input: &AnalysisInput) -> Vec<Diagnostic>;
}
