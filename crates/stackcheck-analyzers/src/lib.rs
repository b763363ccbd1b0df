//! stackcheck analyzers
//!
//! The three checkers over a loaded model, plus the factory that wires them
//! into an [`AnalysisRunner`] in fixed registration order:
//! image layers, topology, runtime contract.

pub mod image_layer;
pub mod runtime_contract;
pub mod topology;

pub use image_layer::ImageLayerAnalyzer;
pub use runtime_contract::RuntimeContractAnalyzer;
pub use topology::TopologyAnalyzer;

use stackcheck_core::{AnalysisRunner, Analyzer, ServiceSpec};
use stackcheck_rules::RuleProfile;
use std::sync::Arc;
use tracing::debug;

/// All analyzers, sharing the profile's tables
pub fn analyzers(profile: &RuleProfile) -> Vec<Arc<dyn Analyzer>> {
    let tables = Arc::new(profile.tables.clone());
    vec![
        Arc::new(ImageLayerAnalyzer::new(Arc::clone(&tables))),
        Arc::new(TopologyAnalyzer::new(tables)),
        Arc::new(RuntimeContractAnalyzer::new()),
    ]
}

/// Runner with every analyzer and the profile's disabled rules filtered out
pub fn runner_for(profile: &RuleProfile) -> AnalysisRunner {
    let runner = AnalysisRunner::new(analyzers(profile))
        .with_disabled(profile.disabled.iter().copied());
    debug!(profile = %profile.name, runner = runner.runner_id(), "runner created");
    runner
}

/// Published ports as written in diagnostics: `host:container`, or the
/// container port alone when the host port is ephemeral
pub(crate) fn describe_ports(service: &ServiceSpec) -> String {
    service
        .host_ports
        .iter()
        .map(|p| {
            if p.host == 0 {
                p.container.to_string()
            } else {
                p.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
