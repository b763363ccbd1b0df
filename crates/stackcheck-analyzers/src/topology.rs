//! Topology Analyzer: cross-service checks, services in name order

use crate::describe_ports;
use stackcheck_core::{
    AnalysisInput, Analyzer, Diagnostic, EnvSource, RuleId, ServiceSpec, Topology,
};
use stackcheck_rules::RuleTables;
use std::sync::Arc;

pub struct TopologyAnalyzer {
    tables: Arc<RuleTables>,
}

impl TopologyAnalyzer {
    pub fn new(tables: Arc<RuleTables>) -> Self {
        Self { tables }
    }

    pub fn analyze_topology(&self, topology: &Topology) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for service in topology.services() {
            out.extend(host_exposure(topology, service));
            out.extend(network_reachability(topology, service));
            out.extend(self.persistence(service));
            out.extend(self.plaintext_credentials(service));
        }
        out
    }

    fn persistence(&self, service: &ServiceSpec) -> Option<Diagnostic> {
        if !service.volumes.is_empty() {
            return None;
        }
        let marker = self
            .tables
            .stateful_services
            .first_match(&service.name)
            .or_else(|| {
                service
                    .image
                    .as_deref()
                    .and_then(|image| self.tables.stateful_services.first_match(image))
            })?;

        Some(Diagnostic::new(
            RuleId::Persistence,
            &service.name,
            format!(
                "stateful service has no persistent volume; data lost on recreation ('{}' looks like {})",
                service.name,
                marker.display_name()
            ),
            format!(
                "Mount a named volume at the data directory of '{}' and declare it under top-level volumes",
                service.name
            ),
        ))
    }

    fn plaintext_credentials(&self, service: &ServiceSpec) -> Vec<Diagnostic> {
        service
            .required_env
            .iter()
            .filter(|name| self.tables.credential_env.is_match(name))
            .filter(|name| service.provided_env.get(*name) == Some(&EnvSource::Inline))
            .map(|name| {
                Diagnostic::new(
                    RuleId::PlaintextCredential,
                    &service.name,
                    format!("credential supplied as plaintext inline value: {}", name),
                    format!(
                        "Provide {} through an env file, ${{{}}} substitution or a secret mounted under /run/secrets",
                        name, name
                    ),
                )
            })
            .collect()
    }
}

/// Internal tier (a dependency of another service) that publishes host ports
fn host_exposure(topology: &Topology, service: &ServiceSpec) -> Option<Diagnostic> {
    if service.host_ports.is_empty() || !topology.is_dependency_target(&service.name) {
        return None;
    }

    let dependents: Vec<&str> = topology
        .dependents_of(&service.name)
        .map(|s| s.name.as_str())
        .collect();

    Some(Diagnostic::new(
        RuleId::HostExposure,
        &service.name,
        format!(
            "internal service exposed to host: '{}' publishes {} but is a dependency of {}",
            service.name,
            describe_ports(service),
            dependents.join(", ")
        ),
        format!(
            "Remove the ports mapping from '{}'; dependents reach it over their shared network",
            service.name
        ),
    ))
}

/// One finding per `depends_on` edge whose endpoints share no network
fn network_reachability(topology: &Topology, service: &ServiceSpec) -> Vec<Diagnostic> {
    service
        .depends_on
        .iter()
        .filter_map(|name| topology.service(name))
        .filter(|dependency| service.shared_networks(dependency).next().is_none())
        .map(|dependency| {
            let suggestion = dependency
                .networks
                .iter()
                .next()
                .map(|network| {
                    format!("e.g. add '{}' to the networks of '{}'", network, service.name)
                })
                .unwrap_or_else(|| format!("e.g. give '{}' a network", dependency.name));

            Diagnostic::new(
                RuleId::NetworkReachability,
                &service.name,
                format!(
                    "service {} cannot reach dependency {}: no shared network ({} is on {}; {} is on {})",
                    service.name,
                    dependency.name,
                    service.name,
                    join(&service.networks),
                    dependency.name,
                    join(&dependency.networks)
                ),
                format!(
                    "Attach '{}' and '{}' to a common network, {}",
                    service.name, dependency.name, suggestion
                ),
            )
        })
        .collect()
}

fn join<'a>(names: impl IntoIterator<Item = &'a String>) -> String {
    let names: Vec<&str> = names.into_iter().map(String::as_str).collect();
    if names.is_empty() {
        "no network".to_string()
    } else {
        names.join(", ")
    }
}

impl Default for TopologyAnalyzer {
    fn default() -> Self {
        Self::new(Arc::new(RuleTables::default()))
    }
}

impl Analyzer for TopologyAnalyzer {
    fn id(&self) -> &'static str {
        "topology.v1"
    }

    fn analyze(&self, input: &AnalysisInput) -> Vec<Diagnostic> {
        input
            .topology
            .as_ref()
            .map(|topology| self.analyze_topology(topology))
            .unwrap_or_default()
    }
}
