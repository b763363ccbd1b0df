//! Runtime Contract Analyzer
//!
//! Compares what one service needs at start (its listen port, its required
//! variables) with what the topology gives it.

use stackcheck_core::{AnalysisInput, Analyzer, Diagnostic, PortBinding, RuleId, ServiceSpec};

#[derive(Debug, Default)]
pub struct RuntimeContractAnalyzer;

impl RuntimeContractAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze_service(&self, service: &ServiceSpec) -> Vec<Diagnostic> {
        let mut out = Vec::new();

        if let Some(listen) = service.listen_port {
            for binding in service.host_ports.iter().filter(|b| b.container != listen) {
                out.push(port_mismatch(service, *binding, listen));
            }
        }

        for name in service.missing_env() {
            out.push(Diagnostic::new(
                RuleId::MissingEnv,
                &service.name,
                format!("required environment variable absent: process will fail at start ({})", name),
                format!(
                    "Supply {} in the environment of '{}' as an explicit value, an env_file entry or a ${{{}}} reference",
                    name, service.name, name
                ),
            ));
        }

        out
    }
}

fn port_mismatch(service: &ServiceSpec, binding: PortBinding, listen: u16) -> Diagnostic {
    let (published, corrected) = if binding.host == 0 {
        (binding.container.to_string(), listen.to_string())
    } else {
        (binding.to_string(), PortBinding::new(binding.host, listen).to_string())
    };

    Diagnostic::new(
        RuleId::PortMismatch,
        &service.name,
        format!(
            "published container port does not match process listen port, connections will be refused: '{}' publishes {} but listens on {}",
            service.name, published, listen
        ),
        format!("Change the mapping to {}", corrected),
    )
}

impl Analyzer for RuntimeContractAnalyzer {
    fn id(&self) -> &'static str {
        "runtime.contract.v1"
    }

    fn analyze(&self, input: &AnalysisInput) -> Vec<Diagnostic> {
        let Some(topology) = &input.topology else {
            return Vec::new();
        };
        topology
            .services()
            .filter(|service| service.has_runtime_contract())
            .flat_map(|service| self.analyze_service(service))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackcheck_core::EnvSource;

    #[test]
    fn test_port_mismatch_recommends_listen_port() {
        let service = ServiceSpec::new("web").with_port(3000, 3000).with_listen_port(8080);
        let out = RuntimeContractAnalyzer::new().analyze_service(&service);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rule, RuleId::PortMismatch);
        assert_eq!(out[0].remediation, "Change the mapping to 3000:8080");
    }

    #[test]
    fn test_matching_and_unknown_listen_port() {
        let service = ServiceSpec::new("web").with_port(3000, 8080).with_listen_port(8080);
        assert!(RuntimeContractAnalyzer::new().analyze_service(&service).is_empty());

        let service = ServiceSpec::new("web").with_port(3000, 3000);
        assert!(RuntimeContractAnalyzer::new().analyze_service(&service).is_empty());
    }

    #[test]
    fn test_ephemeral_host_port() {
        let service = ServiceSpec::new("web").with_port(0, 80).with_listen_port(8080);
        let out = RuntimeContractAnalyzer::new().analyze_service(&service);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].remediation, "Change the mapping to 8080");
    }

    #[test]
    fn test_missing_env_until_provided() {
        let service = ServiceSpec::new("api").with_required_env("API_KEY");
        let out = RuntimeContractAnalyzer::new().analyze_service(&service);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rule, RuleId::MissingEnv);
        assert!(out[0].message.contains("API_KEY"));

        let service = service.with_env("API_KEY", EnvSource::Interpolated);
        assert!(RuntimeContractAnalyzer::new().analyze_service(&service).is_empty());
    }

    #[test]
    fn test_port_findings_precede_env_findings() {
        let service = ServiceSpec::new("api")
            .with_port(80, 80)
            .with_port(443, 443)
            .with_listen_port(8443)
            .with_required_env("TOKEN");
        let rules: Vec<RuleId> = RuntimeContractAnalyzer::new()
            .analyze_service(&service)
            .iter()
            .map(|d| d.rule)
            .collect();
        assert_eq!(rules, vec![RuleId::PortMismatch, RuleId::PortMismatch, RuleId::MissingEnv]);
    }
}
