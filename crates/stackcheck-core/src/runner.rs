//! Analysis Runner: runs analyzers over one immutable input and merges the results
use crate::analyzer::{AnalysisInput, Analyzer};
use crate::diagnostic::{Diagnostic, RuleId};
use crate::error::AnalysisError;
use crate::report::Report;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct AnalysisRunner {
    analyzers: Vec<Arc<dyn Analyzer>>,
    disabled: BTreeSet<RuleId>,
    runner_id: String,
}

impl AnalysisRunner {
    pub fn new(analyzers: Vec<Arc<dyn Analyzer>>) -> Self {
        let runner_id = analyzers
            .iter()
            .map(|a| a.id().split('.').next().unwrap_or("?"))
            .collect::<Vec<_>>()
            .join("+");

        Self {
            analyzers,
            disabled: BTreeSet::new(),
            runner_id,
        }
    }

    /// Drop diagnostics of these rules from every report
    pub fn with_disabled<I>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = RuleId>,
    {
        self.disabled.extend(rules);
        self
    }

    pub fn runner_id(&self) -> &str {
        &self.runner_id
    }

    pub fn analyzer_ids(&self) -> Vec<&'static str> {
        self.analyzers.iter().map(|a| a.id()).collect()
    }

    /// Run every analyzer on the calling thread, in registration order
    pub fn run_blocking(&self, input: &AnalysisInput) -> Report {
        let start = Instant::now();
        let batches: Vec<Vec<Diagnostic>> = self
            .analyzers
            .iter()
            .map(|analyzer| {
                let found = self.filter(analyzer.analyze(input));
                debug!(analyzer = analyzer.id(), findings = found.len(), "analyzer finished");
                found
            })
            .collect();

        self.finish(batches, start)
    }

    /// Run every analyzer as its own blocking task and join them in
    /// registration order, so completion order never shows in the report.
    pub async fn run(&self, input: Arc<AnalysisInput>) -> Result<Report, AnalysisError> {
        let start = Instant::now();

        let handles: Vec<_> = self
            .analyzers
            .iter()
            .map(|analyzer| {
                let analyzer = Arc::clone(analyzer);
                let input = Arc::clone(&input);
                let id = analyzer.id();
                let handle = tokio::task::spawn_blocking(move || analyzer.analyze(&input));
                (id, handle)
            })
            .collect();

        let mut batches = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let found = handle.await.map_err(|e| AnalysisError::TaskFailed {
                analyzer: id.to_string(),
                reason: e.to_string(),
            })?;
            let found = self.filter(found);
            debug!(analyzer = id, findings = found.len(), "analyzer finished");
            batches.push(found);
        }

        Ok(self.finish(batches, start))
    }

    fn filter(&self, diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
        if self.disabled.is_empty() {
            return diagnostics;
        }
        diagnostics
            .into_iter()
            .filter(|d| !self.disabled.contains(&d.rule))
            .collect()
    }

    fn finish(&self, batches: Vec<Vec<Diagnostic>>, start: Instant) -> Report {
        let report = Report::from_batches(batches);
        info!(
            runner = %self.runner_id,
            errors = report.counts.errors,
            warnings = report.counts.warnings,
            infos = report.counts.infos,
            fingerprint = %report.fingerprint,
            latency_ms = start.elapsed().as_millis() as u64,
            "analysis complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Severity;
    use crate::model::{BuildModel, BuildStep};

    struct Fixed {
        id: &'static str,
        out: Vec<Diagnostic>,
    }

    impl Analyzer for Fixed {
        fn id(&self) -> &'static str {
            self.id
        }

        fn analyze(&self, _input: &AnalysisInput) -> Vec<Diagnostic> {
            self.out.clone()
        }
    }

    struct Panics;

    impl Analyzer for Panics {
        fn id(&self) -> &'static str {
            "panics.v1"
        }

        fn analyze(&self, _input: &AnalysisInput) -> Vec<Diagnostic> {
            panic!("boom")
        }
    }

    fn runner() -> AnalysisRunner {
        AnalysisRunner::new(vec![
            Arc::new(Fixed {
                id: "image.layers.v1",
                out: vec![
                    Diagnostic::new(RuleId::BuildTool, "image", "git", "remove it"),
                    Diagnostic::new(RuleId::RootUser, "image", "root", "add USER"),
                ],
            }),
            Arc::new(Fixed {
                id: "runtime.contract.v1",
                out: vec![Diagnostic::new(RuleId::MissingEnv, "api", "API_KEY", "set it")],
            }),
        ])
    }

    fn input() -> AnalysisInput {
        AnalysisInput::build(BuildModel::new(vec![BuildStep::run("true")]))
    }

    #[test]
    fn test_runner_id() {
        assert_eq!(runner().runner_id(), "image+runtime");
    }

    #[test]
    fn test_blocking_run_orders_output() {
        let report = runner().run_blocking(&input());
        let severities: Vec<Severity> = report.diagnostics.iter().map(|d| d.severity).collect();
        assert_eq!(severities, vec![Severity::Error, Severity::Warning, Severity::Info]);
    }

    #[tokio::test]
    async fn test_async_run_matches_blocking() {
        let runner = runner();
        let blocking = runner.run_blocking(&input());
        let concurrent = runner.run(Arc::new(input())).await.unwrap();
        assert_eq!(blocking, concurrent);
    }

    #[test]
    fn test_disabled_rules_are_dropped() {
        let report = runner()
            .with_disabled([RuleId::BuildTool])
            .run_blocking(&input());
        assert_eq!(report.counts.total(), 2);
        assert!(report.diagnostics.iter().all(|d| d.rule != RuleId::BuildTool));
    }

    #[tokio::test]
    async fn test_panicking_analyzer_is_reported() {
        let runner = AnalysisRunner::new(vec![Arc::new(Panics)]);
        let err = runner.run(Arc::new(input())).await.unwrap_err();
        assert!(err.to_string().starts_with("TASK/panics.v1"));
    }
}
