//! Reporter: deterministic merge of analyzer output
//!
//! Order is severity (ERROR, WARNING, INFO), then component name, then the
//! order the analyzers produced the diagnostics in.

use crate::diagnostic::{Diagnostic, Severity};
use serde::{Deserialize, Serialize};

pub struct Reporter;

impl Reporter {
    /// Merge batches (one per analyzer, in registration order) into one ordered list
    pub fn report<I>(batches: I) -> Vec<Diagnostic>
    where
        I: IntoIterator<Item = Vec<Diagnostic>>,
    {
        let mut merged: Vec<Diagnostic> = batches.into_iter().flatten().collect();
        // sort_by is stable: ties keep production order
        merged.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then_with(|| a.component.cmp(&b.component))
        });
        merged
    }
}

/// Per-severity totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

impl SeverityCounts {
    pub fn tally(diagnostics: &[Diagnostic]) -> Self {
        let mut counts = Self::default();
        for diagnostic in diagnostics {
            match diagnostic.severity {
                Severity::Error => counts.errors += 1,
                Severity::Warning => counts.warnings += 1,
                Severity::Info => counts.infos += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.errors + self.warnings + self.infos
    }
}

/// Ordered result of one analysis run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub diagnostics: Vec<Diagnostic>,
    pub counts: SeverityCounts,
    /// blake3 over the canonical JSON of `diagnostics`
    pub fingerprint: String,
}

impl Report {
    pub fn from_batches<I>(batches: I) -> Self
    where
        I: IntoIterator<Item = Vec<Diagnostic>>,
    {
        let diagnostics = Reporter::report(batches);
        let counts = SeverityCounts::tally(&diagnostics);
        let fingerprint = fingerprint(&diagnostics);

        Self {
            diagnostics,
            counts,
            fingerprint,
        }
    }

    /// Any ERROR: a presentation layer maps this to a non-zero exit code
    pub fn has_errors(&self) -> bool {
        self.counts.errors > 0
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn by_severity(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.severity == severity)
    }

    pub fn for_component<'a>(&'a self, component: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.component == component)
    }
}

fn fingerprint(diagnostics: &[Diagnostic]) -> String {
    // Serializing plain structs and enums cannot fail
    let bytes = serde_json::to_vec(diagnostics).unwrap_or_default();
    format!("blake3:{}", blake3::hash(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::RuleId;

    fn diag(rule: RuleId, component: &str, message: &str) -> Diagnostic {
        Diagnostic::new(rule, component, message, "fix it")
    }

    #[test]
    fn test_orders_by_severity_then_component() {
        let image = vec![
            diag(RuleId::RootUser, "image", "root"),
            diag(RuleId::BuildTool, "image", "git"),
        ];
        let topology = vec![
            diag(RuleId::Persistence, "db", "no volume"),
            diag(RuleId::NetworkReachability, "web", "no shared network"),
            diag(RuleId::HostExposure, "api", "exposed"),
        ];

        let ordered = Reporter::report(vec![image, topology]);
        let summary: Vec<(Severity, &str)> = ordered
            .iter()
            .map(|d| (d.severity, d.component.as_str()))
            .collect();

        assert_eq!(
            summary,
            vec![
                (Severity::Error, "api"),
                (Severity::Error, "web"),
                (Severity::Warning, "db"),
                (Severity::Warning, "image"),
                (Severity::Info, "image"),
            ]
        );
    }

    #[test]
    fn test_ties_keep_production_order() {
        let batch = vec![
            diag(RuleId::MissingEnv, "api", "first"),
            diag(RuleId::PortMismatch, "api", "second"),
        ];
        let later = vec![diag(RuleId::MissingEnv, "api", "third")];

        let ordered = Reporter::report(vec![batch, later]);
        let messages: Vec<&str> = ordered.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_report_counts_and_fingerprint() {
        let batches = || {
            vec![vec![
                diag(RuleId::MissingEnv, "api", "missing"),
                diag(RuleId::RootUser, "image", "root"),
            ]]
        };

        let first = Report::from_batches(batches());
        let second = Report::from_batches(batches());

        assert!(first.has_errors());
        assert_eq!(first.counts.errors, 1);
        assert_eq!(first.counts.warnings, 1);
        assert_eq!(first.counts.total(), 2);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert!(first.fingerprint.starts_with("blake3:"));
    }

    #[test]
    fn test_empty_report() {
        let report = Report::from_batches(Vec::<Vec<Diagnostic>>::new());
        assert!(report.is_clean());
        assert!(!report.has_errors());
    }
}
