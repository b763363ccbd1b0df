//! Diagnostic types produced by the analyzers
//!
//! A diagnostic is one finding with a severity, the component it concerns and
//! remediation text. Diagnostics never abort a run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a finding. Ordering is report order: ERROR first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of the rule that produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    CacheOrder,
    RootUser,
    BuildTool,
    HostExposure,
    NetworkReachability,
    Persistence,
    PlaintextCredential,
    PortMismatch,
    MissingEnv,
}

impl RuleId {
    pub const ALL: [RuleId; 9] = [
        RuleId::CacheOrder,
        RuleId::RootUser,
        RuleId::BuildTool,
        RuleId::HostExposure,
        RuleId::NetworkReachability,
        RuleId::Persistence,
        RuleId::PlaintextCredential,
        RuleId::PortMismatch,
        RuleId::MissingEnv,
    ];

    /// Stable code shown to users
    pub fn code(&self) -> &'static str {
        match self {
            RuleId::CacheOrder => "SC-IMG-001",
            RuleId::RootUser => "SC-IMG-002",
            RuleId::BuildTool => "SC-IMG-003",
            RuleId::HostExposure => "SC-TOP-001",
            RuleId::NetworkReachability => "SC-TOP-002",
            RuleId::Persistence => "SC-TOP-003",
            RuleId::PlaintextCredential => "SC-TOP-004",
            RuleId::PortMismatch => "SC-RUN-001",
            RuleId::MissingEnv => "SC-RUN-002",
        }
    }

    /// Severity the rule reports at
    pub fn severity(&self) -> Severity {
        match self {
            RuleId::HostExposure
            | RuleId::NetworkReachability
            | RuleId::PortMismatch
            | RuleId::MissingEnv => Severity::Error,
            RuleId::CacheOrder | RuleId::RootUser | RuleId::Persistence => Severity::Warning,
            RuleId::BuildTool | RuleId::PlaintextCredential => Severity::Info,
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One analyzer finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub rule: RuleId,
    /// Build or service the finding concerns
    pub component: String,
    pub message: String,
    pub remediation: String,
}

impl Diagnostic {
    /// Create a diagnostic at the rule's own severity
    pub fn new(
        rule: RuleId,
        component: impl Into<String>,
        message: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            severity: rule.severity(),
            rule,
            component: component.into(),
            message: message.into(),
            remediation: remediation.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.severity, self.rule, self.component, self.message
        )
    }
}
