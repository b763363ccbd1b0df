//! Unified Error Model
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of entity a dangling reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Service,
    Network,
    Volume,
    EnvFile,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            RefKind::Service => "service",
            RefKind::Network => "network",
            RefKind::Volume => "volume",
            RefKind::EnvFile => "env file",
        };
        write!(f, "{}", s)
    }
}

/// Load-time structural error. Fatal to the invocation: no analyzer runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedInputError {
    #[error("PARSE/{format}: {message}")]
    Parse { format: String, message: String },

    #[error("MALFORMED/{field}: required field is missing")]
    MissingField { field: String },

    #[error("MALFORMED/{field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("MALFORMED/services.{name}: duplicate service name")]
    DuplicateService { name: String },

    #[error("DANGLING/{field}: unknown {kind} '{name}'")]
    DanglingReference {
        field: String,
        kind: RefKind,
        name: String,
    },
}

impl MalformedInputError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField { field: field.into() }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn dangling(field: impl Into<String>, kind: RefKind, name: impl Into<String>) -> Self {
        Self::DanglingReference {
            field: field.into(),
            kind,
            name: name.into(),
        }
    }

    /// Path of the offending field (`services.api.networks`, `steps[3]`, ...)
    pub fn field(&self) -> String {
        match self {
            Self::Parse { format, .. } => format.clone(),
            Self::MissingField { field } => field.clone(),
            Self::InvalidValue { field, .. } => field.clone(),
            Self::DuplicateService { name } => format!("services.{}", name),
            Self::DanglingReference { field, .. } => field.clone(),
        }
    }
}

/// Failure of the analysis run itself (never a finding)
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("TASK/{analyzer}: {reason}")]
    TaskFailed { analyzer: String, reason: String },
}
