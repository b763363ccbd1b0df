//! stackcheck rules: pluggable heuristic tables
//!
//! The analyzers never hard-code string checks. They ask a [`RuleTables`]
//! whether a command installs dependencies, whether a path is a manifest,
//! whether a service looks stateful, and so on. Profiles let a team extend
//! or replace any table from YAML and switch individual rules off.
//!
//! # Example
//!
//! ```
//! use stackcheck_rules::RuleProfile;
//!
//! let profile = RuleProfile::from_yaml(r#"
//! name: team@1.0
//! tables:
//!   stateful_services:
//!     extend:
//!       - pattern: etcd
//! "#).unwrap();
//!
//! assert!(profile.tables.stateful_services.is_match("etcd"));
//! ```

pub mod pattern;
pub mod profile;
pub mod tables;

pub use pattern::{MatchMode, PatternSet, PatternSpec};
pub use profile::RuleProfile;
pub use tables::RuleTables;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("RULES/{table}: invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        table: String,
        pattern: String,
        reason: String,
    },

    #[error("RULES/tables: unknown table '{0}'")]
    UnknownTable(String),

    #[error("PARSE/profile: {0}")]
    Parse(String),
}
