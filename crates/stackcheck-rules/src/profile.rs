//! Rule Profiles
//!
//! A profile is a named set of rule tables plus the rules it switches off.
//! Built-ins: `default@1.0` (everything on) and `lenient@1.0` (INFO rules off).

use crate::pattern::PatternSpec;
use crate::tables::RuleTables;
use crate::RuleError;
use serde::Deserialize;
use stackcheck_core::{RuleId, Severity};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RuleProfile {
    /// Profile name (e.g., "default@1.0")
    pub name: String,
    pub tables: RuleTables,
    pub disabled: BTreeSet<RuleId>,
}

/// Profile file layout
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileFile {
    name: String,
    /// Built-in profile to start from
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    disabled: Vec<RuleId>,
    #[serde(default)]
    tables: BTreeMap<String, TableOverride>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableOverride {
    /// Replaces the built-in entries when present
    #[serde(default)]
    replace: Option<Vec<PatternSpec>>,
    /// Appended after the built-in (or replaced) entries
    #[serde(default)]
    extend: Vec<PatternSpec>,
}

impl RuleProfile {
    /// Every rule enabled, built-in tables
    pub fn standard() -> Self {
        Self {
            name: "default@1.0".to_string(),
            tables: RuleTables::default(),
            disabled: BTreeSet::new(),
        }
    }

    /// Only ERROR and WARNING rules
    pub fn lenient() -> Self {
        Self {
            name: "lenient@1.0".to_string(),
            tables: RuleTables::default(),
            disabled: RuleId::ALL
                .into_iter()
                .filter(|r| r.severity() == Severity::Info)
                .collect(),
        }
    }

    /// Get profile by name
    pub fn for_name(name: &str) -> Self {
        match name.split('@').next().unwrap_or(name) {
            "lenient" => Self::lenient(),
            _ => Self::standard(), // Default to standard
        }
    }

    /// Load profile from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, RuleError> {
        let file: ProfileFile =
            serde_yaml::from_str(yaml).map_err(|e| RuleError::Parse(e.to_string()))?;

        let mut profile = match file.base.as_deref() {
            Some(base) => Self::for_name(base),
            None => Self::standard(),
        };
        profile.name = file.name;
        profile.disabled.extend(file.disabled);

        for (table, table_override) in file.tables {
            let set = profile
                .tables
                .table_mut(&table)
                .ok_or_else(|| RuleError::UnknownTable(table.clone()))?;

            if let Some(entries) = table_override.replace {
                *set = crate::pattern::PatternSet::compile(&table, entries)?;
            }
            set.extend(table_override.extend)?;
        }

        debug!(profile = %profile.name, disabled = profile.disabled.len(), "rule profile loaded");
        Ok(profile)
    }

    pub fn is_enabled(&self, rule: RuleId) -> bool {
        !self.disabled.contains(&rule)
    }
}

impl Default for RuleProfile {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_disables_info_rules() {
        let profile = RuleProfile::lenient();
        assert!(!profile.is_enabled(RuleId::BuildTool));
        assert!(!profile.is_enabled(RuleId::PlaintextCredential));
        assert!(profile.is_enabled(RuleId::CacheOrder));
        assert!(profile.is_enabled(RuleId::MissingEnv));
    }

    #[test]
    fn test_for_name_falls_back_to_standard() {
        assert_eq!(RuleProfile::for_name("lenient@1.0").name, "lenient@1.0");
        assert_eq!(RuleProfile::for_name("unknown").name, "default@1.0");
    }

    #[test]
    fn test_yaml_extends_and_replaces_tables() {
        let yaml = r#"
name: team@2.0
disabled: [persistence]
tables:
  stateful_services:
    extend:
      - pattern: etcd
  credential_env:
    replace:
      - pattern: "^VAULT_"
        mode: regex
"#;
        let profile = RuleProfile::from_yaml(yaml).unwrap();
        assert_eq!(profile.name, "team@2.0");
        assert!(!profile.is_enabled(RuleId::Persistence));
        assert!(profile.tables.stateful_services.is_match("etcd"));
        assert!(profile.tables.stateful_services.is_match("postgres"));
        assert!(profile.tables.credential_env.is_match("VAULT_ADDR"));
        assert!(!profile.tables.credential_env.is_match("DB_PASSWORD"));
    }

    #[test]
    fn test_yaml_base_profile() {
        let profile = RuleProfile::from_yaml("name: quiet\nbase: lenient").unwrap();
        assert!(!profile.is_enabled(RuleId::BuildTool));
    }

    #[test]
    fn test_yaml_rejects_unknown_table_and_rule() {
        let err = RuleProfile::from_yaml("name: x\ntables:\n  nope:\n    extend: []").unwrap_err();
        assert!(matches!(err, RuleError::UnknownTable(_)));

        let err = RuleProfile::from_yaml("name: x\ndisabled: [not_a_rule]").unwrap_err();
        assert!(matches!(err, RuleError::Parse(_)));
    }
}
