//! Pattern sets: the predicate tables heuristic rules consult
//!
//! Every entry is compiled to a case-insensitive regex. Entries are tried in
//! declared order and the first hit is reported, so a diagnostic can name the
//! exact tool or marker that matched.

use crate::RuleError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// How a pattern string is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Substring anywhere
    Contains,
    /// Whole word(s), bounded by non-word characters
    Word,
    /// Entire text
    Exact,
    /// Raw regular expression
    Regex,
}

fn default_mode() -> MatchMode {
    MatchMode::Word
}

/// A pattern as written in a table or profile file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub pattern: String,
    #[serde(default = "default_mode")]
    pub mode: MatchMode,
    /// Short label used in diagnostic text (defaults to the pattern)
    #[serde(default)]
    pub label: Option<String>,
}

impl PatternSpec {
    pub fn new(pattern: impl Into<String>, mode: MatchMode) -> Self {
        Self {
            pattern: pattern.into(),
            mode,
            label: None,
        }
    }

    pub fn word(pattern: impl Into<String>) -> Self {
        Self::new(pattern, MatchMode::Word)
    }

    pub fn exact(pattern: impl Into<String>) -> Self {
        Self::new(pattern, MatchMode::Exact)
    }

    pub fn contains(pattern: impl Into<String>) -> Self {
        Self::new(pattern, MatchMode::Contains)
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::new(pattern, MatchMode::Regex)
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.pattern)
    }

    fn to_regex_source(&self) -> String {
        match self.mode {
            MatchMode::Contains => format!("(?i){}", regex::escape(&self.pattern)),
            MatchMode::Word => format!(r"(?i)\b{}\b", regex::escape(&self.pattern)),
            MatchMode::Exact => format!("(?i)^{}$", regex::escape(&self.pattern)),
            MatchMode::Regex => format!("(?i){}", self.pattern),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    spec: PatternSpec,
    regex: Regex,
}

/// Ordered, compiled set of patterns
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    table: String,
    entries: Vec<CompiledPattern>,
}

impl PatternSet {
    /// Compile specs for the named table
    pub fn compile(table: &str, specs: Vec<PatternSpec>) -> Result<Self, RuleError> {
        let mut set = Self {
            table: table.to_string(),
            entries: Vec::with_capacity(specs.len()),
        };
        set.extend(specs)?;
        Ok(set)
    }

    pub fn extend(&mut self, specs: Vec<PatternSpec>) -> Result<(), RuleError> {
        for spec in specs {
            let regex = Regex::new(&spec.to_regex_source()).map_err(|e| RuleError::InvalidPattern {
                table: self.table.clone(),
                pattern: spec.pattern.clone(),
                reason: e.to_string(),
            })?;
            self.entries.push(CompiledPattern { spec, regex });
        }
        Ok(())
    }

    /// First pattern matching `text`, in declared order
    pub fn first_match(&self, text: &str) -> Option<&PatternSpec> {
        self.entries
            .iter()
            .find(|e| e.regex.is_match(text))
            .map(|e| &e.spec)
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.first_match(text).is_some()
    }

    /// Every pattern matching `text`, in declared order
    pub fn matches<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a PatternSpec> {
        self.entries
            .iter()
            .filter(move |e| e.regex.is_match(text))
            .map(|e| &e.spec)
    }

    pub fn specs(&self) -> Vec<PatternSpec> {
        self.entries.iter().map(|e| e.spec.clone()).collect()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
