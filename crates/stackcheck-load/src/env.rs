//! Environment provisioning: value classification and env-file parsing

use lazy_static::lazy_static;
use regex::Regex;
use stackcheck_core::EnvSource;

lazy_static! {
    /// Whole-value substitution: `$VAR`, `${VAR}`, `${VAR:-default}`, `${VAR?err}`
    static ref INTERPOLATION: Regex =
        Regex::new(r"^\$(\{[A-Za-z_][A-Za-z0-9_]*(:?[-?+][^}]*)?\}|[A-Za-z_][A-Za-z0-9_]*)$").unwrap();

    static ref ENV_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").unwrap();
}

/// Mount point of file-based secrets
const SECRETS_DIR: &str = "/run/secrets/";

/// Classify where a declared value comes from
pub fn classify(value: &str) -> EnvSource {
    let value = value.trim();
    if INTERPOLATION.is_match(value) {
        EnvSource::Interpolated
    } else if value.starts_with(SECRETS_DIR) {
        EnvSource::SecretFile {
            path: value.to_string(),
        }
    } else {
        EnvSource::Inline
    }
}

/// Split a `KEY=VALUE` entry. A bare `KEY` has no value.
pub fn split_assignment(entry: &str) -> (&str, Option<&str>) {
    match entry.split_once('=') {
        Some((key, value)) => (key.trim(), Some(value)),
        None => (entry.trim(), None),
    }
}

pub fn is_valid_name(name: &str) -> bool {
    ENV_NAME.is_match(name)
}

/// Variable names defined by env-file contents
pub fn env_file_names(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.strip_prefix("export ").unwrap_or(l))
        .map(|l| split_assignment(l).0)
        .filter(|name| is_valid_name(name))
        .map(str::to_string)
        .collect()
}
