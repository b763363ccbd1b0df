//! stackcheck-load: Model Loader
//!
//! Turns raw configuration text into the immutable core model. Builds come
//! as Dockerfile-like instruction text or as a structured YAML/JSON step list;
//! topologies come as compose-style YAML/JSON.
//!
//! # Example
//!
//! ```
//! use stackcheck_load::{load, LoadOptions};
//!
//! let build = "FROM node:20\nCOPY . .\nRUN npm ci\n";
//! let topology = "services:\n  web:\n    ports: [\"80:8080\"]\n";
//!
//! let (build, topology) = load(Some(build), Some(topology)).unwrap();
//! assert_eq!(build.unwrap().steps().len(), 3);
//! assert_eq!(topology.unwrap().len(), 1);
//! # let _ = LoadOptions::default();
//! ```

pub mod build_config;
pub mod compose;
pub mod env;
pub mod instructions;

use stackcheck_core::{AnalysisInput, BuildModel, MalformedInputError, Topology};
use std::collections::BTreeMap;
use tracing::debug;

/// How to read build text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildFormat {
    /// Instruction text if the first line starts with a keyword, else structured
    #[default]
    Auto,
    Instructions,
    Structured,
}

/// Knobs for one load
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Component name for the build in diagnostics
    pub build_name: String,
    pub build_format: BuildFormat,
    /// Env-file contents keyed by the path the topology references
    pub env_files: BTreeMap<String, String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            build_name: "image".to_string(),
            build_format: BuildFormat::Auto,
            env_files: BTreeMap::new(),
        }
    }
}

impl LoadOptions {
    pub fn with_build_name(mut self, name: impl Into<String>) -> Self {
        self.build_name = name.into();
        self
    }

    pub fn with_build_format(mut self, format: BuildFormat) -> Self {
        self.build_format = format;
        self
    }

    pub fn with_env_file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.env_files.insert(path.into(), contents.into());
        self
    }

    /// Supplied contents of an env file, matched with or without a leading `./`
    pub fn env_file(&self, path: &str) -> Option<&str> {
        let bare = path.strip_prefix("./").unwrap_or(path);
        self.env_files
            .get(path)
            .or_else(|| self.env_files.get(bare))
            .or_else(|| self.env_files.get(&format!("./{}", bare)))
            .map(String::as_str)
    }
}

/// Load either or both inputs with default options
pub fn load(
    raw_build: Option<&str>,
    raw_topology: Option<&str>,
) -> Result<(Option<BuildModel>, Option<Topology>), MalformedInputError> {
    load_with(&LoadOptions::default(), raw_build, raw_topology)
}

pub fn load_with(
    options: &LoadOptions,
    raw_build: Option<&str>,
    raw_topology: Option<&str>,
) -> Result<(Option<BuildModel>, Option<Topology>), MalformedInputError> {
    let build = raw_build.map(|text| load_build(options, text)).transpose()?;
    let topology = raw_topology
        .map(|text| load_topology(options, text))
        .transpose()?;
    Ok((build, topology))
}

/// Load straight into an analysis input
pub fn load_input(
    options: &LoadOptions,
    raw_build: Option<&str>,
    raw_topology: Option<&str>,
) -> Result<AnalysisInput, MalformedInputError> {
    let (build, topology) = load_with(options, raw_build, raw_topology)?;
    Ok(AnalysisInput::new(build, topology))
}

pub fn load_build(options: &LoadOptions, text: &str) -> Result<BuildModel, MalformedInputError> {
    let structured = match options.build_format {
        BuildFormat::Instructions => false,
        BuildFormat::Structured => true,
        BuildFormat::Auto => !instructions::looks_like_instructions(text),
    };

    let build = if structured {
        build_config::parse(&options.build_name, text)?
    } else {
        instructions::parse(&options.build_name, text)?
    };

    debug!(
        build = %build.name,
        steps = build.steps().len(),
        stages = build.stages().len(),
        structured,
        "build parsed"
    );
    Ok(build)
}

pub fn load_topology(options: &LoadOptions, text: &str) -> Result<Topology, MalformedInputError> {
    compose::parse(text, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_detects_build_format() {
        let options = LoadOptions::default();
        let build = load_build(&options, "FROM alpine\nUSER app\n").unwrap();
        assert_eq!(build.final_user(), "app");

        let build = load_build(&options, "steps:\n  - kind: user\n    user: app\n").unwrap();
        assert_eq!(build.final_user(), "app");
    }

    #[test]
    fn test_forced_format() {
        let options = LoadOptions::default().with_build_format(BuildFormat::Structured);
        let err = load_build(&options, "FROM alpine\n").unwrap_err();
        assert!(matches!(
            err,
            MalformedInputError::Parse { .. } | MalformedInputError::MissingField { .. }
        ));
    }

    #[test]
    fn test_build_name_is_used() {
        let options = LoadOptions::default().with_build_name("api");
        let build = load_build(&options, "FROM alpine\n").unwrap();
        assert_eq!(build.name, "api");
    }

    #[test]
    fn test_env_file_lookup_ignores_dot_slash() {
        let options = LoadOptions::default().with_env_file(".env", "A=1");
        assert_eq!(options.env_file("./.env"), Some("A=1"));
        assert_eq!(options.env_file(".env"), Some("A=1"));
        assert_eq!(options.env_file("other.env"), None);
    }

    #[test]
    fn test_load_nothing() {
        let (build, topology) = load(None, None).unwrap();
        assert!(build.is_none() && topology.is_none());
    }

    #[test]
    fn test_first_error_aborts() {
        let topology = "services:\n  a:\n    depends_on: [b]\n";
        let err = load(Some("FROM alpine\n"), Some(topology)).unwrap_err();
        assert_eq!(err.field(), "services.a.depends_on");
    }
}
