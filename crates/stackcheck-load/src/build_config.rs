//! Structured (YAML/JSON) build descriptions
//!
//! ```yaml
//! name: api
//! steps:
//!   - kind: copy
//!     sources: [package.json, package-lock.json]
//!   - kind: run
//!     command: npm ci
//!   - kind: user
//!     user: node
//! ```

use serde::Deserialize;
use stackcheck_core::{BuildModel, BuildStep, MalformedInputError};

#[derive(Debug, Deserialize)]
struct BuildFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    steps: Option<Vec<StepEntry>>,
}

#[derive(Debug, Deserialize)]
struct StepEntry {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    command: Option<String>,
    /// Stage a copy reads from
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    image: Option<String>,
    /// Keyword for `other` steps
    #[serde(default)]
    instruction: Option<String>,
}

pub fn parse(default_name: &str, text: &str) -> Result<BuildModel, MalformedInputError> {
    let file: BuildFile = serde_yaml::from_str(text).map_err(|e| MalformedInputError::Parse {
        format: "build".to_string(),
        message: e.to_string(),
    })?;

    let entries = file.steps.ok_or_else(|| MalformedInputError::missing("steps"))?;
    let steps = entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| to_step(entry, &format!("steps[{}]", i)))
        .collect::<Result<Vec<_>, _>>()?;

    let name = file.name.unwrap_or_else(|| default_name.to_string());
    Ok(BuildModel::named(name, steps))
}

fn to_step(entry: StepEntry, field: &str) -> Result<BuildStep, MalformedInputError> {
    let kind = entry
        .kind
        .ok_or_else(|| MalformedInputError::missing(format!("{}.kind", field)))?;

    let non_empty = |value: Option<String>, name: &str| {
        value
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| MalformedInputError::missing(format!("{}.{}", field, name)))
    };

    match kind.to_ascii_lowercase().as_str() {
        "copy" | "add" => {
            if entry.sources.is_empty() {
                return Err(MalformedInputError::missing(format!("{}.sources", field)));
            }
            let mut step = BuildStep::copy(entry.sources).with_instruction(&kind);
            if let Some(stage) = entry.from {
                step = step.with_from_stage(stage);
            }
            Ok(step)
        }
        "run" => non_empty(entry.command, "command").map(BuildStep::run),
        "user" => non_empty(entry.user.or(entry.command), "user").map(BuildStep::user),
        "expose" => non_empty(entry.command, "command").map(BuildStep::expose),
        "from" => non_empty(entry.image.or(entry.command), "image").map(BuildStep::from),
        "other" => {
            let instruction = entry.instruction.unwrap_or_else(|| "OTHER".to_string());
            Ok(BuildStep::other(&instruction, entry.command.unwrap_or_default()))
        }
        unknown => Err(MalformedInputError::invalid(
            format!("{}.kind", field),
            format!("unknown step kind '{}'", unknown),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackcheck_core::StepKind;

    #[test]
    fn test_parses_yaml_steps() {
        let yaml = r#"
name: api
steps:
  - kind: copy
    sources: [package.json]
  - kind: run
    command: npm ci
  - kind: copy
    sources: ["."]
  - kind: user
    user: node
"#;
        let build = parse("image", yaml).unwrap();
        assert_eq!(build.name, "api");
        assert_eq!(build.steps().len(), 4);
        assert_eq!(build.final_user(), "node");
    }

    #[test]
    fn test_parses_json_steps() {
        let json = r#"{"steps": [{"kind": "COPY", "sources": ["/app"], "from": "build"}, {"kind": "expose", "command": "8080"}]}"#;
        let build = parse("image", json).unwrap();
        assert_eq!(build.name, "image");
        assert_eq!(build.steps()[0].from_stage.as_deref(), Some("build"));
        assert_eq!(build.steps()[1].kind, StepKind::Expose);
    }

    #[test]
    fn test_missing_fields_are_named() {
        let err = parse("image", "name: x").unwrap_err();
        assert_eq!(err.field(), "steps");

        let err = parse("image", "steps:\n  - kind: run\n").unwrap_err();
        assert_eq!(err.field(), "steps[0].command");

        let err = parse("image", "steps:\n  - command: ls\n").unwrap_err();
        assert_eq!(err.field(), "steps[0].kind");

        let err = parse("image", "steps:\n  - kind: copy\n").unwrap_err();
        assert_eq!(err.field(), "steps[0].sources");

        let err = parse("image", "steps:\n  - kind: teleport\n").unwrap_err();
        assert!(err.to_string().contains("teleport"));
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        let err = parse("image", "steps: [").unwrap_err();
        assert!(matches!(err, MalformedInputError::Parse { .. }));
    }
}
