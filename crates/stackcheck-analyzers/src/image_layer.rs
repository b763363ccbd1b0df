//! Image Layer Analyzer
//!
//! Three checks over one build, each reported at most once:
//! - cache order: a broad context copy lands before the dependency install
//! - root user: the final stage runs as root
//! - build tool: a version control client is installed into the final image

use stackcheck_core::{AnalysisInput, Analyzer, BuildModel, BuildStep, Diagnostic, RuleId, StepKind};
use stackcheck_rules::{PatternSpec, RuleTables};
use std::sync::Arc;
use tracing::trace;

pub struct ImageLayerAnalyzer {
    tables: Arc<RuleTables>,
}

impl ImageLayerAnalyzer {
    pub fn new(tables: Arc<RuleTables>) -> Self {
        Self { tables }
    }

    pub fn analyze_build(&self, build: &BuildModel) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        out.extend(self.cache_order(build));
        out.extend(self.root_user(build));
        out.extend(self.build_tool(build));
        out
    }

    /// First stage where a broad copy precedes the first dependency install
    fn cache_order(&self, build: &BuildModel) -> Option<Diagnostic> {
        for stage in build.stages() {
            let Some((install, manager)) = stage.iter().find_map(|step| {
                if step.kind != StepKind::Run {
                    return None;
                }
                self.tables
                    .dependency_installs
                    .first_match(&step.command)
                    .map(|spec| (step, spec.display_name()))
            }) else {
                continue;
            };

            let Some((copy, source)) = stage
                .iter()
                .take_while(|step| step.index < install.index)
                .find_map(|step| self.broad_source(step).map(|source| (step, source)))
            else {
                continue;
            };

            trace!(copy = copy.index, install = install.index, "cache order violation");
            return Some(Diagnostic::new(
                RuleId::CacheOrder,
                &build.name,
                format!(
                    "cache-busting copy precedes dependency install: {} '{}' (step {}) comes before the {} install (step {}), so any source change re-runs the install",
                    copy.instruction,
                    source,
                    copy.index + 1,
                    manager,
                    install.index + 1
                ),
                format!(
                    "Copy only the dependency manifests before '{}', then copy the remaining sources after it",
                    install.command.trim()
                ),
            ));
        }
        None
    }

    /// A context copy source outside the manifest table
    fn broad_source<'a>(&self, step: &'a BuildStep) -> Option<&'a str> {
        if !step.is_context_copy() {
            return None;
        }
        step.sources
            .iter()
            .map(String::as_str)
            .find(|source| {
                !is_remote(source) && !self.tables.dependency_manifests.is_match(basename(source))
            })
    }

    fn root_user(&self, build: &BuildModel) -> Option<Diagnostic> {
        let declared = build
            .final_stage()
            .iter()
            .any(|step| step.kind == StepKind::User);
        let user = build.final_user();

        let message = if !declared {
            "process runs as root: the final stage has no USER step".to_string()
        } else if user.is_empty() || self.tables.root_users.is_match(user) {
            format!("process runs as root: final USER is '{}'", user)
        } else {
            return None;
        };

        Some(Diagnostic::new(
            RuleId::RootUser,
            &build.name,
            message,
            "Create an unprivileged user and switch to it with USER before the default command",
        ))
    }

    fn build_tool(&self, build: &BuildModel) -> Option<Diagnostic> {
        let stage = build.final_stage();
        let runs: Vec<&BuildStep> = stage.iter().filter(|s| s.kind == StepKind::Run).collect();

        for (position, step) in runs.iter().enumerate() {
            for segment in segments(&step.command) {
                let Some(manager) = self.tables.system_installs.first_match(segment) else {
                    continue;
                };
                let groups = virtual_names(segment);

                for tool in self.tables.build_tools.matches(segment) {
                    if self.removed(tool, &groups, &runs[position..]) {
                        continue;
                    }
                    return Some(Diagnostic::new(
                        RuleId::BuildTool,
                        &build.name,
                        format!(
                            "unnecessary build-time tool increases attack surface and image size: '{}' installed with {} at step {} stays in the final image",
                            tool.display_name(),
                            manager.display_name(),
                            step.index + 1
                        ),
                        format!(
                            "Install {} in a separate build stage, or remove it in the same RUN once it is no longer needed",
                            tool.display_name()
                        ),
                    ));
                }
            }
        }
        None
    }

    /// Removal evidence in this or a later RUN: the tool itself or its virtual package group
    fn removed(&self, tool: &PatternSpec, groups: &[&str], runs: &[&BuildStep]) -> bool {
        runs.iter()
            .flat_map(|step| segments(&step.command))
            .filter(|segment| self.tables.tool_removals.is_match(segment))
            .any(|segment| {
                self.tables.build_tools.matches(segment).any(|t| t == tool)
                    || segment.split_whitespace().any(|word| groups.contains(&word))
            })
    }
}

impl Default for ImageLayerAnalyzer {
    fn default() -> Self {
        Self::new(Arc::new(RuleTables::default()))
    }
}

impl Analyzer for ImageLayerAnalyzer {
    fn id(&self) -> &'static str {
        "image.layers.v1"
    }

    fn analyze(&self, input: &AnalysisInput) -> Vec<Diagnostic> {
        input
            .build
            .as_ref()
            .map(|build| self.analyze_build(build))
            .unwrap_or_default()
    }
}

/// Shell commands chained with `&&`, `||`, `;` or `|`
fn segments(command: &str) -> impl Iterator<Item = &str> {
    command
        .split(['&', '|', ';', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// `apk add --virtual NAME` / `-t NAME` package groups
fn virtual_names(segment: &str) -> Vec<&str> {
    let words: Vec<&str> = segment.split_whitespace().collect();
    let mut names = Vec::new();
    for (i, word) in words.iter().enumerate() {
        if let Some(name) = word.strip_prefix("--virtual=") {
            names.push(name);
        } else if *word == "--virtual" || *word == "-t" {
            if let Some(name) = words.get(i + 1) {
                names.push(*name);
            }
        }
    }
    names
}

fn basename(source: &str) -> &str {
    let trimmed = source.trim_end_matches('/');
    if trimmed.is_empty() {
        return source;
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
