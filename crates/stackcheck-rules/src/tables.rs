//! Built-in rule tables
//!
//! Each heuristic the analyzers apply (what counts as a dependency install,
//! a manifest file, a stateful service, a credential) lives here as data.
//! Profiles extend or replace these tables without touching analyzer code.

use crate::pattern::{PatternSet, PatternSpec};
use crate::RuleError;
use lazy_static::lazy_static;

lazy_static! {
    static ref BUILTIN: RuleTables = RuleTables::builtin().unwrap();
}

/// Every table the analyzers consult
#[derive(Debug, Clone)]
pub struct RuleTables {
    /// RUN commands that install dependencies from a manifest
    pub dependency_installs: PatternSet,
    /// Basenames of dependency manifests (narrow COPY sources)
    pub dependency_manifests: PatternSet,
    /// RUN commands that install OS packages
    pub system_installs: PatternSet,
    /// Packages unnecessary at runtime (version control clients)
    pub build_tools: PatternSet,
    /// RUN commands that remove OS packages
    pub tool_removals: PatternSet,
    /// Service names or images that hold state
    pub stateful_services: PatternSet,
    /// Environment variable names that carry credentials
    pub credential_env: PatternSet,
    /// USER values that mean root
    pub root_users: PatternSet,
}

impl RuleTables {
    fn builtin() -> Result<Self, RuleError> {
        Ok(Self {
            dependency_installs: PatternSet::compile(
                "dependency_installs",
                vec![
                    PatternSpec::regex(r"\bnpm\s+(ci|install|i)\b").label("npm"),
                    PatternSpec::regex(r"\byarn(\s+install)?\s+--(frozen-lockfile|immutable)\b")
                        .label("yarn"),
                    PatternSpec::regex(r"\byarn\s+install\b").label("yarn"),
                    PatternSpec::regex(r"\bpnpm\s+(install|i)\b").label("pnpm"),
                    PatternSpec::regex(r"\bpip3?\s+install\b").label("pip"),
                    PatternSpec::regex(r"\bpoetry\s+install\b").label("poetry"),
                    PatternSpec::regex(r"\bpipenv\s+install\b").label("pipenv"),
                    PatternSpec::regex(r"\buv\s+(sync|pip\s+install)\b").label("uv"),
                    PatternSpec::regex(r"\bbundle\s+install\b").label("bundler"),
                    PatternSpec::regex(r"\bcomposer\s+install\b").label("composer"),
                    PatternSpec::regex(r"\bgo\s+mod\s+download\b").label("go"),
                    PatternSpec::regex(r"\bcargo\s+(fetch|build)\b").label("cargo"),
                    PatternSpec::regex(r"\bmvn\b.*\bdependency:go-offline\b").label("maven"),
                    PatternSpec::regex(r"\bgradle\b.*\bdependencies\b").label("gradle"),
                    PatternSpec::regex(r"\bdotnet\s+restore\b").label("dotnet"),
                    PatternSpec::regex(r"\bmix\s+deps\.get\b").label("mix"),
                ],
            )?,
            dependency_manifests: PatternSet::compile(
                "dependency_manifests",
                [
                    "package.json",
                    "package-lock.json",
                    "package*.json",
                    "npm-shrinkwrap.json",
                    ".npmrc",
                    "yarn.lock",
                    ".yarnrc.yml",
                    "pnpm-lock.yaml",
                    "requirements.txt",
                    "requirements*.txt",
                    "Pipfile",
                    "Pipfile.lock",
                    "pyproject.toml",
                    "poetry.lock",
                    "uv.lock",
                    "setup.py",
                    "setup.cfg",
                    "Gemfile",
                    "Gemfile.lock",
                    "go.mod",
                    "go.sum",
                    "Cargo.toml",
                    "Cargo.lock",
                    "pom.xml",
                    "build.gradle",
                    "build.gradle.kts",
                    "settings.gradle",
                    "gradle.properties",
                    "composer.json",
                    "composer.lock",
                    "mix.exs",
                    "mix.lock",
                ]
                .into_iter()
                .map(PatternSpec::exact)
                .chain([
                    PatternSpec::regex(r"^requirements[\w.-]*\.txt$"),
                    PatternSpec::regex(r"^[\w.-]+\.csproj$"),
                ])
                .collect(),
            )?,
            system_installs: PatternSet::compile(
                "system_installs",
                vec![
                    PatternSpec::regex(r"\bapt-get\s+(-\S+\s+)*install\b").label("apt-get"),
                    PatternSpec::regex(r"\bapt\s+(-\S+\s+)*install\b").label("apt"),
                    PatternSpec::regex(r"\bapk\s+(-\S+\s+)*add\b").label("apk"),
                    PatternSpec::regex(r"\byum\s+(-\S+\s+)*install\b").label("yum"),
                    PatternSpec::regex(r"\b(micro)?dnf\s+(-\S+\s+)*install\b").label("dnf"),
                    PatternSpec::regex(r"\bzypper\s+(-\S+\s+)*(in|install)\b").label("zypper"),
                ],
            )?,
            build_tools: PatternSet::compile(
                "build_tools",
                vec![
                    PatternSpec::word("git"),
                    PatternSpec::word("subversion").label("svn"),
                    PatternSpec::word("svn"),
                    PatternSpec::word("mercurial").label("hg"),
                    PatternSpec::word("bzr"),
                ],
            )?,
            tool_removals: PatternSet::compile(
                "tool_removals",
                vec![
                    PatternSpec::regex(r"\bapt-get\s+(-\S+\s+)*(purge|remove|autoremove)\b"),
                    PatternSpec::regex(r"\bapt\s+(-\S+\s+)*(purge|remove)\b"),
                    PatternSpec::regex(r"\bapk\s+(-\S+\s+)*del\b"),
                    PatternSpec::regex(r"\byum\s+(-\S+\s+)*(remove|erase)\b"),
                    PatternSpec::regex(r"\b(micro)?dnf\s+(-\S+\s+)*remove\b"),
                ],
            )?,
            stateful_services: PatternSet::compile(
                "stateful_services",
                [
                    "postgres",
                    "postgresql",
                    "mysql",
                    "mariadb",
                    "mongo",
                    "mongodb",
                    "redis",
                    "elasticsearch",
                    "opensearch",
                    "cassandra",
                    "couchdb",
                    "influxdb",
                    "neo4j",
                    "clickhouse",
                    "cockroachdb",
                    "minio",
                    "rabbitmq",
                    "database",
                ]
                .into_iter()
                .map(PatternSpec::word)
                .chain([PatternSpec::regex(r"(^|[^a-z0-9])db([^a-z0-9]|$)").label("db")])
                .collect(),
            )?,
            credential_env: PatternSet::compile(
                "credential_env",
                vec![
                    PatternSpec::regex(r"pass(word|wd)").label("password"),
                    PatternSpec::contains("secret"),
                    PatternSpec::contains("token"),
                    PatternSpec::regex(r"(api|access|private|secret)_?key").label("key"),
                    PatternSpec::regex(r"_key$").label("key"),
                    PatternSpec::contains("credential"),
                ],
            )?,
            root_users: PatternSet::compile(
                "root_users",
                vec![
                    PatternSpec::exact("root"),
                    PatternSpec::exact("0"),
                    PatternSpec::regex(r"^(root|0):"),
                ],
            )?,
        })
    }

    /// Look up a table by its profile key
    pub fn table_mut(&mut self, name: &str) -> Option<&mut PatternSet> {
        match name {
            "dependency_installs" => Some(&mut self.dependency_installs),
            "dependency_manifests" => Some(&mut self.dependency_manifests),
            "system_installs" => Some(&mut self.system_installs),
            "build_tools" => Some(&mut self.build_tools),
            "tool_removals" => Some(&mut self.tool_removals),
            "stateful_services" => Some(&mut self.stateful_services),
            "credential_env" => Some(&mut self.credential_env),
            "root_users" => Some(&mut self.root_users),
            _ => None,
        }
    }

    pub const TABLE_NAMES: [&'static str; 8] = [
        "dependency_installs",
        "dependency_manifests",
        "system_installs",
        "build_tools",
        "tool_removals",
        "stateful_services",
        "credential_env",
        "root_users",
    ];
}

impl Default for RuleTables {
    fn default() -> Self {
        BUILTIN.clone()
    }
}
