//! In-memory model of an image build and a multi-service topology
//!
//! Both models are built once by the loader and never mutated afterwards.
//! `Topology::new` enforces the structural invariants (unique names, no
//! dangling references), so an analyzer can assume every reference resolves.

use crate::error::{MalformedInputError, RefKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// User a build runs as when no USER step is declared
pub const IMPLICIT_ROOT: &str = "root";

/// Network compose attaches a service to when it names none
pub const DEFAULT_NETWORK: &str = "default";

// ============================================================================
// BUILD MODEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Copy,
    Run,
    User,
    Expose,
    Other,
}

/// One ordered build step (layer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStep {
    /// Position in the build, assigned by `BuildModel`
    pub index: usize,
    pub kind: StepKind,
    /// Upper-cased keyword as written (`COPY`, `ADD`, `FROM`, ...)
    pub instruction: String,
    /// Path patterns copied into the image (COPY/ADD only)
    pub sources: BTreeSet<String>,
    /// `COPY --from=<stage>`: copies from another stage, not the build context
    pub from_stage: Option<String>,
    /// Argument text: RUN command, USER value, EXPOSE ports, raw args otherwise
    pub command: String,
}

impl BuildStep {
    fn bare(kind: StepKind, instruction: &str, command: impl Into<String>) -> Self {
        Self {
            index: 0,
            kind,
            instruction: instruction.to_string(),
            sources: BTreeSet::new(),
            from_stage: None,
            command: command.into(),
        }
    }

    pub fn copy<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut step = Self::bare(StepKind::Copy, "COPY", String::new());
        step.sources = sources.into_iter().map(Into::into).collect();
        step
    }

    pub fn run(command: impl Into<String>) -> Self {
        Self::bare(StepKind::Run, "RUN", command)
    }

    pub fn user(user: impl Into<String>) -> Self {
        Self::bare(StepKind::User, "USER", user)
    }

    pub fn expose(ports: impl Into<String>) -> Self {
        Self::bare(StepKind::Expose, "EXPOSE", ports)
    }

    /// Start of a build stage
    pub fn from(image: impl Into<String>) -> Self {
        Self::bare(StepKind::Other, "FROM", image)
    }

    pub fn other(instruction: &str, args: impl Into<String>) -> Self {
        Self::bare(StepKind::Other, &instruction.to_ascii_uppercase(), args)
    }

    pub fn with_instruction(mut self, instruction: &str) -> Self {
        self.instruction = instruction.to_ascii_uppercase();
        self
    }

    pub fn with_from_stage(mut self, stage: impl Into<String>) -> Self {
        self.from_stage = Some(stage.into());
        self
    }

    /// Copy from the build context (as opposed to another stage)
    pub fn is_context_copy(&self) -> bool {
        self.kind == StepKind::Copy && self.from_stage.is_none()
    }

    pub fn is_stage_start(&self) -> bool {
        self.kind == StepKind::Other && self.instruction == "FROM"
    }
}

/// One image build: an ordered list of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildModel {
    pub name: String,
    steps: Vec<BuildStep>,
}

impl BuildModel {
    pub fn new(steps: Vec<BuildStep>) -> Self {
        Self::named("image", steps)
    }

    pub fn named(name: impl Into<String>, steps: Vec<BuildStep>) -> Self {
        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(index, mut step)| {
                step.index = index;
                step
            })
            .collect();

        Self {
            name: name.into(),
            steps,
        }
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Split into stages at each `FROM`. Steps before the first `FROM`
    /// (global ARGs) belong to no stage. A build without `FROM` is one stage.
    pub fn stages(&self) -> Vec<&[BuildStep]> {
        let starts: Vec<usize> = self
            .steps
            .iter()
            .filter(|s| s.is_stage_start())
            .map(|s| s.index)
            .collect();

        if starts.is_empty() {
            return vec![&self.steps[..]];
        }

        starts
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end = starts.get(i + 1).copied().unwrap_or(self.steps.len());
                &self.steps[start..end]
            })
            .collect()
    }

    pub fn final_stage(&self) -> &[BuildStep] {
        self.stages().last().copied().unwrap_or(&[])
    }

    /// Last USER of the final stage, or the implicit root user
    pub fn final_user(&self) -> &str {
        self.final_stage()
            .iter()
            .rev()
            .find(|s| s.kind == StepKind::User)
            .map(|s| s.command.trim())
            .unwrap_or(IMPLICIT_ROOT)
    }
}

// ============================================================================
// TOPOLOGY MODEL
// ============================================================================

/// A `(hostPort, containerPort)` publication
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
}

impl PortBinding {
    pub fn new(host: u16, container: u16) -> Self {
        Self { host, container }
    }
}

impl fmt::Display for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// Declared named volume
    Named,
    /// Host path
    Bind,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VolumeBinding {
    pub source: String,
    pub mount_path: String,
    pub kind: MountKind,
}

impl VolumeBinding {
    pub fn named(volume: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            source: volume.into(),
            mount_path: mount_path.into(),
            kind: MountKind::Named,
        }
    }

    pub fn bind(host_path: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            source: host_path.into(),
            mount_path: mount_path.into(),
            kind: MountKind::Bind,
        }
    }
}

/// Where a provided environment variable gets its value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvSource {
    /// Literal value written in the topology
    Inline,
    /// `${VAR}` substitution from the caller's environment
    Interpolated,
    EnvFile { path: String },
    /// Path into a mounted secret store (`/run/secrets/...`)
    SecretFile { path: String },
}

impl EnvSource {
    pub fn is_external(&self) -> bool {
        !matches!(self, EnvSource::Inline)
    }
}

/// One service in a topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSpec {
    pub name: String,
    pub image: Option<String>,
    pub networks: BTreeSet<String>,
    pub host_ports: BTreeSet<PortBinding>,
    /// Port the process binds inside the container, when known
    pub listen_port: Option<u16>,
    pub volumes: BTreeSet<VolumeBinding>,
    pub required_env: BTreeSet<String>,
    pub provided_env: BTreeMap<String, EnvSource>,
    pub depends_on: BTreeSet<String>,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            networks: BTreeSet::new(),
            host_ports: BTreeSet::new(),
            listen_port: None,
            volumes: BTreeSet::new(),
            required_env: BTreeSet::new(),
            provided_env: BTreeMap::new(),
            depends_on: BTreeSet::new(),
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.networks.insert(network.into());
        self
    }

    pub fn with_port(mut self, host: u16, container: u16) -> Self {
        self.host_ports.insert(PortBinding::new(host, container));
        self
    }

    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    pub fn with_volume(mut self, volume: VolumeBinding) -> Self {
        self.volumes.insert(volume);
        self
    }

    pub fn with_required_env(mut self, name: impl Into<String>) -> Self {
        self.required_env.insert(name.into());
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, source: EnvSource) -> Self {
        self.provided_env.insert(name.into(), source);
        self
    }

    pub fn with_dependency(mut self, service: impl Into<String>) -> Self {
        self.depends_on.insert(service.into());
        self
    }

    /// Published ports or required variables: something to check at runtime
    pub fn has_runtime_contract(&self) -> bool {
        !self.host_ports.is_empty() || !self.required_env.is_empty()
    }

    /// Required variables nobody supplies, in name order
    pub fn missing_env(&self) -> impl Iterator<Item = &str> {
        self.required_env
            .iter()
            .filter(move |name| !self.provided_env.contains_key(*name))
            .map(String::as_str)
    }

    pub fn shared_networks<'a>(&'a self, other: &'a ServiceSpec) -> impl Iterator<Item = &'a str> {
        self.networks
            .intersection(&other.networks)
            .map(String::as_str)
    }
}

/// Services plus the declared networks and named volumes they use
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topology {
    services: BTreeMap<String, ServiceSpec>,
    networks: BTreeSet<String>,
    volumes: BTreeSet<String>,
}

impl Topology {
    /// Build a topology, rejecting duplicate names and dangling references
    pub fn new<N, V>(
        services: Vec<ServiceSpec>,
        networks: N,
        volumes: V,
    ) -> Result<Self, MalformedInputError>
    where
        N: IntoIterator,
        N::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        let networks: BTreeSet<String> = networks.into_iter().map(Into::into).collect();
        let volumes: BTreeSet<String> = volumes.into_iter().map(Into::into).collect();

        let mut by_name = BTreeMap::new();
        for service in services {
            if service.name.trim().is_empty() {
                return Err(MalformedInputError::missing("services[].name"));
            }
            if by_name.contains_key(&service.name) {
                return Err(MalformedInputError::DuplicateService { name: service.name });
            }
            by_name.insert(service.name.clone(), service);
        }

        for (name, service) in &by_name {
            if let Some(network) = service.networks.iter().find(|n| !networks.contains(*n)) {
                return Err(MalformedInputError::dangling(
                    format!("services.{}.networks", name),
                    RefKind::Network,
                    network,
                ));
            }

            if let Some(volume) = service
                .volumes
                .iter()
                .find(|v| v.kind == MountKind::Named && !volumes.contains(&v.source))
            {
                return Err(MalformedInputError::dangling(
                    format!("services.{}.volumes", name),
                    RefKind::Volume,
                    &volume.source,
                ));
            }

            for dependency in &service.depends_on {
                if dependency == name {
                    return Err(MalformedInputError::invalid(
                        format!("services.{}.depends_on", name),
                        "service cannot depend on itself",
                    ));
                }
                if !by_name.contains_key(dependency) {
                    return Err(MalformedInputError::dangling(
                        format!("services.{}.depends_on", name),
                        RefKind::Service,
                        dependency,
                    ));
                }
            }
        }

        Ok(Self {
            services: by_name,
            networks,
            volumes,
        })
    }

    /// Services in name order
    pub fn services(&self) -> impl Iterator<Item = &ServiceSpec> {
        self.services.values()
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.get(name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn networks(&self) -> &BTreeSet<String> {
        &self.networks
    }

    pub fn volumes(&self) -> &BTreeSet<String> {
        &self.volumes
    }

    /// Services that list `name` in their `depends_on`, in name order
    pub fn dependents_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ServiceSpec> {
        self.services
            .values()
            .filter(move |s| s.depends_on.contains(name))
    }

    /// Whether another service depends on `name` (an internal tier)
    pub fn is_dependency_target(&self, name: &str) -> bool {
        self.dependents_of(name).next().is_some()
    }
}
