//! Compose-style topology descriptions
//!
//! Accepts the subset of the compose file format the analyzers look at:
//! `image`, `ports`, `networks`, `volumes`, `environment`, `env_file`,
//! `depends_on`, plus two extension keys for facts compose cannot express:
//! `x-listen-port` (the port the process binds) and `x-required-env` (the
//! variables it refuses to start without). Everything else is ignored.

use crate::env;
use crate::LoadOptions;
use serde::Deserialize;
use serde_yaml::Value;
use stackcheck_core::{
    EnvSource, MalformedInputError, RefKind, ServiceSpec, Topology, VolumeBinding,
    DEFAULT_NETWORK,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Upper bound on ports produced by one range entry
const MAX_PORT_RANGE: u32 = 1024;

#[derive(Debug, Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: Option<Value>,
    #[serde(default)]
    networks: Option<Names>,
    #[serde(default)]
    volumes: Option<Names>,
}

/// A list of names or a map keyed by name
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Names {
    List(Vec<String>),
    Map(BTreeMap<String, Value>),
}

impl Names {
    fn into_vec(self) -> Vec<String> {
        match self {
            Names::List(list) => list,
            Names::Map(map) => map.into_keys().collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawService {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    ports: Vec<Value>,
    #[serde(default)]
    networks: Option<Names>,
    #[serde(default)]
    volumes: Vec<RawVolume>,
    #[serde(default)]
    environment: Option<RawEnvironment>,
    #[serde(default)]
    env_file: Option<RawEnvFiles>,
    #[serde(default)]
    depends_on: Option<Names>,
    #[serde(default, alias = "x-listen-port")]
    listen_port: Option<Value>,
    #[serde(default, alias = "x-required-env")]
    required_env: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPort {
    Number(u32),
    Text(String),
    Long {
        target: u32,
        #[serde(default)]
        published: Option<Value>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawVolume {
    Short(String),
    Long {
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        source: Option<String>,
        target: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEnvironment {
    Map(BTreeMap<String, Option<Value>>),
    List(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEnvFiles {
    One(String),
    Many(Vec<RawEnvFile>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEnvFile {
    Path(String),
    Long {
        path: String,
        #[serde(default = "default_true")]
        required: bool,
    },
}

fn default_true() -> bool {
    true
}

/// Parse compose-style text into a validated topology
pub fn parse(text: &str, options: &LoadOptions) -> Result<Topology, MalformedInputError> {
    let file: ComposeFile = serde_yaml::from_str(text).map_err(|e| MalformedInputError::Parse {
        format: "topology".to_string(),
        message: e.to_string(),
    })?;

    let raw_services = file
        .services
        .ok_or_else(|| MalformedInputError::missing("services"))?;

    let entries = service_entries(raw_services)?;
    let mut services = Vec::with_capacity(entries.len());
    for (field, raw) in entries {
        services.push(to_service(field, raw, options)?);
    }

    let mut networks = file.networks.map(Names::into_vec).unwrap_or_default();
    if services.iter().any(|s| s.networks.contains(DEFAULT_NETWORK)) {
        networks.push(DEFAULT_NETWORK.to_string());
    }
    let volumes = file.volumes.map(Names::into_vec).unwrap_or_default();

    debug!(
        services = services.len(),
        networks = networks.len(),
        volumes = volumes.len(),
        "topology parsed"
    );
    Topology::new(services, networks, volumes)
}

/// `(field path, service)` pairs from map form or list form
fn service_entries(value: Value) -> Result<Vec<(String, RawService)>, MalformedInputError> {
    match value {
        Value::Mapping(map) => {
            let mut out = Vec::with_capacity(map.len());
            for (key, body) in map {
                let name = key
                    .as_str()
                    .ok_or_else(|| {
                        MalformedInputError::invalid("services", "service names must be strings")
                    })?
                    .to_string();
                let field = format!("services.{}", name);
                let mut raw = raw_service(body, &field)?;
                raw.name = Some(name);
                out.push((field, raw));
            }
            Ok(out)
        }
        Value::Sequence(list) => list
            .into_iter()
            .enumerate()
            .map(|(i, body)| {
                let field = format!("services[{}]", i);
                let mut raw = raw_service(body, &field)?;
                let name = raw
                    .name
                    .take()
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| MalformedInputError::missing(format!("{}.name", field)))?;
                let field = format!("services.{}", name);
                raw.name = Some(name);
                Ok((field, raw))
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        _ => Err(MalformedInputError::invalid(
            "services",
            "expected a mapping of services or a list of services",
        )),
    }
}

fn raw_service(body: Value, field: &str) -> Result<RawService, MalformedInputError> {
    match body {
        Value::Null => Ok(RawService::default()),
        Value::Mapping(_) => serde_yaml::from_value(body)
            .map_err(|e| MalformedInputError::invalid(field, e.to_string())),
        _ => Err(MalformedInputError::invalid(field, "service definition must be a mapping")),
    }
}

fn to_service(
    field: String,
    raw: RawService,
    options: &LoadOptions,
) -> Result<ServiceSpec, MalformedInputError> {
    let name = raw.name.unwrap_or_default();
    let mut service = ServiceSpec::new(name);
    service.image = raw.image;
    service.listen_port = raw
        .listen_port
        .map(|value| listen_port(value, &format!("{}.x-listen-port", field)))
        .transpose()?;

    for (i, port) in raw.ports.into_iter().enumerate() {
        let port_field = format!("{}.ports[{}]", field, i);
        for (host, container) in parse_port(port, &port_field)? {
            service = service.with_port(host, container);
        }
    }

    service.networks = raw
        .networks
        .map(Names::into_vec)
        .unwrap_or_default()
        .into_iter()
        .collect();
    if service.networks.is_empty() {
        service.networks.insert(DEFAULT_NETWORK.to_string());
    }

    for (i, volume) in raw.volumes.into_iter().enumerate() {
        if let Some(binding) = parse_volume(volume, &format!("{}.volumes[{}]", field, i))? {
            service = service.with_volume(binding);
        }
    }

    // env_file first: `environment` wins on conflict
    if let Some(files) = raw.env_file {
        provide_from_env_files(&mut service, files, &field, options)?;
    }
    if let Some(environment) = raw.environment {
        provide_from_environment(&mut service, environment, &field)?;
    }

    for (i, name) in raw.required_env.into_iter().enumerate() {
        if !env::is_valid_name(&name) {
            return Err(MalformedInputError::invalid(
                format!("{}.x-required-env[{}]", field, i),
                format!("'{}' is not a variable name", name),
            ));
        }
        service = service.with_required_env(name);
    }

    service.depends_on = raw
        .depends_on
        .map(Names::into_vec)
        .unwrap_or_default()
        .into_iter()
        .collect();

    Ok(service)
}

fn listen_port(value: Value, field: &str) -> Result<u16, MalformedInputError> {
    match value {
        Value::Number(n) => number_port(&n, field),
        Value::String(s) => parse_single(&s, field),
        _ => Err(MalformedInputError::invalid(field, "listen port must be a number")),
    }
}

/// Host bindings for one `ports` entry. Host port 0 means an ephemeral host port.
fn parse_port(port: Value, field: &str) -> Result<Vec<(u16, u16)>, MalformedInputError> {
    let port: RawPort = serde_yaml::from_value(port)
        .map_err(|e| MalformedInputError::invalid(field, e.to_string()))?;
    match port {
        RawPort::Number(container) => Ok(vec![(0, to_port(container, field)?)]),
        RawPort::Long { target, published } => {
            let container = to_port(target, field)?;
            let host = match published {
                None | Some(Value::Null) => 0,
                Some(Value::Number(n)) => number_port(&n, field)?,
                Some(Value::String(s)) => parse_single(&s, field)?,
                Some(_) => {
                    return Err(MalformedInputError::invalid(field, "published must be a port"));
                }
            };
            Ok(vec![(host, container)])
        }
        RawPort::Text(text) => parse_port_text(&text, field),
    }
}

/// `[IP:][HOST:]CONTAINER[/PROTO]`, where HOST and CONTAINER may be ranges
fn parse_port_text(text: &str, field: &str) -> Result<Vec<(u16, u16)>, MalformedInputError> {
    let spec = text.trim();
    let spec = spec.split_once('/').map(|(head, _)| head).unwrap_or(spec);

    // IPv6 host IPs are bracketed; take host and container from the right
    let mut parts = spec.rsplitn(3, ':');
    let container = parts.next().unwrap_or_default();
    let host = parts.next();

    let containers = parse_range(container, field)?;
    let hosts = match host {
        None | Some("") => vec![0; containers.len()],
        Some(host) => parse_range(host, field)?,
    };

    if hosts.len() != containers.len() {
        return Err(MalformedInputError::invalid(
            field,
            format!("host range and container range differ in size in '{}'", text),
        ));
    }

    Ok(hosts.into_iter().zip(containers).collect())
}

fn parse_range(text: &str, field: &str) -> Result<Vec<u16>, MalformedInputError> {
    match text.split_once('-') {
        Some((start, end)) => {
            let start = parse_single(start, field)?;
            let end = parse_single(end, field)?;
            if end < start || u32::from(end - start) >= MAX_PORT_RANGE {
                return Err(MalformedInputError::invalid(
                    field,
                    format!("invalid port range '{}'", text),
                ));
            }
            Ok((start..=end).collect())
        }
        None => Ok(vec![parse_single(text, field)?]),
    }
}

fn parse_single(text: &str, field: &str) -> Result<u16, MalformedInputError> {
    text.trim()
        .parse::<u16>()
        .map_err(|_| MalformedInputError::invalid(field, format!("'{}' is not a port", text)))
}

fn number_port(n: &serde_yaml::Number, field: &str) -> Result<u16, MalformedInputError> {
    n.as_u64()
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| MalformedInputError::invalid(field, format!("{} is not a port", n)))
}

fn to_port(value: u32, field: &str) -> Result<u16, MalformedInputError> {
    u16::try_from(value)
        .map_err(|_| MalformedInputError::invalid(field, format!("{} is not a port", value)))
}

/// Named or bind mount; `None` for anonymous volumes and tmpfs
fn parse_volume(
    volume: RawVolume,
    field: &str,
) -> Result<Option<VolumeBinding>, MalformedInputError> {
    match volume {
        RawVolume::Short(text) => {
            let mut parts = text.splitn(3, ':');
            let first = parts.next().unwrap_or_default().trim();
            let Some(target) = parts.next() else {
                if first.is_empty() {
                    return Err(MalformedInputError::invalid(field, "empty volume entry"));
                }
                return Ok(None);
            };
            if first.is_empty() || target.trim().is_empty() {
                return Err(MalformedInputError::invalid(
                    field,
                    format!("invalid volume '{}'", text),
                ));
            }
            Ok(Some(binding(first, target.trim())))
        }
        RawVolume::Long { kind, source, target } => match (kind.as_deref(), source) {
            (Some("tmpfs"), _) | (_, None) => Ok(None),
            (Some("bind"), Some(source)) => Ok(Some(VolumeBinding::bind(source, target))),
            (Some("volume"), Some(source)) => Ok(Some(VolumeBinding::named(source, target))),
            (None, Some(source)) => Ok(Some(binding(&source, &target))),
            (Some(other), Some(_)) => Err(MalformedInputError::invalid(
                field,
                format!("unsupported volume type '{}'", other),
            )),
        },
    }
}

fn binding(source: &str, target: &str) -> VolumeBinding {
    if is_host_path(source) {
        VolumeBinding::bind(source, target)
    } else {
        VolumeBinding::named(source, target)
    }
}

fn is_host_path(source: &str) -> bool {
    source.starts_with('/')
        || source.starts_with('.')
        || source.starts_with('~')
        || source.contains('/')
}

fn provide_from_environment(
    service: &mut ServiceSpec,
    environment: RawEnvironment,
    field: &str,
) -> Result<(), MalformedInputError> {
    let entries: Vec<(String, Option<String>)> = match environment {
        RawEnvironment::Map(map) => map
            .into_iter()
            .map(|(key, value)| (key, value.and_then(scalar_text)))
            .collect(),
        RawEnvironment::List(list) => list
            .iter()
            .map(|entry| {
                let (key, value) = env::split_assignment(entry);
                (key.to_string(), value.map(str::to_string))
            })
            .collect(),
    };

    for (key, value) in entries {
        if !env::is_valid_name(&key) {
            return Err(MalformedInputError::invalid(
                format!("{}.environment", field),
                format!("'{}' is not a variable name", key),
            ));
        }
        // No value: passed through from the caller's shell
        let source = value.as_deref().map(env::classify).unwrap_or(EnvSource::Interpolated);
        service.provided_env.insert(key, source);
    }
    Ok(())
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn provide_from_env_files(
    service: &mut ServiceSpec,
    files: RawEnvFiles,
    field: &str,
    options: &LoadOptions,
) -> Result<(), MalformedInputError> {
    let files: Vec<(String, bool)> = match files {
        RawEnvFiles::One(path) => vec![(path, true)],
        RawEnvFiles::Many(list) => list
            .into_iter()
            .map(|f| match f {
                RawEnvFile::Path(path) => (path, true),
                RawEnvFile::Long { path, required } => (path, required),
            })
            .collect(),
    };

    for (path, required) in files {
        match options.env_file(&path) {
            Some(contents) => {
                for name in env::env_file_names(contents) {
                    service
                        .provided_env
                        .insert(name, EnvSource::EnvFile { path: path.clone() });
                }
            }
            None if required => {
                return Err(MalformedInputError::dangling(
                    format!("{}.env_file", field),
                    RefKind::EnvFile,
                    path,
                ));
            }
            None => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackcheck_core::{MountKind, PortBinding};

    fn load(text: &str) -> Result<Topology, MalformedInputError> {
        parse(text, &LoadOptions::default())
    }

    #[test]
    fn test_port_forms() {
        assert_eq!(parse_port_text("3000:8080", "p").unwrap(), vec![(3000, 8080)]);
        assert_eq!(parse_port_text("127.0.0.1:80:80/tcp", "p").unwrap(), vec![(80, 80)]);
        assert_eq!(parse_port_text("9090", "p").unwrap(), vec![(0, 9090)]);
        assert_eq!(parse_port_text("127.0.0.1::5432", "p").unwrap(), vec![(0, 5432)]);
        assert_eq!(
            parse_port_text("8000-8001:9000-9001", "p").unwrap(),
            vec![(8000, 9000), (8001, 9001)]
        );
        assert!(parse_port_text("8000-8002:9000", "p").is_err());
        assert!(parse_port_text("http:80", "p").is_err());
    }

    #[test]
    fn test_map_form_services() {
        let topology = load(
            r#"
services:
  web:
    image: nginx:alpine
    ports: ["80:8080", {target: 443, published: "8443"}]
    networks: [frontend]
    x-listen-port: 8080
  api:
    image: node:20
    networks:
      frontend: {}
      backend: {}
    depends_on:
      db:
        condition: service_healthy
  db:
    image: postgres:16
    networks: [backend]
    volumes:
      - pgdata:/var/lib/postgresql/data
      - ./init.sql:/docker-entrypoint-initdb.d/init.sql:ro
networks:
  frontend:
  backend:
volumes:
  pgdata:
"#,
        )
        .unwrap();

        let web = topology.service("web").unwrap();
        assert!(web.host_ports.contains(&PortBinding::new(80, 8080)));
        assert!(web.host_ports.contains(&PortBinding::new(8443, 443)));
        assert_eq!(web.listen_port, Some(8080));

        let api = topology.service("api").unwrap();
        assert_eq!(api.networks.len(), 2);
        assert!(api.depends_on.contains("db"));

        let db = topology.service("db").unwrap();
        let kinds: Vec<MountKind> = db.volumes.iter().map(|v| v.kind).collect();
        assert!(kinds.contains(&MountKind::Named));
        assert!(kinds.contains(&MountKind::Bind));
    }

    #[test]
    fn test_list_form_requires_name() {
        let err = load("services:\n  - image: redis\n").unwrap_err();
        assert_eq!(err.field(), "services[0].name");

        let topology = load("services:\n  - name: cache\n    image: redis\n").unwrap();
        assert!(topology.service("cache").is_some());
    }

    #[test]
    fn test_missing_services_key() {
        let err = load("networks: {}\n").unwrap_err();
        assert_eq!(err.field(), "services");
    }

    #[test]
    fn test_services_without_networks_join_default() {
        let topology = load("services:\n  a:\n    depends_on: [b]\n  b:\n").unwrap();
        assert!(topology.networks().contains(DEFAULT_NETWORK));
        assert!(topology.service("a").unwrap().networks.contains(DEFAULT_NETWORK));
    }

    #[test]
    fn test_dangling_references() {
        let err = load("services:\n  a:\n    networks: [ghost]\n").unwrap_err();
        assert_eq!(
            err,
            MalformedInputError::dangling("services.a.networks", RefKind::Network, "ghost")
        );

        let err = load("services:\n  a:\n    volumes: [\"data:/data\"]\n").unwrap_err();
        assert_eq!(err.field(), "services.a.volumes");

        let err = load("services:\n  a:\n    depends_on: [b]\n").unwrap_err();
        assert_eq!(err.field(), "services.a.depends_on");
    }

    #[test]
    fn test_environment_sources() {
        let topology = load(
            r#"
services:
  api:
    environment:
      NODE_ENV: production
      PORT: 8080
      DB_PASSWORD: ${DB_PASSWORD}
      SHELL_VALUE:
      TOKEN_FILE: /run/secrets/token
    x-required-env: [DB_PASSWORD, API_KEY]
"#,
        )
        .unwrap();

        let api = topology.service("api").unwrap();
        assert_eq!(api.provided_env["NODE_ENV"], EnvSource::Inline);
        assert_eq!(api.provided_env["PORT"], EnvSource::Inline);
        assert_eq!(api.provided_env["DB_PASSWORD"], EnvSource::Interpolated);
        assert_eq!(api.provided_env["SHELL_VALUE"], EnvSource::Interpolated);
        assert!(matches!(api.provided_env["TOKEN_FILE"], EnvSource::SecretFile { .. }));
        assert_eq!(api.missing_env().collect::<Vec<_>>(), vec!["API_KEY"]);
    }

    #[test]
    fn test_list_environment() {
        let text = "services:\n  api:\n    environment:\n      - API_KEY=abc\n      - HOME\n";
        let topology = load(text).unwrap();
        let api = topology.service("api").unwrap();
        assert_eq!(api.provided_env["API_KEY"], EnvSource::Inline);
        assert_eq!(api.provided_env["HOME"], EnvSource::Interpolated);
    }

    #[test]
    fn test_env_files_come_from_options() {
        let text =
            "services:\n  api:\n    env_file: .env\n    environment:\n      LOG_LEVEL: debug\n";

        let err = load(text).unwrap_err();
        assert_eq!(
            err,
            MalformedInputError::dangling("services.api.env_file", RefKind::EnvFile, ".env")
        );

        let options =
            LoadOptions::default().with_env_file(".env", "API_KEY=secret\nLOG_LEVEL=info\n");
        let topology = parse(text, &options).unwrap();
        let api = topology.service("api").unwrap();
        assert_eq!(
            api.provided_env["API_KEY"],
            EnvSource::EnvFile { path: ".env".to_string() }
        );
        assert_eq!(api.provided_env["LOG_LEVEL"], EnvSource::Inline);
    }

    #[test]
    fn test_optional_env_file_may_be_absent() {
        let text =
            "services:\n  api:\n    env_file:\n      - path: .env.local\n        required: false\n";
        assert!(load(text).is_ok());
    }

    #[test]
    fn test_invalid_service_body() {
        let err = load("services:\n  api: 42\n").unwrap_err();
        assert_eq!(err.field(), "services.api");

        let err = load("services:\n  api:\n    ports: [\"eighty:80\"]\n").unwrap_err();
        assert_eq!(err.field(), "services.api.ports[0]");
    }

    #[test]
    fn test_bad_port_values_name_their_entry() {
        let err = load("services:\n  api:\n    x-listen-port: 70000\n").unwrap_err();
        assert_eq!(err.field(), "services.api.x-listen-port");

        let err = load("services:\n  api:\n    ports: [\"80:80\", {target: http}]\n").unwrap_err();
        assert_eq!(err.field(), "services.api.ports[1]");

        let text = "services:\n  api:\n    ports: [{target: 80, published: [1]}]\n";
        let err = load(text).unwrap_err();
        assert_eq!(err.field(), "services.api.ports[0]");

        let topology = load("services:\n  api:\n    x-listen-port: \"8080\"\n").unwrap();
        assert_eq!(topology.service("api").unwrap().listen_port, Some(8080));
    }
}
