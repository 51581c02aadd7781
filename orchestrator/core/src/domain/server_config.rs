// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Server Configuration Types
//
// Defines the configuration schema for a Vertice server process, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - One section per subsystem, each with its own enabled flag
// - Profiling output paths
// - Logging and box-log storage settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::domain::service::SubsystemKind;

pub const API_VERSION: &str = "vertice.io/v1";
pub const KIND: &str = "ServerConfig";

/// Top-level Kubernetes-style server configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfigManifest {
    /// API version (must be "vertice.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ServerConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable server name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Server configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub deployd: DeploydConfig,

    #[serde(default)]
    pub httpd: HttpdConfig,

    #[serde(default)]
    pub docker: DockerConfig,

    #[serde(default)]
    pub metricsd: MetricsdConfig,

    #[serde(default)]
    pub eventsd: EventsdConfig,

    #[serde(default)]
    pub dns: DnsConfig,

    #[serde(default)]
    pub profiling: ProfilingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub logs: LogStoreConfig,
}

impl ServerConfig {
    /// Whether the subsystem should be instantiated at all
    pub fn is_enabled(&self, kind: SubsystemKind) -> bool {
        match kind {
            SubsystemKind::Deployd => self.deployd.enabled,
            SubsystemKind::Httpd => self.httpd.enabled,
            SubsystemKind::Docker => self.docker.enabled,
            SubsystemKind::Metricsd => self.metricsd.enabled,
            SubsystemKind::Eventsd => self.eventsd.enabled,
            SubsystemKind::Dns => self.dns.enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploydConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Pending destroy requests accepted before the queue reports full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Destroys allowed to run at the same time
    #[serde(default = "default_max_concurrent_destroys")]
    pub max_concurrent_destroys: usize,
}

impl Default for DeploydConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: default_queue_capacity(),
            max_concurrent_destroys: default_max_concurrent_destroys(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpdConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_httpd_bind_address")]
    pub bind_address: String,
}

impl Default for HttpdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_httpd_bind_address(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Path to Docker socket
    /// Default: auto-detected by the Docker client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,

    /// Client request timeout in seconds
    #[serde(default = "default_docker_timeout")]
    pub timeout_seconds: u64,

    /// Grace period given to a container before it is killed
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_seconds: i32,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            socket_path: None,
            timeout_seconds: default_docker_timeout(),
            stop_timeout_seconds: default_stop_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsdConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_bind_address")]
    pub bind_address: String,
}

impl Default for MetricsdConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_metrics_bind_address(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsdConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Capacity of the lifecycle event bus
    #[serde(default = "default_event_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_dns_provider")]
    pub provider: String,

    /// Hosted zone boxes are registered under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_dns_provider(),
            zone: None,
            access_key: None,
            secret_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilingConfig {
    /// Write a CPU usage profile here while the server runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_profile: Option<PathBuf>,

    /// Write a heap snapshot here when the server closes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_profile: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStoreConfig {
    /// Directory holding one log file per box
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self { dir: default_log_dir() }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    256
}

fn default_max_concurrent_destroys() -> usize {
    4
}

fn default_httpd_bind_address() -> String {
    "localhost:7777".to_string()
}

fn default_docker_timeout() -> u64 {
    120
}

fn default_stop_timeout() -> i32 {
    10
}

fn default_metrics_bind_address() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_event_capacity() -> usize {
    1000
}

fn default_dns_provider() -> String {
    "route53".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("vertice").join("logs"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/vertice/logs"))
}

impl Default for ServerConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "vertice".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: ServerConfig::default(),
        }
    }
}

impl ServerConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Locations searched when no explicit path is given, highest precedence first
    pub fn search_paths() -> Vec<(&'static str, PathBuf)> {
        let mut paths = Vec::with_capacity(4);
        if let Ok(path) = std::env::var("VERTICE_CONFIG_PATH") {
            paths.push(("VERTICE_CONFIG_PATH", PathBuf::from(path)));
        }
        paths.push(("working directory", PathBuf::from("./vertice-config.yaml")));
        if let Some(home) = dirs::home_dir() {
            paths.push(("user", home.join(".vertice").join("config.yaml")));
        }
        paths.push(("system", PathBuf::from("/etc/vertice/config.yaml")));
        paths
    }

    /// First existing entry of [`Self::search_paths`]
    pub fn discover_config() -> Option<PathBuf> {
        Self::search_paths()
            .into_iter()
            .map(|(_, path)| path)
            .find(|path| path.exists())
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // An explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("VERTICE_HTTPD_BIND_ADDRESS") {
            tracing::info!("Environment override: VERTICE_HTTPD_BIND_ADDRESS={}", addr);
            self.spec.httpd.bind_address = addr;
        }

        if let Some(val) = lookup("VERTICE_DOCKER_ENABLED") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: VERTICE_DOCKER_ENABLED=true");
                    self.spec.docker.enabled = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: VERTICE_DOCKER_ENABLED=false");
                    self.spec.docker.enabled = false;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for VERTICE_DOCKER_ENABLED: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Some(path) = lookup("VERTICE_CPU_PROFILE") {
            self.spec.profiling.cpu_profile = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("VERTICE_MEM_PROFILE") {
            self.spec.profiling.mem_profile = Some(PathBuf::from(path));
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;

        if spec.httpd.enabled && spec.httpd.bind_address.trim().is_empty() {
            anyhow::bail!("httpd.bind_address cannot be empty when httpd is enabled");
        }

        if spec.metricsd.enabled && spec.metricsd.bind_address.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!(
                "metricsd.bind_address must be an ip:port pair, got '{}'",
                spec.metricsd.bind_address
            );
        }

        if spec.deployd.queue_capacity == 0 {
            anyhow::bail!("deployd.queue_capacity must be greater than zero");
        }

        if spec.deployd.max_concurrent_destroys == 0 {
            anyhow::bail!("deployd.max_concurrent_destroys must be greater than zero");
        }

        if spec.eventsd.channel_capacity == 0 {
            anyhow::bail!("eventsd.channel_capacity must be greater than zero");
        }

        if spec.dns.enabled && spec.dns.zone.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("dns.zone is required when dns is enabled");
        }

        Ok(())
    }

    /// Human-readable per-subsystem summary, secrets masked
    pub fn describe(&self) -> String {
        let spec = &self.spec;
        let mut out = String::new();

        let mut section = |name: &str, rows: &[(&str, String)]| {
            let _ = writeln!(out, "{:<24}{}", "Config:", name);
            for (key, value) in rows {
                let _ = writeln!(out, "{:<24}{}", key, value);
            }
            out.push('\n');
        };

        section(
            "deployd",
            &[
                ("Enabled", spec.deployd.enabled.to_string()),
                ("QueueCapacity", spec.deployd.queue_capacity.to_string()),
                ("MaxConcurrentDestroys", spec.deployd.max_concurrent_destroys.to_string()),
            ],
        );
        section(
            "httpd",
            &[
                ("Enabled", spec.httpd.enabled.to_string()),
                ("BindAddress", spec.httpd.bind_address.clone()),
            ],
        );
        section(
            "dockerd",
            &[
                ("Enabled", spec.docker.enabled.to_string()),
                (
                    "SocketPath",
                    spec.docker.socket_path.clone().unwrap_or_else(|| "auto".to_string()),
                ),
            ],
        );
        section(
            "metricsd",
            &[
                ("Enabled", spec.metricsd.enabled.to_string()),
                ("BindAddress", spec.metricsd.bind_address.clone()),
            ],
        );
        section(
            "eventsd",
            &[
                ("Enabled", spec.eventsd.enabled.to_string()),
                ("ChannelCapacity", spec.eventsd.channel_capacity.to_string()),
            ],
        );
        section(
            "dns",
            &[
                ("Enabled", spec.dns.enabled.to_string()),
                ("Provider", spec.dns.provider.clone()),
                ("Zone", spec.dns.zone.clone().unwrap_or_default()),
                (
                    "SecretKey",
                    if spec.dns.secret_key.is_some() { "********".to_string() } else { String::new() },
                ),
            ],
        );

        out
    }
}
