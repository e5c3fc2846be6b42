//! Fleet configuration loaded from TOML
//!
//! Every section is optional. An empty file yields the built-in platform fleet
//! with default monitor, socket and routing settings.

use crate::registry::fleet::{self, FleetDefinition};
use crate::registry::SpecialistSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FleetConfig {
    #[serde(default)]
    pub fleet: FleetSection,
    /// Explicit specialists; the built-in fleet is used when empty
    #[serde(default)]
    pub specialists: Vec<SpecialistEntry>,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub socket: SocketSection,
    #[serde(default)]
    pub routing: RoutingSection,
    #[serde(default)]
    pub status_server: StatusServerSection,
}

/// Where the fleet lives and how ports are numbered
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FleetSection {
    #[serde(default = "default_host")]
    pub host: String,
    /// First component port (default: 8000)
    #[serde(default = "default_port_base")]
    pub port_base: u16,
    /// First specialist port (default: 45000)
    #[serde(default = "default_ai_port_base")]
    pub ai_port_base: u16,
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port_base: default_port_base(),
            ai_port_base: default_ai_port_base(),
        }
    }
}

fn default_host() -> String {
    fleet::DEFAULT_HOST.to_string()
}

fn default_port_base() -> u16 {
    fleet::COMPONENT_PORT_BASE
}

fn default_ai_port_base() -> u16 {
    fleet::AI_PORT_BASE
}

/// One `[[specialists]]` entry
///
/// The port is `port` when given, otherwise derived from `component_port`.
/// Capabilities and roles default to the component's built-in profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecialistEntry {
    pub component: String,
    /// Defaults to `<component>-ai`
    pub id: Option<String>,
    pub port: Option<u16>,
    pub component_port: Option<u16>,
    /// Defaults to `[fleet].host`
    pub host: Option<String>,
    pub name: Option<String>,
    pub model: Option<String>,
    pub capabilities: Option<Vec<String>>,
    pub roles: Option<Vec<String>>,
}

/// Health monitor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorSection {
    /// Seconds between probe rounds (default: 30)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Successful probes slower than this mark the specialist Degraded
    #[serde(default = "default_slow_response_ms")]
    pub slow_response_ms: u64,
    /// Success rates below this mark the specialist Degraded
    #[serde(default = "default_degraded_success_rate")]
    pub degraded_success_rate: f64,
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            slow_response_ms: default_slow_response_ms(),
            degraded_success_rate: default_degraded_success_rate(),
            max_concurrent_probes: default_max_concurrent_probes(),
        }
    }
}

fn default_interval_secs() -> u64 {
    30
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_slow_response_ms() -> u64 {
    1000
}

fn default_degraded_success_rate() -> f64 {
    0.5
}

fn default_max_concurrent_probes() -> usize {
    16
}

/// Socket client timeouts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocketSection {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Default reply timeout for content messages
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for SocketSection {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Routing engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingSection {
    /// Load the built-in rules (default: true)
    #[serde(default = "default_true")]
    pub use_default_rules: bool,
    /// Specialists tried per dispatched message (default: 2)
    #[serde(default = "default_dispatch_attempts")]
    pub dispatch_attempts: usize,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            use_default_rules: true,
            dispatch_attempts: default_dispatch_attempts(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_dispatch_attempts() -> usize {
    2
}

/// HTTP status endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusServerSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_status_bind")]
    pub bind: String,
    #[serde(default = "default_status_port")]
    pub port: u16,
}

impl Default for StatusServerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_status_bind(),
            port: default_status_port(),
        }
    }
}

fn default_status_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_status_port() -> u16 {
    8090
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ConfigError {
    fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig(message.into())
    }
}

impl FleetConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: FleetConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and resolve the fleet once to catch id/port problems
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.interval_secs == 0 {
            return Err(ConfigError::invalid("monitor.interval_secs must be at least 1"));
        }
        if self.monitor.probe_timeout_ms == 0 {
            return Err(ConfigError::invalid("monitor.probe_timeout_ms must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.monitor.degraded_success_rate) {
            return Err(ConfigError::invalid(format!(
                "monitor.degraded_success_rate must be within [0, 1], got {}",
                self.monitor.degraded_success_rate
            )));
        }
        if self.socket.connect_timeout_ms == 0 || self.socket.request_timeout_ms == 0 {
            return Err(ConfigError::invalid("socket timeouts must be at least 1 ms"));
        }
        if self.routing.dispatch_attempts == 0 {
            return Err(ConfigError::invalid("routing.dispatch_attempts must be at least 1"));
        }

        let fleet = self.fleet_definition()?;
        let mut seen = HashSet::new();
        for spec in fleet.specs() {
            if !seen.insert(spec.id.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate specialist id '{}'",
                    spec.id
                )));
            }
        }
        Ok(())
    }

    /// Resolve the configured specialists, or the built-in fleet when none are listed
    pub fn fleet_definition(&self) -> Result<FleetDefinition, ConfigError> {
        if self.specialists.is_empty() {
            return Ok(FleetDefinition::platform(
                &self.fleet.host,
                self.fleet.ai_port_base,
            ));
        }

        self.specialists
            .iter()
            .map(|entry| self.resolve_entry(entry))
            .collect::<Result<Vec<_>, _>>()
            .map(FleetDefinition::new)
    }

    fn resolve_entry(&self, entry: &SpecialistEntry) -> Result<SpecialistSpec, ConfigError> {
        let component = entry.component.trim();
        if component.is_empty() {
            return Err(ConfigError::invalid("specialist entry with empty component"));
        }

        let port = match (entry.port, entry.component_port) {
            (Some(port), _) => port,
            (None, Some(component_port)) => fleet::ai_port_for(
                component_port,
                self.fleet.port_base,
                self.fleet.ai_port_base,
            )
            .ok_or_else(|| {
                ConfigError::invalid(format!(
                    "component port {component_port} of '{component}' cannot be mapped from base {} to base {}",
                    self.fleet.port_base, self.fleet.ai_port_base
                ))
            })?,
            (None, None) => fleet::DEFAULT_COMPONENTS
                .iter()
                .find(|(name, _)| *name == component)
                .and_then(|(_, component_port)| {
                    fleet::ai_port_for(
                        *component_port,
                        fleet::COMPONENT_PORT_BASE,
                        self.fleet.ai_port_base,
                    )
                })
                .ok_or_else(|| {
                    ConfigError::invalid(format!(
                        "specialist '{component}' needs `port` or `component_port`"
                    ))
                })?,
        };
        if port == 0 {
            return Err(ConfigError::invalid(format!(
                "specialist '{component}' has port 0"
            )));
        }

        let host = entry.host.as_deref().unwrap_or(&self.fleet.host);
        let mut spec = fleet::component_spec(component, host, port);
        if let Some(id) = &entry.id {
            if id.trim().is_empty() {
                return Err(ConfigError::invalid(format!(
                    "specialist '{component}' has an empty id"
                )));
            }
            spec.id = id.clone();
        }
        if let Some(name) = &entry.name {
            spec.name = name.clone();
        }
        if let Some(model) = &entry.model {
            spec.model = model.clone();
        }
        if let Some(capabilities) = &entry.capabilities {
            spec.capabilities = capabilities.clone();
        }
        if let Some(roles) = &entry.roles {
            spec.roles = roles.clone();
        }
        Ok(spec)
    }

    /// Configuration as TOML text
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[fleet]
host = "127.0.0.1"

[[specialists]]
component = "athena"
port = 45005

[[specialists]]
component = "hermes"
component_port = 8001

[monitor]
interval_secs = 5
probe_timeout_ms = 200
"#;
        Self::from_toml_str(toml_content).expect("Test config should parse")
    }
}
