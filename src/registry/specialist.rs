//! Specialist records and their health status
//!
//! A [`Specialist`] is one backend process bound to a fixed port. Identity
//! fields come from a [`SpecialistSpec`]; status and counters are owned by the
//! registry and only change through its accessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Success rate reported for a specialist that has never been contacted
///
/// Optimistic so untested specialists are not filtered out by
/// `min_success_rate` before their first probe.
pub const UNTESTED_SUCCESS_RATE: f64 = 1.0;

/// Health status of a specialist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistStatus {
    /// Not probed yet, or explicitly restarting
    Starting,
    Healthy,
    /// Answering, but slowly or with a poor success rate
    Degraded,
    /// Last probe failed
    Unresponsive,
    Unknown,
    /// Set by an operator; probes leave it alone
    Stopping,
}

impl SpecialistStatus {
    pub const ALL: [SpecialistStatus; 6] = [
        SpecialistStatus::Starting,
        SpecialistStatus::Healthy,
        SpecialistStatus::Degraded,
        SpecialistStatus::Unresponsive,
        SpecialistStatus::Unknown,
        SpecialistStatus::Stopping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialistStatus::Starting => "starting",
            SpecialistStatus::Healthy => "healthy",
            SpecialistStatus::Degraded => "degraded",
            SpecialistStatus::Unresponsive => "unresponsive",
            SpecialistStatus::Unknown => "unknown",
            SpecialistStatus::Stopping => "stopping",
        }
    }

    /// Healthy or Degraded specialists can take requests
    pub fn is_available(&self) -> bool {
        matches!(self, SpecialistStatus::Healthy | SpecialistStatus::Degraded)
    }
}

impl fmt::Display for SpecialistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SpecialistStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpecialistStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown specialist status: {s}"))
    }
}

/// Static description of a specialist, as found in the fleet definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialistSpec {
    pub id: String,
    pub name: String,
    /// Owning component, e.g. `athena`
    pub component: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl SpecialistSpec {
    /// Spec with `name` and `component` derived from the id
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let id = id.into();
        let component = id.strip_suffix("-ai").unwrap_or(&id).to_string();
        Self {
            name: component.clone(),
            component,
            id,
            host: host.into(),
            port,
            model: "unknown".to_string(),
            capabilities: Vec::new(),
            roles: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }
}

/// One known specialist with its live health and performance state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specialist {
    pub id: String,
    pub name: String,
    pub component: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub capabilities: BTreeSet<String>,
    pub roles: BTreeSet<String>,
    pub status: SpecialistStatus,
    pub success_count: u64,
    pub failure_count: u64,
    /// Cumulative average latency of successful contacts, in seconds
    pub avg_response_secs: f64,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

impl Specialist {
    /// New specialist in `Starting` state with zeroed counters
    pub fn from_spec(spec: SpecialistSpec) -> Self {
        Self {
            id: spec.id,
            name: spec.name,
            component: spec.component,
            host: spec.host,
            port: spec.port,
            model: spec.model,
            capabilities: normalize(spec.capabilities),
            roles: normalize(spec.roles),
            status: SpecialistStatus::Starting,
            success_count: 0,
            failure_count: 0,
            avg_response_secs: 0.0,
            last_seen_at: None,
            registered_at: Utc::now(),
        }
    }

    /// Replace identity metadata, keeping status and counters
    pub(crate) fn apply_spec(&mut self, spec: SpecialistSpec) {
        self.name = spec.name;
        self.component = spec.component;
        self.host = spec.host;
        self.port = spec.port;
        self.model = spec.model;
        self.capabilities = normalize(spec.capabilities);
        self.roles = normalize(spec.roles);
    }

    pub fn total_requests(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub fn success_rate(&self) -> f64 {
        match self.total_requests() {
            0 => UNTESTED_SUCCESS_RATE,
            total => self.success_count as f64 / total as f64,
        }
    }

    pub fn avg_response_time(&self) -> Duration {
        Duration::from_secs_f64(self.avg_response_secs.max(0.0))
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True when every requested capability is present (case-insensitive)
    pub fn has_capabilities<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required
            .iter()
            .all(|cap| self.capabilities.contains(&cap.as_ref().trim().to_lowercase()))
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(&role.trim().to_lowercase())
    }

    /// Fold one request outcome into the counters
    ///
    /// Only successful outcomes contribute latency samples.
    pub(crate) fn record(&mut self, success: bool, elapsed: Duration) {
        if success {
            self.success_count += 1;
            let sample = elapsed.as_secs_f64();
            self.avg_response_secs += (sample - self.avg_response_secs) / self.success_count as f64;
            self.last_seen_at = Some(Utc::now());
        } else {
            self.failure_count += 1;
        }
    }
}

fn normalize(values: Vec<String>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}
