//! Health monitor loop
//!
//! Keeps registry health state fresh without caller intervention.

pub mod probe_loop;
pub mod transitions;

pub use probe_loop::{HealthMonitor, MonitorConfig, MonitorHandle, ProbeResult, ProbeRoundSummary};
pub use transitions::{next_status, should_probe, HealthThresholds};
