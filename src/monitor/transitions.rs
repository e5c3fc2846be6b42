//! Status state machine driven by probe results

use crate::registry::{Specialist, SpecialistStatus};
use std::time::Duration;

/// Thresholds separating Healthy from Degraded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    /// Successful probes slower than this degrade the specialist
    pub slow_response: Duration,
    /// Success rates below this degrade the specialist
    pub degraded_success_rate: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            slow_response: Duration::from_secs(1),
            degraded_success_rate: 0.5,
        }
    }
}

/// Status after a probe, given the specialist's counters with the probe
/// already recorded
pub fn next_status(
    specialist: &Specialist,
    success: bool,
    elapsed: Duration,
    thresholds: &HealthThresholds,
) -> SpecialistStatus {
    if specialist.status == SpecialistStatus::Stopping {
        return SpecialistStatus::Stopping;
    }
    if !success {
        return SpecialistStatus::Unresponsive;
    }
    if elapsed > thresholds.slow_response
        || specialist.success_rate() < thresholds.degraded_success_rate
    {
        SpecialistStatus::Degraded
    } else {
        SpecialistStatus::Healthy
    }
}

/// Whether the monitor should probe a specialist in this status
pub fn should_probe(status: SpecialistStatus) -> bool {
    status != SpecialistStatus::Stopping
}
