//! Aggregate snapshot of registry state

use super::specialist::{Specialist, SpecialistStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Fleet-wide counters computed on demand
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryStatistics {
    pub total_specialists: usize,
    pub total_requests: u64,
    pub total_failures: u64,
    /// Successes over all requests; 0 when nothing was ever requested
    pub overall_success_rate: f64,
    /// Count per status, every status present (possibly 0)
    pub status_breakdown: BTreeMap<SpecialistStatus, usize>,
    pub last_update: DateTime<Utc>,
}

impl RegistryStatistics {
    pub fn compute<'a, I>(specialists: I) -> Self
    where
        I: IntoIterator<Item = &'a Specialist>,
    {
        let mut status_breakdown: BTreeMap<SpecialistStatus, usize> =
            SpecialistStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        let mut total_specialists = 0;
        let mut total_requests = 0;
        let mut total_failures = 0;

        for specialist in specialists {
            total_specialists += 1;
            total_requests += specialist.total_requests();
            total_failures += specialist.failure_count;
            *status_breakdown.entry(specialist.status).or_insert(0) += 1;
        }

        let overall_success_rate = if total_requests == 0 {
            0.0
        } else {
            (total_requests - total_failures) as f64 / total_requests as f64
        };

        Self {
            total_specialists,
            total_requests,
            total_failures,
            overall_success_rate,
            status_breakdown,
            last_update: Utc::now(),
        }
    }

    pub fn count(&self, status: SpecialistStatus) -> usize {
        self.status_breakdown.get(&status).copied().unwrap_or(0)
    }

    pub fn available(&self) -> usize {
        self.count(SpecialistStatus::Healthy) + self.count(SpecialistStatus::Degraded)
    }
}
