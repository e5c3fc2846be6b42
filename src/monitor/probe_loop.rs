//! Periodic probing of every known specialist
//!
//! Each round pings all specialists concurrently (bounded by
//! `max_concurrent_probes`) and feeds the results into the registry. Probe
//! failures are data for the state machine, never errors of the loop itself.

use super::transitions::{next_status, should_probe, HealthThresholds};
use crate::config::MonitorSection;
use crate::probe_span;
use crate::registry::{
    DiscoverFilter, ProbeApplication, RegistryEvent, Specialist, SpecialistRegistry,
};
use crate::transport::SpecialistTransport;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Lower bound for the round interval
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Health monitor settings
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Time between probe rounds
    pub interval: Duration,
    pub probe_timeout: Duration,
    pub thresholds: HealthThresholds,
    pub max_concurrent_probes: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            thresholds: HealthThresholds::default(),
            max_concurrent_probes: 16,
        }
    }
}

impl MonitorConfig {
    pub fn from_section(section: &MonitorSection) -> Self {
        Self {
            interval: Duration::from_secs(section.interval_secs),
            probe_timeout: Duration::from_millis(section.probe_timeout_ms),
            thresholds: HealthThresholds {
                slow_response: Duration::from_millis(section.slow_response_ms),
                degraded_success_rate: section.degraded_success_rate,
            },
            max_concurrent_probes: section.max_concurrent_probes.max(1),
        }
    }
}

/// Outcome of probing one specialist
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub specialist_id: String,
    pub success: bool,
    pub elapsed_ms: u64,
    pub error: Option<String>,
    #[serde(skip)]
    pub application: Option<ProbeApplication>,
}

/// Counts for one probe round
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProbeRoundSummary {
    pub probed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Specialists in `Stopping` state
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<ProbeResult>,
}

/// Probes specialists and applies the results to a registry
pub struct HealthMonitor {
    registry: SpecialistRegistry,
    transport: Arc<dyn SpecialistTransport>,
    config: MonitorConfig,
}

impl HealthMonitor {
    pub fn new(
        registry: SpecialistRegistry,
        transport: Arc<dyn SpecialistTransport>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Probe every specialist once, concurrently
    pub async fn probe_all(&self) -> ProbeRoundSummary {
        let started = Instant::now();
        let (targets, stopping): (Vec<Specialist>, Vec<Specialist>) = self
            .registry
            .discover(&DiscoverFilter::new())
            .await
            .into_iter()
            .partition(|s| should_probe(s.status));

        let results: Vec<ProbeResult> = stream::iter(targets)
            .map(|specialist| self.probe_one(specialist))
            .buffer_unordered(self.config.max_concurrent_probes.max(1))
            .collect()
            .await;

        let succeeded = results.iter().filter(|r| r.success).count();
        let summary = ProbeRoundSummary {
            probed: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            skipped: stopping.len(),
            duration_ms: started.elapsed().as_millis() as u64,
            results,
        };

        debug!(
            probed = summary.probed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            duration_ms = summary.duration_ms,
            "Probe round completed"
        );
        self.registry.publish(RegistryEvent::ProbeRoundCompleted {
            probed: summary.probed,
            succeeded: summary.succeeded,
            failed: summary.failed,
            skipped: summary.skipped,
        });
        summary
    }

    /// Ping one specialist and hand the result to the registry
    pub async fn probe_one(&self, specialist: Specialist) -> ProbeResult {
        let span = probe_span!(specialist_id = %specialist.id, port = specialist.port);

        async {
            let started = Instant::now();
            let outcome = self
                .transport
                .ping(&specialist.host, specialist.port, self.config.probe_timeout)
                .await;
            let elapsed = started.elapsed();

            let (success, error) = match outcome {
                Ok(_) => (true, None),
                Err(e) => {
                    debug!(kind = e.kind(), error = %e, "Probe failed");
                    (false, Some(e.to_string()))
                }
            };

            let thresholds = self.config.thresholds;
            let application = match self
                .registry
                .apply_probe(&specialist.id, success, elapsed, |s| {
                    next_status(s, success, elapsed, &thresholds)
                })
                .await
            {
                Ok(application) => Some(application),
                Err(e) => {
                    warn!(error = %e, "Probe result could not be applied");
                    None
                }
            };

            ProbeResult {
                specialist_id: specialist.id.clone(),
                success,
                elapsed_ms: elapsed.as_millis() as u64,
                error,
                application,
            }
        }
        .instrument(span)
        .await
    }

    /// Run probe rounds every `interval` until the returned handle is shut down
    ///
    /// The first round runs one interval after spawning.
    pub fn spawn(self) -> MonitorHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            info!(
                interval_secs = self.config.interval.as_secs_f64(),
                max_concurrent_probes = self.config.max_concurrent_probes,
                "Health monitor started"
            );

            let period = self.config.interval.max(MIN_INTERVAL);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // Dropping an in-flight round closes its connections
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = self.probe_all() => {}
                }
            }

            info!("Health monitor stopped");
        });

        MonitorHandle { cancel, task }
    }
}

/// Handle to a running monitor loop
#[derive(Debug)]
pub struct MonitorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait for it to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Health monitor task ended abnormally");
        }
    }
}
