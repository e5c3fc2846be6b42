//! Thread-safe specialist registry
//!
//! The registry is the single source of truth for specialist identity and
//! health. Clones share state; every mutation happens under one write lock so
//! per-specialist updates are serialized.

use super::error::RegistryError;
use super::events::{RegistryEvent, EVENT_CHANNEL_CAPACITY};
use super::fleet::FleetDefinition;
use super::specialist::{Specialist, SpecialistSpec, SpecialistStatus};
use super::statistics::RegistryStatistics;
use crate::monitor::{HealthMonitor, MonitorConfig, MonitorHandle, ProbeRoundSummary};
use crate::transport::SpecialistTransport;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info};

/// Discovery filters; every supplied filter must match
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoverFilter {
    pub role: Option<String>,
    /// All of these must be present
    pub capabilities: Vec<String>,
    pub status: Option<SpecialistStatus>,
    pub min_success_rate: Option<f64>,
    pub component: Option<String>,
}

impl DiscoverFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
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

    pub fn with_status(mut self, status: SpecialistStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_min_success_rate(mut self, rate: f64) -> Self {
        self.min_success_rate = Some(rate);
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn matches(&self, specialist: &Specialist) -> bool {
        self.role.as_deref().map_or(true, |role| specialist.has_role(role))
            && specialist.has_capabilities(&self.capabilities)
            && self.status.map_or(true, |status| specialist.status == status)
            && self
                .min_success_rate
                .map_or(true, |min| specialist.success_rate() >= min)
            && self
                .component
                .as_deref()
                .map_or(true, |c| specialist.component.eq_ignore_ascii_case(c))
    }
}

/// What happened to a probe result handed to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeApplication {
    Applied {
        from: SpecialistStatus,
        to: SpecialistStatus,
    },
    /// Specialist is `Stopping`; nothing recorded
    SkippedStopping,
    /// Registry was stopped while the probe was in flight
    Discarded,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Insertion order is the discovery order
    specialists: Vec<Specialist>,
    index: HashMap<String, usize>,
}

impl RegistryState {
    fn get(&self, id: &str) -> Option<&Specialist> {
        self.index.get(id).map(|&i| &self.specialists[i])
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Specialist> {
        let i = *self.index.get(id)?;
        self.specialists.get_mut(i)
    }
}

struct Inner {
    state: RwLock<RegistryState>,
    accepting_probes: AtomicBool,
    events: broadcast::Sender<RegistryEvent>,
    monitor: Mutex<Option<MonitorHandle>>,
}

/// Registry of known specialists and their health state
#[derive(Clone)]
pub struct SpecialistRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SpecialistRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialistRegistry")
            .field(
                "accepting_probes",
                &self.inner.accepting_probes.load(Ordering::SeqCst),
            )
            .finish_non_exhaustive()
    }
}

impl Default for SpecialistRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecialistRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(RegistryState::default()),
                accepting_probes: AtomicBool::new(true),
                events,
                monitor: Mutex::new(None),
            }),
        }
    }

    /// Populate from a fleet definition, then probe once and start the monitor loop
    ///
    /// Returns the summary of the initial probe round, which has completed
    /// before this returns.
    pub async fn start(
        &self,
        fleet: FleetDefinition,
        transport: Arc<dyn SpecialistTransport>,
        config: MonitorConfig,
    ) -> Result<ProbeRoundSummary, RegistryError> {
        let mut monitor = self.inner.monitor.lock().await;
        if monitor.is_some() {
            return Err(RegistryError::AlreadyRunning);
        }

        let registered = self.register_fleet(fleet).await?;
        self.inner.accepting_probes.store(true, Ordering::SeqCst);

        let health_monitor = HealthMonitor::new(self.clone(), transport, config);
        let summary = health_monitor.probe_all().await;
        *monitor = Some(health_monitor.spawn());

        info!(
            specialists = registered,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Specialist registry started"
        );
        Ok(summary)
    }

    /// Stop the monitor loop and reject late probe results
    pub async fn stop(&self) {
        {
            let _state = self.inner.state.write().await;
            self.inner.accepting_probes.store(false, Ordering::SeqCst);
        }

        let handle = self.inner.monitor.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            info!("Specialist registry stopped");
        }
    }

    /// True while a monitor loop started by [`start`](Self::start) is alive
    pub async fn is_monitoring(&self) -> bool {
        self.inner
            .monitor
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn accepts_probe_results(&self) -> bool {
        self.inner.accepting_probes.load(Ordering::SeqCst)
    }

    /// Add a specialist, or refresh the metadata of a known one
    ///
    /// Returns `true` when the id was new. Counters and status of a known
    /// specialist are kept.
    pub async fn register(&self, spec: SpecialistSpec) -> Result<bool, RegistryError> {
        if spec.id.trim().is_empty() {
            return Err(RegistryError::InvalidSpec("empty specialist id".to_string()));
        }
        if spec.port == 0 {
            return Err(RegistryError::InvalidSpec(format!(
                "specialist '{}' has no port",
                spec.id
            )));
        }

        let id = spec.id.clone();
        let port = spec.port;
        let is_new = {
            let mut state = self.inner.state.write().await;
            match state.get_mut(&id) {
                Some(existing) => {
                    existing.apply_spec(spec);
                    false
                }
                None => {
                    let position = state.specialists.len();
                    state.specialists.push(Specialist::from_spec(spec));
                    state.index.insert(id.clone(), position);
                    true
                }
            }
        };

        if is_new {
            info!(specialist_id = %id, port = port, "Registered specialist");
            self.publish(RegistryEvent::Registered { id, port });
        } else {
            debug!(specialist_id = %id, "Updated specialist metadata");
        }
        Ok(is_new)
    }

    /// Register every specialist of a fleet; returns how many were new
    pub async fn register_fleet(&self, fleet: FleetDefinition) -> Result<usize, RegistryError> {
        let mut added = 0;
        for spec in fleet {
            if self.register(spec).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Copies of all specialists matching `filter`, in insertion order
    pub async fn discover(&self, filter: &DiscoverFilter) -> Vec<Specialist> {
        let state = self.inner.state.read().await;
        state
            .specialists
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<Specialist> {
        self.inner.state.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.state.read().await.specialists.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get_statistics(&self) -> RegistryStatistics {
        let state = self.inner.state.read().await;
        RegistryStatistics::compute(&state.specialists)
    }

    /// Fold the outcome of a real request into the specialist's counters
    pub async fn record_outcome(
        &self,
        id: &str,
        success: bool,
        elapsed: Duration,
    ) -> Result<Specialist, RegistryError> {
        let updated = {
            let mut state = self.inner.state.write().await;
            let specialist = state
                .get_mut(id)
                .ok_or_else(|| RegistryError::not_found(id))?;
            specialist.record(success, elapsed);
            specialist.clone()
        };

        debug!(
            specialist_id = %id,
            success = success,
            elapsed_ms = elapsed.as_millis() as u64,
            success_rate = updated.success_rate(),
            "Recorded request outcome"
        );
        self.publish(RegistryEvent::OutcomeRecorded {
            id: id.to_string(),
            success,
            elapsed_ms: elapsed.as_millis() as u64,
            success_rate: updated.success_rate(),
        });
        Ok(updated)
    }

    /// Set the status directly; returns the previous status
    pub async fn set_status(
        &self,
        id: &str,
        status: SpecialistStatus,
    ) -> Result<SpecialistStatus, RegistryError> {
        let previous = {
            let mut state = self.inner.state.write().await;
            let specialist = state
                .get_mut(id)
                .ok_or_else(|| RegistryError::not_found(id))?;
            std::mem::replace(&mut specialist.status, status)
        };

        if previous != status {
            self.announce_transition(id, previous, status);
        }
        Ok(previous)
    }

    /// Record a probe result and move the status as `decide` says
    ///
    /// The running flag and the `Stopping` state are checked under the same
    /// write lock that applies the result.
    pub async fn apply_probe<F>(
        &self,
        id: &str,
        success: bool,
        elapsed: Duration,
        decide: F,
    ) -> Result<ProbeApplication, RegistryError>
    where
        F: FnOnce(&Specialist) -> SpecialistStatus,
    {
        let (from, to, success_rate) = {
            let mut state = self.inner.state.write().await;
            if !self.inner.accepting_probes.load(Ordering::SeqCst) {
                return Ok(ProbeApplication::Discarded);
            }
            let specialist = state
                .get_mut(id)
                .ok_or_else(|| RegistryError::not_found(id))?;
            if specialist.status == SpecialistStatus::Stopping {
                return Ok(ProbeApplication::SkippedStopping);
            }

            specialist.record(success, elapsed);
            let from = specialist.status;
            let to = decide(specialist);
            specialist.status = to;
            (from, to, specialist.success_rate())
        };

        self.publish(RegistryEvent::OutcomeRecorded {
            id: id.to_string(),
            success,
            elapsed_ms: elapsed.as_millis() as u64,
            success_rate,
        });
        if from != to {
            self.announce_transition(id, from, to);
        }
        Ok(ProbeApplication::Applied { from, to })
    }

    /// Receive registry events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn publish(&self, event: RegistryEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn announce_transition(&self, id: &str, from: SpecialistStatus, to: SpecialistStatus) {
        info!(specialist_id = %id, from = %from, to = %to, "Specialist status changed");
        self.publish(RegistryEvent::StatusChanged {
            id: id.to_string(),
            from,
            to,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, port: u16, capabilities: &[&str]) -> SpecialistSpec {
        SpecialistSpec::new(id, "localhost", port).with_capabilities(capabilities.iter().copied())
    }

    async fn registry_with(specs: Vec<SpecialistSpec>) -> SpecialistRegistry {
        let registry = SpecialistRegistry::new();
        registry
            .register_fleet(FleetDefinition::new(specs))
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = SpecialistRegistry::new();
        assert!(registry.is_empty().await);

        let added = registry.register(spec("a-ai", 45001, &["chat"])).await.unwrap();
        assert!(added);

        let a = registry.get("a-ai").await.unwrap();
        assert_eq!(a.port, 45001);
        assert_eq!(a.status, SpecialistStatus::Starting);
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_specs() {
        let registry = SpecialistRegistry::new();
        assert!(matches!(
            registry.register(spec("", 45001, &[])).await,
            Err(RegistryError::InvalidSpec(_))
        ));
        assert!(matches!(
            registry.register(spec("a-ai", 0, &[])).await,
            Err(RegistryError::InvalidSpec(_))
        ));
    }

    #[tokio::test]
    async fn test_reregister_keeps_counters_and_order() {
        let registry = registry_with(vec![spec("a-ai", 1, &[]), spec("b-ai", 2, &[])]).await;
        registry
            .record_outcome("a-ai", true, Duration::from_millis(10))
            .await
            .unwrap();

        let added = registry.register(spec("a-ai", 11, &["vision"])).await.unwrap();
        assert!(!added);

        let all = registry.discover(&DiscoverFilter::new()).await;
        let ids: Vec<_> = all.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a-ai", "b-ai"]);
        assert_eq!(all[0].port, 11);
        assert_eq!(all[0].success_count, 1);
        assert!(all[0].has_capabilities(&["vision"]));
    }

    #[tokio::test]
    async fn test_discover_filters_combine() {
        let registry = registry_with(vec![
            spec("a-ai", 1, &["chat"]).with_roles(["assistant"]),
            spec("b-ai", 2, &["chat", "vision"]),
            spec("c-ai", 3, &["vision"]),
        ])
        .await;
        registry
            .set_status("b-ai", SpecialistStatus::Healthy)
            .await
            .unwrap();

        let vision = registry
            .discover(&DiscoverFilter::new().with_capabilities(["vision"]))
            .await;
        assert_eq!(vision.len(), 2);

        let both = registry
            .discover(&DiscoverFilter::new().with_capabilities(["chat", "vision"]))
            .await;
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].id, "b-ai");

        let healthy_vision = registry
            .discover(
                &DiscoverFilter::new()
                    .with_capabilities(["vision"])
                    .with_status(SpecialistStatus::Healthy),
            )
            .await;
        assert_eq!(healthy_vision.len(), 1);

        let assistants = registry
            .discover(&DiscoverFilter::new().with_role("assistant"))
            .await;
        assert_eq!(assistants.len(), 1);
        assert_eq!(assistants[0].id, "a-ai");

        let by_component = registry
            .discover(&DiscoverFilter::new().with_component("C"))
            .await;
        assert_eq!(by_component.len(), 1);
    }

    #[tokio::test]
    async fn test_min_success_rate_filter() {
        let registry = registry_with(vec![spec("a-ai", 1, &[]), spec("b-ai", 2, &[])]).await;
        registry
            .record_outcome("a-ai", false, Duration::ZERO)
            .await
            .unwrap();

        let reliable = registry
            .discover(&DiscoverFilter::new().with_min_success_rate(0.5))
            .await;
        assert_eq!(reliable.len(), 1);
        assert_eq!(reliable[0].id, "b-ai");
    }

    #[tokio::test]
    async fn test_unknown_id_errors() {
        let registry = SpecialistRegistry::new();
        assert_eq!(
            registry
                .record_outcome("ghost", true, Duration::ZERO)
                .await
                .unwrap_err(),
            RegistryError::NotFound("ghost".to_string())
        );
        assert!(registry
            .set_status("ghost", SpecialistStatus::Healthy)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_set_status_publishes_transition() {
        let registry = registry_with(vec![spec("a-ai", 1, &[])]).await;
        let mut events = registry.subscribe();

        let previous = registry
            .set_status("a-ai", SpecialistStatus::Stopping)
            .await
            .unwrap();
        assert_eq!(previous, SpecialistStatus::Starting);

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            RegistryEvent::StatusChanged {
                id: "a-ai".to_string(),
                from: SpecialistStatus::Starting,
                to: SpecialistStatus::Stopping,
            }
        );
    }

    #[tokio::test]
    async fn test_apply_probe_respects_stopping_and_stop() {
        let registry = registry_with(vec![spec("a-ai", 1, &[]), spec("b-ai", 2, &[])]).await;
        registry
            .set_status("a-ai", SpecialistStatus::Stopping)
            .await
            .unwrap();

        let skipped = registry
            .apply_probe("a-ai", true, Duration::ZERO, |_| SpecialistStatus::Healthy)
            .await
            .unwrap();
        assert_eq!(skipped, ProbeApplication::SkippedStopping);
        assert_eq!(registry.get("a-ai").await.unwrap().total_requests(), 0);

        let applied = registry
            .apply_probe("b-ai", true, Duration::ZERO, |_| SpecialistStatus::Healthy)
            .await
            .unwrap();
        assert_eq!(
            applied,
            ProbeApplication::Applied {
                from: SpecialistStatus::Starting,
                to: SpecialistStatus::Healthy
            }
        );

        registry.stop().await;
        let late = registry
            .apply_probe("b-ai", false, Duration::ZERO, |_| {
                SpecialistStatus::Unresponsive
            })
            .await
            .unwrap();
        assert_eq!(late, ProbeApplication::Discarded);
        let b = registry.get("b-ai").await.unwrap();
        assert_eq!(b.status, SpecialistStatus::Healthy);
        assert_eq!(b.failure_count, 0);
    }

    #[tokio::test]
    async fn test_statistics_match_discover() {
        let registry = registry_with(vec![
            spec("a-ai", 1, &[]),
            spec("b-ai", 2, &[]),
            spec("c-ai", 3, &[]),
        ])
        .await;
        registry
            .record_outcome("a-ai", true, Duration::from_millis(5))
            .await
            .unwrap();
        registry
            .record_outcome("b-ai", false, Duration::from_millis(5))
            .await
            .unwrap();

        let stats = registry.get_statistics().await;
        assert_eq!(
            stats.total_specialists,
            registry.discover(&DiscoverFilter::new()).await.len()
        );
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.total_failures, 1);
        assert_eq!(stats.status_breakdown.values().sum::<usize>(), 3);
    }
}
