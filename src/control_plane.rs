//! Control plane composition
//!
//! Wires the registry, health monitor, routing engine and socket client from a
//! [`FleetConfig`]. The binary drives one of these; embedders can too.

use crate::config::FleetConfig;
use crate::error::{FleetError, FleetResult};
use crate::lifecycle_span;
use crate::monitor::{MonitorConfig, ProbeRoundSummary};
use crate::observability::StatusServer;
use crate::registry::SpecialistRegistry;
use crate::routing::{DispatchReply, RouteRequest, RouteResult, RoutingEngine};
use crate::transport::{ChunkStream, MessageOptions, SocketClient, SpecialistTransport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Instrument};

/// Registry, monitor and router sharing one transport
pub struct ControlPlane {
    config: FleetConfig,
    registry: SpecialistRegistry,
    engine: RoutingEngine,
    transport: Arc<dyn SpecialistTransport>,
    monitor_config: MonitorConfig,
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("registry", &self.registry)
            .field("engine", &self.engine)
            .field("monitor_config", &self.monitor_config)
            .finish_non_exhaustive()
    }
}

impl ControlPlane {
    /// Build with the TCP socket client
    pub fn from_config(config: FleetConfig) -> FleetResult<Self> {
        let client = SocketClient::from_config(&config.socket);
        Self::with_transport(config, Arc::new(client))
    }

    /// Build with any transport, e.g. a mock in tests
    pub fn with_transport(
        config: FleetConfig,
        transport: Arc<dyn SpecialistTransport>,
    ) -> FleetResult<Self> {
        config.validate()?;

        let registry = SpecialistRegistry::new();
        let engine = if config.routing.use_default_rules {
            RoutingEngine::with_default_rules(registry.clone())
        } else {
            RoutingEngine::new(registry.clone())
        };
        let monitor_config = MonitorConfig::from_section(&config.monitor);

        Ok(Self {
            config,
            registry,
            engine,
            transport,
            monitor_config,
        })
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn registry(&self) -> &SpecialistRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &RoutingEngine {
        &self.engine
    }

    /// Mutable engine access for adding or removing rules before start
    pub fn engine_mut(&mut self) -> &mut RoutingEngine {
        &mut self.engine
    }

    pub fn transport(&self) -> Arc<dyn SpecialistTransport> {
        Arc::clone(&self.transport)
    }

    /// Register the configured fleet, probe it once and start monitoring
    pub async fn start(&self) -> FleetResult<ProbeRoundSummary> {
        let fleet = self.config.fleet_definition()?;
        let span = lifecycle_span!(event = "start", specialists = fleet.len());

        async {
            let summary = self
                .registry
                .start(fleet, self.transport(), self.monitor_config.clone())
                .await?;
            info!(
                interval_secs = self.monitor_config.interval.as_secs(),
                healthy = summary.succeeded,
                "Control plane started"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    /// Stop monitoring; routing keeps working on the last known state
    pub async fn stop(&self) {
        self.registry
            .stop()
            .instrument(lifecycle_span!(event = "stop"))
            .await;
    }

    pub async fn route(&self, request: &RouteRequest) -> FleetResult<RouteResult> {
        Ok(self.engine.route_message(request).await?)
    }

    /// Route and send, retrying on other specialists up to the configured attempts
    pub async fn dispatch(
        &self,
        request: &RouteRequest,
        options: &MessageOptions,
    ) -> FleetResult<DispatchReply> {
        Ok(self
            .engine
            .dispatch(
                self.transport.as_ref(),
                request,
                options,
                self.config.routing.dispatch_attempts,
            )
            .await?)
    }

    /// Route and open a streaming reply from the selected specialist
    ///
    /// Only a failure to open the stream is recorded against the specialist.
    pub async fn dispatch_stream(
        &self,
        request: &RouteRequest,
        options: &MessageOptions,
    ) -> FleetResult<(RouteResult, ChunkStream)> {
        let route = self.engine.route_message(request).await?;
        let specialist = &route.specialist;
        let started = tokio::time::Instant::now();
        match self
            .transport
            .send_message_stream(&specialist.host, specialist.port, &request.message, options)
            .await
        {
            Ok(stream) => Ok((route, stream)),
            Err(e) => {
                self.registry
                    .record_outcome(&specialist.id, false, started.elapsed())
                    .await?;
                Err(e.into())
            }
        }
    }

    /// Status server for the configured address, if enabled
    pub fn status_server(&self) -> FleetResult<Option<StatusServer>> {
        let section = &self.config.status_server;
        if !section.enabled {
            return Ok(None);
        }
        let addr: SocketAddr = format!("{}:{}", section.bind, section.port)
            .parse()
            .map_err(|e| {
                FleetError::invalid_input(format!(
                    "invalid status server address {}:{}: {e}",
                    section.bind, section.port
                ))
            })?;
        Ok(Some(StatusServer::new(self.registry.clone(), addr)))
    }

    /// Ping one specialist by id with the monitor's probe timeout
    pub async fn ping(&self, specialist_id: &str) -> FleetResult<Duration> {
        let specialist = self
            .registry
            .get(specialist_id)
            .await
            .ok_or_else(|| crate::registry::RegistryError::not_found(specialist_id))?;
        let reply = self
            .transport
            .ping(
                &specialist.host,
                specialist.port,
                self.monitor_config.probe_timeout,
            )
            .await?;
        Ok(reply.elapsed)
    }
}
