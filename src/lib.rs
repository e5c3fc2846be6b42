//! Specialist Router
//!
//! Control plane for a fleet of AI specialist processes, each listening on its
//! own TCP port and speaking line-delimited JSON.
//!
//! # Overview
//!
//! - [`registry`] - known specialists, their health state and statistics
//! - [`monitor`] - periodic concurrent health probes feeding the registry
//! - [`routing`] - rule-based selection of one specialist (or a team)
//! - [`transport`] - the socket client: ping, request/reply, streaming
//! - [`control_plane`] - all of the above wired from a [`FleetConfig`]
//!
//! # Quick Start
//!
//! ```rust
//! use specialist_router::registry::{SpecialistRegistry, SpecialistSpec, SpecialistStatus};
//! use specialist_router::routing::{RouteRequest, RoutingEngine};
//!
//! # tokio_test::block_on(async {
//! let registry = SpecialistRegistry::new();
//! let hermes =
//!     SpecialistSpec::new("hermes-ai", "localhost", 45001).with_capabilities(["documentation"]);
//! registry.register(hermes).await.unwrap();
//! registry.set_status("hermes-ai", SpecialistStatus::Healthy).await.unwrap();
//!
//! let engine = RoutingEngine::with_default_rules(registry);
//! let route = engine
//!     .route_message(&RouteRequest::new("Please update the docs"))
//!     .await
//!     .unwrap();
//! assert_eq!(route.specialist.id, "hermes-ai");
//! assert_eq!(route.rule_used.as_deref(), Some("documentation"));
//! # });
//! ```

pub mod config;
pub mod control_plane;
pub mod error;
pub mod monitor;
pub mod observability;
pub mod protocol;
pub mod registry;
pub mod routing;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, FleetConfig};
pub use control_plane::ControlPlane;
pub use error::{FleetError, FleetResult};
pub use registry::{Specialist, SpecialistRegistry, SpecialistSpec, SpecialistStatus};
pub use routing::{RouteRequest, RouteResult, RoutingEngine};
pub use transport::{SocketClient, SocketError, SpecialistTransport};
