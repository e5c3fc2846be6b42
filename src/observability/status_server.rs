//! HTTP status endpoint for operators and orchestrators
//!
//! Read-only views over the registry:
//!
//! - `GET /health` - registry statistics; 200 when at least one specialist
//!   is Healthy, 503 otherwise
//! - `GET /live` - process liveness
//! - `GET /specialists` - every specialist, optionally filtered with
//!   `status`, `role`, `capability` (comma separated) and `min_success_rate`
//! - `GET /specialists/{id}` - one specialist, 404 when unknown

use crate::registry::{DiscoverFilter, SpecialistRegistry, SpecialistStatus};
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::info;
use warp::http::StatusCode;
use warp::Filter;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// HTTP server exposing registry state
#[derive(Clone)]
pub struct StatusServer {
    registry: SpecialistRegistry,
    addr: SocketAddr,
}

impl StatusServer {
    pub fn new(registry: SpecialistRegistry, addr: SocketAddr) -> Self {
        Self { registry, addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// All routes, mountable in another warp server or driven by `warp::test`
    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let registry = self.registry.clone();
        let health_route = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let registry = registry.clone();
                async move {
                    let stats = registry.get_statistics().await;
                    let code = if stats.count(SpecialistStatus::Healthy) > 0 {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&stats), code))
                }
            });

        let live_route = warp::path("live")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| warp::reply::json(&serde_json::json!({ "status": "alive" })));

        let registry = self.registry.clone();
        let list_route = warp::path("specialists")
            .and(warp::path::end())
            .and(warp::get())
            .and(warp::query::<HashMap<String, String>>())
            .and_then(move |query: HashMap<String, String>| {
                let registry = registry.clone();
                async move {
                    let reply = match filter_from_query(&query) {
                        Ok(filter) => warp::reply::with_status(
                            warp::reply::json(&registry.discover(&filter).await),
                            StatusCode::OK,
                        ),
                        Err(error) => warp::reply::with_status(
                            warp::reply::json(&ErrorBody { error }),
                            StatusCode::BAD_REQUEST,
                        ),
                    };
                    Ok::<_, Infallible>(reply)
                }
            });

        let registry = self.registry.clone();
        let detail_route = warp::path!("specialists" / String)
            .and(warp::get())
            .and_then(move |id: String| {
                let registry = registry.clone();
                async move {
                    let reply = match registry.get(&id).await {
                        Some(specialist) => warp::reply::with_status(
                            warp::reply::json(&specialist),
                            StatusCode::OK,
                        ),
                        None => warp::reply::with_status(
                            warp::reply::json(&ErrorBody {
                                error: format!("specialist not found: {id}"),
                            }),
                            StatusCode::NOT_FOUND,
                        ),
                    };
                    Ok::<_, Infallible>(reply)
                }
            });

        health_route
            .or(live_route)
            .or(list_route)
            .or(detail_route)
            .with(warp::cors().allow_any_origin())
    }

    /// Serve until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), warp::Error> {
        let (bound, server) = warp::serve(self.routes())
            .try_bind_with_graceful_shutdown(self.addr, async move {
                shutdown.cancelled().await;
            })?;
        info!(addr = %bound, "Status server listening");
        server.await;
        info!("Status server stopped");
        Ok(())
    }
}

fn filter_from_query(query: &HashMap<String, String>) -> Result<DiscoverFilter, String> {
    let mut filter = DiscoverFilter::new();
    if let Some(status) = query.get("status") {
        filter = filter.with_status(status.parse()?);
    }
    if let Some(role) = query.get("role") {
        filter = filter.with_role(role.clone());
    }
    if let Some(capabilities) = query.get("capability") {
        filter = filter.with_capabilities(
            capabilities
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty()),
        );
    }
    if let Some(rate) = query.get("min_success_rate") {
        let rate: f64 = rate
            .parse()
            .map_err(|_| format!("invalid min_success_rate: {rate}"))?;
        filter = filter.with_min_success_rate(rate);
    }
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SpecialistSpec;
    use std::net::{Ipv4Addr, SocketAddrV4};

    async fn server_with(specs: &[(&str, &[&str])]) -> StatusServer {
        let registry = SpecialistRegistry::new();
        for (i, (id, caps)) in specs.iter().enumerate() {
            registry
                .register(
                    SpecialistSpec::new(*id, "localhost", 45000 + i as u16)
                        .with_capabilities(caps.iter().copied()),
                )
                .await
                .unwrap();
        }
        StatusServer::new(
            registry,
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)),
        )
    }

    #[tokio::test]
    async fn test_health_is_unavailable_without_healthy_specialists() {
        let server = server_with(&[("athena-ai", &["knowledge"])]).await;
        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&server.routes())
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["total_specialists"], 1);
    }

    #[tokio::test]
    async fn test_health_is_ok_with_a_healthy_specialist() {
        let server = server_with(&[("athena-ai", &[])]).await;
        server
            .registry
            .set_status("athena-ai", SpecialistStatus::Healthy)
            .await
            .unwrap();

        let response = warp::test::request()
            .path("/health")
            .reply(&server.routes())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_specialists_list_applies_filters() {
        let server = server_with(&[
            ("athena-ai", &["knowledge"]),
            ("hermes-ai", &["documentation"]),
        ])
        .await;

        let response = warp::test::request()
            .path("/specialists?capability=documentation")
            .reply(&server.routes())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Vec<serde_json::Value> = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0]["id"], "hermes-ai");

        let bad = warp::test::request()
            .path("/specialists?status=sleepy")
            .reply(&server.routes())
            .await;
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_specialist_detail_and_not_found() {
        let server = server_with(&[("athena-ai", &[])]).await;

        let found = warp::test::request()
            .path("/specialists/athena-ai")
            .reply(&server.routes())
            .await;
        assert_eq!(found.status(), StatusCode::OK);

        let missing = warp::test::request()
            .path("/specialists/nobody-ai")
            .reply(&server.routes())
            .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_live_route() {
        let server = server_with(&[]).await;
        let response = warp::test::request()
            .path("/live")
            .reply(&server.routes())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
