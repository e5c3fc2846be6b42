//! Route-then-send helper
//!
//! Routes a request, sends it to the selected specialist and reports the
//! outcome to the registry. A specialist whose connection fails, times out or
//! closes early is excluded and the request is routed again, up to the attempt
//! limit. Error and malformed replies are returned without a retry.

use super::engine::{RouteRequest, RouteResult, RoutingEngine, RoutingError};
use crate::transport::{MessageOptions, MessageReply, SocketError, SpecialistTransport};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

/// Dispatch failures
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("specialist {specialist_id} failed after {attempts} attempt(s): {source}")]
    Specialist {
        specialist_id: String,
        attempts: usize,
        #[source]
        source: SocketError,
    },
}

/// Successful dispatch
#[derive(Debug)]
pub struct DispatchReply {
    pub route: RouteResult,
    pub reply: MessageReply,
    /// Specialists tried, including the one that answered
    pub attempts: usize,
}

impl RoutingEngine {
    /// Route `request`, send it, and retry on other specialists on failure
    pub async fn dispatch(
        &self,
        transport: &dyn SpecialistTransport,
        request: &RouteRequest,
        options: &MessageOptions,
        max_attempts: usize,
    ) -> Result<DispatchReply, DispatchError> {
        let max_attempts = max_attempts.max(1);
        let mut request = request.clone();
        let mut last_failure: Option<DispatchError> = None;

        for attempt in 1..=max_attempts {
            let route = match self.route_message(&request).await {
                Ok(route) => route,
                // Report the specialist failure rather than the exhausted pool
                Err(e) => return Err(last_failure.unwrap_or(DispatchError::Routing(e))),
            };

            let specialist = &route.specialist;
            let started = Instant::now();
            let outcome = transport
                .send_message(&specialist.host, specialist.port, &request.message, options)
                .await;
            let elapsed = started.elapsed();

            let success = outcome.is_ok();
            if let Err(e) = self
                .registry()
                .record_outcome(&specialist.id, success, elapsed)
                .await
            {
                warn!(specialist_id = %specialist.id, error = %e, "Could not record outcome");
            }

            match outcome {
                Ok(reply) => {
                    info!(
                        specialist_id = %specialist.id,
                        attempt = attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Dispatched message"
                    );
                    return Ok(DispatchReply {
                        route,
                        reply,
                        attempts: attempt,
                    });
                }
                Err(source) => {
                    warn!(
                        specialist_id = %specialist.id,
                        attempt = attempt,
                        kind = source.kind(),
                        error = %source,
                        "Dispatch attempt failed"
                    );
                    let retry = source.is_transport_failure();
                    let failure = DispatchError::Specialist {
                        specialist_id: specialist.id.clone(),
                        attempts: attempt,
                        source,
                    };
                    if !retry {
                        return Err(failure);
                    }
                    request.exclude.push(specialist.id.clone());
                    last_failure = Some(failure);
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| {
            DispatchError::Routing(RoutingError::NoCandidate {
                required_capabilities: request.required_capabilities.clone(),
                excluded: request.exclude.clone(),
            })
        }))
    }
}
