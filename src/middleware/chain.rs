//! Composition of the cross-cutting request chain
//!
//! Every request passes, in order: panic containment, security/CORS headers,
//! metrics, the deadline, the Rate Gate and access logging. Protected routes
//! additionally pass the Identity Gate before their handler runs.

use axum::{middleware::from_fn_with_state, Router};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use super::{
    auth::{require_identity, CredentialAuthority},
    cors::{cors_middleware, CorsPolicy},
    deadline::deadline_middleware,
    panic::handle_panic,
    rate_limiter::{rate_limit_middleware, AdmissionRegistry},
};
use crate::observability::{track_metrics, HttpMetrics};

/// Shared state owned by the chain stages
#[derive(Clone)]
pub struct ChainState {
    pub registry: Arc<AdmissionRegistry>,
    pub authority: Arc<CredentialAuthority>,
    pub cors: Arc<CorsPolicy>,
    pub metrics: Arc<HttpMetrics>,
    pub request_timeout: Duration,
}

impl ChainState {
    /// Wrap every route of `router` in the cross-cutting stages
    pub fn apply<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(from_fn_with_state(self.cors.clone(), cors_middleware))
                .layer(from_fn_with_state(self.metrics.clone(), track_metrics))
                .layer(from_fn_with_state(self.request_timeout, deadline_middleware))
                .layer(from_fn_with_state(self.registry.clone(), rate_limit_middleware))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                ),
        )
    }

    /// Require a verified identity on every route of `router`
    pub fn protect<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route_layer(from_fn_with_state(self.authority.clone(), require_identity))
    }
}
