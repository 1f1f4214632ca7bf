//! Request pipeline composition.
//!
//! # Layers (outermost first)
//! ```text
//! SetRequestId      x-request-id (UUID v4) when absent
//! Trace             one span per request, carrying the request id
//! PropagateRequestId
//! CatchPanic        panics → 500, Connection: close
//! metrics           gatehouse_requests_total / duration
//! Timeout           whole-request deadline → 500 envelope
//! CORS              trusted origins only
//! rate limit        per-client token bucket
//! authenticate      Authorization → Principal, attached once
//!   route gates     per route: authenticated → activated → permitted
//! ```
//!
//! The pipeline adds no behavior of its own; it only fixes the order. Panic
//! isolation wraps every layer that runs service code, and sits inside the
//! request-id and trace layers so a caught panic is logged in the request's
//! span and answered with its request id.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    http::{header, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::MethodRouter,
    Router,
};
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::auth::{GateChain, PermissionResolver, TokenAuthenticator};
use crate::http::middleware::{
    authenticate, enforce_gates, panic_response, timeout_response, track_metrics,
};
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::security::{rate_limit_middleware, ClientLimiterRegistry};

#[derive(Clone)]
pub struct RequestPipeline {
    limiter: Arc<ClientLimiterRegistry>,
    authenticator: TokenAuthenticator,
    permissions: Arc<dyn PermissionResolver>,
    store_timeout: Duration,
    request_timeout: Duration,
    trusted_origins: Vec<HeaderValue>,
}

impl RequestPipeline {
    pub fn new(
        limiter: Arc<ClientLimiterRegistry>,
        authenticator: TokenAuthenticator,
        permissions: Arc<dyn PermissionResolver>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            limiter,
            authenticator,
            permissions,
            store_timeout,
            request_timeout: Duration::from_secs(30),
            trusted_origins: Vec::new(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Origins that may call the API cross-origin. Invalid values are skipped.
    pub fn with_trusted_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.trusted_origins = origins
            .into_iter()
            .filter_map(|origin| match HeaderValue::from_str(origin.as_ref()) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = origin.as_ref(), "Ignoring invalid trusted origin");
                    None
                }
            })
            .collect();
        self
    }

    pub fn limiter(&self) -> &Arc<ClientLimiterRegistry> {
        &self.limiter
    }

    /// Gates for a route needing only a real user.
    pub fn authenticated(&self) -> GateChain {
        GateChain::builder().authenticated().build()
    }

    /// Gates for a route needing an activated user.
    pub fn activated(&self) -> GateChain {
        GateChain::builder().activated().build()
    }

    /// Gates for a route needing `code`, with every stage before it.
    pub fn permission(&self, code: &str) -> GateChain {
        GateChain::builder()
            .permission(code, Arc::clone(&self.permissions), self.store_timeout)
            .build()
    }

    /// Put a gate chain in front of every handler of `route`.
    pub fn guard<S>(&self, chain: GateChain, route: MethodRouter<S>) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        route.route_layer(from_fn_with_state(chain, enforce_gates))
    }

    /// Wrap fully routed `routes` in the shared layers.
    pub fn wrap(&self, routes: Router) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(AllowOrigin::list(self.trusted_origins.clone()))
            .allow_methods([
                Method::OPTIONS,
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

        let inner = ServiceBuilder::new()
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(from_fn(track_metrics))
            .layer(HandleErrorLayer::new(timeout_response))
            .layer(TimeoutLayer::new(self.request_timeout))
            .layer(cors)
            .layer(from_fn_with_state(Arc::clone(&self.limiter), rate_limit_middleware))
            .layer(from_fn_with_state(self.authenticator.clone(), authenticate));

        let outer = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                let request_id = req
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID));

        routes.layer(inner).layer(outer)
    }
}
