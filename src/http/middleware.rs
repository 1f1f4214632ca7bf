//! Pipeline middleware.
//!
//! # Order (outermost first)
//! ```text
//! request id → trace → catch panic → metrics → timeout → CORS
//!     → rate limit → authenticate → [per-route gate chain] → handler
//! ```

use std::any::Any;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
    BoxError,
};
use tower::timeout::error::Elapsed;

use crate::auth::{GateChain, TokenAuthenticator};
use crate::error::Error;
use crate::http::context;
use crate::observability::metrics;

/// Resolve the `Authorization` header and attach the principal.
///
/// Refusals short-circuit before the route is reached.
pub async fn authenticate(
    State(authenticator): State<TokenAuthenticator>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let header = match req.headers().get(header::AUTHORIZATION) {
        None => None,
        Some(value) => match value.to_str() {
            Ok(text) => Some(text.to_owned()),
            Err(_) => return with_vary(Error::InvalidToken.into_response()),
        },
    };

    let principal = match authenticator.authenticate(header.as_deref()).await {
        Ok(principal) => principal,
        Err(err) => return with_vary(err.into_response()),
    };

    context::attach(req.extensions_mut(), principal);
    with_vary(next.run(req).await)
}

fn with_vary(mut response: Response) -> Response {
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

/// Run a route's gate chain against the attached principal.
pub async fn enforce_gates(State(chain): State<GateChain>, req: Request<Body>, next: Next) -> Response {
    let principal = context::principal(req.extensions()).clone();
    match chain.admit(&principal).await {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

/// Count every response by method and status.
pub async fn track_metrics(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let response = next.run(req).await;
    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

/// Error handler for the whole-request timeout. The request is safe to retry.
pub async fn timeout_response(err: BoxError) -> Error {
    if err.is::<Elapsed>() {
        Error::fault("request deadline exceeded")
    } else {
        Error::fault(format_args!("request failed: {err}"))
    }
}

/// Panic hook for `CatchPanicLayer`: a generic 500 that closes the connection.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };

    let mut response = Error::fault(format_args!("handler panicked: {detail}")).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
