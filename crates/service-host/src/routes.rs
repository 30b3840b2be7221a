// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Routes module
//!
//! Builds the request pipeline every connection is served with. Layers, from
//! the outermost in:
//!
//! 1. [`metrics_stage`]: stamps the start time and records the outcome
//! 2. request-id assignment and a tracing span per request
//! 3. panic catcher, classifying panics as internal failures
//! 4. CORS
//! 5. [`augment_identity`]: resolves the session header
//! 6. routes: admin routes under [`ADMIN_PREFIX`], business routes, and a
//!    `404 notFound` fallback

pub mod admin;

use axum::{
    Router,
    http::{HeaderName, Request},
    middleware::{from_fn, from_fn_with_state},
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info_span;

use crate::{
    classifier::panic_response,
    error::{ClassifiedError, RequestError},
    middleware::{augment_identity, metrics_stage},
    state::ServiceState,
};

/// Path prefix reserved for admin routes
pub const ADMIN_PREFIX: &str = "/_";

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Assemble the full pipeline around a service's business routes
///
/// Business routes must not install their own fallback; unmatched requests
/// are answered with `404 notFound` here.
pub fn create_pipeline(state: ServiceState, routes: Router<ServiceState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(from_fn(metrics_stage))
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                if let Some(request_id) = req.headers().get(REQUEST_ID_HEADER) {
                    info_span!("http_request", ?request_id)
                } else {
                    tracing::error!("failed to extract id from request");
                    info_span!("http_request", request_id = "unknown")
                }
            }),
        )
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CorsLayer::permissive())
        .layer(from_fn_with_state(state.clone(), augment_identity));

    Router::new()
        .nest(ADMIN_PREFIX, admin::router())
        .merge(routes)
        .fallback(not_found)
        .layer(middleware)
        .with_state(state)
}

async fn not_found() -> RequestError {
    ClassifiedError::not_found().into()
}
