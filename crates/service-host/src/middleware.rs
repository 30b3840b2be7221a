// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Middleware module
//!
//! The request pipeline's own stages: the outermost metrics stage and the
//! identity augmentation that runs just before routing.

use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use session_store::SessionStore;
use shared_types::SessionId;
use tracing::{debug, info};

use crate::{
    error::{ClassifiedError, RequestResult},
    identity::Identity,
    metrics,
    state::ServiceState,
};

/// When the pipeline first saw the request
#[derive(Debug, Clone, Copy)]
pub struct RequestStart(Instant);

impl RequestStart {
    /// Stamp the current instant
    pub fn now() -> Self {
        Self(Instant::now())
    }

    /// Time since the stamp
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

/// Outermost stage: one metric record per request, whatever the outcome
///
/// Stamps [`RequestStart`] into the request, runs the rest of the pipeline
/// and then logs duration, status, method, path, caller and referer under the
/// `service_host::metrics` target.
pub async fn metrics_stage(mut request: Request, next: Next) -> Response {
    let start = RequestStart::now();
    request.extensions_mut().insert(start);

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let caller = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "-".to_string(), |ConnectInfo(addr)| addr.ip().to_string());
    let referer = request
        .headers()
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();
    info!(
        target: "service_host::metrics",
        duration_ms = elapsed.as_secs_f64() * 1000.0,
        status = status.as_u16(),
        method = %method,
        path = %path,
        caller = %caller,
        referer = %referer,
        "request served"
    );
    metrics::record_request(method.as_str(), status, elapsed);

    response
}

/// Attach the caller's [`Identity`] when the request carries a session header
///
/// An absent or empty header leaves the request anonymous. A header that is
/// not a usable session id, or names no live session, is `401 invalidSession`.
/// Store failures propagate to the classifier.
pub async fn augment_identity(
    State(state): State<ServiceState>,
    mut request: Request,
    next: Next,
) -> RequestResult<Response> {
    let presented = request
        .headers()
        .get(state.session_header())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_str().ok().and_then(|raw| SessionId::new(raw).ok()));

    let Some(parsed) = presented else {
        return Ok(next.run(request).await);
    };

    let session_id = parsed.ok_or_else(|| {
        debug!("unusable session header");
        ClassifiedError::invalid_session()
    })?;

    let Some(record) = state.sessions().lookup(&session_id).await? else {
        debug!("session not found");
        return Err(ClassifiedError::invalid_session().into());
    };

    let identity = Identity::from_record(record, session_id);
    debug!(user_id = identity.user_id, "caller identified");
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_start_measures_elapsed_time() {
        let start = RequestStart::now();
        std::thread::sleep(Duration::from_millis(5));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
