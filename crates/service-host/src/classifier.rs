// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error classification
//!
//! Every failure raised while serving a request ends here and becomes exactly
//! one response. Clients only ever see a status and a small closed set of
//! `errorCode` strings; the failure itself goes to the server log.

use std::any::Any;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::error::{ClassifiedError, ErrorBody, ErrorResponse, RequestError};

/// Code sent for request bodies that cannot be parsed
pub const INVALID_JSON: &str = "invalidJSON";

/// Code sent for every failure that carries no classification
pub const INTERNAL_ERROR: &str = "internalError";

/// Map a failure to the response the client receives
pub fn classify(error: RequestError) -> ErrorResponse {
    match error {
        RequestError::Classified(classified) if !classified.error_code.is_empty() => {
            if let Some(server_details) = &classified.server_details {
                error!(
                    status = classified.status.as_u16(),
                    error_code = %classified.error_code,
                    server_details = %server_details,
                    "classified request failure"
                );
            }
            ErrorResponse {
                status: classified.status,
                body: ErrorBody {
                    error_code: classified.error_code,
                    client_details: classified.client_details,
                },
            }
        }
        RequestError::Classified(classified) => {
            error!(error = ?classified, "classified error without an error code");
            internal_error()
        }
        RequestError::MalformedInput { message } => {
            debug!(%message, "malformed request input");
            ErrorResponse::new(StatusCode::BAD_REQUEST, INVALID_JSON)
        }
        RequestError::SessionLookup(source) => {
            error!(error = %source, "session lookup failed");
            internal_error()
        }
        RequestError::Internal(source) => {
            error!(error = ?source, "unclassified request failure");
            internal_error()
        }
    }
}

fn internal_error() -> ErrorResponse {
    ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        classify(self).into_response()
    }
}

impl IntoResponse for ClassifiedError {
    fn into_response(self) -> Response {
        RequestError::from(self).into_response()
    }
}

/// Response for a handler that panicked
///
/// Installed in the catch-panic layer so a panic is classified like any other
/// unclassified failure and still passes through the metrics stage.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());

    RequestError::Internal(anyhow::anyhow!("handler panicked: {message}")).into_response()
}
