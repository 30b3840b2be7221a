// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error handling module
//!
//! Two families of errors live here:
//!
//! - [`ServiceError`] for lifecycle and configuration failures. These never
//!   reach a client; bind and listener faults terminate the process.
//! - [`RequestError`] for anything that goes wrong while serving a request.
//!   Every variant is turned into exactly one response by
//!   [`classify`](crate::classifier::classify).

use std::{borrow::Cow, fmt};

use axum::http::StatusCode;
use serde::Serialize;
use session_store::SessionStoreError;
use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Lifecycle and configuration errors
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Configuration validation errors
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Network binding errors
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// Address that failed to bind, as configured
        address: String,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Service startup errors
    #[error("Service startup failed: {source}")]
    Startup {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The listener failed in a way it cannot recover from
    #[error("Listener fault: {source}")]
    Listener {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// A lifecycle operation was invoked from a state that does not allow it
    #[error("cannot {operation} while {from}")]
    InvalidTransition {
        /// State the controller was in
        from: LifecycleState,
        /// Operation that was refused
        operation: &'static str,
    },

    /// Task join errors for async operations
    #[error("Task join error: {source}")]
    TaskJoin {
        /// Underlying tokio join error
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Result type for lifecycle operations
pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<tokio::task::JoinError> for ServiceError {
    fn from(source: tokio::task::JoinError) -> Self {
        Self::TaskJoin { source }
    }
}

/// Error kinds a failure can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The listener could not bind or failed while accepting; never reaches a client
    BindOrListenerFault,
    /// The request could not be parsed
    MalformedInput,
    /// A failure carrying its own status and client code
    ClassifiedClientError,
    /// Anything else
    UnclassifiedInternalFailure,
    /// The session store could not be consulted
    SessionLookupFailure,
}

/// A failure that already knows how it should look to the client
///
/// `server_details` is logged when the error is classified and never sent.
///
/// ```rust
/// use axum::http::StatusCode;
/// use serde_json::json;
/// use service_host::ClassifiedError;
///
/// let error = ClassifiedError::new(StatusCode::FORBIDDEN, "forbidden")
///     .with_client_details(json!({"resource": "invoice"}))
///     .with_server_details("user 7 lacks role billing");
/// assert_eq!(error.status, StatusCode::FORBIDDEN);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedError {
    /// HTTP status of the response
    pub status: StatusCode,
    /// Client-visible error code
    pub error_code: Cow<'static, str>,
    /// Client-visible structured details
    pub client_details: Option<serde_json::Value>,
    /// Details for the server log only
    pub server_details: Option<String>,
}

impl ClassifiedError {
    /// Create an error with a status and client code
    pub fn new(status: StatusCode, error_code: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            error_code: error_code.into(),
            client_details: None,
            server_details: None,
        }
    }

    /// Attach details the client will see
    #[must_use]
    pub fn with_client_details(mut self, details: serde_json::Value) -> Self {
        self.client_details = Some(details);
        self
    }

    /// Attach details only the server log will see
    #[must_use]
    pub fn with_server_details(mut self, details: impl Into<String>) -> Self {
        self.server_details = Some(details.into());
        self
    }

    /// No route matched the request
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "notFound")
    }

    /// The session header did not resolve to a live session
    pub fn invalid_session() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalidSession")
    }

    /// The route requires an identity and the request has none
    pub fn unauthenticated() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated")
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.error_code)
    }
}

impl std::error::Error for ClassifiedError {}

/// Errors raised while serving a request
#[derive(Error, Debug)]
pub enum RequestError {
    /// A failure with a caller-chosen status and code
    #[error("classified error: {0}")]
    Classified(ClassifiedError),

    /// The request body could not be parsed
    #[error("malformed input: {message}")]
    MalformedInput {
        /// What was wrong with the input
        message: String,
    },

    /// The session store failed while resolving the caller
    #[error("session lookup failed: {0}")]
    SessionLookup(#[from] SessionStoreError),

    /// Any other failure
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RequestError {
    /// The kind this failure belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Classified(_) => ErrorKind::ClassifiedClientError,
            Self::MalformedInput { .. } => ErrorKind::MalformedInput,
            Self::SessionLookup(_) => ErrorKind::SessionLookupFailure,
            Self::Internal(_) => ErrorKind::UnclassifiedInternalFailure,
        }
    }
}

impl From<ClassifiedError> for RequestError {
    fn from(error: ClassifiedError) -> Self {
        Self::Classified(error)
    }
}

/// Result type for request handlers
pub type RequestResult<T> = Result<T, RequestError>;

/// Client-visible error body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Error code
    pub error_code: Cow<'static, str>,
    /// Structured details, omitted when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_details: Option<serde_json::Value>,
}

/// The single response a failure is mapped to
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    /// HTTP status
    pub status: StatusCode,
    /// JSON body
    pub body: ErrorBody,
}

impl ErrorResponse {
    pub(crate) fn new(status: StatusCode, error_code: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error_code: error_code.into(),
                client_details: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn host_error_codes() {
        let not_found = ClassifiedError::not_found();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_found.error_code, "notFound");

        let invalid = ClassifiedError::invalid_session();
        assert_eq!(invalid.status, StatusCode::UNAUTHORIZED);
        assert_eq!(invalid.error_code, "invalidSession");

        let unauthenticated = ClassifiedError::unauthenticated();
        assert_eq!(unauthenticated.status, StatusCode::UNAUTHORIZED);
        assert_eq!(unauthenticated.error_code, "unauthenticated");
    }

    #[test]
    fn request_error_kinds() {
        let classified: RequestError = ClassifiedError::not_found().into();
        assert_eq!(classified.kind(), ErrorKind::ClassifiedClientError);

        let malformed = RequestError::MalformedInput {
            message: "bad".to_string(),
        };
        assert_eq!(malformed.kind(), ErrorKind::MalformedInput);

        let lookup: RequestError = SessionStoreError::Timeout { timeout_seconds: 1 }.into();
        assert_eq!(lookup.kind(), ErrorKind::SessionLookupFailure);

        let internal: RequestError = anyhow::anyhow!("boom").into();
        assert_eq!(internal.kind(), ErrorKind::UnclassifiedInternalFailure);
    }

    #[test]
    fn error_body_omits_missing_details() {
        let body = ErrorBody {
            error_code: "notFound".into(),
            client_details: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"errorCode": "notFound"})
        );

        let body = ErrorBody {
            error_code: "forbidden".into(),
            client_details: Some(json!({"resource": "invoice"})),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"errorCode": "forbidden", "clientDetails": {"resource": "invoice"}})
        );
    }

    #[test]
    fn invalid_transition_message() {
        let error = ServiceError::InvalidTransition {
            from: LifecycleState::Listening,
            operation: "connect",
        };
        assert_eq!(error.to_string(), "cannot connect while listening");
    }
}
