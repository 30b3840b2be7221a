// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Remote session store
//!
//! Resolves sessions against a session service over HTTP:
//! `GET {base_url}/sessions/{session_id}` answers `200` with a
//! [`SessionRecord`] body for live sessions and `404` for unknown ones.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared_types::{SessionId, SessionRecord};
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use crate::{SessionStore, SessionStoreError, SessionStoreResult};

const DEFAULT_TIMEOUT_SECONDS: u64 = 5;

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

/// Configuration for the HTTP session store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSessionStoreConfig {
    /// Base URL of the session service
    pub base_url: Url,
    /// Per-lookup timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl HttpSessionStoreConfig {
    /// Create a configuration with the default timeout
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

/// Session store that queries a remote session service
#[derive(Debug, Clone)]
pub struct HttpSessionStore {
    client: Client,
    config: HttpSessionStoreConfig,
}

impl HttpSessionStore {
    /// Create a new HTTP session store
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Configuration` if the base URL cannot carry a
    /// path or the timeout is zero, and `SessionStoreError::Transport` if the
    /// HTTP client cannot be built.
    pub fn new(config: HttpSessionStoreConfig) -> SessionStoreResult<Self> {
        if config.base_url.cannot_be_a_base() {
            return Err(SessionStoreError::Configuration {
                message: format!("base URL '{}' cannot carry a path", config.base_url),
            });
        }

        if config.timeout_seconds == 0 {
            return Err(SessionStoreError::Configuration {
                message: "timeout must be greater than 0".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("service-host/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    /// Build the lookup URL, percent-encoding the session id as one path segment
    fn session_url(&self, session_id: &SessionId) -> SessionStoreResult<Url> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SessionStoreError::Configuration {
                message: format!("base URL '{}' cannot carry a path", self.config.base_url),
            })?
            .pop_if_empty()
            .extend(["sessions", session_id.as_str()]);
        Ok(url)
    }
}

impl SessionStore for HttpSessionStore {
    async fn lookup(&self, session_id: &SessionId) -> SessionStoreResult<Option<SessionRecord>> {
        let url = self.session_url(session_id)?;
        debug!(url = %url, "looking up session");

        let request = self
            .client
            .get(url)
            .header("accept", "application/json")
            .send();

        let response = timeout(Duration::from_secs(self.config.timeout_seconds), request)
            .await
            .map_err(|_| SessionStoreError::Timeout {
                timeout_seconds: self.config.timeout_seconds,
            })??;

        match response.status() {
            StatusCode::OK => {
                let body = response.bytes().await?;
                let record: SessionRecord = serde_json::from_slice(&body)?;
                Ok(Some(record))
            }
            StatusCode::NOT_FOUND => {
                debug!("session not found");
                Ok(None)
            }
            status => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".to_string());
                warn!(status = status.as_u16(), "session store returned an error");
                Err(SessionStoreError::Status {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
