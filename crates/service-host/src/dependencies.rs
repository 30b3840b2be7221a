// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Dependency injection module
//!
//! Everything a [`Service`](crate::Service) needs besides its configuration:
//! the business routes it hosts and the collaborators behind the session
//! lookup, the diagnostics routes and process exit. Tests swap any of them.

use std::sync::Arc;

use axum::Router;
use diagnostics::{DiagnosticsProvider, SystemDiagnostics};
use session_store::{SessionBackend, SessionStore};
use tracing::info;

use crate::{
    config::{ServiceConfig, SessionStoreConfig},
    error::{ServiceError, ServiceResult},
    lifecycle::{ProcessTerminator, Terminator},
    state::ServiceState,
};

/// Collaborators injected into a service
#[derive(Debug)]
pub struct Dependencies {
    /// Business routes; must not install a fallback
    pub routes: Router<ServiceState>,
    /// Session store consulted by identity augmentation
    pub sessions: SessionBackend,
    /// Source of the diagnostics admin routes
    pub diagnostics: Arc<dyn DiagnosticsProvider>,
    /// How the process exits
    pub terminator: Arc<dyn Terminator>,
}

impl Dependencies {
    /// Default collaborators for a configuration
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Config` if the configured session store cannot
    /// be built.
    pub fn from_config(config: &ServiceConfig) -> ServiceResult<Self> {
        let sessions = match &config.session.store {
            SessionStoreConfig::Memory => SessionBackend::memory(),
            SessionStoreConfig::Http(http) => {
                SessionBackend::http(http.clone()).map_err(|e| ServiceError::Config {
                    message: format!("invalid session store: {e}"),
                })?
            }
        };
        info!(store = sessions.name(), "session store configured");

        Ok(Self {
            routes: Router::new(),
            sessions,
            diagnostics: Arc::new(SystemDiagnostics::new()),
            terminator: Arc::new(ProcessTerminator),
        })
    }

    /// Replace the business routes
    #[must_use]
    pub fn with_routes(mut self, routes: Router<ServiceState>) -> Self {
        self.routes = routes;
        self
    }

    /// Replace the session store
    #[must_use]
    pub fn with_sessions(mut self, sessions: impl Into<SessionBackend>) -> Self {
        self.sessions = sessions.into();
        self
    }

    /// Replace the diagnostics provider
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsProvider>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Replace the terminator
    #[must_use]
    pub fn with_terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }
}
