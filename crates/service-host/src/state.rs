// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Service state management module
//!
//! This module provides the state shared by every request handler: the
//! configuration, the session store, diagnostics, and the control handle the
//! admin routes use to end the service.

use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use axum::http::HeaderName;
use diagnostics::DiagnosticsProvider;
use session_store::SessionBackend;

use crate::{config::ServiceConfig, lifecycle::ServiceControl};

/// Wall-clock milliseconds that never repeat or go backwards
///
/// Each reading is the current Unix time in milliseconds, or one more than the
/// previous reading when the wall clock has not advanced past it.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    /// Create a clock
    pub fn new() -> Self {
        Self::default()
    }

    /// A strictly increasing timestamp in milliseconds
    pub fn now_ms(&self) -> i64 {
        let wall = chrono::Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }
}

/// Shared application state
#[derive(Debug, Clone)]
pub struct ServiceState {
    config: Arc<ServiceConfig>,
    session_header: HeaderName,
    sessions: Arc<SessionBackend>,
    diagnostics: Arc<dyn DiagnosticsProvider>,
    clock: Arc<MonotonicClock>,
    control: ServiceControl,
}

impl ServiceState {
    /// Create new service state
    pub fn new(
        config: Arc<ServiceConfig>,
        sessions: SessionBackend,
        diagnostics: Arc<dyn DiagnosticsProvider>,
        control: ServiceControl,
    ) -> Self {
        let session_header = config.session.header.value().clone();
        Self {
            config,
            session_header,
            sessions: Arc::new(sessions),
            diagnostics,
            clock: Arc::new(MonotonicClock::new()),
            control,
        }
    }

    /// Service configuration
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Header carrying the caller's session identifier
    pub fn session_header(&self) -> &HeaderName {
        &self.session_header
    }

    /// Store sessions are resolved against
    pub fn sessions(&self) -> &SessionBackend {
        &self.sessions
    }

    /// Diagnostics served by the admin routes
    pub fn diagnostics(&self) -> &Arc<dyn DiagnosticsProvider> {
        &self.diagnostics
    }

    /// Clock behind the ping route
    pub fn clock(&self) -> &MonotonicClock {
        &self.clock
    }

    /// Handle for ending the service
    pub fn control(&self) -> &ServiceControl {
        &self.control
    }
}
