// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Test fixtures for running a live service
//!
//! Services are bound to an OS-assigned loopback port and exit through a
//! [`RecordingTerminator`], so tests can observe exits without dying.

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::Router;
use service_host::{
    Dependencies, ExitStatus, Service, ServiceConfig, ServiceState, Terminator,
    config::GracePeriod,
};
use session_store::SessionBackend;
use tokio::sync::Notify;

/// How long a test waits for something that should happen promptly
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Records exits instead of ending the test process
#[derive(Debug, Default)]
pub struct RecordingTerminator {
    exits: Mutex<Vec<ExitStatus>>,
    exited: Notify,
}

impl RecordingTerminator {
    /// Every status exited with, in order
    pub fn exits(&self) -> Vec<ExitStatus> {
        self.exits.lock().expect("terminator lock poisoned").clone()
    }

    /// Wait until the first exit is recorded and return it
    pub async fn first_exit(&self) -> ExitStatus {
        loop {
            let notified = self.exited.notified();
            if let Some(status) = self.exits().first() {
                return *status;
            }
            tokio::time::timeout(PATIENCE, notified)
                .await
                .expect("service never exited");
        }
    }
}

impl Terminator for RecordingTerminator {
    fn exit(&self, status: ExitStatus) {
        self.exits
            .lock()
            .expect("terminator lock poisoned")
            .push(status);
        self.exited.notify_waiters();
    }
}

/// A service under test
#[derive(Debug)]
pub struct TestService {
    pub service: Service,
    pub terminator: Arc<RecordingTerminator>,
}

impl TestService {
    /// Build a service around business routes, not yet connected
    pub fn new(routes: Router<ServiceState>) -> Self {
        Self::build(ServiceConfig::for_testing(), routes, SessionBackend::memory())
    }

    /// Build with a specific grace period
    pub fn with_grace(routes: Router<ServiceState>, grace_ms: u64) -> Self {
        let mut config = ServiceConfig::for_testing();
        config.shutdown_grace_period =
            GracePeriod::from_millis(grace_ms).expect("valid grace period");
        Self::build(config, routes, SessionBackend::memory())
    }

    /// Build with a specific session store
    pub fn with_sessions(routes: Router<ServiceState>, sessions: SessionBackend) -> Self {
        Self::build(ServiceConfig::for_testing(), routes, sessions)
    }

    fn build(config: ServiceConfig, routes: Router<ServiceState>, sessions: SessionBackend) -> Self {
        let terminator = Arc::new(RecordingTerminator::default());
        let dependencies = Dependencies::from_config(&config)
            .expect("default dependencies")
            .with_routes(routes)
            .with_sessions(sessions)
            .with_terminator(terminator.clone());

        Self {
            service: Service::with_dependencies(config, dependencies),
            terminator,
        }
    }

    /// Connect and return the base URL
    pub async fn start(&self) -> String {
        let addr = self.service.connect().await.expect("service connects");
        base_url(addr)
    }
}

/// `http://` URL for a bound address
pub fn base_url(addr: SocketAddr) -> String {
    format!("http://{addr}")
}

/// Poll `condition` until it holds or [`PATIENCE`] runs out
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(PATIENCE, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}
