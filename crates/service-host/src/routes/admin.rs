// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Admin routes
//!
//! Operational endpoints every hosted service carries, mounted under
//! [`ADMIN_PREFIX`](super::ADMIN_PREFIX). The table is the single source of
//! truth: [`router`] binds every entry and `help` lists every entry.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::{MethodRouter, get},
};
use diagnostics::{DiagnosticsProvider, DiagnosticsResult};
use serde::Serialize;
use serde_json::json;

use crate::{error::RequestResult, state::ServiceState};

/// One admin endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminRoute {
    /// Strictly increasing timestamp
    Ping,
    /// Coarse health check
    Ok,
    /// Route name to description
    Help,
    /// Process diagnostics
    Process,
    /// Operating system diagnostics
    Os,
    /// Network interfaces
    Network,
    /// Exit with failure, skipping the drain
    Crash,
    /// Graceful termination
    End,
}

impl AdminRoute {
    /// Every admin route
    pub const ALL: [Self; 8] = [
        Self::Ping,
        Self::Ok,
        Self::Help,
        Self::Process,
        Self::Os,
        Self::Network,
        Self::Crash,
        Self::End,
    ];

    /// Route name, also its path segment
    pub fn name(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Ok => "ok",
            Self::Help => "help",
            Self::Process => "process",
            Self::Os => "os",
            Self::Network => "network",
            Self::Crash => "crash",
            Self::End => "end",
        }
    }

    /// What the route returns
    pub fn description(self) -> &'static str {
        match self {
            Self::Ping => "current time in milliseconds, strictly increasing between calls",
            Self::Ok => "plain text OK while the service accepts requests",
            Self::Help => "this list of admin routes",
            Self::Process => "pid, arguments, memory, uptime and ids of the service process",
            Self::Os => "hostname, CPUs, load average and memory of the host",
            Self::Network => "network interfaces and their addresses",
            Self::Crash => "responds, then exits with a failure status without draining",
            Self::End => "responds, then drains connections and exits",
        }
    }

    /// Path relative to the admin prefix
    pub fn path(self) -> String {
        format!("/{}", self.name())
    }

    fn method_router(self) -> MethodRouter<ServiceState> {
        match self {
            Self::Ping => get(ping),
            Self::Ok => get(ok),
            Self::Help => get(help),
            Self::Process => get(process),
            Self::Os => get(os),
            Self::Network => get(network),
            Self::Crash => get(crash),
            Self::End => get(end),
        }
    }
}

/// Router binding every [`AdminRoute`]
pub fn router() -> Router<ServiceState> {
    AdminRoute::ALL
        .into_iter()
        .fold(Router::new(), |router, route| {
            router.route(&route.path(), route.method_router())
        })
}

async fn ping(State(state): State<ServiceState>) -> Json<serde_json::Value> {
    Json(json!({ "pong": state.clock().now_ms() }))
}

async fn ok() -> &'static str {
    "OK"
}

async fn help() -> Json<BTreeMap<&'static str, &'static str>> {
    Json(
        AdminRoute::ALL
            .into_iter()
            .map(|route| (route.name(), route.description()))
            .collect(),
    )
}

/// Run a diagnostics query off the async workers
async fn query<T, F>(state: &ServiceState, run: F) -> RequestResult<Response>
where
    T: Serialize + Send + 'static,
    F: FnOnce(&dyn DiagnosticsProvider) -> DiagnosticsResult<T> + Send + 'static,
{
    let provider = Arc::clone(state.diagnostics());
    let report = tokio::task::spawn_blocking(move || run(provider.as_ref()))
        .await
        .map_err(anyhow::Error::from)?
        .map_err(anyhow::Error::from)?;
    Ok(Json(report).into_response())
}

async fn process(State(state): State<ServiceState>) -> RequestResult<Response> {
    query(&state, |provider| provider.process()).await
}

async fn os(State(state): State<ServiceState>) -> RequestResult<Response> {
    query(&state, |provider| provider.os()).await
}

async fn network(State(state): State<ServiceState>) -> RequestResult<Response> {
    query(&state, |provider| provider.network()).await
}

async fn crash(State(state): State<ServiceState>) -> Json<serde_json::Value> {
    state.control().crash();
    Json(json!({}))
}

async fn end(State(state): State<ServiceState>) -> Json<serde_json::Value> {
    state.control().request_termination();
    Json(json!({}))
}
