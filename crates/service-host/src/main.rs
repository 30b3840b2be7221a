// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Service Host
//!
//! Runs the host with its admin routes and a Prometheus `/metrics` route.

use anyhow::Result;
use axum::{Router, routing::get};
use service_host::{Dependencies, Service, ServiceConfig, metrics::metrics_handler};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting service host");

    let config = ServiceConfig::from_env()?;
    let dependencies = Dependencies::from_config(&config)?
        .with_routes(Router::new().route("/metrics", get(metrics_handler)));
    let service = Service::with_dependencies(config, dependencies);

    // NOTE: the `#[tokio::main]` task does not run a worker future, we must spawn
    tokio::spawn(async move { service.run().await }).await??;

    Ok(())
}
