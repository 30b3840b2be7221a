// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Service Host Implementation
//!
//! This crate hosts a network-facing service: it owns the inbound listener,
//! tracks every live connection so shutdown drains instead of severing them,
//! reacts to termination signals, and mounts a fixed set of admin routes next
//! to the business routes each service supplies.
//!
//! # Module Structure
//!
//! - [`config`]: layered configuration with environment overrides
//! - [`error`]: lifecycle errors and the request failure taxonomy
//! - [`classifier`]: turns every request failure into exactly one response
//! - [`registry`]: table of open connections
//! - [`lifecycle`]: lifecycle states, process exit and signals
//! - [`server`]: the [`Service`] lifecycle controller
//! - [`routes`]: the request pipeline and the admin routes
//! - [`middleware`]: metrics stage and identity augmentation
//! - [`identity`], [`extractors`]: extractors for business routes
//! - [`metrics`]: Prometheus collectors
//!
//! # Example
//!
//! ```no_run
//! use axum::{Router, routing::get};
//! use service_host::{Dependencies, Identity, Service, ServiceConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ServiceConfig::from_env()?;
//! let routes = Router::new().route(
//!     "/hello",
//!     get(|identity: Identity| async move { format!("hello {}", identity.username) }),
//! );
//! let dependencies = Dependencies::from_config(&config)?.with_routes(routes);
//! Service::with_dependencies(config, dependencies).run().await?;
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod dependencies;
pub mod error;
pub mod extractors;
pub mod identity;
pub mod lifecycle;
pub mod metrics;
pub mod middleware;
pub mod registry;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{Environment, ServiceConfig};
pub use dependencies::Dependencies;
pub use error::{
    ClassifiedError, ErrorKind, RequestError, RequestResult, ServiceError, ServiceResult,
};
pub use extractors::JsonBody;
pub use identity::Identity;
pub use lifecycle::{ExitStatus, LifecycleState, ProcessTerminator, Terminator};
pub use registry::{ConnectionId, ConnectionRegistry};
pub use server::Service;
pub use state::ServiceState;
