// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Service configuration module
//!
//! This module provides the immutable configuration a [`Service`](crate::Service)
//! is constructed with: where to listen, how long to wait for connections to
//! drain on shutdown, and how callers' sessions are resolved.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr},
    path::Path,
    str::FromStr,
    time::Duration,
};

use anyhow::{Result, anyhow, ensure};
use axum::http::HeaderName;
use config::{Config, ConfigError, Environment as ConfigEnv, File};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use session_store::HttpSessionStoreConfig;

use crate::error::{ServiceError, ServiceResult};

/// Host value meaning "every interface"
pub const WILDCARD_HOST: &str = "*";

/// Default header carrying the caller's session identifier
pub const DEFAULT_SESSION_HEADER: &str = "x-session-id";

/// Upper bound on the shutdown grace period
pub const MAX_GRACE_PERIOD_MS: u64 = 300_000;

/// Interface the listener binds to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindHost {
    /// All IPv4 interfaces, written `*`
    ///
    /// Binds `0.0.0.0`. Use an explicit `::` host for an IPv6 or dual-stack
    /// listener.
    Any,
    /// An IP literal or a resolvable host name
    Named(String),
}

impl BindHost {
    /// Host string suitable for socket address resolution
    pub fn as_bind_str(&self) -> &str {
        match self {
            Self::Any => "0.0.0.0",
            Self::Named(host) => host,
        }
    }
}

impl FromStr for BindHost {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let host = s.trim();
        ensure!(!host.is_empty(), "host cannot be empty");
        if host == WILDCARD_HOST {
            Ok(Self::Any)
        } else {
            Ok(Self::Named(host.to_string()))
        }
    }
}

impl From<IpAddr> for BindHost {
    fn from(ip: IpAddr) -> Self {
        Self::Named(ip.to_string())
    }
}

impl fmt::Display for BindHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str(WILDCARD_HOST),
            Self::Named(host) => f.write_str(host),
        }
    }
}

impl Serialize for BindHost {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BindHost {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(|e: anyhow::Error| de::Error::custom(e))
    }
}

/// A validated server port that ensures the value is appropriate for the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerPort {
    port: u16,
    environment: Environment,
}

impl ServerPort {
    /// Create a new `ServerPort`, ensuring it's valid for the given environment
    ///
    /// # Errors
    ///
    /// Returns an error if the port is 0 in non-testing environments
    pub fn new(port: u16, environment: Environment) -> Result<Self> {
        if port == 0 && environment != Environment::Testing {
            return Err(anyhow!("port cannot be 0 in non-testing environments"));
        }
        Ok(Self { port, environment })
    }

    /// Create a safe default port for development
    pub const fn default_development() -> Self {
        Self {
            port: 3000,
            environment: Environment::Development,
        }
    }

    /// Create a safe testing port (port 0)
    pub const fn testing() -> Self {
        Self {
            port: 0,
            environment: Environment::Testing,
        }
    }

    /// Get the port value
    pub fn value(&self) -> u16 {
        self.port
    }
}

impl Serialize for ServerPort {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.port)
    }
}

impl<'de> Deserialize<'de> for ServerPort {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let port = u16::deserialize(deserializer)?;
        // Validated against the environment once loading knows it
        Ok(Self {
            port,
            environment: Environment::Development,
        })
    }
}

/// How long shutdown waits for connections to drain before exiting anyway
///
/// Zero (the default) exits as soon as the drain has been initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GracePeriod(Duration);

impl GracePeriod {
    /// Create a new `GracePeriod` from milliseconds
    ///
    /// # Errors
    ///
    /// Returns an error if the period exceeds [`MAX_GRACE_PERIOD_MS`]
    pub fn from_millis(millis: u64) -> Result<Self> {
        ensure!(
            millis <= MAX_GRACE_PERIOD_MS,
            "shutdown grace period cannot exceed {MAX_GRACE_PERIOD_MS} ms"
        );
        Ok(Self(Duration::from_millis(millis)))
    }

    /// No grace period
    pub const fn none() -> Self {
        Self(Duration::ZERO)
    }

    /// Get the period as a duration
    pub fn value(&self) -> Duration {
        self.0
    }
}

impl Serialize for GracePeriod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(self.0.as_millis()).unwrap_or(u64::MAX))
    }
}

impl<'de> Deserialize<'de> for GracePeriod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Self::from_millis(millis).map_err(|e| de::Error::custom(e.to_string()))
    }
}

/// A validated header name for the session identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHeader(HeaderName);

impl SessionHeader {
    /// Get the header name
    pub fn value(&self) -> &HeaderName {
        &self.0
    }
}

impl Default for SessionHeader {
    fn default() -> Self {
        Self(HeaderName::from_static(DEFAULT_SESSION_HEADER))
    }
}

impl FromStr for SessionHeader {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        HeaderName::from_bytes(s.trim().as_bytes())
            .map(Self)
            .map_err(|_| anyhow!("'{s}' is not a valid header name"))
    }
}

impl Serialize for SessionHeader {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for SessionHeader {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(|e: anyhow::Error| de::Error::custom(e))
    }
}

/// Which session store resolves caller sessions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum SessionStoreConfig {
    /// In-process store, populated by the embedding service
    #[default]
    Memory,
    /// Remote session service
    Http(HttpSessionStoreConfig),
}

/// Session resolution settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Header carrying the session identifier
    #[serde(default)]
    pub header: SessionHeader,
    /// Store the identifier is resolved against
    #[serde(default)]
    pub store: SessionStoreConfig,
}

/// Environment types for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production environment
    Production,
    /// Development environment
    Development,
    /// Testing environment
    Testing,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
            Environment::Testing => write!(f, "testing"),
        }
    }
}

/// Service configuration, fixed for the life of a [`Service`](crate::Service)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Interface to bind, `*` for all
    pub host: BindHost,
    /// Port to bind (validated for environment compatibility)
    pub port: ServerPort,
    /// Bound on draining before a forced exit
    #[serde(rename = "shutdown_grace_period_ms", default)]
    pub shutdown_grace_period: GracePeriod,
    /// Environment type
    pub environment: Environment,
    /// Session resolution
    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: BindHost::from(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            port: ServerPort::default_development(),
            shutdown_grace_period: GracePeriod::none(),
            environment: Environment::Development,
            session: SessionConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create configuration from environment variables and optional configuration files
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Config` if configuration is invalid or cannot be loaded.
    pub fn from_env() -> ServiceResult<Self> {
        Self::load().map_err(|e| ServiceError::Config {
            message: format!("failed to load configuration: {e}"),
        })
    }

    /// Load configuration from the working directory
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new("."))
    }

    /// Load configuration using the config crate with hierarchical sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. Configuration file (`{dir}/config.json`)
    /// 3. Environment-specific file (`{dir}/config.{env}.json`)
    /// 4. Environment variables with `SERVICE_` prefix, `__` between nested keys
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or is invalid.
    pub fn load_from(dir: &Path) -> Result<Self, ConfigError> {
        let env_var = std::env::var("ENVIRONMENT").ok();
        let env_name = env_var
            .as_deref()
            .unwrap_or("development")
            .to_lowercase();

        let mut config_builder = Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 3000)?
            .set_default("shutdown_grace_period_ms", 0)?
            .set_default("environment", "development")?
            .add_source(File::from(dir.join("config.json")).required(false))
            .add_source(File::from(dir.join(format!("config.{env_name}.json"))).required(false))
            .add_source(
                ConfigEnv::with_prefix("SERVICE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if env_var.is_some() {
            config_builder = config_builder.set_override("environment", env_name)?;
        }

        let config = config_builder.build()?;
        let mut service_config: Self = config.try_deserialize()?;

        service_config.port =
            ServerPort::new(service_config.port.value(), service_config.environment)
                .map_err(|e| ConfigError::Message(format!("invalid port configuration: {e}")))?;

        Ok(service_config)
    }

    /// Create configuration optimized for testing
    pub fn for_testing() -> Self {
        Self {
            host: BindHost::from(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            port: ServerPort::testing(), // let OS choose available port
            shutdown_grace_period: GracePeriod::none(),
            environment: Environment::Testing,
            session: SessionConfig::default(),
        }
    }
}
