// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Process, OS and network diagnostics
//!
//! This crate answers the questions operational endpoints ask about a running
//! service: who is this process, what machine is it on, which interfaces can it
//! reach. Every query is a synchronous, read-only call into the OS.
//!
//! # Module Structure
//!
//! - [`process`]: [`ProcessReport`] for the current process
//! - [`os`]: [`OsReport`] for the host operating system
//! - [`network`]: [`NetworkReport`] listing interface addresses
//! - [`human`]: byte counts rendered for people

use std::{fmt, time::Instant};

use thiserror::Error;

pub mod human;
pub mod network;
pub mod os;
pub mod process;

pub use human::human_size;
pub use network::{AddressFamily, InterfaceAddress, NetworkReport};
pub use os::{CpuSummary, OsReport, SystemMemory};
pub use process::{ProcessMemory, ProcessReport};

/// Result type for diagnostics queries
pub type DiagnosticsResult<T> = Result<T, DiagnosticsError>;

/// Failures querying the operating system
#[derive(Debug, Error)]
pub enum DiagnosticsError {
    /// A filesystem or process query failed
    #[error("failed to read {what}: {source}")]
    Io {
        /// What was being read
        what: &'static str,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// A system call failed
    #[error("failed to query {what}: {source}")]
    Os {
        /// What was being queried
        what: &'static str,
        /// Underlying errno
        source: nix::Error,
    },
}

/// Supplier of point-in-time diagnostics
///
/// The host only calls these; it never depends on how they are produced.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait DiagnosticsProvider: Send + Sync + fmt::Debug {
    /// Facts about the current process
    fn process(&self) -> DiagnosticsResult<ProcessReport>;

    /// Facts about the host operating system
    fn os(&self) -> DiagnosticsResult<OsReport>;

    /// Addresses of every network interface
    fn network(&self) -> DiagnosticsResult<NetworkReport>;
}

/// Diagnostics read from the running operating system
#[derive(Debug, Clone)]
pub struct SystemDiagnostics {
    started: Instant,
}

impl SystemDiagnostics {
    /// Create a provider; process uptime is measured from this call
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticsProvider for SystemDiagnostics {
    fn process(&self) -> DiagnosticsResult<ProcessReport> {
        process::collect(self.started)
    }

    fn os(&self) -> DiagnosticsResult<OsReport> {
        os::collect()
    }

    fn network(&self) -> DiagnosticsResult<NetworkReport> {
        network::collect()
    }
}
