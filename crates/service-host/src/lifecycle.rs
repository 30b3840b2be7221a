// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle states, process exit and termination signals

use std::{fmt, sync::Arc, time::Duration};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Time given to a response before a requested crash exits the process
pub const CRASH_FLUSH_DELAY: Duration = Duration::from_millis(100);

/// Shortest wait for connections to close before a disconnect destroys them
///
/// The actual window is the larger of this and the shutdown grace period.
pub const MIN_DRAIN_WINDOW: Duration = Duration::from_secs(1);

/// Where a [`Service`](crate::Service) is in its lifecycle
///
/// `Idle → Listening → Draining → Stopped`; restarting goes back through
/// `Idle` and never resumes a draining listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Constructed, no listener
    Idle,
    /// Accepting connections
    Listening,
    /// Listener closed, waiting for open connections to finish
    Draining,
    /// Every connection has closed
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Listening => write!(f, "listening"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Status the process exits with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Clean shutdown
    Success,
    /// Fatal fault or requested crash
    Failure,
}

impl ExitStatus {
    /// Process exit code
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }
}

/// Ends the process
#[cfg_attr(test, mockall::automock)]
pub trait Terminator: Send + Sync + fmt::Debug {
    /// Exit with the given status
    fn exit(&self, status: ExitStatus);
}

/// Exits the real process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn exit(&self, status: ExitStatus) {
        info!(code = status.code(), "exiting process");
        std::process::exit(status.code());
    }
}

/// Handle routes use to end the service
#[derive(Debug, Clone)]
pub struct ServiceControl {
    termination: CancellationToken,
    terminator: Arc<dyn Terminator>,
}

impl ServiceControl {
    /// Create a control handle exiting through `terminator`
    pub fn new(terminator: Arc<dyn Terminator>) -> Self {
        Self {
            termination: CancellationToken::new(),
            terminator,
        }
    }

    /// Ask the running service to drain and exit
    pub fn request_termination(&self) {
        info!("termination requested");
        self.termination.cancel();
    }

    /// Whether termination has been requested
    pub fn termination_requested(&self) -> bool {
        self.termination.is_cancelled()
    }

    /// Resolves once termination has been requested
    pub async fn terminated(&self) {
        self.termination.cancelled().await;
    }

    /// Exit with a failure status after [`CRASH_FLUSH_DELAY`], skipping the drain
    pub fn crash(&self) {
        let terminator = Arc::clone(&self.terminator);
        tokio::spawn(async move {
            tokio::time::sleep(CRASH_FLUSH_DELAY).await;
            error!("crash requested, exiting without draining");
            terminator.exit(ExitStatus::Failure);
        });
    }

    /// The terminator the service exits through
    pub fn terminator(&self) -> &Arc<dyn Terminator> {
        &self.terminator
    }
}

/// Wait for the process to be asked to terminate
///
/// Listens for SIGTERM and SIGINT on unix, Ctrl-C elsewhere, and returns the
/// name of the signal received.
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
pub async fn termination_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        warn!(signal = name, "received termination signal");
        Ok(name)
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        warn!(signal = "CTRL+C", "received termination signal");
        Ok("CTRL+C")
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;

    #[test]
    fn state_display() {
        assert_eq!(LifecycleState::Idle.to_string(), "idle");
        assert_eq!(LifecycleState::Listening.to_string(), "listening");
        assert_eq!(LifecycleState::Draining.to_string(), "draining");
        assert_eq!(LifecycleState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Failure.code(), 1);
    }

    #[tokio::test]
    async fn termination_request_wakes_waiters() {
        let control = ServiceControl::new(Arc::new(MockTerminator::new()));
        let waiter = control.clone();
        let task = tokio::spawn(async move { waiter.terminated().await });

        assert!(!control.termination_requested());
        control.request_termination();
        task.await.unwrap();
        assert!(control.termination_requested());
    }

    #[tokio::test]
    async fn crash_exits_with_failure_after_delay() {
        let mut terminator = MockTerminator::new();
        terminator
            .expect_exit()
            .with(eq(ExitStatus::Failure))
            .times(1)
            .return_const(());
        let control = ServiceControl::new(Arc::new(terminator));

        control.crash();
        tokio::time::sleep(CRASH_FLUSH_DELAY * 2).await;
        // The mock verifies the single call when the control is dropped
        drop(control);
    }
}
