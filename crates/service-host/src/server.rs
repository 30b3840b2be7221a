// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server implementation module
//!
//! [`Service`] is the lifecycle controller: it owns the listener, the
//! connection registry and the request pipeline, and walks them through
//! `idle → listening → draining → stopped`. Transitions are serialized by an
//! async mutex, so a disconnect in flight makes later lifecycle calls wait for
//! it instead of racing the listener shutdown.

use std::{
    future::Future,
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use axum::{Router, extract::ConnectInfo, http::Request};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use session_store::SessionBackend;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    sync::{Mutex, watch},
    task::JoinHandle,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower::{ServiceExt, service_fn};
use tracing::{debug, error, info, trace, warn};

use crate::{
    config::ServiceConfig,
    dependencies::Dependencies,
    error::{ServiceError, ServiceResult},
    lifecycle::{
        ExitStatus, LifecycleState, MIN_DRAIN_WINDOW, ServiceControl, Terminator,
        termination_signal,
    },
    registry::{ConnectionHandle, ConnectionRegistry, Registration},
    routes,
    state::ServiceState,
};

#[derive(Debug, Clone, Copy)]
struct Status {
    state: LifecycleState,
    local_addr: Option<SocketAddr>,
}

/// The listener currently accepting, with everything needed to stop it
#[derive(Debug)]
struct ActiveListener {
    local_addr: SocketAddr,
    stop: CancellationToken,
    tracker: TaskTracker,
}

#[derive(Debug)]
struct ServiceInner {
    config: Arc<ServiceConfig>,
    state: ServiceState,
    routes: Router<ServiceState>,
    registry: ConnectionRegistry,
    status: watch::Sender<Status>,
    transition: Mutex<Option<ActiveListener>>,
    termination_started: AtomicBool,
    termination_done: CancellationToken,
}

/// Network service host
///
/// Cloning yields another handle to the same service.
#[derive(Debug, Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

impl Service {
    /// Create a service with the default collaborators for `config`
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Config` if the configured session store cannot
    /// be built.
    pub fn new(config: ServiceConfig) -> ServiceResult<Self> {
        let dependencies = Dependencies::from_config(&config)?;
        Ok(Self::with_dependencies(config, dependencies))
    }

    /// Create a service with injected collaborators
    pub fn with_dependencies(config: ServiceConfig, dependencies: Dependencies) -> Self {
        let config = Arc::new(config);
        let control = ServiceControl::new(dependencies.terminator);
        let state = ServiceState::new(
            Arc::clone(&config),
            dependencies.sessions,
            dependencies.diagnostics,
            control,
        );
        let (status, _) = watch::channel(Status {
            state: LifecycleState::Idle,
            local_addr: None,
        });

        Self {
            inner: Arc::new(ServiceInner {
                config,
                state,
                routes: dependencies.routes,
                registry: ConnectionRegistry::new(),
                status,
                transition: Mutex::new(None),
                termination_started: AtomicBool::new(false),
                termination_done: CancellationToken::new(),
            }),
        }
    }

    /// Bind the listener and start accepting connections
    ///
    /// Only valid from `idle`. A bind failure is fatal: it is logged and the
    /// process exits with a failure status. While listening, a termination
    /// request (`terminate()` or the `end` admin route) runs the termination
    /// path whether or not the service was started with [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::InvalidTransition` when not idle,
    /// `ServiceError::Bind` if the address cannot be bound, or
    /// `ServiceError::Startup` if the bound address cannot be read.
    pub async fn connect(&self) -> ServiceResult<SocketAddr> {
        let mut active = self.inner.transition.lock().await;
        self.connect_locked(&mut active).await
    }

    async fn connect_locked(
        &self,
        active: &mut Option<ActiveListener>,
    ) -> ServiceResult<SocketAddr> {
        let current = self.state();
        if current != LifecycleState::Idle {
            return Err(ServiceError::InvalidTransition {
                from: current,
                operation: "connect",
            });
        }

        let config = &self.inner.config;
        let app = routes::create_pipeline(self.inner.state.clone(), self.inner.routes.clone());

        let listener = match TcpListener::bind((config.host.as_bind_str(), config.port.value()))
            .await
        {
            Ok(listener) => listener,
            Err(source) => {
                let err = ServiceError::Bind {
                    address: format!("{}:{}", config.host, config.port.value()),
                    source,
                };
                error!(error = %err, "listener could not bind");
                self.terminator().exit(ExitStatus::Failure);
                return Err(err);
            }
        };

        let local_addr = listener
            .local_addr()
            .map_err(|source| ServiceError::Startup { source })?;

        self.inner.registry.reopen();
        let stop = CancellationToken::new();
        let tracker = TaskTracker::new();
        tracker.spawn(accept_loop(
            listener,
            app,
            self.inner.registry.clone(),
            tracker.clone(),
            stop.clone(),
            Arc::clone(self.terminator()),
        ));
        // Outside the tracker: termination waits on the drain.
        tokio::spawn(watch_termination(self.clone(), stop.clone()));

        *active = Some(ActiveListener {
            local_addr,
            stop,
            tracker,
        });
        self.inner.status.send_modify(|status| {
            status.state = LifecycleState::Listening;
            status.local_addr = Some(local_addr);
        });

        info!(
            address = %local_addr,
            environment = %config.environment,
            "service listening"
        );
        Ok(local_addr)
    }

    /// Stop accepting, close every connection and wait for them to finish
    ///
    /// In-flight responses complete before their connection closes; idle
    /// connections close at once. Connections still open after the drain
    /// window (the grace period, at least [`MIN_DRAIN_WINDOW`]) are destroyed.
    /// Returns when the last connection task has ended. A no-op when no
    /// listener is active.
    pub async fn disconnect(&self) {
        let mut active = self.inner.transition.lock().await;
        self.disconnect_locked(&mut active).await;
    }

    async fn disconnect_locked(&self, active: &mut Option<ActiveListener>) {
        let Some(listener) = active.take() else {
            debug!(state = %self.state(), "no active listener to disconnect");
            return;
        };

        self.set_state(LifecycleState::Draining);
        info!(
            address = %listener.local_addr,
            open_connections = self.open_connections(),
            "service draining"
        );

        listener.stop.cancel();
        self.inner.registry.force_close_all();
        listener.tracker.close();

        let window = self.drain_window();
        if tokio::time::timeout(window, listener.tracker.wait())
            .await
            .is_err()
        {
            let destroyed = self.inner.registry.destroy_all();
            warn!(
                window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
                connections = destroyed,
                "connections still open after drain window, destroying them"
            );
            listener.tracker.wait().await;
        }

        self.inner.status.send_modify(|status| {
            status.state = LifecycleState::Stopped;
            status.local_addr = None;
        });
        info!(address = %listener.local_addr, "service stopped");
    }

    /// Full stop then start on a fresh listener
    ///
    /// Holds the transition lock across both halves so no other lifecycle
    /// call can interleave.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn reconnect(&self) -> ServiceResult<SocketAddr> {
        let mut active = self.inner.transition.lock().await;
        self.disconnect_locked(&mut active).await;
        self.set_state(LifecycleState::Idle);
        self.connect_locked(&mut active).await
    }

    /// Start a disconnect in the background
    pub fn end(&self) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move { service.disconnect().await })
    }

    /// Ask a running service to drain and exit, as if signalled
    pub fn terminate(&self) {
        self.inner.state.control().request_termination();
    }

    /// Drain for at most the grace period, then exit with success
    ///
    /// With a zero grace period the drain is started and the process exits
    /// without waiting for it.
    pub async fn handle_termination(&self) {
        let grace = self.inner.config.shutdown_grace_period.value();
        let drain = self.end();

        if grace.is_zero() {
            info!(
                open_connections = self.open_connections(),
                "no grace period, exiting without waiting for drain"
            );
        } else {
            match tokio::time::timeout(grace, drain).await {
                Ok(Ok(())) => info!("connections drained"),
                Ok(Err(e)) => error!(error = %e, "drain task failed"),
                Err(_) => warn!(
                    grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                    open_connections = self.open_connections(),
                    "grace period elapsed before connections drained"
                ),
            }
        }

        self.terminator().exit(ExitStatus::Success);
    }

    /// Connect, serve until a termination signal or request, then shut down
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot connect.
    pub async fn run(&self) -> ServiceResult<()> {
        self.connect().await?;

        let control = self.inner.state.control().clone();
        tokio::select! {
            signal = wait_for_signal() => {
                info!(signal, "termination signal received");
                control.request_termination();
            }
            () = control.terminated() => {}
        }

        self.terminate_once().await;
        Ok(())
    }

    /// Run the termination path unless it already ran, then wait for it
    async fn terminate_once(&self) {
        if self.inner.termination_started.swap(true, Ordering::SeqCst) {
            self.inner.termination_done.cancelled().await;
            return;
        }
        self.handle_termination().await;
        self.inner.termination_done.cancel();
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.inner.status.borrow().state
    }

    /// Address the active listener is bound to
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.status.borrow().local_addr
    }

    /// Number of open connections
    pub fn open_connections(&self) -> usize {
        self.inner.registry.count()
    }

    /// Service configuration
    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Session store the service resolves identities against
    pub fn sessions(&self) -> &SessionBackend {
        self.inner.state.sessions()
    }

    /// Resolves once the service reaches `target`
    pub async fn wait_for_state(&self, target: LifecycleState) {
        let mut status = self.inner.status.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = status.wait_for(|status| status.state == target).await;
    }

    fn drain_window(&self) -> Duration {
        self.inner
            .config
            .shutdown_grace_period
            .value()
            .max(MIN_DRAIN_WINDOW)
    }

    fn set_state(&self, state: LifecycleState) {
        self.inner.status.send_modify(|status| status.state = state);
    }

    fn terminator(&self) -> &Arc<dyn Terminator> {
        self.inner.state.control().terminator()
    }
}

async fn wait_for_signal() -> &'static str {
    match termination_signal().await {
        Ok(signal) => signal,
        Err(e) => {
            error!(error = %e, "failed to install signal handlers");
            std::future::pending().await
        }
    }
}

/// Run the termination path if it is requested while `stop` is live
async fn watch_termination(service: Service, stop: CancellationToken) {
    let control = service.inner.state.control().clone();
    tokio::select! {
        () = stop.cancelled() => {}
        () = control.terminated() => {
            info!("termination requested in process");
            service.terminate_once().await;
        }
    }
}

/// Source of inbound connections for the accept loop
trait Acceptor: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

/// What the accept loop does after a failed accept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// The error concerns one connection; keep accepting
    Connection,
    /// The listener itself is broken
    Listener,
}

impl AcceptFailure {
    fn of(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock => Self::Connection,
            _ => Self::Listener,
        }
    }
}

async fn accept_loop<A: Acceptor>(
    mut listener: A,
    app: Router,
    registry: ConnectionRegistry,
    tracker: TaskTracker,
    stop: CancellationToken,
    terminator: Arc<dyn Terminator>,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            () = stop.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let connection = ConnectionHandle::new(peer);
                let registration = registry.track(connection.clone());
                tracker.spawn(serve_connection(
                    stream,
                    peer,
                    app.clone(),
                    connection,
                    registration,
                ));
            }
            Err(e) => match AcceptFailure::of(&e) {
                AcceptFailure::Connection => debug!(error = %e, "accept failed"),
                AcceptFailure::Listener => {
                    let err = ServiceError::Listener { source: e };
                    error!(error = %err, "listener failed");
                    terminator.exit(ExitStatus::Failure);
                    break;
                }
            },
        }
    }
    debug!("accept loop stopped");
}

async fn serve_connection<S>(
    stream: S,
    peer: SocketAddr,
    app: Router,
    connection: ConnectionHandle,
    registration: Registration,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        app.clone().oneshot(request)
    });
    let service = TowerToHyperService::new(service);

    let builder = auto::Builder::new(TokioExecutor::new());
    let serving = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
    tokio::pin!(serving);

    let mut closing = false;
    loop {
        tokio::select! {
            result = serving.as_mut() => {
                if let Err(e) = result {
                    debug!(connection = %registration.id(), %peer, error = %e, "connection error");
                }
                break;
            }
            () = connection.closing(), if !closing => {
                closing = true;
                serving.as_mut().graceful_shutdown();
            }
            () = connection.destroyed() => {
                debug!(connection = %registration.id(), %peer, "connection destroyed");
                break;
            }
        }
    }

    trace!(connection = %registration.id(), %peer, "connection closed");
}
