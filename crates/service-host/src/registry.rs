// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Connection registry
//!
//! Tracks every open transport connection so shutdown can ask each of them to
//! close, and destroy the ones that do not. An entry exists exactly while its connection is open: the serving
//! task registers on accept and holds a [`Registration`] that unregisters when
//! the connection ends, whoever closed it.

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::metrics;

/// Identifier of a tracked connection, unique for the life of the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Get the raw identifier
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle allowing a tracked connection to be closed
///
/// [`close`](Self::close) is graceful: the connection finishes the response in
/// flight and then closes; an idle keep-alive connection closes at once.
/// [`destroy`](Self::destroy) drops the connection wherever it is.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    peer: SocketAddr,
    shutdown: CancellationToken,
    destroy: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle for a connection from `peer`
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            shutdown: CancellationToken::new(),
            destroy: CancellationToken::new(),
        }
    }

    /// Remote address of the connection
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Ask the connection to close
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Whether the connection has been asked to close
    pub fn is_closing(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once the connection has been asked to close
    pub async fn closing(&self) {
        self.shutdown.cancelled().await;
    }

    /// Close the connection without waiting for its in-flight request
    pub fn destroy(&self) {
        self.shutdown.cancel();
        self.destroy.cancel();
    }

    /// Whether the connection has been destroyed
    pub fn is_destroyed(&self) -> bool {
        self.destroy.is_cancelled()
    }

    /// Resolves once the connection has been destroyed
    pub async fn destroyed(&self) {
        self.destroy.cancelled().await;
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    connections: DashMap<ConnectionId, ConnectionHandle>,
    next_id: AtomicU64,
    closing: AtomicBool,
    destroying: AtomicBool,
}

/// Table of open connections
///
/// Cloning yields another handle to the same table.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection and return its fresh identifier
    ///
    /// A connection registered while [`force_close_all`](Self::force_close_all)
    /// is in effect is asked to close immediately, or destroyed once
    /// [`destroy_all`](Self::destroy_all) has run.
    pub fn register(&self, connection: ConnectionHandle) -> ConnectionId {
        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let peer = connection.peer();
        self.inner.connections.insert(id, connection.clone());
        metrics::OPEN_CONNECTIONS.inc();

        // Checked after the insert so a concurrent force_close_all either sees
        // this entry or this call sees its flag.
        if self.inner.destroying.load(Ordering::SeqCst) {
            debug!(connection = %id, %peer, "destroying connection accepted during shutdown");
            connection.destroy();
        } else if self.inner.closing.load(Ordering::SeqCst) {
            debug!(connection = %id, %peer, "closing connection accepted during shutdown");
            connection.close();
        } else {
            trace!(connection = %id, %peer, "connection registered");
        }

        id
    }

    /// Stop tracking a connection
    ///
    /// Returns whether an entry was removed; repeated calls are no-ops.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.inner.connections.remove(&id).is_some();
        if removed {
            metrics::OPEN_CONNECTIONS.dec();
            trace!(connection = %id, "connection unregistered");
        }
        removed
    }

    /// Ask every tracked connection to close, without waiting for them
    ///
    /// Connections registered afterwards are closed on arrival until
    /// [`reopen`](Self::reopen) is called. Returns how many were asked.
    pub fn force_close_all(&self) -> usize {
        self.inner.closing.store(true, Ordering::SeqCst);

        let handles: Vec<ConnectionHandle> = self
            .inner
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for handle in &handles {
            handle.close();
        }

        debug!(connections = handles.len(), "asked open connections to close");
        handles.len()
    }

    /// Destroy every tracked connection, without waiting for them
    ///
    /// The escalation of [`force_close_all`](Self::force_close_all) for
    /// connections that would not finish. Returns how many were destroyed.
    pub fn destroy_all(&self) -> usize {
        self.inner.closing.store(true, Ordering::SeqCst);
        self.inner.destroying.store(true, Ordering::SeqCst);

        let handles: Vec<ConnectionHandle> = self
            .inner
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for handle in &handles {
            handle.destroy();
        }

        debug!(connections = handles.len(), "destroyed open connections");
        handles.len()
    }

    /// Accept connections normally again after a [`force_close_all`](Self::force_close_all)
    pub fn reopen(&self) {
        self.inner.closing.store(false, Ordering::SeqCst);
        self.inner.destroying.store(false, Ordering::SeqCst);
    }

    /// Whether connections are currently being force-closed
    pub fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }

    /// Number of open connections
    pub fn count(&self) -> usize {
        self.inner.connections.len()
    }

    /// Register a connection for as long as the returned guard lives
    pub fn track(&self, connection: ConnectionHandle) -> Registration {
        let id = self.register(connection);
        Registration {
            registry: self.clone(),
            id,
        }
    }
}

/// Keeps a connection registered until dropped
#[derive(Debug)]
pub struct Registration {
    registry: ConnectionRegistry,
    id: ConnectionId,
}

impl Registration {
    /// Identifier of the registered connection
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddrV4};

    use super::*;

    fn handle(port: u16) -> ConnectionHandle {
        ConnectionHandle::new(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)))
    }

    #[test]
    fn identifiers_start_at_one_and_increase() {
        let registry = ConnectionRegistry::new();
        let first = registry.register(handle(1));
        let second = registry.register(handle(2));

        assert_eq!(first.value(), 1);
        assert_eq!(second.value(), 2);
        assert_eq!(first.to_string(), "#1");
    }

    #[test]
    fn count_tracks_accepts_minus_closes() {
        let registry = ConnectionRegistry::new();
        let ids: Vec<_> = (0..5).map(|port| registry.register(handle(port))).collect();
        assert_eq!(registry.count(), 5);

        assert!(registry.unregister(ids[0]));
        assert!(registry.unregister(ids[3]));
        assert_eq!(registry.count(), 3);
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(handle(1));
        registry.register(handle(2));

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn force_close_asks_every_connection() {
        let registry = ConnectionRegistry::new();
        let connections: Vec<_> = (0..3).map(handle).collect();
        for connection in &connections {
            registry.register(connection.clone());
        }

        assert_eq!(registry.force_close_all(), 3);
        assert!(connections.iter().all(ConnectionHandle::is_closing));
        // Entries leave only when their connections report closed
        assert_eq!(registry.count(), 3);
    }

    #[test]
    fn late_registration_closes_immediately() {
        let registry = ConnectionRegistry::new();
        registry.force_close_all();

        let late = handle(9);
        registry.register(late.clone());
        assert!(late.is_closing());

        registry.reopen();
        let fresh = handle(10);
        registry.register(fresh.clone());
        assert!(!fresh.is_closing());
    }

    #[test]
    fn destroy_all_escalates_force_close() {
        let registry = ConnectionRegistry::new();
        let stalled = handle(1);
        registry.register(stalled.clone());

        registry.force_close_all();
        assert!(stalled.is_closing());
        assert!(!stalled.is_destroyed());

        assert_eq!(registry.destroy_all(), 1);
        assert!(stalled.is_destroyed());
        assert_eq!(registry.count(), 1);

        let late = handle(2);
        registry.register(late.clone());
        assert!(late.is_destroyed());

        registry.reopen();
        let fresh = handle(3);
        registry.register(fresh.clone());
        assert!(!fresh.is_closing());
        assert!(!fresh.is_destroyed());
    }

    #[test]
    fn registration_guard_unregisters_on_drop() {
        let registry = ConnectionRegistry::new();
        let guard = registry.track(handle(1));
        let id = guard.id();
        assert_eq!(registry.count(), 1);

        drop(guard);
        assert_eq!(registry.count(), 0);
        assert!(!registry.unregister(id));
    }

    #[tokio::test]
    async fn concurrent_accepts_and_closes_balance() {
        let registry = ConnectionRegistry::new();
        let tasks: Vec<_> = (0..64u16)
            .map(|port| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let guard = registry.track(handle(port));
                    tokio::task::yield_now().await;
                    drop(guard);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.count(), 0);
        let next = registry.register(handle(0));
        assert_eq!(next.value(), 65);
    }

    #[tokio::test]
    async fn closing_future_resolves_after_close() {
        let connection = handle(1);
        let waiter = connection.clone();
        let task = tokio::spawn(async move { waiter.closing().await });

        connection.close();
        task.await.unwrap();
    }
}
