// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Configured session store dispatch

use shared_types::{SessionId, SessionRecord};
use tracing::debug;

use crate::{
    HttpSessionStore, HttpSessionStoreConfig, InMemorySessionStore, SessionStore,
    SessionStoreResult,
};

/// The session store a service was configured with
#[derive(Debug, Clone)]
pub enum SessionBackend {
    /// Sessions held in process
    Memory(InMemorySessionStore),
    /// Sessions resolved by a remote session service
    Http(HttpSessionStore),
}

impl SessionBackend {
    /// An empty in-process store
    pub fn memory() -> Self {
        Self::Memory(InMemorySessionStore::new())
    }

    /// A remote store for the given configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP store cannot be created from the configuration.
    pub fn http(config: HttpSessionStoreConfig) -> SessionStoreResult<Self> {
        HttpSessionStore::new(config).map(Self::Http)
    }

    /// The in-process store, if this backend is one
    pub fn as_memory(&self) -> Option<&InMemorySessionStore> {
        match self {
            Self::Memory(store) => Some(store),
            Self::Http(_) => None,
        }
    }
}

impl Default for SessionBackend {
    fn default() -> Self {
        Self::memory()
    }
}

impl From<InMemorySessionStore> for SessionBackend {
    fn from(store: InMemorySessionStore) -> Self {
        Self::Memory(store)
    }
}

impl From<HttpSessionStore> for SessionBackend {
    fn from(store: HttpSessionStore) -> Self {
        Self::Http(store)
    }
}

impl SessionStore for SessionBackend {
    async fn lookup(&self, session_id: &SessionId) -> SessionStoreResult<Option<SessionRecord>> {
        debug!(store = self.name(), "resolving session");
        match self {
            Self::Memory(store) => store.lookup(session_id).await,
            Self::Http(store) => store.lookup(session_id).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Memory(store) => store.name(),
            Self::Http(store) => store.name(),
        }
    }
}
