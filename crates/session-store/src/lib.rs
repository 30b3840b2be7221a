// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Session lookup stores
//!
//! This crate provides the session store collaborator used by the host's
//! identity augmentation stage: given the session id a caller presented, return
//! the user it belongs to.
//!
//! # Architecture
//!
//! - **Store Trait**: [`SessionStore`] - async lookup returning `Ok(None)` for unknown sessions
//! - **Implementations**: [`memory`] for in-process sessions, [`http`] for a remote session service
//! - **Dispatch**: [`SessionBackend`] - the configured store, chosen at startup

use shared_types::{SessionId, SessionRecord};
use thiserror::Error;

pub mod backend;
pub mod http;
pub mod memory;

pub use backend::SessionBackend;
pub use http::{HttpSessionStore, HttpSessionStoreConfig};
pub use memory::InMemorySessionStore;

/// Result type for session store operations
pub type SessionStoreResult<T> = Result<T, SessionStoreError>;

/// Failures talking to a session store
///
/// An unknown session is not an error; stores report it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// The request to the store could not be completed
    #[error("session store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store did not answer within the configured timeout
    #[error("session store did not respond within {timeout_seconds} seconds")]
    Timeout {
        /// Timeout that elapsed
        timeout_seconds: u64,
    },

    /// The store answered with an unexpected status
    #[error("session store returned status {status}: {message}")]
    Status {
        /// HTTP status code returned by the store
        status: u16,
        /// Response body, if readable
        message: String,
    },

    /// The store returned a record that could not be decoded
    #[error("session store returned an invalid record: {0}")]
    InvalidRecord(#[from] serde_json::Error),

    /// The store configuration is unusable
    #[error("session store configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },
}

/// Trait implemented by every session store
pub trait SessionStore: Send + Sync {
    /// Look up the record for a session id
    ///
    /// # Returns
    ///
    /// * `Ok(Some(record))` if the session exists
    /// * `Ok(None)` if the store has no such session
    /// * `Err(error)` if the store could not be queried
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or answers with garbage.
    fn lookup(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = SessionStoreResult<Option<SessionRecord>>> + Send;

    /// Short name of the store, used in logs
    fn name(&self) -> &'static str;
}
