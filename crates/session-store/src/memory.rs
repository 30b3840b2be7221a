// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! In-process session store
//!
//! Holds sessions in a concurrent map. Useful for services that manage their
//! own sessions and for tests.

use std::sync::Arc;

use dashmap::DashMap;
use shared_types::{SessionId, SessionRecord};

use crate::{SessionStore, SessionStoreResult};

/// Session store backed by a lock-free concurrent map
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<SessionId, SessionRecord>>,
}

impl InMemorySessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a session, returning the previous record if any
    pub fn insert(&self, session_id: SessionId, record: SessionRecord) -> Option<SessionRecord> {
        self.sessions.insert(session_id, record)
    }

    /// Remove a session, returning its record if it existed
    pub fn remove(&self, session_id: &SessionId) -> Option<SessionRecord> {
        self.sessions.remove(session_id).map(|(_, record)| record)
    }

    /// Number of stored sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store holds no sessions
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for InMemorySessionStore {
    async fn lookup(&self, session_id: &SessionId) -> SessionStoreResult<Option<SessionRecord>> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|entry| entry.value().clone()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::assert_ok;

    use super::*;

    fn session(id: &str) -> SessionId {
        SessionId::new(id).unwrap()
    }

    #[tokio::test]
    async fn lookup_known_and_unknown_sessions() {
        let store = InMemorySessionStore::new();
        store.insert(session("s-1"), SessionRecord::new(7, "a"));

        let found = assert_ok!(store.lookup(&session("s-1")).await);
        assert_eq!(found, Some(SessionRecord::new(7, "a")));

        let missing = assert_ok!(store.lookup(&session("s-2")).await);
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn clones_share_sessions() {
        let store = InMemorySessionStore::new();
        let other = store.clone();

        other.insert(session("shared"), SessionRecord::new(1, "x"));
        assert_eq!(store.len(), 1);

        assert_eq!(
            store.remove(&session("shared")),
            Some(SessionRecord::new(1, "x"))
        );
        assert!(other.is_empty());
    }

    #[test]
    fn insert_replaces_existing_record() {
        let store = InMemorySessionStore::new();
        assert!(
            store
                .insert(session("s"), SessionRecord::new(1, "old"))
                .is_none()
        );
        let previous = store.insert(session("s"), SessionRecord::new(2, "new"));
        assert_eq!(previous, Some(SessionRecord::new(1, "old")));
    }
}
