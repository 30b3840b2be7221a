// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Session identifier and session record types
//!
//! A [`SessionId`] is the opaque token a caller presents in the session header.
//! A [`SessionRecord`] is what a session store returns for a known session.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use thiserror::Error;

/// Upper bound on the length of a session identifier
pub const MAX_SESSION_ID_LEN: usize = 256;

/// Reasons a raw value cannot be used as a session identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionIdError {
    /// The value was empty or whitespace-only
    #[error("session id cannot be empty")]
    Empty,

    /// The value exceeded [`MAX_SESSION_ID_LEN`]
    #[error("session id is {len} bytes long (max: {MAX_SESSION_ID_LEN})")]
    TooLong {
        /// Length of the rejected value
        len: usize,
    },

    /// The value contained a character outside visible ASCII
    #[error("session id contains characters outside visible ASCII")]
    InvalidCharacter,
}

/// A validated session identifier
///
/// Guarantees the contained value:
/// - is not empty
/// - is at most [`MAX_SESSION_ID_LEN`] bytes
/// - only contains visible ASCII, so it is safe to embed in URLs and logs
///
/// ```rust
/// use shared_types::SessionId;
///
/// let id = SessionId::new("a1b2c3").unwrap();
/// assert_eq!(id.as_str(), "a1b2c3");
///
/// assert!(SessionId::new("").is_err());
/// assert!(SessionId::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Box<str>);

impl SessionId {
    /// Create a new `SessionId`, validating the raw value
    ///
    /// # Errors
    ///
    /// Returns [`SessionIdError`] describing the first rule the value breaks.
    pub fn new(value: impl Into<String>) -> Result<Self, SessionIdError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(SessionIdError::Empty);
        }
        if value.len() > MAX_SESSION_ID_LEN {
            return Err(SessionIdError::TooLong { len: value.len() });
        }
        if !value.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(SessionIdError::InvalidCharacter);
        }
        Ok(Self(value.into_boxed_str()))
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = SessionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

/// The stored data behind a live session
///
/// Session stores commonly persist numeric ids as strings, so `userId`
/// accepts either a JSON number or a numeric string.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Numeric id of the user owning the session
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub user_id: u64,
    /// Username of the user owning the session
    pub username: String,
}

impl SessionRecord {
    /// Create a new session record
    pub fn new(user_id: u64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn session_id_validation() {
        assert!(SessionId::new("abc-123_XYZ").is_ok());

        assert_eq!(SessionId::new(""), Err(SessionIdError::Empty));
        assert_eq!(SessionId::new("   "), Err(SessionIdError::Empty));
        assert_eq!(
            SessionId::new("two words"),
            Err(SessionIdError::InvalidCharacter)
        );
        assert_eq!(
            SessionId::new("caf\u{e9}"),
            Err(SessionIdError::InvalidCharacter)
        );

        let long = "a".repeat(MAX_SESSION_ID_LEN + 1);
        assert_eq!(
            SessionId::new(long),
            Err(SessionIdError::TooLong {
                len: MAX_SESSION_ID_LEN + 1
            })
        );
    }

    #[test]
    fn session_id_deserialize_validates() {
        let ok: Result<SessionId, _> = serde_json::from_value(json!("s-1"));
        assert_eq!(ok.map(|id| id.to_string()).ok().as_deref(), Some("s-1"));

        let err: Result<SessionId, _> = serde_json::from_value(json!(""));
        assert!(err.is_err());
    }

    #[test]
    fn session_record_accepts_numeric_and_string_user_id() {
        let numeric: SessionRecord =
            serde_json::from_value(json!({"userId": 7, "username": "a"})).unwrap();
        let stringly: SessionRecord =
            serde_json::from_value(json!({"userId": "7", "username": "a"})).unwrap();

        assert_eq!(numeric, SessionRecord::new(7, "a"));
        assert_eq!(stringly, numeric);
    }

    #[test]
    fn session_record_rejects_non_numeric_user_id() {
        let result: Result<SessionRecord, _> =
            serde_json::from_value(json!({"userId": "seven", "username": "a"}));
        assert!(result.is_err());
    }

    #[test]
    fn session_record_serializes_camel_case() {
        let value = serde_json::to_value(SessionRecord::new(42, "bob")).unwrap();
        assert_eq!(value, json!({"userId": 42, "username": "bob"}));
    }
}
