// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Caller identity attached by session lookup

use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use serde::Serialize;
use shared_types::{SessionId, SessionRecord};

use crate::error::{ClassifiedError, RequestError};

/// The caller behind a resolved session
///
/// Routes that require a caller take `Identity` as an extractor and reject
/// anonymous requests with `401 unauthenticated`; routes that merely accept
/// one take `Option<Identity>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Numeric user id
    pub user_id: u64,
    /// Username
    pub username: String,
    /// Session the caller presented
    pub session_id: SessionId,
}

impl Identity {
    /// Normalize a session record into an identity
    pub fn from_record(record: SessionRecord, session_id: SessionId) -> Self {
        Self {
            user_id: record.user_id,
            username: record.username,
            session_id,
        }
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = RequestError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| ClassifiedError::unauthenticated().into())
    }
}

impl<S> OptionalFromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Identity>().cloned())
    }
}
