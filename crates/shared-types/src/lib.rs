// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Shared types for the service host
//!
//! This crate provides the session types that both the host pipeline and the
//! session store collaborators speak, avoiding a dependency between them.

pub mod session;

pub use session::{SessionId, SessionIdError, SessionRecord};
