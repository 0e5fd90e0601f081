// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! Collaborator interfaces
//!
//! The engine is a control loop over two external services: the namespace
//! (location and attribute authority) and the pools themselves (replica
//! copy/remove/pin commands). Both are injected as trait objects so tests
//! can script them.

use async_trait::async_trait;

use crate::error::{ActionFailure, Result};
use crate::types::{FileAttributes, FileId};

/// Read access to the namespace service.
#[async_trait]
pub trait NamespaceAccess: Send + Sync {
    /// Fetch the attributes the engine needs for `file_id`.
    ///
    /// Returns `Ok(None)` when the file no longer exists in the namespace;
    /// callers treat that as "nothing to do", not as an error.
    async fn required_attributes(&self, file_id: &FileId) -> Result<Option<FileAttributes>>;

    /// Enumerate the files with a replica on `pool`. Used by pool scans.
    async fn files_on_pool(&self, pool: &str) -> Result<Vec<FileId>>;
}

/// Commands the engine issues against pools.
///
/// Every call is asynchronous and resolves when the pool has acknowledged
/// (or refused) the action; a copy may block for the duration of a real
/// data transfer.
#[async_trait]
pub trait PoolCommands: Send + Sync {
    /// Replicate `file_id` from `source` onto `target`, pinning the new
    /// replica with the system sticky flag.
    async fn copy(
        &self,
        file_id: &FileId,
        source: &str,
        target: &str,
    ) -> std::result::Result<(), ActionFailure>;

    /// Remove the replica of `file_id` held by `pool`.
    async fn remove(&self, file_id: &FileId, pool: &str)
        -> std::result::Result<(), ActionFailure>;

    /// Pin an existing replica of `file_id` on `pool` with the system
    /// sticky flag.
    async fn set_sticky(
        &self,
        file_id: &FileId,
        pool: &str,
    ) -> std::result::Result<(), ActionFailure>;
}
