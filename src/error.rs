// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! Error types for the resilience engine
//!
//! Two layers: `ResilienceError` for fallible engine calls, and
//! `ActionFailure` for the outcome of a dispatched copy/remove/set-sticky
//! action, whose `FailureKind` drives the retry policy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::selection::SelectionError;
use crate::types::FileId;

/// Result type for engine operations.
pub type Result<T, E = ResilienceError> = std::result::Result<T, E>;

/// Classification of a failed copy/remove/set-sticky action.
///
/// The class decides the retry route: a new source, a new target, the same
/// pair again, or abandonment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Unclassified or internal error; abandon the operation.
    Fatal,
    /// The source replica is corrupt or unreadable; pick another source.
    SourceBroken,
    /// The source pool is unreachable or gone; pick another source.
    SourcePoolFailed,
    /// The target already holds the file or refused it; pick another target.
    TargetRejected,
    /// Delayed-media or not-yet-in-repository class of error; retry the
    /// same pair, escalating to a new target once the budget is exhausted.
    Retriable,
}

/// Failure reported for a dispatched pool action.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct ActionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ActionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Fatal, message)
    }

    pub fn retriable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Retriable, message)
    }
}

/// Errors surfaced by the engine's own interfaces.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The namespace collaborator failed.
    #[error("namespace access failed for {file_id}: {reason}")]
    Namespace { file_id: FileId, reason: String },

    /// Enumerating the files on a pool failed; the pool operation is
    /// marked FAILED and left for the watchdog or an operator.
    #[error("scan of pool {pool} failed: {reason}")]
    ScanFailed { pool: String, reason: String },

    /// No legal source or target pool exists.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// A dispatched pool action failed.
    #[error(transparent)]
    Action(#[from] ActionFailure),

    /// Checkpoint file could not be written or read.
    #[error("checkpoint i/o on {path}: {source}")]
    Checkpoint {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value.
    #[error("invalid configuration - {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Lookup of an entity not (or no longer) defined in the topology.
    #[error("unknown {kind}: {name}")]
    UnknownEntity { kind: &'static str, name: String },

    /// New work was refused because the engine is disabled.
    #[error("engine is disabled")]
    Disabled,
}

impl ResilienceError {
    pub fn namespace(file_id: &FileId, reason: impl Into<String>) -> Self {
        Self::Namespace {
            file_id: file_id.clone(),
            reason: reason.into(),
        }
    }

    pub fn unknown_pool(name: impl Into<String>) -> Self {
        Self::UnknownEntity {
            kind: "pool",
            name: name.into(),
        }
    }

    pub fn unknown_unit(name: impl Into<String>) -> Self {
        Self::UnknownEntity {
            kind: "storage unit",
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_failure_display_carries_kind() {
        let f = ActionFailure::new(FailureKind::TargetRejected, "file exists on target");
        assert!(f.to_string().contains("TargetRejected"));
        assert!(f.to_string().contains("file exists on target"));
    }

    #[test]
    fn resilience_error_wraps_action_failure() {
        let err: ResilienceError = ActionFailure::fatal("boom").into();
        assert!(matches!(err, ResilienceError::Action(_)));
    }
}
