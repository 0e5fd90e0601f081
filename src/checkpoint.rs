// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! # Checkpointing
//!
//! Periodic snapshot of the live file-operation table so that queued work
//! survives a restart. The snapshot is advisory: on reload each record is
//! re-admitted as a fresh update and re-verified against the namespace, so
//! a stale or partially written checkpoint can cause no incorrect action.
//!
//! Format: one version byte followed by a bincode-encoded record list.
//! Writes go to a temporary file first and are renamed into place, so a
//! crash mid-write leaves the previous checkpoint intact. A sidecar text
//! file (one pool name per line) records operator-excluded pools.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ResilienceError, Result};
use crate::types::FileId;

/// Bumped whenever the record layout changes; a mismatched checkpoint is
/// discarded, not migrated.
pub const CHECKPOINT_VERSION: u8 = 1;

/// One live operation, with pool indices resolved to names. Indices are
/// not stable across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOpRecord {
    pub file_id: FileId,
    pub parent: Option<String>,
    pub source: Option<String>,
    pub target: Option<String>,
    pub op_count: u32,
    pub retried: u32,
    pub from_scan: bool,
}

fn io_error(path: &Path, source: std::io::Error) -> ResilienceError {
    ResilienceError::Checkpoint {
        path: path.display().to_string(),
        source,
    }
}

/// Write the record list atomically.
pub fn save(path: &Path, records: &[FileOpRecord]) -> Result<()> {
    let mut bytes = vec![CHECKPOINT_VERSION];
    let body = bincode::serialize(records).map_err(|e| {
        io_error(path, std::io::Error::new(ErrorKind::InvalidData, e))
    })?;
    bytes.extend_from_slice(&body);

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &bytes).map_err(|e| io_error(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| io_error(path, e))?;
    debug!(path = %path.display(), records = records.len(), "checkpoint written");
    Ok(())
}

/// Read a checkpoint. A missing file, an unknown version or a corrupt body
/// all yield an empty list; recovery must never block startup.
pub fn load(path: &Path) -> Vec<FileOpRecord> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "checkpoint unreadable, ignoring");
            return Vec::new();
        }
    };
    let Some((&version, body)) = bytes.split_first() else {
        return Vec::new();
    };
    if version != CHECKPOINT_VERSION {
        warn!(
            path = %path.display(),
            found = version,
            expected = CHECKPOINT_VERSION,
            "checkpoint version mismatch, discarding"
        );
        return Vec::new();
    }
    match bincode::deserialize::<Vec<FileOpRecord>>(body) {
        Ok(records) => {
            info!(path = %path.display(), records = records.len(), "checkpoint loaded");
            records
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "checkpoint corrupt, ignoring");
            Vec::new()
        }
    }
}

/// Persist the operator-excluded pool list, one name per line.
pub fn save_excluded(path: &Path, pools: &[String]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, pools.join("\n")).map_err(|e| io_error(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| io_error(path, e))?;
    Ok(())
}

/// Read the excluded-pool sidecar; a missing file means no exclusions.
pub fn load_excluded(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(raw) => raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "excluded-pool sidecar unreadable");
            Vec::new()
        }
    }
}
