// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! Core value types shared across the engine
//!
//! Operations reference pools, pool groups and storage units through stable
//! integer indices assigned by the topology map, so that the (potentially
//! very large) file-operation table stores 4-byte handles instead of names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespace identity of a file. Opaque to the engine.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

impl From<&str> for FileId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stable index of a pool in the topology map. Never reassigned for the
/// lifetime of the process, even if the pool is undefined and later re-added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolIndex(pub u32);

/// Stable index of a pool group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupIndex(pub u32);

/// Stable index of a storage unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitIndex(pub u32);

impl fmt::Display for PoolIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UnitIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mode of a storage pool as reported by the status feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolStatus {
    /// No status observed yet.
    Uninitialized,
    /// Readable and writable.
    Enabled,
    /// Readable but not accepting new replicas.
    ReadOnly,
    /// Unreachable or disabled.
    Down,
}

impl PoolStatus {
    pub fn is_readable(self) -> bool {
        matches!(self, PoolStatus::Enabled | PoolStatus::ReadOnly)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, PoolStatus::Enabled)
    }

    pub fn is_down(self) -> bool {
        matches!(self, PoolStatus::Down)
    }
}

/// Kind of event that gave rise to an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    /// A replica appeared on a pool.
    AddCacheLocation,
    /// A replica disappeared from a pool.
    ClearCacheLocation,
    /// A replica was reported unreadable.
    CorruptFile,
    /// Scan triggered because the pool went down.
    PoolDown,
    /// Scan triggered because the pool came (back) up.
    PoolRestart,
    /// Scan triggered by the periodic watchdog.
    PeriodicScan,
}

impl MessageType {
    /// True for the scan-sourced variants.
    pub fn is_scan(self) -> bool {
        matches!(
            self,
            MessageType::PoolDown | MessageType::PoolRestart | MessageType::PeriodicScan
        )
    }
}

/// Durability class of a file, as recorded by the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetentionPolicy {
    Replica,
    Output,
    Custodial,
}

/// Whether a file is expected to stay online on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessLatency {
    Online,
    Nearline,
}

/// Snapshot of the namespace attributes the engine needs for one file.
///
/// `locations` are the pools holding a replica pinned by the system sticky
/// flag; `cached_locations` hold a transient, unpinned copy which can be
/// promoted to a replica without moving data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub locations: Vec<String>,
    pub cached_locations: Vec<String>,
    pub storage_class: String,
    pub retention_policy: RetentionPolicy,
    pub access_latency: AccessLatency,
    pub size: u64,
}

impl FileAttributes {
    pub fn new(storage_class: impl Into<String>) -> Self {
        Self {
            locations: Vec::new(),
            cached_locations: Vec::new(),
            storage_class: storage_class.into(),
            retention_policy: RetentionPolicy::Replica,
            access_latency: AccessLatency::Online,
            size: 0,
        }
    }

    pub fn with_locations(mut self, locations: Vec<String>) -> Self {
        self.locations = locations;
        self
    }

    pub fn with_cached(mut self, cached: Vec<String>) -> Self {
        self.cached_locations = cached;
        self
    }
}

/// A pool status transition delivered by the status feed, or synthesized
/// from a topology diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStateUpdate {
    pub pool: String,
    pub status: PoolStatus,
    /// Restrict the resulting scan to one pool group, if set.
    pub group: Option<GroupIndex>,
    /// Restrict the resulting scan to files of one storage unit, if set.
    pub unit: Option<UnitIndex>,
}

impl PoolStateUpdate {
    pub fn new(pool: impl Into<String>, status: PoolStatus) -> Self {
        Self {
            pool: pool.into(),
            status,
            group: None,
            unit: None,
        }
    }
}

/// A per-file update event, from the location-change feed or from a pool
/// scan.
#[derive(Debug, Clone)]
pub struct FileUpdate {
    pub file_id: FileId,
    /// Pool the event refers to. `None` means the namespace no longer knows
    /// any location (typically a deletion race); such updates are dropped.
    pub pool: Option<String>,
    pub message_type: MessageType,
    /// True when the update was produced by a pool scan; the originating
    /// pool then becomes the operation's parent.
    pub from_scan: bool,
}

impl FileUpdate {
    pub fn new(file_id: FileId, pool: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            file_id,
            pool: Some(pool.into()),
            message_type,
            from_scan: false,
        }
    }

    pub fn scanned(file_id: FileId, pool: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            file_id,
            pool: Some(pool.into()),
            message_type,
            from_scan: true,
        }
    }
}

/// Outcome of the verification step for one pass over a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyResult {
    /// Below the required count (or thinned by a prior eviction): make a copy.
    Copy,
    /// Above the required count or misplaced: remove one replica.
    Remove,
    /// A cached copy can be pinned instead of copying data.
    SetSticky,
    /// Placement is compliant; nothing to do.
    Void,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_status_predicates() {
        assert!(PoolStatus::Enabled.is_readable());
        assert!(PoolStatus::Enabled.is_writable());
        assert!(PoolStatus::ReadOnly.is_readable());
        assert!(!PoolStatus::ReadOnly.is_writable());
        assert!(!PoolStatus::Down.is_readable());
        assert!(PoolStatus::Down.is_down());
        assert!(!PoolStatus::Uninitialized.is_readable());
    }

    #[test]
    fn message_type_scan_variants() {
        assert!(MessageType::PoolDown.is_scan());
        assert!(MessageType::PeriodicScan.is_scan());
        assert!(!MessageType::AddCacheLocation.is_scan());
        assert!(!MessageType::ClearCacheLocation.is_scan());
    }
}
