// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! Live-view snapshot and diff types for topology reconciliation
//!
//! A `LiveTopology` is what the pool-status feed (or an initial load)
//! asserts the world looks like; `TopologyMap::compare` turns it into a
//! `TopologyDiff`, which `TopologyMap::apply` then replays under the write
//! lock. An empty map plus a full snapshot is equivalent to initial load.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::topology::constraints::StorageUnitConstraints;
use crate::types::PoolStatus;

/// Live cost information for a pool, fed into selection weighting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolCost {
    pub free_bytes: u64,
    pub queued_movers: u32,
}

/// One pool as reported by the live view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivePool {
    pub name: String,
    pub status: PoolStatus,
    pub tags: BTreeMap<String, String>,
    pub cost: PoolCost,
}

impl LivePool {
    pub fn new(name: impl Into<String>, status: PoolStatus) -> Self {
        Self {
            name: name.into(),
            status,
            tags: BTreeMap::new(),
            cost: PoolCost::default(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_cost(mut self, free_bytes: u64, queued_movers: u32) -> Self {
        self.cost = PoolCost {
            free_bytes,
            queued_movers,
        };
        self
    }
}

/// One pool group as reported by the live view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveGroup {
    pub name: String,
    pub resilient: bool,
    pub pools: Vec<String>,
    /// Storage units bound to this group (by unit name / storage class).
    pub units: Vec<String>,
}

impl LiveGroup {
    pub fn new(name: impl Into<String>, resilient: bool) -> Self {
        Self {
            name: name.into(),
            resilient,
            pools: Vec::new(),
            units: Vec::new(),
        }
    }

    pub fn with_pools<I, S>(mut self, pools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pools = pools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_units<I, S>(mut self, units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.units = units.into_iter().map(Into::into).collect();
        self
    }
}

/// One storage unit as reported by the live view. The unit name doubles as
/// the storage class it governs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveUnit {
    pub name: String,
    pub constraints: StorageUnitConstraints,
}

impl LiveUnit {
    pub fn new(name: impl Into<String>, required: usize, one_copy_per: Vec<String>) -> Self {
        Self {
            name: name.into(),
            constraints: StorageUnitConstraints::new(required, one_copy_per),
        }
    }
}

/// Full snapshot of the world as asserted by the live pool monitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveTopology {
    pub pools: Vec<LivePool>,
    pub groups: Vec<LiveGroup>,
    pub units: Vec<LiveUnit>,
}

/// The difference between the in-memory topology and a live snapshot.
#[derive(Debug, Clone, Default)]
pub struct TopologyDiff {
    pub new_pools: Vec<LivePool>,
    pub removed_pools: Vec<String>,
    pub new_groups: Vec<LiveGroup>,
    pub removed_groups: Vec<String>,
    pub new_units: Vec<LiveUnit>,
    pub removed_units: Vec<String>,
    /// (group, pool) memberships to add / remove.
    pub pools_added_to_group: Vec<(String, String)>,
    pub pools_removed_from_group: Vec<(String, String)>,
    /// (group, unit) bindings to add / remove.
    pub units_added_to_group: Vec<(String, String)>,
    pub units_removed_from_group: Vec<(String, String)>,
    /// Units whose constraints changed.
    pub constraint_changes: Vec<(String, StorageUnitConstraints)>,
    /// Pools whose status changed (including previously uninitialized
    /// ones); the engine turns these into `PoolStateUpdate`s.
    pub status_changes: Vec<(String, PoolStatus)>,
    /// Pools whose tag set changed.
    pub tag_changes: Vec<(String, BTreeMap<String, String>)>,
    /// Refreshed cost figures.
    pub cost_changes: Vec<(String, PoolCost)>,
}

impl TopologyDiff {
    pub fn is_empty(&self) -> bool {
        self.new_pools.is_empty()
            && self.removed_pools.is_empty()
            && self.new_groups.is_empty()
            && self.removed_groups.is_empty()
            && self.new_units.is_empty()
            && self.removed_units.is_empty()
            && self.pools_added_to_group.is_empty()
            && self.pools_removed_from_group.is_empty()
            && self.units_added_to_group.is_empty()
            && self.units_removed_from_group.is_empty()
            && self.constraint_changes.is_empty()
            && self.status_changes.is_empty()
            && self.tag_changes.is_empty()
            && self.cost_changes.is_empty()
    }
}
