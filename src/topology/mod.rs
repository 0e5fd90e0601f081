// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! # Topology Map
//!
//! The central, read-mostly view of pools, pool groups, storage units and
//! their relations. Pools, groups and units are referenced everywhere else
//! by stable indices: an entity that disappears from the live view is
//! tombstoned rather than removed, so indices held by in-flight operations
//! never dangle and are never reassigned.
//!
//! Mutation happens on exactly two paths: `update_pool_status` (status-feed
//! ingestion) and `apply` (diff reconciliation against a live snapshot).
//! Everything else is a read under the shared lock.

pub mod constraints;
pub mod diff;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::types::{GroupIndex, PoolIndex, PoolStateUpdate, PoolStatus, UnitIndex};

pub use constraints::StorageUnitConstraints;
pub use diff::{LiveGroup, LivePool, LiveTopology, LiveUnit, PoolCost, TopologyDiff};

/// Live, per-pool information kept alongside the stable identity.
#[derive(Debug, Clone)]
pub struct PoolInformation {
    pub status: PoolStatus,
    pub tags: BTreeMap<String, String>,
    pub cost: PoolCost,
    /// Set by the admin exclude command; an excluded pool takes no part in
    /// scans or selection but still counts toward "manually excluded"
    /// accounting during verification.
    pub excluded: bool,
    pub last_status_update: Option<Instant>,
}

impl PoolInformation {
    fn uninitialized() -> Self {
        Self {
            status: PoolStatus::Uninitialized,
            tags: BTreeMap::new(),
            cost: PoolCost::default(),
            excluded: false,
            last_status_update: None,
        }
    }
}

/// A pool candidate handed to the selection layer.
#[derive(Debug, Clone)]
pub struct PoolMember {
    pub index: PoolIndex,
    pub name: String,
    pub info: PoolInformation,
}

#[derive(Debug)]
struct PoolRecord {
    name: String,
    defined: bool,
    info: PoolInformation,
}

#[derive(Debug)]
struct GroupRecord {
    name: String,
    defined: bool,
    resilient: bool,
}

#[derive(Debug)]
struct UnitRecord {
    name: String,
    defined: bool,
    constraints: StorageUnitConstraints,
}

#[derive(Default)]
struct Inner {
    pools: Vec<PoolRecord>,
    pool_idx: HashMap<String, PoolIndex>,
    groups: Vec<GroupRecord>,
    group_idx: HashMap<String, GroupIndex>,
    units: Vec<UnitRecord>,
    unit_idx: HashMap<String, UnitIndex>,
    group_pools: HashMap<GroupIndex, BTreeSet<PoolIndex>>,
    pool_groups: HashMap<PoolIndex, BTreeSet<GroupIndex>>,
    group_units: HashMap<GroupIndex, BTreeSet<UnitIndex>>,
    unit_groups: HashMap<UnitIndex, BTreeSet<GroupIndex>>,
}

impl Inner {
    fn pool(&self, index: PoolIndex) -> Option<&PoolRecord> {
        self.pools.get(index.0 as usize)
    }

    fn pool_mut(&mut self, index: PoolIndex) -> Option<&mut PoolRecord> {
        self.pools.get_mut(index.0 as usize)
    }

    fn defined_pool_index(&self, name: &str) -> Option<PoolIndex> {
        self.pool_idx
            .get(name)
            .copied()
            .filter(|i| self.pool(*i).map(|p| p.defined).unwrap_or(false))
    }

    fn ensure_pool(&mut self, name: &str) -> PoolIndex {
        if let Some(&i) = self.pool_idx.get(name) {
            if let Some(record) = self.pool_mut(i) {
                record.defined = true;
            }
            return i;
        }
        let index = PoolIndex(self.pools.len() as u32);
        self.pools.push(PoolRecord {
            name: name.to_string(),
            defined: true,
            info: PoolInformation::uninitialized(),
        });
        self.pool_idx.insert(name.to_string(), index);
        index
    }

    fn ensure_group(&mut self, name: &str, resilient: bool) -> GroupIndex {
        if let Some(&i) = self.group_idx.get(name) {
            if let Some(record) = self.groups.get_mut(i.0 as usize) {
                record.defined = true;
                record.resilient = resilient;
            }
            return i;
        }
        let index = GroupIndex(self.groups.len() as u32);
        self.groups.push(GroupRecord {
            name: name.to_string(),
            defined: true,
            resilient,
        });
        self.group_idx.insert(name.to_string(), index);
        index
    }

    fn ensure_unit(&mut self, name: &str, constraints: StorageUnitConstraints) -> UnitIndex {
        if let Some(&i) = self.unit_idx.get(name) {
            if let Some(record) = self.units.get_mut(i.0 as usize) {
                record.defined = true;
                record.constraints = constraints;
            }
            return i;
        }
        let index = UnitIndex(self.units.len() as u32);
        self.units.push(UnitRecord {
            name: name.to_string(),
            defined: true,
            constraints,
        });
        self.unit_idx.insert(name.to_string(), index);
        index
    }
}

/// In-memory topology, shared across the engine behind a read/write lock.
pub struct TopologyMap {
    inner: RwLock<Inner>,
}

impl Default for TopologyMap {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyMap {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Load a full snapshot: compare + apply in one step. Returns the pool
    /// status transitions the snapshot implies.
    pub fn load(&self, live: &LiveTopology) -> Vec<PoolStateUpdate> {
        let diff = self.compare(live);
        self.apply(diff)
    }

    // ---- lookups ------------------------------------------------------

    pub fn pool_index(&self, name: &str) -> Option<PoolIndex> {
        self.inner.read().defined_pool_index(name)
    }

    pub fn pool_name(&self, index: PoolIndex) -> Option<String> {
        self.inner.read().pool(index).map(|p| p.name.clone())
    }

    pub fn group_index(&self, name: &str) -> Option<GroupIndex> {
        let inner = self.inner.read();
        inner
            .group_idx
            .get(name)
            .copied()
            .filter(|i| inner.groups[i.0 as usize].defined)
    }

    pub fn group_name(&self, index: GroupIndex) -> Option<String> {
        self.inner
            .read()
            .groups
            .get(index.0 as usize)
            .map(|g| g.name.clone())
    }

    /// Unit lookup by name; the unit name doubles as the storage class.
    pub fn unit_index(&self, storage_class: &str) -> Option<UnitIndex> {
        let inner = self.inner.read();
        inner
            .unit_idx
            .get(storage_class)
            .copied()
            .filter(|i| inner.units[i.0 as usize].defined)
    }

    pub fn unit_name(&self, index: UnitIndex) -> Option<String> {
        self.inner
            .read()
            .units
            .get(index.0 as usize)
            .map(|u| u.name.clone())
    }

    /// Constraints of a unit; an unknown or tombstoned unit yields the
    /// invisible single-copy policy.
    pub fn constraints_of(&self, unit: Option<UnitIndex>) -> StorageUnitConstraints {
        let inner = self.inner.read();
        unit.and_then(|u| inner.units.get(u.0 as usize))
            .filter(|u| u.defined)
            .map(|u| u.constraints.clone())
            .unwrap_or_default()
    }

    pub fn pool_info(&self, index: PoolIndex) -> Option<PoolInformation> {
        self.inner
            .read()
            .pool(index)
            .filter(|p| p.defined)
            .map(|p| p.info.clone())
    }

    pub fn pool_status(&self, name: &str) -> Option<PoolStatus> {
        let inner = self.inner.read();
        inner
            .defined_pool_index(name)
            .and_then(|i| inner.pool(i))
            .map(|p| p.info.status)
    }

    // ---- resilience membership ---------------------------------------

    pub fn is_resilient_group(&self, group: GroupIndex) -> bool {
        self.inner
            .read()
            .groups
            .get(group.0 as usize)
            .map(|g| g.defined && g.resilient)
            .unwrap_or(false)
    }

    /// The resilient group a pool belongs to, if any. A pool in more than
    /// one resilient group is a configuration error; the first wins.
    pub fn resilient_group_of(&self, pool: PoolIndex) -> Option<GroupIndex> {
        let inner = self.inner.read();
        inner.pool_groups.get(&pool).and_then(|groups| {
            groups
                .iter()
                .copied()
                .find(|g| inner.groups[g.0 as usize].defined && inner.groups[g.0 as usize].resilient)
        })
    }

    pub fn is_resilient_pool(&self, name: &str) -> bool {
        match self.pool_index(name) {
            Some(i) => self.resilient_group_of(i).is_some(),
            None => false,
        }
    }

    /// Names of every pool in some resilient group.
    pub fn resilient_pools(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut out = BTreeSet::new();
        for (gi, pools) in &inner.group_pools {
            let group = &inner.groups[gi.0 as usize];
            if !group.defined || !group.resilient {
                continue;
            }
            for pi in pools {
                if let Some(p) = inner.pool(*pi) {
                    if p.defined {
                        out.insert(p.name.clone());
                    }
                }
            }
        }
        out.into_iter().collect()
    }

    pub fn pools_of_group(&self, group: GroupIndex) -> Vec<PoolIndex> {
        let inner = self.inner.read();
        inner
            .group_pools
            .get(&group)
            .map(|s| {
                s.iter()
                    .copied()
                    .filter(|i| inner.pool(*i).map(|p| p.defined).unwrap_or(false))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Members of a group with their live info, for selection.
    pub fn group_members(&self, group: GroupIndex) -> Vec<PoolMember> {
        let inner = self.inner.read();
        inner
            .group_pools
            .get(&group)
            .map(|s| {
                s.iter()
                    .filter_map(|i| {
                        inner.pool(*i).filter(|p| p.defined).map(|p| PoolMember {
                            index: *i,
                            name: p.name.clone(),
                            info: p.info.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn units_of_group(&self, group: GroupIndex) -> Vec<UnitIndex> {
        let inner = self.inner.read();
        inner
            .group_units
            .get(&group)
            .map(|s| {
                s.iter()
                    .copied()
                    .filter(|i| inner.units.get(i.0 as usize).map(|u| u.defined).unwrap_or(false))
                    .collect()
            })
            .unwrap_or_default()
    }

    // ---- location filtering ------------------------------------------

    /// The subset of `locations` that are defined pools of `group`.
    pub fn member_locations(&self, group: GroupIndex, locations: &[String]) -> Vec<String> {
        let inner = self.inner.read();
        let members = match inner.group_pools.get(&group) {
            Some(m) => m,
            None => return Vec::new(),
        };
        locations
            .iter()
            .filter(|name| {
                inner
                    .defined_pool_index(name)
                    .map(|i| members.contains(&i))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// The subset of `locations` on pools that are currently readable and
    /// not admin-excluded.
    pub fn readable_locations(&self, locations: &[String]) -> Vec<String> {
        let inner = self.inner.read();
        locations
            .iter()
            .filter(|name| {
                inner
                    .defined_pool_index(name)
                    .and_then(|i| inner.pool(i))
                    .map(|p| p.info.status.is_readable() && !p.info.excluded)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// The subset of `locations` on admin-excluded pools.
    pub fn excluded_locations(&self, locations: &[String]) -> Vec<String> {
        let inner = self.inner.read();
        locations
            .iter()
            .filter(|name| {
                inner
                    .defined_pool_index(name)
                    .and_then(|i| inner.pool(i))
                    .map(|p| p.info.excluded)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Whether a pool can serve as a source (read) or target (write) right
    /// now.
    pub fn viable(&self, pool: PoolIndex, for_write: bool) -> bool {
        let inner = self.inner.read();
        inner
            .pool(pool)
            .map(|p| {
                p.defined
                    && !p.info.excluded
                    && if for_write {
                        p.info.status.is_writable()
                    } else {
                        p.info.status.is_readable()
                    }
            })
            .unwrap_or(false)
    }

    /// Does the group still contain readable pools beyond the tried set?
    pub fn has_untried_member(&self, group: GroupIndex, tried: &BTreeSet<PoolIndex>) -> bool {
        let inner = self.inner.read();
        inner
            .group_pools
            .get(&group)
            .map(|members| {
                members
                    .iter()
                    .filter(|i| {
                        inner
                            .pool(**i)
                            .map(|p| p.defined && p.info.status.is_readable())
                            .unwrap_or(false)
                    })
                    .any(|i| !tried.contains(i))
            })
            .unwrap_or(false)
    }

    // ---- mutation -----------------------------------------------------

    /// Record a status transition; returns the previous status if the pool
    /// is known.
    pub fn update_pool_status(&self, name: &str, status: PoolStatus) -> Option<PoolStatus> {
        let mut inner = self.inner.write();
        let index = inner.defined_pool_index(name)?;
        let record = inner.pool_mut(index)?;
        let previous = record.info.status;
        record.info.status = status;
        record.info.last_status_update = Some(Instant::now());
        trace!(pool = name, ?previous, ?status, "pool status updated");
        Some(previous)
    }

    /// Refresh live cost figures for a pool.
    pub fn update_pool_cost(&self, name: &str, cost: PoolCost) {
        let mut inner = self.inner.write();
        if let Some(index) = inner.defined_pool_index(name) {
            if let Some(record) = inner.pool_mut(index) {
                record.info.cost = cost;
            }
        }
    }

    /// Admin exclude/include. Returns false if the pool is unknown.
    pub fn set_excluded(&self, name: &str, excluded: bool) -> bool {
        let mut inner = self.inner.write();
        match inner.defined_pool_index(name) {
            Some(index) => {
                if let Some(record) = inner.pool_mut(index) {
                    record.info.excluded = excluded;
                }
                true
            }
            None => false,
        }
    }

    // ---- reconciliation ----------------------------------------------

    /// Diff the in-memory state against a live snapshot, under the read
    /// lock. Pure computation; `apply` replays the result.
    pub fn compare(&self, live: &LiveTopology) -> TopologyDiff {
        let inner = self.inner.read();
        let mut diff = TopologyDiff::default();

        let live_pools: HashMap<&str, &LivePool> =
            live.pools.iter().map(|p| (p.name.as_str(), p)).collect();
        let live_groups: HashMap<&str, &LiveGroup> =
            live.groups.iter().map(|g| (g.name.as_str(), g)).collect();
        let live_units: HashMap<&str, &LiveUnit> =
            live.units.iter().map(|u| (u.name.as_str(), u)).collect();

        for pool in &live.pools {
            match inner.defined_pool_index(&pool.name) {
                None => diff.new_pools.push(pool.clone()),
                Some(index) => {
                    let current = &inner.pools[index.0 as usize].info;
                    if current.status != pool.status {
                        diff.status_changes.push((pool.name.clone(), pool.status));
                    }
                    if current.tags != pool.tags {
                        diff.tag_changes.push((pool.name.clone(), pool.tags.clone()));
                    }
                    if current.cost != pool.cost {
                        diff.cost_changes.push((pool.name.clone(), pool.cost));
                    }
                }
            }
        }
        for record in inner.pools.iter().filter(|p| p.defined) {
            if !live_pools.contains_key(record.name.as_str()) {
                diff.removed_pools.push(record.name.clone());
            }
        }

        for group in &live.groups {
            let known = inner
                .group_idx
                .get(&group.name)
                .map(|i| &inner.groups[i.0 as usize])
                .filter(|g| g.defined);
            match known {
                None => {
                    diff.new_groups.push(group.clone());
                    for pool in &group.pools {
                        diff.pools_added_to_group
                            .push((group.name.clone(), pool.clone()));
                    }
                    for unit in &group.units {
                        diff.units_added_to_group
                            .push((group.name.clone(), unit.clone()));
                    }
                }
                Some(current) => {
                    if current.resilient != group.resilient {
                        diff.new_groups.push(group.clone());
                    }
                    let gi = inner.group_idx[&group.name];
                    let current_pools: BTreeSet<String> = inner
                        .group_pools
                        .get(&gi)
                        .map(|s| {
                            s.iter()
                                .filter_map(|i| inner.pool(*i).map(|p| p.name.clone()))
                                .collect()
                        })
                        .unwrap_or_default();
                    let wanted_pools: BTreeSet<String> = group.pools.iter().cloned().collect();
                    for added in wanted_pools.difference(&current_pools) {
                        diff.pools_added_to_group
                            .push((group.name.clone(), added.clone()));
                    }
                    for removed in current_pools.difference(&wanted_pools) {
                        diff.pools_removed_from_group
                            .push((group.name.clone(), removed.clone()));
                    }
                    let current_units: BTreeSet<String> = inner
                        .group_units
                        .get(&gi)
                        .map(|s| {
                            s.iter()
                                .filter_map(|i| {
                                    inner.units.get(i.0 as usize).map(|u| u.name.clone())
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    let wanted_units: BTreeSet<String> = group.units.iter().cloned().collect();
                    for added in wanted_units.difference(&current_units) {
                        diff.units_added_to_group
                            .push((group.name.clone(), added.clone()));
                    }
                    for removed in current_units.difference(&wanted_units) {
                        diff.units_removed_from_group
                            .push((group.name.clone(), removed.clone()));
                    }
                }
            }
        }
        for record in inner.groups.iter().filter(|g| g.defined) {
            if !live_groups.contains_key(record.name.as_str()) {
                diff.removed_groups.push(record.name.clone());
            }
        }

        for unit in &live.units {
            let known = inner
                .unit_idx
                .get(&unit.name)
                .map(|i| &inner.units[i.0 as usize])
                .filter(|u| u.defined);
            match known {
                None => diff.new_units.push(unit.clone()),
                Some(current) => {
                    if current.constraints != unit.constraints {
                        diff.constraint_changes
                            .push((unit.name.clone(), unit.constraints.clone()));
                    }
                }
            }
        }
        for record in inner.units.iter().filter(|u| u.defined) {
            if !live_units.contains_key(record.name.as_str()) {
                diff.removed_units.push(record.name.clone());
            }
        }

        diff
    }

    /// Replay a diff under the write lock. Returns the status transitions
    /// implied by the diff (new pools included), for forwarding to the
    /// pool-operation layer.
    pub fn apply(&self, diff: TopologyDiff) -> Vec<PoolStateUpdate> {
        let mut updates = Vec::new();
        {
            let mut inner = self.inner.write();

            for (group, pool) in &diff.pools_removed_from_group {
                let gi = inner.group_idx.get(group).copied();
                let pi = inner.pool_idx.get(pool).copied();
                if let (Some(gi), Some(pi)) = (gi, pi) {
                    if let Some(set) = inner.group_pools.get_mut(&gi) {
                        set.remove(&pi);
                    }
                    if let Some(set) = inner.pool_groups.get_mut(&pi) {
                        set.remove(&gi);
                    }
                }
            }
            for (group, unit) in &diff.units_removed_from_group {
                let gi = inner.group_idx.get(group).copied();
                let ui = inner.unit_idx.get(unit).copied();
                if let (Some(gi), Some(ui)) = (gi, ui) {
                    if let Some(set) = inner.group_units.get_mut(&gi) {
                        set.remove(&ui);
                    }
                    if let Some(set) = inner.unit_groups.get_mut(&ui) {
                        set.remove(&gi);
                    }
                }
            }

            for name in &diff.removed_pools {
                if let Some(&i) = inner.pool_idx.get(name) {
                    if let Some(record) = inner.pool_mut(i) {
                        record.defined = false;
                    }
                    let groups = inner.pool_groups.remove(&i).unwrap_or_default();
                    for g in groups {
                        if let Some(set) = inner.group_pools.get_mut(&g) {
                            set.remove(&i);
                        }
                    }
                }
            }
            for name in &diff.removed_groups {
                if let Some(&i) = inner.group_idx.get(name) {
                    if let Some(record) = inner.groups.get_mut(i.0 as usize) {
                        record.defined = false;
                    }
                    let pools = inner.group_pools.remove(&i).unwrap_or_default();
                    for p in pools {
                        if let Some(set) = inner.pool_groups.get_mut(&p) {
                            set.remove(&i);
                        }
                    }
                    let units = inner.group_units.remove(&i).unwrap_or_default();
                    for u in units {
                        if let Some(set) = inner.unit_groups.get_mut(&u) {
                            set.remove(&i);
                        }
                    }
                }
            }
            for name in &diff.removed_units {
                if let Some(&i) = inner.unit_idx.get(name) {
                    if let Some(record) = inner.units.get_mut(i.0 as usize) {
                        record.defined = false;
                    }
                    let groups = inner.unit_groups.remove(&i).unwrap_or_default();
                    for g in groups {
                        if let Some(set) = inner.group_units.get_mut(&g) {
                            set.remove(&i);
                        }
                    }
                }
            }

            for unit in &diff.new_units {
                inner.ensure_unit(&unit.name, unit.constraints.clone());
            }
            for group in &diff.new_groups {
                inner.ensure_group(&group.name, group.resilient);
            }
            for pool in &diff.new_pools {
                let index = inner.ensure_pool(&pool.name);
                if let Some(record) = inner.pool_mut(index) {
                    record.info.tags = pool.tags.clone();
                    record.info.cost = pool.cost;
                }
                if pool.status != PoolStatus::Uninitialized {
                    updates.push(PoolStateUpdate::new(pool.name.clone(), pool.status));
                }
            }

            for (group, unit) in &diff.units_added_to_group {
                let gi = inner.group_idx.get(group).copied();
                let ui = inner.unit_idx.get(unit).copied();
                if let (Some(gi), Some(ui)) = (gi, ui) {
                    inner.group_units.entry(gi).or_default().insert(ui);
                    inner.unit_groups.entry(ui).or_default().insert(gi);
                } else {
                    warn!(group, unit, "membership refers to an unknown entity");
                }
            }
            for (group, pool) in &diff.pools_added_to_group {
                let gi = inner.group_idx.get(group).copied();
                let pi = inner.pool_idx.get(pool).copied();
                if let (Some(gi), Some(pi)) = (gi, pi) {
                    inner.group_pools.entry(gi).or_default().insert(pi);
                    inner.pool_groups.entry(pi).or_default().insert(gi);
                } else {
                    warn!(group, pool, "membership refers to an unknown entity");
                }
            }

            for (name, constraints) in &diff.constraint_changes {
                if let Some(&i) = inner.unit_idx.get(name) {
                    if let Some(record) = inner.units.get_mut(i.0 as usize) {
                        record.constraints = constraints.clone();
                    }
                }
            }
            for (name, tags) in &diff.tag_changes {
                if let Some(index) = inner.defined_pool_index(name) {
                    if let Some(record) = inner.pool_mut(index) {
                        record.info.tags = tags.clone();
                    }
                }
            }
            for (name, cost) in &diff.cost_changes {
                if let Some(index) = inner.defined_pool_index(name) {
                    if let Some(record) = inner.pool_mut(index) {
                        record.info.cost = *cost;
                    }
                }
            }
            for (name, status) in &diff.status_changes {
                if let Some(index) = inner.defined_pool_index(name) {
                    if let Some(record) = inner.pool_mut(index) {
                        record.info.status = *status;
                        record.info.last_status_update = Some(Instant::now());
                    }
                    updates.push(PoolStateUpdate::new(name.clone(), *status));
                }
            }
        }

        self.check_feasibility();
        debug!(
            transitions = updates.len(),
            "topology diff applied"
        );
        updates
    }

    /// Warn about resilient groups that cannot in principle satisfy the
    /// constraints of a unit bound to them.
    fn check_feasibility(&self) {
        let inner = self.inner.read();
        for (gi, units) in &inner.group_units {
            let group = &inner.groups[gi.0 as usize];
            if !group.defined || !group.resilient {
                continue;
            }
            let members: Vec<&PoolRecord> = inner
                .group_pools
                .get(gi)
                .map(|s| {
                    s.iter()
                        .filter_map(|i| inner.pool(*i))
                        .filter(|p| p.defined)
                        .collect()
                })
                .unwrap_or_default();
            for ui in units {
                let unit = match inner.units.get(ui.0 as usize) {
                    Some(u) if u.defined => u,
                    _ => continue,
                };
                let constraints = &unit.constraints;
                if !constraints.is_resilient() {
                    continue;
                }
                if members.len() < constraints.required {
                    warn!(
                        group = %group.name,
                        unit = %unit.name,
                        pools = members.len(),
                        required = constraints.required,
                        "group cannot satisfy replica count"
                    );
                    continue;
                }
                for tag in &constraints.one_copy_per {
                    let distinct: BTreeSet<&String> = members
                        .iter()
                        .filter_map(|p| p.info.tags.get(tag))
                        .collect();
                    if distinct.len() < constraints.required {
                        warn!(
                            group = %group.name,
                            unit = %unit.name,
                            tag = %tag,
                            distinct = distinct.len(),
                            required = constraints.required,
                            "group cannot satisfy tag diversity exactly; \
                             selection will degrade gracefully"
                        );
                    }
                }
            }
        }
    }
}
