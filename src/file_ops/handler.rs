// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! # File Operation Handler
//!
//! Admission of location updates and execution of verification passes.
//! Each pass re-reads the namespace, compares the live replica census
//! against the storage unit's constraints, and dispatches at most one
//! corrective action: a copy, a removal, or a sticky promotion.
//!
//! Replicas on operator-excluded pools count toward the required total, so
//! excluding a pool never triggers replication churn. A diversity
//! violation at the correct count resolves in two passes: evict the
//! offending replica, then re-copy to a better pool.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{FailureKind, Result};
use crate::file_ops::map::{FileOpRegistration, FileOperationMap};
use crate::file_ops::operation::FileOperation;
use crate::selection::{LocationSelector, SelectionError};
use crate::topology::{PoolMember, StorageUnitConstraints, TopologyMap};
use crate::traits::{NamespaceAccess, PoolCommands};
use crate::types::{FileAttributes, FileUpdate, MessageType, VerifyResult};

pub struct FileOperationHandler {
    topology: Arc<TopologyMap>,
    namespace: Arc<dyn NamespaceAccess>,
    pools: Arc<dyn PoolCommands>,
    map: Arc<FileOperationMap>,
    selector: LocationSelector,
}

/// The action decided by one verification pass.
enum Decision {
    Copy { source: PoolMember, target: PoolMember },
    Remove { victim: PoolMember, evict: bool },
    SetSticky { pool: PoolMember },
    Void,
    Abandon(&'static str),
}

impl FileOperationHandler {
    pub fn new(
        topology: Arc<TopologyMap>,
        namespace: Arc<dyn NamespaceAccess>,
        pools: Arc<dyn PoolCommands>,
        map: Arc<FileOperationMap>,
    ) -> Self {
        Self {
            topology,
            namespace,
            pools,
            map,
            selector: LocationSelector::default(),
        }
    }

    /// Admit a location update from the live feed. Returns true when a new
    /// operation was created, false when the update merged or was dropped.
    pub async fn handle_update(&self, update: FileUpdate) -> Result<bool> {
        let Some(pool) = update.pool.as_deref() else {
            debug!(file = %update.file_id, "update without a location, dropped");
            return Ok(false);
        };
        let Some(pool_index) = self.topology.pool_index(pool) else {
            debug!(file = %update.file_id, pool, "update for unknown pool, dropped");
            return Ok(false);
        };
        let Some(group) = self.topology.resilient_group_of(pool_index) else {
            return Ok(false);
        };
        let Some(attrs) = self.namespace.required_attributes(&update.file_id).await? else {
            return Ok(false);
        };
        if update.message_type == MessageType::ClearCacheLocation
            && attrs.locations.is_empty()
            && attrs.cached_locations.is_empty()
        {
            debug!(file = %update.file_id, "no locations remain after clear, dropped");
            return Ok(false);
        }
        let unit = self.topology.unit_index(&attrs.storage_class);
        if !self.topology.constraints_of(unit).is_resilient() {
            return Ok(false);
        }
        let broken_source =
            (update.message_type == MessageType::CorruptFile).then_some(pool_index);
        let admission = self.map.register(FileOpRegistration {
            file_id: update.file_id,
            parent: None,
            group,
            unit,
            from_scan: update.from_scan,
            broken_source,
        });
        Ok(admission.created)
    }

    /// Execute one verification pass for a promoted operation. Every exit
    /// path reports back to the map; this function never leaves a slot
    /// dangling.
    pub async fn run_pass(&self, op: FileOperation) {
        let attrs = match self.namespace.required_attributes(&op.file_id).await {
            Ok(Some(attrs)) => attrs,
            Ok(None) => {
                // deleted while queued
                self.map.complete_void(&op.file_id);
                return;
            }
            Err(e) => {
                warn!(file = %op.file_id, error = %e, "namespace lookup failed");
                self.map.complete_failure(&op.file_id, FailureKind::Fatal);
                return;
            }
        };

        let decision = self.verify(&op, &attrs);
        match decision {
            Decision::Void => {
                self.map.complete_void(&op.file_id);
            }
            Decision::Abandon(reason) => {
                self.map.abandon(&op.file_id, reason);
            }
            Decision::SetSticky { pool } => {
                self.map.note_action(
                    &op.file_id,
                    VerifyResult::SetSticky,
                    None,
                    Some(pool.index),
                );
                info!(file = %op.file_id, pool = %pool.name, "promoting cached replica");
                match self.pools.set_sticky(&op.file_id, &pool.name).await {
                    Ok(()) => self.map.complete_success(&op.file_id),
                    Err(f) => self.map.complete_failure(&op.file_id, f.kind),
                }
            }
            Decision::Copy { source, target } => {
                self.map.note_action(
                    &op.file_id,
                    VerifyResult::Copy,
                    Some(source.index),
                    Some(target.index),
                );
                info!(
                    file = %op.file_id,
                    source = %source.name,
                    target = %target.name,
                    "replicating"
                );
                match self.pools.copy(&op.file_id, &source.name, &target.name).await {
                    Ok(()) => self.map.complete_success(&op.file_id),
                    Err(f) => self.map.complete_failure(&op.file_id, f.kind),
                }
            }
            Decision::Remove { victim, evict } => {
                if evict {
                    // keep the operation alive for the follow-up copy
                    self.map.add_pass(&op.file_id);
                }
                self.map.note_action(
                    &op.file_id,
                    VerifyResult::Remove,
                    Some(victim.index),
                    None,
                );
                info!(file = %op.file_id, pool = %victim.name, evict, "removing replica");
                match self.pools.remove(&op.file_id, &victim.name).await {
                    Ok(()) => self.map.complete_success(&op.file_id),
                    Err(f) => self.map.complete_failure(&op.file_id, f.kind),
                }
            }
        }
    }

    /// Compare the replica census against the constraints and decide the
    /// corrective action, if any.
    fn verify(&self, op: &FileOperation, attrs: &FileAttributes) -> Decision {
        let unit = op
            .unit
            .or_else(|| self.topology.unit_index(&attrs.storage_class));
        let constraints = self.topology.constraints_of(unit);
        if !constraints.is_resilient() {
            return Decision::Void;
        }

        let members = self.topology.group_members(op.group);
        let sticky = self
            .topology
            .member_locations(op.group, &attrs.locations);
        let cached = self
            .topology
            .member_locations(op.group, &attrs.cached_locations);
        let excluded = self.topology.excluded_locations(&sticky);

        // replicas reported corrupt sit in the tried set; they count
        // neither as usable copies nor as sources
        let readable: Vec<String> = self
            .topology
            .readable_locations(&sticky)
            .into_iter()
            .filter(|name| {
                self.topology
                    .pool_index(name)
                    .map(|i| !op.tried.contains(&i))
                    .unwrap_or(false)
            })
            .collect();

        if sticky.is_empty() && cached.is_empty() {
            // no replica of this file lives in the group
            return Decision::Void;
        }

        let required = constraints.required as i64;
        let missing = required - readable.len() as i64 - excluded.len() as i64;

        if missing > 0 {
            self.deficient(op, &constraints, &members, &readable, &cached, &sticky)
        } else if missing < 0 {
            self.redundant(op, &constraints, &members, &readable)
        } else {
            self.check_diversity(op, &constraints, &members, &readable)
        }
    }

    fn deficient(
        &self,
        op: &FileOperation,
        constraints: &StorageUnitConstraints,
        members: &[PoolMember],
        readable: &[String],
        cached: &[String],
        sticky: &[String],
    ) -> Decision {
        // every sticky holder counts as occupied for target purposes, even
        // when down, excluded or corrupt: the physical replica is there
        let sticky_members = filter_members(members, sticky);
        let cached_members = filter_members(members, cached);
        let readable_members = filter_members(members, readable);

        // a cached replica on a writable pool can be pinned in place
        if !cached_members.is_empty() {
            if let Ok(pool) = self.selector.select_copy_target(
                &op.file_id,
                &cached_members,
                &sticky_members,
                &op.tried,
                constraints,
            ) {
                return Decision::SetSticky { pool };
            }
        }

        // usable sticky and cached replicas both serve as copy sources
        let mut sources = readable_members;
        sources.extend(cached_members.iter().cloned());
        let source = match self
            .selector
            .select_copy_source(&op.file_id, &sources, &op.tried)
        {
            Ok(source) => source,
            Err(SelectionError::NoViableSource { .. }) => {
                if readable.is_empty() && !sticky.is_empty() {
                    warn!(file = %op.file_id, "file currently inaccessible, no readable replica");
                }
                return Decision::Abandon("no viable copy source");
            }
            Err(_) => return Decision::Abandon("source selection failed"),
        };

        let mut holding = sticky_members;
        holding.extend(cached_members);
        match self.selector.select_copy_target(
            &op.file_id,
            members,
            &holding,
            &op.tried,
            constraints,
        ) {
            Ok(target) => Decision::Copy { source, target },
            Err(_) => Decision::Abandon("no viable copy target"),
        }
    }

    fn redundant(
        &self,
        op: &FileOperation,
        constraints: &StorageUnitConstraints,
        members: &[PoolMember],
        readable: &[String],
    ) -> Decision {
        let replicas = filter_members(members, readable);
        match self
            .selector
            .select_remove_target(&op.file_id, &replicas, constraints)
        {
            Ok(victim) => Decision::Remove {
                victim,
                evict: false,
            },
            Err(_) => Decision::Abandon("no removable replica"),
        }
    }

    fn check_diversity(
        &self,
        op: &FileOperation,
        constraints: &StorageUnitConstraints,
        members: &[PoolMember],
        readable: &[String],
    ) -> Decision {
        let replicas = filter_members(members, readable);
        match self
            .selector
            .find_location_to_evict(&replicas, constraints)
        {
            Some(victim) => {
                debug!(
                    file = %op.file_id,
                    pool = %victim.name,
                    "exclusive-tag violation, scheduling eviction and re-copy"
                );
                Decision::Remove {
                    victim,
                    evict: true,
                }
            }
            None => Decision::Void,
        }
    }
}

fn filter_members(members: &[PoolMember], names: &[String]) -> Vec<PoolMember> {
    members
        .iter()
        .filter(|m| names.iter().any(|n| n == &m.name))
        .cloned()
        .collect()
}
