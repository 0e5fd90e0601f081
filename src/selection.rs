// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! # Location Selection
//!
//! Pure decision logic for picking copy sources, copy targets and removal
//! victims among the members of one resilient pool group. The selector
//! never touches shared state; callers hand it the candidate members (with
//! live status, tags and cost) and the constraints of the file's storage
//! unit.
//!
//! All choices are deterministic: candidates are ordered by exclusive-tag
//! collision count, then strategy weight, then pool name, so the same
//! inputs always produce the same placement. Tag diversity degrades
//! gracefully: when no candidate is collision-free, the least-colliding
//! one is still chosen rather than failing the operation.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::trace;

use crate::topology::{PoolMember, StorageUnitConstraints};
use crate::types::{FileId, PoolIndex};

/// Selection failures; both are terminal for the current attempt and route
/// through the retry policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no viable copy source for {file_id}")]
    NoViableSource { file_id: FileId },

    #[error("no viable copy target for {file_id}")]
    NoViableTarget { file_id: FileId },

    #[error("no removable replica for {file_id}")]
    NoRemovableReplica { file_id: FileId },
}

/// Weighting of otherwise-equivalent candidate pools.
pub trait SelectionStrategy: Send + Sync {
    /// Higher is better for targets; lower marks removal victims.
    fn weight(&self, member: &PoolMember) -> u64;
}

/// Default strategy: prefer pools with more free space, discounted by mover
/// queue depth.
pub struct FreeSpaceStrategy;

impl SelectionStrategy for FreeSpaceStrategy {
    fn weight(&self, member: &PoolMember) -> u64 {
        member.info.cost.free_bytes / (1 + u64::from(member.info.cost.queued_movers))
    }
}

/// How many of the occupied replicas a candidate collides with on the
/// unit's exclusive tags. A missing tag value never collides.
fn collisions(
    candidate: &PoolMember,
    occupied: &[PoolMember],
    constraints: &StorageUnitConstraints,
) -> usize {
    constraints
        .one_copy_per
        .iter()
        .map(|tag| {
            let value = match candidate.info.tags.get(tag) {
                Some(v) => v,
                None => return 0,
            };
            occupied
                .iter()
                .filter(|o| o.index != candidate.index)
                .filter(|o| o.info.tags.get(tag) == Some(value))
                .count()
        })
        .sum()
}

pub struct LocationSelector {
    strategy: Box<dyn SelectionStrategy>,
}

impl Default for LocationSelector {
    fn default() -> Self {
        Self::new(Box::new(FreeSpaceStrategy))
    }
}

impl LocationSelector {
    pub fn new(strategy: Box<dyn SelectionStrategy>) -> Self {
        Self { strategy }
    }

    /// Pick the source for a copy among the readable replicas, skipping
    /// pools already tried for this operation.
    pub fn select_copy_source(
        &self,
        file_id: &FileId,
        sources: &[PoolMember],
        tried: &BTreeSet<PoolIndex>,
    ) -> Result<PoolMember, SelectionError> {
        let mut viable: Vec<&PoolMember> = sources
            .iter()
            .filter(|m| m.info.status.is_readable() && !m.info.excluded)
            .filter(|m| !tried.contains(&m.index))
            .collect();
        if viable.is_empty() {
            return Err(SelectionError::NoViableSource {
                file_id: file_id.clone(),
            });
        }
        viable.sort_by(|a, b| {
            self.strategy
                .weight(b)
                .cmp(&self.strategy.weight(a))
                .then_with(|| a.name.cmp(&b.name))
        });
        let chosen = viable[0].clone();
        trace!(file = %file_id, source = %chosen.name, "source selected");
        Ok(chosen)
    }

    /// Pick the target for a copy among the group members.
    ///
    /// Candidates must be writable, hold no replica of the file, and not
    /// have been tried before. Ordering: fewest exclusive-tag collisions
    /// with the existing replicas first, then highest strategy weight, then
    /// name.
    pub fn select_copy_target(
        &self,
        file_id: &FileId,
        candidates: &[PoolMember],
        occupied: &[PoolMember],
        tried: &BTreeSet<PoolIndex>,
        constraints: &StorageUnitConstraints,
    ) -> Result<PoolMember, SelectionError> {
        let holding: BTreeSet<PoolIndex> = occupied.iter().map(|m| m.index).collect();
        let mut viable: Vec<&PoolMember> = candidates
            .iter()
            .filter(|m| m.info.status.is_writable() && !m.info.excluded)
            .filter(|m| !holding.contains(&m.index))
            .filter(|m| !tried.contains(&m.index))
            .collect();
        if viable.is_empty() {
            return Err(SelectionError::NoViableTarget {
                file_id: file_id.clone(),
            });
        }
        viable.sort_by(|a, b| {
            collisions(a, occupied, constraints)
                .cmp(&collisions(b, occupied, constraints))
                .then_with(|| self.strategy.weight(b).cmp(&self.strategy.weight(a)))
                .then_with(|| a.name.cmp(&b.name))
        });
        let chosen = viable[0].clone();
        trace!(
            file = %file_id,
            target = %chosen.name,
            collisions = collisions(&chosen, occupied, constraints),
            "target selected"
        );
        Ok(chosen)
    }

    /// Pick the replica to drop when the file has too many.
    ///
    /// Victims are ordered most-colliding first, then lowest weight, then
    /// name, so removal restores diversity before it reclaims space.
    /// Replicas on non-writable pools are never removed; a replica on a
    /// down pool may be the only copy left elsewhere.
    pub fn select_remove_target(
        &self,
        file_id: &FileId,
        replicas: &[PoolMember],
        constraints: &StorageUnitConstraints,
    ) -> Result<PoolMember, SelectionError> {
        let mut viable: Vec<&PoolMember> = replicas
            .iter()
            .filter(|m| m.info.status.is_writable() && !m.info.excluded)
            .collect();
        if viable.is_empty() {
            return Err(SelectionError::NoRemovableReplica {
                file_id: file_id.clone(),
            });
        }
        viable.sort_by(|a, b| {
            collisions(b, replicas, constraints)
                .cmp(&collisions(a, replicas, constraints))
                .then_with(|| self.strategy.weight(a).cmp(&self.strategy.weight(b)))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(viable[0].clone())
    }

    /// When the replica count is exactly right but two replicas share an
    /// exclusive tag value, return the replica to evict so a better-placed
    /// copy can be made. `None` means placement is compliant.
    pub fn find_location_to_evict(
        &self,
        replicas: &[PoolMember],
        constraints: &StorageUnitConstraints,
    ) -> Option<PoolMember> {
        let mut offenders: Vec<&PoolMember> = replicas
            .iter()
            .filter(|m| collisions(m, replicas, constraints) > 0)
            .filter(|m| m.info.status.is_writable() && !m.info.excluded)
            .collect();
        if offenders.is_empty() {
            return None;
        }
        offenders.sort_by(|a, b| {
            collisions(b, replicas, constraints)
                .cmp(&collisions(a, replicas, constraints))
                .then_with(|| self.strategy.weight(a).cmp(&self.strategy.weight(b)))
                .then_with(|| a.name.cmp(&b.name))
        });
        Some(offenders[0].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{PoolCost, PoolInformation};
    use crate::types::PoolStatus;
    use std::collections::BTreeMap;

    fn member(index: u32, name: &str, status: PoolStatus, free: u64) -> PoolMember {
        PoolMember {
            index: PoolIndex(index),
            name: name.to_string(),
            info: PoolInformation {
                status,
                tags: BTreeMap::new(),
                cost: PoolCost {
                    free_bytes: free,
                    queued_movers: 0,
                },
                excluded: false,
                last_status_update: None,
            },
        }
    }

    fn tagged(mut m: PoolMember, key: &str, value: &str) -> PoolMember {
        m.info.tags.insert(key.to_string(), value.to_string());
        m
    }

    fn host_constraint(required: usize) -> StorageUnitConstraints {
        StorageUnitConstraints::new(required, vec!["hostname".into()])
    }

    #[test]
    fn source_skips_tried_and_unreadable() {
        let selector = LocationSelector::default();
        let file = FileId::from("f1");
        let sources = vec![
            member(0, "a", PoolStatus::Down, 100),
            member(1, "b", PoolStatus::Enabled, 100),
            member(2, "c", PoolStatus::Enabled, 500),
        ];
        let mut tried = BTreeSet::new();
        tried.insert(PoolIndex(2));
        let chosen = selector.select_copy_source(&file, &sources, &tried).unwrap();
        assert_eq!(chosen.name, "b");
    }

    #[test]
    fn source_exhaustion_is_an_error() {
        let selector = LocationSelector::default();
        let file = FileId::from("f1");
        let sources = vec![member(0, "a", PoolStatus::Down, 100)];
        let err = selector
            .select_copy_source(&file, &sources, &BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err, SelectionError::NoViableSource { .. }));
    }

    #[test]
    fn target_prefers_collision_free_pool_over_bigger_one() {
        let selector = LocationSelector::default();
        let file = FileId::from("f1");
        let occupied = vec![tagged(
            member(0, "a", PoolStatus::Enabled, 100),
            "hostname",
            "h1",
        )];
        let candidates = vec![
            // same host as the existing replica, but much more space
            tagged(member(1, "b", PoolStatus::Enabled, 9000), "hostname", "h1"),
            tagged(member(2, "c", PoolStatus::Enabled, 100), "hostname", "h2"),
        ];
        let chosen = selector
            .select_copy_target(&file, &candidates, &occupied, &BTreeSet::new(), &host_constraint(2))
            .unwrap();
        assert_eq!(chosen.name, "c");
    }

    #[test]
    fn target_degrades_to_colliding_pool_when_no_other_exists() {
        let selector = LocationSelector::default();
        let file = FileId::from("f1");
        let occupied = vec![tagged(
            member(0, "a", PoolStatus::Enabled, 100),
            "hostname",
            "h1",
        )];
        let candidates = vec![tagged(
            member(1, "b", PoolStatus::Enabled, 100),
            "hostname",
            "h1",
        )];
        let chosen = selector
            .select_copy_target(&file, &candidates, &occupied, &BTreeSet::new(), &host_constraint(2))
            .unwrap();
        assert_eq!(chosen.name, "b");
    }

    #[test]
    fn target_never_reuses_an_occupied_pool() {
        let selector = LocationSelector::default();
        let file = FileId::from("f1");
        let occupied = vec![member(0, "a", PoolStatus::Enabled, 100)];
        let candidates = vec![member(0, "a", PoolStatus::Enabled, 100)];
        let err = selector
            .select_copy_target(
                &file,
                &candidates,
                &occupied,
                &BTreeSet::new(),
                &host_constraint(2),
            )
            .unwrap_err();
        assert!(matches!(err, SelectionError::NoViableTarget { .. }));
    }

    #[test]
    fn remove_picks_the_collision_offender() {
        let selector = LocationSelector::default();
        let file = FileId::from("f1");
        let replicas = vec![
            tagged(member(0, "a", PoolStatus::Enabled, 100), "hostname", "h1"),
            tagged(member(1, "b", PoolStatus::Enabled, 500), "hostname", "h1"),
            tagged(member(2, "c", PoolStatus::Enabled, 100), "hostname", "h2"),
        ];
        let chosen = selector
            .select_remove_target(&file, &replicas, &host_constraint(2))
            .unwrap();
        // a and b collide; a has less free space and sorts first by name too
        assert_eq!(chosen.name, "a");
    }

    #[test]
    fn remove_without_collisions_reclaims_least_free_pool() {
        let selector = LocationSelector::default();
        let file = FileId::from("f1");
        let replicas = vec![
            member(0, "a", PoolStatus::Enabled, 500),
            member(1, "b", PoolStatus::Enabled, 100),
        ];
        let chosen = selector
            .select_remove_target(&file, &replicas, &StorageUnitConstraints::new(1, vec![]))
            .unwrap();
        assert_eq!(chosen.name, "b");
    }

    #[test]
    fn eviction_only_fires_on_a_violation() {
        let selector = LocationSelector::default();
        let compliant = vec![
            tagged(member(0, "a", PoolStatus::Enabled, 100), "hostname", "h1"),
            tagged(member(1, "b", PoolStatus::Enabled, 100), "hostname", "h2"),
        ];
        assert!(selector
            .find_location_to_evict(&compliant, &host_constraint(2))
            .is_none());

        let violating = vec![
            tagged(member(0, "a", PoolStatus::Enabled, 100), "hostname", "h1"),
            tagged(member(1, "b", PoolStatus::Enabled, 100), "hostname", "h1"),
        ];
        let evict = selector
            .find_location_to_evict(&violating, &host_constraint(2))
            .unwrap();
        assert_eq!(evict.name, "a");
    }

    #[test]
    fn deterministic_given_equal_inputs() {
        let selector = LocationSelector::default();
        let file = FileId::from("f1");
        let candidates = vec![
            member(0, "p1", PoolStatus::Enabled, 100),
            member(1, "p2", PoolStatus::Enabled, 100),
        ];
        for _ in 0..10 {
            let chosen = selector
                .select_copy_target(
                    &file,
                    &candidates,
                    &[],
                    &BTreeSet::new(),
                    &StorageUnitConstraints::new(2, vec![]),
                )
                .unwrap();
            assert_eq!(chosen.name, "p1");
        }
    }
}
