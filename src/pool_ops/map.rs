// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! # Pool Operation Map
//!
//! Tracks scan state for every pool in a resilient group. Status changes
//! mark a pool WAITING; the sweep launches scans once the applicable grace
//! period has elapsed, bounded by `max_concurrent_scans`. Waiting pools
//! are admitted in the order they became eligible, name as tie-break. The same sweep
//! doubles as the watchdog: idle pools unscanned for longer than the
//! rescan window are queued for a periodic scan, which needs no grace.
//!
//! A pool that goes down, is scanned, and is seen down again is not
//! rescanned; its replicas were already handled.
//!
//! Lock order: the file-operation lock may be taken while this map's lock
//! is free (child completion runs file -> pool). Methods here that cancel
//! child operations therefore drop this map's lock before calling into the
//! file-operation map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::PoolOpConfig;
use crate::error::{ResilienceError, Result};
use crate::file_ops::FileOperationMap;
use crate::pool_ops::operation::{PoolOpState, PoolOperation, ScanTrigger};
use crate::topology::TopologyMap;
use crate::types::{GroupIndex, PoolIndex, PoolStateUpdate, UnitIndex};

/// A scan ready to launch, as returned by the sweep.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub pool: String,
    pub index: PoolIndex,
    pub group: GroupIndex,
    pub unit: Option<UnitIndex>,
    pub trigger: ScanTrigger,
}

pub struct PoolOperationMap {
    topology: Arc<TopologyMap>,
    down_grace: Duration,
    restart_grace: Duration,
    rescan_window: Duration,
    max_concurrent_scans: usize,
    file_ops: OnceCell<Arc<FileOperationMap>>,
    inner: Mutex<HashMap<String, PoolOperation>>,
}

impl PoolOperationMap {
    pub fn new(topology: Arc<TopologyMap>, config: &PoolOpConfig) -> Self {
        Self {
            topology,
            down_grace: Duration::from_secs(config.down_grace_period),
            restart_grace: Duration::from_secs(config.restart_grace_period),
            rescan_window: Duration::from_secs(config.rescan_window),
            max_concurrent_scans: config.max_concurrent_scans,
            file_ops: OnceCell::new(),
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Wire the back-reference used to cancel child operations. Called
    /// once during engine construction.
    pub fn set_file_ops(&self, file_ops: Arc<FileOperationMap>) {
        let _ = self.file_ops.set(file_ops);
    }

    /// Start tracking a pool, seeding its status from the topology.
    /// Idempotent. A down status is not seeded, so the first DOWN
    /// transition forwarded for the pool still reads as a fresh one and
    /// triggers a scan.
    pub fn ensure_pool(&self, name: &str) {
        let status = self.topology.pool_status(name);
        let mut inner = self.inner.lock();
        let op = inner
            .entry(name.to_string())
            .or_insert_with(PoolOperation::new);
        if op.current_status == crate::types::PoolStatus::Uninitialized {
            if let Some(status) = status {
                if !status.is_down() {
                    op.current_status = status;
                }
            }
        }
    }

    /// Stop tracking a pool removed from the topology.
    pub fn remove_pool(&self, name: &str) {
        self.inner.lock().remove(name);
    }

    /// Ingest a status transition. Non-resilient pools are ignored; a
    /// change during a running scan cancels the scan first.
    pub fn update(&self, update: &PoolStateUpdate) {
        if !self.topology.is_resilient_pool(&update.pool) {
            return;
        }
        let cancel_index = {
            let mut inner = self.inner.lock();
            let op = inner
                .entry(update.pool.clone())
                .or_insert_with(PoolOperation::new);
            let was_running = op.state == PoolOpState::Running;
            op.status_changed(update.status, update.group, update.unit);
            if was_running {
                self.topology.pool_index(&update.pool)
            } else {
                None
            }
        };
        if let Some(index) = cancel_index {
            info!(pool = %update.pool, "status change interrupts running scan");
            if let Some(file_ops) = self.file_ops.get() {
                file_ops.cancel_for_pool(index);
            }
        }
    }

    /// Operator-requested scan; bypasses grace periods but never runs on
    /// an excluded pool.
    pub fn scan(&self, pool: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let op = inner
            .get_mut(pool)
            .ok_or_else(|| ResilienceError::unknown_pool(pool))?;
        if op.state == PoolOpState::Excluded {
            return Err(ResilienceError::ScanFailed {
                pool: pool.to_string(),
                reason: "pool is excluded".to_string(),
            });
        }
        if op.state == PoolOpState::Running {
            return Err(ResilienceError::ScanFailed {
                pool: pool.to_string(),
                reason: "scan already running".to_string(),
            });
        }
        op.trigger = Some(ScanTrigger::Admin);
        op.state = PoolOpState::Waiting;
        op.last_update = Instant::now();
        Ok(())
    }

    /// One pass of the scheduler and watchdog. Returns the scans to
    /// launch; the caller spawns them without holding any lock.
    pub fn sweep(&self) -> Vec<ScanRequest> {
        let mut inner = self.inner.lock();

        // watchdog: queue periodic rescans for idle or stuck pools
        for op in inner.values_mut() {
            let stuck = matches!(op.state, PoolOpState::Failed | PoolOpState::Canceled)
                && op.last_update.elapsed() >= self.rescan_window;
            if op.rescan_due(self.rescan_window) || stuck {
                op.trigger = Some(ScanTrigger::Periodic);
                op.state = PoolOpState::Waiting;
                op.last_update = Instant::now();
            }
        }

        let mut running = inner
            .values()
            .filter(|op| op.state == PoolOpState::Running)
            .count();

        // oldest waiter first, so no pool is starved behind later arrivals
        let mut candidates: Vec<(Instant, String)> = inner
            .iter()
            .filter(|(_, op)| op.state == PoolOpState::Waiting)
            .map(|(name, op)| (op.last_update, name.clone()))
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut launches = Vec::new();
        for (_, name) in candidates {
            if running >= self.max_concurrent_scans {
                break;
            }
            let index = match self.topology.pool_index(&name) {
                Some(i) => i,
                None => {
                    // pool left the topology while waiting
                    inner.remove(&name);
                    continue;
                }
            };
            let group = match self
                .topology
                .resilient_group_of(index)
            {
                Some(g) => g,
                None => {
                    if let Some(op) = inner.get_mut(&name) {
                        op.state = PoolOpState::Idle;
                    }
                    continue;
                }
            };
            let Some(op) = inner.get_mut(&name) else {
                continue;
            };
            let trigger = op.trigger.unwrap_or(ScanTrigger::Periodic);
            if trigger == ScanTrigger::Down && op.is_redundant_down_scan() {
                debug!(pool = %name, "pool already handled as down, skipping rescan");
                op.state = PoolOpState::Idle;
                op.trigger = None;
                continue;
            }
            if !op.grace_elapsed(self.down_grace, self.restart_grace) {
                continue;
            }
            let group = op.group.unwrap_or(group);
            let unit = op.unit;
            op.begin_scan();
            running += 1;
            launches.push(ScanRequest {
                pool: name,
                index,
                group,
                unit,
                trigger,
            });
        }
        if !launches.is_empty() {
            debug!(launched = launches.len(), running, "scan sweep");
        }
        launches
    }

    /// Enumeration finished; record how many child operations the scan
    /// spawned. A scan with no children completes immediately.
    pub fn set_children(&self, pool: &str, total: usize) {
        let mut inner = self.inner.lock();
        if let Some(op) = inner.get_mut(pool) {
            op.children_total = Some(total);
            Self::maybe_finish(pool, op);
        }
    }

    /// A child file operation finished (in any way). Called by the file
    /// operation map with its own lock held; must not call back into it.
    pub fn child_completed(&self, parent: PoolIndex, success: bool) {
        let Some(name) = self.topology.pool_name(parent) else {
            return;
        };
        let mut inner = self.inner.lock();
        if let Some(op) = inner.get_mut(&name) {
            op.children_done += 1;
            if !success {
                op.children_failed += 1;
            }
            Self::maybe_finish(&name, op);
        }
    }

    fn maybe_finish(name: &str, op: &mut PoolOperation) {
        if op.state == PoolOpState::Running && op.children_drained() {
            if op.children_failed > 0 {
                warn!(
                    pool = name,
                    failed = op.children_failed,
                    total = op.children_total.unwrap_or(0),
                    "scan completed with failed children"
                );
            } else {
                info!(pool = name, total = op.children_total.unwrap_or(0), "scan completed");
            }
            op.finish_scan();
        }
    }

    /// Enumeration failed; the watchdog will retry after the rescan window.
    pub fn scan_failed(&self, pool: &str) {
        let mut inner = self.inner.lock();
        if let Some(op) = inner.get_mut(pool) {
            op.state = PoolOpState::Failed;
            op.trigger = None;
        }
    }

    /// Cancel a waiting or running scan, including its children.
    pub fn cancel_scan(&self, pool: &str) -> bool {
        let cancel_index = {
            let mut inner = self.inner.lock();
            let Some(op) = inner.get_mut(pool) else {
                return false;
            };
            if !matches!(op.state, PoolOpState::Waiting | PoolOpState::Running) {
                return false;
            }
            let was_running = op.state == PoolOpState::Running;
            op.state = PoolOpState::Canceled;
            op.trigger = None;
            if was_running {
                self.topology.pool_index(pool)
            } else {
                None
            }
        };
        if let Some(index) = cancel_index {
            if let Some(file_ops) = self.file_ops.get() {
                file_ops.cancel_for_pool(index);
            }
        }
        true
    }

    /// Operator exclusion: the pool takes no further part in scans until
    /// included again. A running scan is canceled. Forced scans are also
    /// refused while excluded.
    pub fn exclude(&self, pool: &str) -> bool {
        let cancel_index = {
            let mut inner = self.inner.lock();
            let Some(op) = inner.get_mut(pool) else {
                return false;
            };
            let was_running = op.state == PoolOpState::Running;
            op.state = PoolOpState::Excluded;
            op.trigger = None;
            if was_running {
                self.topology.pool_index(pool)
            } else {
                None
            }
        };
        self.topology.set_excluded(pool, true);
        if let Some(index) = cancel_index {
            if let Some(file_ops) = self.file_ops.get() {
                file_ops.cancel_for_pool(index);
            }
        }
        info!(pool, "pool excluded from resilience handling");
        true
    }

    /// Lift an exclusion; the pool resumes as idle and the watchdog will
    /// pick it up.
    pub fn include(&self, pool: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(op) = inner.get_mut(pool) else {
            return false;
        };
        if op.state != PoolOpState::Excluded {
            return false;
        }
        op.state = PoolOpState::Idle;
        drop(inner);
        self.topology.set_excluded(pool, false);
        info!(pool, "pool included in resilience handling");
        true
    }

    /// Excluded pool names, for the crash-recovery sidecar.
    pub fn excluded_pools(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut names: Vec<String> = inner
            .iter()
            .filter(|(_, op)| op.state == PoolOpState::Excluded)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Reinstate exclusions recorded before a restart.
    pub fn restore_excluded(&self, pools: &[String]) {
        let mut inner = self.inner.lock();
        for name in pools {
            let op = inner.entry(name.clone()).or_insert_with(PoolOperation::new);
            op.state = PoolOpState::Excluded;
        }
        drop(inner);
        for name in pools {
            self.topology.set_excluded(name, true);
        }
    }

    // ---- introspection ------------------------------------------------

    pub fn state_of(&self, pool: &str) -> Option<PoolOpState> {
        self.inner.lock().get(pool).map(|op| op.state)
    }

    pub fn operation(&self, pool: &str) -> Option<PoolOperation> {
        self.inner.lock().get(pool).cloned()
    }

    pub fn running_scans(&self) -> usize {
        self.inner
            .lock()
            .values()
            .filter(|op| op.state == PoolOpState::Running)
            .count()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
