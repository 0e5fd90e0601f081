// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! # File Operation Map
//!
//! Bounded-concurrency scheduler over the per-file operations. One index
//! entry per file, two waiting queues (foreground for live location
//! updates, background for scan-generated work) and a running-slot budget
//! of `copy_threads`.
//!
//! Under contention neither queue may claim more than `max_allocation`
//! percent of the slots, and the minority queue is always guaranteed one.
//! Requeues after a recoverable failure go to the head of the queue, so a
//! file in trouble is resolved before new work starts.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::checkpoint::FileOpRecord;
use crate::config::FileOpConfig;
use crate::error::FailureKind;
use crate::file_ops::operation::{FileOpState, FileOperation};
use crate::pool_ops::PoolOperationMap;
use crate::topology::TopologyMap;
use crate::types::{FileId, GroupIndex, PoolIndex, UnitIndex, VerifyResult};

/// Data needed to admit a new operation (or merge into a live one).
#[derive(Debug, Clone)]
pub struct FileOpRegistration {
    pub file_id: FileId,
    pub parent: Option<PoolIndex>,
    pub group: GroupIndex,
    pub unit: Option<UnitIndex>,
    pub from_scan: bool,
    /// A replica already known to be unreadable; ruled out as a source
    /// from the start.
    pub broken_source: Option<PoolIndex>,
}

/// How an admission was absorbed, reported under the map lock so scan
/// child accounting sees the same parent the operation will report to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// A new operation was created (false: merged into a live one).
    pub created: bool,
    /// The parent the operation reports to after this admission.
    pub parent: Option<PoolIndex>,
}

/// Terminal operations kept for operator visibility.
const HISTORY_CAPACITY: usize = 1000;

/// Record of a finished operation, kept in a bounded ring.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub file_id: FileId,
    pub state: FileOpState,
    pub last_action: Option<VerifyResult>,
    pub last_failure: Option<FailureKind>,
    pub finished: Instant,
}

impl OperationOutcome {
    pub fn is_error(&self) -> bool {
        self.state == FileOpState::Failed
    }
}

/// Outcome of a running pass, decided under the per-operation borrow.
enum Disposition {
    /// Requeue at the head of the foreground (false) or background (true)
    /// queue.
    Requeue(bool),
    /// Terminal; report success or failure to the parent scan.
    Finish(bool),
}

#[derive(Default)]
struct Inner {
    index: HashMap<FileId, FileOperation>,
    foreground: VecDeque<FileId>,
    background: VecDeque<FileId>,
    running_fg: usize,
    running_bg: usize,
    history: VecDeque<OperationOutcome>,
}

impl Inner {
    fn queue_for(&mut self, from_scan: bool) -> &mut VecDeque<FileId> {
        if from_scan {
            &mut self.background
        } else {
            &mut self.foreground
        }
    }

    fn drop_from_queues(&mut self, file_id: &FileId) {
        self.foreground.retain(|f| f != file_id);
        self.background.retain(|f| f != file_id);
    }
}

pub struct FileOperationMap {
    topology: Arc<TopologyMap>,
    config: FileOpConfig,
    pool_ops: OnceCell<Arc<PoolOperationMap>>,
    inner: Mutex<Inner>,
    wakeup: Notify,
}

impl FileOperationMap {
    pub fn new(topology: Arc<TopologyMap>, config: FileOpConfig) -> Self {
        Self {
            topology,
            config,
            pool_ops: OnceCell::new(),
            inner: Mutex::new(Inner::default()),
            wakeup: Notify::new(),
        }
    }

    /// Wire the back-reference for scan child accounting. Called once
    /// during engine construction.
    pub fn set_pool_ops(&self, pool_ops: Arc<PoolOperationMap>) {
        let _ = self.pool_ops.set(pool_ops);
    }

    /// Wait until new work arrives or a completion frees a slot.
    pub async fn notified(&self) {
        self.wakeup.notified().await;
    }

    /// Admit an update, creating a new operation or merging into a live
    /// one. The returned [`Admission`] carries the operation's parent as
    /// decided under the lock.
    pub fn register(&self, reg: FileOpRegistration) -> Admission {
        let mut inner = self.inner.lock();
        let merged = match inner.index.get_mut(&reg.file_id) {
            Some(op) if !op.state.is_terminal() => {
                op.absorb_update(reg.parent);
                if let Some(broken) = reg.broken_source {
                    op.tried.insert(broken);
                }
                Some(Admission {
                    created: false,
                    parent: op.parent,
                })
            }
            _ => None,
        };
        let admission = merged.unwrap_or_else(|| {
            let mut op = FileOperation::new(
                reg.file_id.clone(),
                reg.parent,
                reg.group,
                reg.unit,
                reg.from_scan,
            );
            if let Some(broken) = reg.broken_source {
                op.tried.insert(broken);
            }
            let parent = op.parent;
            inner.index.insert(reg.file_id.clone(), op);
            inner.queue_for(reg.from_scan).push_back(reg.file_id);
            Admission {
                created: true,
                parent,
            }
        });
        drop(inner);
        self.wakeup.notify_one();
        admission
    }

    /// Reinstate counters recovered from a checkpoint onto a re-admitted
    /// operation. No-op when the record was dropped at re-admission.
    pub fn restore_counters(&self, file_id: &FileId, op_count: u32, retried: u32) {
        let mut inner = self.inner.lock();
        if let Some(op) = inner.index.get_mut(file_id) {
            op.op_count = op.op_count.max(op_count);
            op.retried = op.retried.max(retried);
        }
    }

    /// Promote waiting operations into running slots and return snapshots
    /// for the caller to launch. The lock is never held across a launch.
    pub fn sweep(&self) -> Vec<FileOperation> {
        let mut inner = self.inner.lock();
        let cap = std::cmp::max(
            1,
            self.config.copy_threads * usize::from(self.config.max_allocation) / 100,
        );
        let mut launches = Vec::new();

        loop {
            let running = inner.running_fg + inner.running_bg;
            if running >= self.config.copy_threads {
                break;
            }
            let fg_waiting = !inner.foreground.is_empty();
            let bg_waiting = !inner.background.is_empty();
            if !fg_waiting && !bg_waiting {
                break;
            }
            // the allocation cap only binds under contention
            let take_fg = if fg_waiting && bg_waiting {
                if inner.running_fg >= cap {
                    false
                } else if inner.running_bg >= cap {
                    true
                } else {
                    inner.running_fg <= inner.running_bg
                }
            } else {
                fg_waiting
            };
            let file_id = if take_fg {
                inner.foreground.pop_front()
            } else {
                inner.background.pop_front()
            };
            let file_id = match file_id {
                Some(f) => f,
                None => break,
            };
            let snapshot = match inner.index.get_mut(&file_id) {
                Some(op) if op.state == FileOpState::Waiting => {
                    op.state = FileOpState::Running;
                    op.clone()
                }
                // canceled or stale queue entry
                _ => continue,
            };
            if take_fg {
                inner.running_fg += 1;
            } else {
                inner.running_bg += 1;
            }
            launches.push(snapshot);
        }
        if !launches.is_empty() {
            debug!(
                launched = launches.len(),
                running = inner.running_fg + inner.running_bg,
                "sweep promoted operations"
            );
        }
        launches
    }

    /// Record the decision of a verification pass before dispatch.
    pub fn note_action(
        &self,
        file_id: &FileId,
        action: VerifyResult,
        source: Option<PoolIndex>,
        target: Option<PoolIndex>,
    ) {
        let mut inner = self.inner.lock();
        if let Some(op) = inner.index.get_mut(file_id) {
            op.note_action(action, source, target);
        }
    }

    /// An eviction pass was scheduled; keep the operation alive for the
    /// follow-up copy.
    pub fn add_pass(&self, file_id: &FileId) {
        let mut inner = self.inner.lock();
        if let Some(op) = inner.index.get_mut(file_id) {
            op.op_count += 1;
        }
    }

    /// A pass completed successfully.
    pub fn complete_success(&self, file_id: &FileId) {
        let mut inner = self.inner.lock();
        let disposition = match inner.index.get_mut(file_id) {
            Some(op) if op.state == FileOpState::Canceled => Disposition::Finish(false),
            Some(op) => {
                if op.pass_succeeded() {
                    Disposition::Requeue(op.from_scan)
                } else {
                    Disposition::Finish(true)
                }
            }
            None => return,
        };
        self.settle(&mut inner, file_id, disposition);
        drop(inner);
        self.wakeup.notify_one();
    }

    /// The file needs nothing (compliant, deleted, or not resilient).
    /// A cancellation that raced the pass wins; the operation stays
    /// canceled and counts as a failed child.
    pub fn complete_void(&self, file_id: &FileId) {
        let mut inner = self.inner.lock();
        let success = match inner.index.get_mut(file_id) {
            Some(op) if op.state == FileOpState::Canceled => false,
            Some(op) => {
                op.op_count = 0;
                op.state = FileOpState::Done;
                true
            }
            None => return,
        };
        self.finalize(&mut inner, file_id, success, true);
        drop(inner);
        self.wakeup.notify_one();
    }

    /// A pass failed; route by failure class. Recoverable classes requeue
    /// at the head of the operation's queue.
    pub fn complete_failure(&self, file_id: &FileId, kind: FailureKind) {
        let mut inner = self.inner.lock();
        let disposition = match inner.index.get_mut(file_id) {
            Some(op) if op.state == FileOpState::Canceled => Disposition::Finish(false),
            Some(op) => {
                if !op.pass_failed(kind, self.config.max_retries) {
                    warn!(file = %file_id, ?kind, "operation abandoned");
                    Disposition::Finish(false)
                } else if !self.topology.has_untried_member(op.group, &op.tried) {
                    warn!(file = %file_id, ?kind, "no untried pools remain, abandoning");
                    op.abandon();
                    Disposition::Finish(false)
                } else {
                    Disposition::Requeue(op.from_scan)
                }
            }
            None => return,
        };
        self.settle(&mut inner, file_id, disposition);
        drop(inner);
        self.wakeup.notify_one();
    }

    /// Selection found no legal alternative; abandon the operation.
    pub fn abandon(&self, file_id: &FileId, reason: &str) {
        let mut inner = self.inner.lock();
        let Some(op) = inner.index.get_mut(file_id) else {
            return;
        };
        warn!(file = %file_id, reason, "no alternatives left, abandoning");
        op.abandon();
        self.finalize(&mut inner, file_id, false, true);
        drop(inner);
        self.wakeup.notify_one();
    }

    /// Cancel the operation for one file. Running passes are discarded on
    /// completion.
    pub fn cancel_file(&self, file_id: &FileId) -> bool {
        let mut inner = self.inner.lock();
        let Some(op) = inner.index.get_mut(file_id) else {
            return false;
        };
        let was_running = op.state == FileOpState::Running;
        op.cancel();
        if !was_running {
            // waiting entries can be finalized immediately
            self.finalize(&mut inner, file_id, false, false);
        }
        true
    }

    /// Cancel every operation touching `pool` (as parent, source or
    /// target). Used when a pool is excluded or a scan is canceled.
    pub fn cancel_for_pool(&self, pool: PoolIndex) -> usize {
        let mut inner = self.inner.lock();
        let affected: Vec<FileId> = inner
            .index
            .iter()
            .filter(|(_, op)| !op.state.is_terminal())
            .filter(|(_, op)| {
                op.parent == Some(pool) || op.source == Some(pool) || op.target == Some(pool)
            })
            .map(|(f, _)| f.clone())
            .collect();
        for file_id in &affected {
            if let Some(op) = inner.index.get_mut(file_id) {
                let was_running = op.state == FileOpState::Running;
                op.cancel();
                if !was_running {
                    self.finalize(&mut inner, file_id, false, false);
                }
            }
        }
        if !affected.is_empty() {
            info!(pool = %pool, canceled = affected.len(), "pool-wide cancellation");
        }
        affected.len()
    }

    /// Cancel every live operation. Used by a strict engine disable.
    pub fn cancel_all(&self) -> usize {
        let mut inner = self.inner.lock();
        let ids: Vec<FileId> = inner
            .index
            .iter()
            .filter(|(_, op)| !op.state.is_terminal())
            .map(|(f, _)| f.clone())
            .collect();
        for file_id in &ids {
            if let Some(op) = inner.index.get_mut(file_id) {
                let was_running = op.state == FileOpState::Running;
                op.cancel();
                if !was_running {
                    self.finalize(&mut inner, file_id, false, false);
                }
            }
        }
        if !ids.is_empty() {
            info!(canceled = ids.len(), "all operations canceled");
        }
        ids.len()
    }

    /// Apply the outcome of a running pass after the per-operation borrow
    /// has been released.
    fn settle(&self, inner: &mut Inner, file_id: &FileId, disposition: Disposition) {
        match disposition {
            Disposition::Requeue(from_scan) => {
                self.release_slot(inner, from_scan);
                inner.queue_for(from_scan).push_front(file_id.clone());
            }
            Disposition::Finish(success) => {
                self.finalize(inner, file_id, success, true);
            }
        }
    }

    /// Remove a finished operation from the table and report to the parent
    /// scan. `held_slot` is true when the caller completes a running pass.
    fn finalize(&self, inner: &mut Inner, file_id: &FileId, success: bool, held_slot: bool) {
        let Some(op) = inner.index.remove(file_id) else {
            return;
        };
        if held_slot {
            self.release_slot(inner, op.from_scan);
        }
        inner.drop_from_queues(file_id);
        inner.history.push_front(OperationOutcome {
            file_id: op.file_id.clone(),
            state: op.state,
            last_action: op.last_action,
            last_failure: op.last_failure,
            finished: Instant::now(),
        });
        inner.history.truncate(HISTORY_CAPACITY);
        if let (Some(parent), Some(pool_ops)) = (op.parent, self.pool_ops.get()) {
            pool_ops.child_completed(parent, success);
        }
    }

    fn release_slot(&self, inner: &mut Inner, from_scan: bool) {
        if from_scan {
            inner.running_bg = inner.running_bg.saturating_sub(1);
        } else {
            inner.running_fg = inner.running_fg.saturating_sub(1);
        }
    }

    // ---- introspection ------------------------------------------------

    pub fn contains(&self, file_id: &FileId) -> bool {
        self.inner.lock().index.contains_key(file_id)
    }

    pub fn operation(&self, file_id: &FileId) -> Option<FileOperation> {
        self.inner.lock().index.get(file_id).cloned()
    }

    pub fn waiting(&self) -> usize {
        let inner = self.inner.lock();
        inner.foreground.len() + inner.background.len()
    }

    pub fn running(&self) -> usize {
        let inner = self.inner.lock();
        inner.running_fg + inner.running_bg
    }

    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().index.is_empty()
    }

    /// Recent terminal operations, newest first.
    pub fn history(&self) -> Vec<OperationOutcome> {
        self.inner.lock().history.iter().cloned().collect()
    }

    /// Recent abandoned operations, newest first.
    pub fn recent_errors(&self) -> Vec<OperationOutcome> {
        self.inner
            .lock()
            .history
            .iter()
            .filter(|o| o.is_error())
            .cloned()
            .collect()
    }

    /// Serialize the live table for crash recovery. Pool indices are
    /// resolved to names; indices are not stable across restarts.
    pub fn checkpoint_records(&self) -> Vec<FileOpRecord> {
        let inner = self.inner.lock();
        let resolve = |p: Option<PoolIndex>| p.and_then(|i| self.topology.pool_name(i));
        let mut records: Vec<FileOpRecord> = inner
            .index
            .values()
            .filter(|op| !op.state.is_terminal())
            .map(|op| FileOpRecord {
                file_id: op.file_id.clone(),
                parent: resolve(op.parent),
                source: resolve(op.source),
                target: resolve(op.target),
                op_count: op.op_count,
                retried: op.retried,
                from_scan: op.from_scan,
            })
            .collect();
        records.sort_by(|a, b| a.file_id.cmp(&b.file_id));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{LiveGroup, LivePool, LiveTopology, LiveUnit};
    use crate::types::PoolStatus;

    fn topology() -> Arc<TopologyMap> {
        let map = TopologyMap::new();
        map.load(&LiveTopology {
            pools: vec![
                LivePool::new("p0", PoolStatus::Enabled),
                LivePool::new("p1", PoolStatus::Enabled),
            ],
            groups: vec![LiveGroup::new("g", true).with_pools(["p0", "p1"])],
            units: vec![LiveUnit::new("sc", 2, vec![])],
        });
        Arc::new(map)
    }

    fn map_with(copy_threads: usize, max_allocation: u8) -> FileOperationMap {
        let config = FileOpConfig {
            copy_threads,
            max_retries: 2,
            sweep_interval: 60,
            max_allocation,
        };
        FileOperationMap::new(topology(), config)
    }

    fn reg(id: &str, from_scan: bool) -> FileOpRegistration {
        FileOpRegistration {
            file_id: FileId::from(id),
            parent: if from_scan { Some(PoolIndex(0)) } else { None },
            group: GroupIndex(0),
            unit: Some(UnitIndex(0)),
            from_scan,
            broken_source: None,
        }
    }

    #[test]
    fn duplicate_registration_merges() {
        let map = map_with(4, 80);
        assert!(map.register(reg("f1", false)).created);
        assert!(!map.register(reg("f1", false)).created);
        assert_eq!(map.len(), 1);
        assert_eq!(map.operation(&FileId::from("f1")).unwrap().op_count, 2);
    }

    #[test]
    fn admission_reports_the_owning_parent() {
        let map = map_with(4, 100);
        let first = map.register(reg("f1", false));
        assert!(first.created);
        assert_eq!(first.parent, None);
        // a merging scan adopts an orphan operation
        let adopted = map.register(reg("f1", true));
        assert!(!adopted.created);
        assert_eq!(adopted.parent, Some(PoolIndex(0)));
        // a second scan merges but does not steal the parent
        let mut other = reg("f1", true);
        other.parent = Some(PoolIndex(1));
        let kept = map.register(other);
        assert!(!kept.created);
        assert_eq!(kept.parent, Some(PoolIndex(0)));
    }

    #[test]
    fn restored_counters_apply_to_the_readmitted_operation() {
        let map = map_with(4, 100);
        map.register(reg("f1", false));
        map.restore_counters(&FileId::from("f1"), 3, 1);
        let op = map.operation(&FileId::from("f1")).unwrap();
        assert_eq!(op.op_count, 3);
        assert_eq!(op.retried, 1);
        // never lowers a count already raised by a merge
        map.restore_counters(&FileId::from("f1"), 1, 0);
        assert_eq!(map.operation(&FileId::from("f1")).unwrap().op_count, 3);
    }

    #[test]
    fn sweep_respects_slot_budget() {
        let map = map_with(2, 100);
        for i in 0..5 {
            map.register(reg(&format!("f{i}"), false));
        }
        let launched = map.sweep();
        assert_eq!(launched.len(), 2);
        assert_eq!(map.running(), 2);
        // no more slots until a completion
        assert!(map.sweep().is_empty());
        map.complete_success(&launched[0].file_id);
        assert_eq!(map.sweep().len(), 1);
    }

    #[test]
    fn minority_queue_is_guaranteed_a_slot() {
        let map = map_with(2, 80);
        // cap = max(1, 2*80/100) = 1 per queue under contention
        for i in 0..3 {
            map.register(reg(&format!("fg{i}"), false));
        }
        map.register(reg("bg0", true));
        let launched = map.sweep();
        assert_eq!(launched.len(), 2);
        let scans: Vec<bool> = launched.iter().map(|o| o.from_scan).collect();
        assert!(scans.contains(&true), "background work must get a slot");
        assert!(scans.contains(&false));
    }

    #[test]
    fn lone_queue_may_use_all_slots() {
        let map = map_with(4, 50);
        for i in 0..6 {
            map.register(reg(&format!("f{i}"), false));
        }
        assert_eq!(map.sweep().len(), 4);
    }

    #[test]
    fn recoverable_failure_requeues_at_head() {
        let map = map_with(1, 100);
        map.register(reg("first", false));
        map.register(reg("second", false));
        let launched = map.sweep();
        assert_eq!(launched[0].file_id, FileId::from("first"));
        map.note_action(
            &FileId::from("first"),
            VerifyResult::Copy,
            Some(PoolIndex(0)),
            Some(PoolIndex(1)),
        );
        map.complete_failure(&FileId::from("first"), FailureKind::Retriable);
        // "first" must run again before "second"
        let launched = map.sweep();
        assert_eq!(launched[0].file_id, FileId::from("first"));
    }

    #[test]
    fn fatal_failure_removes_the_operation() {
        let map = map_with(1, 100);
        map.register(reg("f1", false));
        map.sweep();
        map.complete_failure(&FileId::from("f1"), FailureKind::Fatal);
        assert!(!map.contains(&FileId::from("f1")));
        assert_eq!(map.running(), 0);
    }

    #[test]
    fn success_with_merged_update_runs_again() {
        let map = map_with(1, 100);
        map.register(reg("f1", false));
        map.register(reg("f1", false));
        map.sweep();
        map.complete_success(&FileId::from("f1"));
        assert!(map.contains(&FileId::from("f1")));
        assert_eq!(map.sweep().len(), 1);
        map.complete_success(&FileId::from("f1"));
        assert!(!map.contains(&FileId::from("f1")));
    }

    #[test]
    fn pool_wide_cancellation_hits_parent_source_and_target() {
        let map = map_with(4, 100);
        map.register(reg("scanned", true)); // parent p0
        map.register(reg("live", false));
        map.note_action(
            &FileId::from("live"),
            VerifyResult::Copy,
            Some(PoolIndex(0)),
            Some(PoolIndex(1)),
        );
        let canceled = map.cancel_for_pool(PoolIndex(0));
        assert_eq!(canceled, 2);
        assert!(!map.contains(&FileId::from("scanned")));
        assert!(!map.contains(&FileId::from("live")));
    }

    #[test]
    fn void_on_a_canceled_operation_keeps_the_cancellation() {
        let map = map_with(2, 100);
        map.register(reg("f1", true));
        map.sweep();
        assert!(map.cancel_file(&FileId::from("f1")));
        map.complete_void(&FileId::from("f1"));
        assert!(!map.contains(&FileId::from("f1")));
        assert_eq!(map.running(), 0);
        let history = map.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, FileOpState::Canceled);
    }

    #[test]
    fn history_records_terminal_outcomes() {
        let map = map_with(2, 100);
        map.register(reg("ok", false));
        map.register(reg("bad", false));
        map.sweep();
        map.complete_success(&FileId::from("ok"));
        map.complete_failure(&FileId::from("bad"), FailureKind::Fatal);

        let history = map.history();
        assert_eq!(history.len(), 2);
        assert!(history
            .iter()
            .any(|o| o.file_id == FileId::from("ok") && o.state == FileOpState::Done));
        let errors = map.recent_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].file_id, FileId::from("bad"));
        assert_eq!(errors[0].last_failure, Some(FailureKind::Fatal));
    }

    #[test]
    fn escalation_aborts_once_the_group_is_exhausted() {
        // the topology fixture has two readable pools; ruling both out
        // leaves no viable member
        let map = map_with(2, 100);
        map.register(reg("f1", false));
        map.sweep();
        map.note_action(
            &FileId::from("f1"),
            VerifyResult::Copy,
            Some(PoolIndex(0)),
            Some(PoolIndex(1)),
        );
        map.complete_failure(&FileId::from("f1"), FailureKind::TargetRejected);
        // p1 is ruled out; p0 remains untried, so the operation requeues
        assert!(map.contains(&FileId::from("f1")));

        map.sweep();
        map.note_action(
            &FileId::from("f1"),
            VerifyResult::Copy,
            Some(PoolIndex(1)),
            Some(PoolIndex(0)),
        );
        map.complete_failure(&FileId::from("f1"), FailureKind::TargetRejected);
        assert!(!map.contains(&FileId::from("f1")));
        assert_eq!(map.recent_errors().len(), 1);
    }

    #[test]
    fn checkpoint_records_resolve_names_and_skip_terminal() {
        let map = map_with(4, 100);
        map.register(reg("f1", true));
        map.note_action(
            &FileId::from("f1"),
            VerifyResult::Copy,
            Some(PoolIndex(0)),
            Some(PoolIndex(1)),
        );
        let records = map.checkpoint_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].parent.as_deref(), Some("p0"));
        assert_eq!(records[0].source.as_deref(), Some("p0"));
        assert_eq!(records[0].target.as_deref(), Some("p1"));
        assert!(records[0].from_scan);
    }
}
