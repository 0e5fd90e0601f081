// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! Per-file operation record and its state machine
//!
//! At most one operation exists per file at any time. Concurrent updates
//! for the same file merge into the live operation by incrementing its
//! pass count, so a single record can drive several verification passes
//! back to back (e.g. an eviction followed by a re-copy).

use std::collections::BTreeSet;
use std::time::Instant;

use crate::error::FailureKind;
use crate::types::{FileId, GroupIndex, PoolIndex, UnitIndex, VerifyResult};

/// Lifecycle of a file operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpState {
    /// Queued, not yet picked up by the consumer.
    Waiting,
    /// A verification pass (and possibly a pool action) is in flight.
    Running,
    /// All passes finished successfully.
    Done,
    /// Abandoned after a fatal failure or exhausted alternatives.
    Failed,
    /// Removed by an operator or a pool-wide cancellation.
    Canceled,
}

impl FileOpState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FileOpState::Done | FileOpState::Failed | FileOpState::Canceled
        )
    }
}

/// One live operation. Pools are held as stable topology indices; names are
/// resolved only at dispatch and checkpoint time.
#[derive(Debug, Clone)]
pub struct FileOperation {
    pub file_id: FileId,
    pub state: FileOpState,
    /// Pool whose scan created this operation, if any. Completion is
    /// reported back to that pool's scan accounting.
    pub parent: Option<PoolIndex>,
    /// Resilient group governing placement.
    pub group: GroupIndex,
    /// Storage unit of the file, when its storage class maps to one.
    pub unit: Option<UnitIndex>,
    /// Source/target chosen by the last verification pass.
    pub source: Option<PoolIndex>,
    pub target: Option<PoolIndex>,
    /// Pools ruled out for this operation (failed sources and targets).
    pub tried: BTreeSet<PoolIndex>,
    /// Outstanding verification passes. Starts at 1; merged updates and
    /// two-phase corrections increment it.
    pub op_count: u32,
    /// Same-pair retries consumed by retriable failures.
    pub retried: u32,
    /// Action decided by the last verification pass.
    pub last_action: Option<VerifyResult>,
    /// Classification of the last failure, for diagnostics.
    pub last_failure: Option<FailureKind>,
    /// True when the triggering update came from a pool scan; decides the
    /// background queue.
    pub from_scan: bool,
    pub created: Instant,
    pub updated: Instant,
}

impl FileOperation {
    pub fn new(
        file_id: FileId,
        parent: Option<PoolIndex>,
        group: GroupIndex,
        unit: Option<UnitIndex>,
        from_scan: bool,
    ) -> Self {
        let now = Instant::now();
        Self {
            file_id,
            state: FileOpState::Waiting,
            parent,
            group,
            unit,
            source: None,
            target: None,
            tried: BTreeSet::new(),
            op_count: 1,
            retried: 0,
            last_action: None,
            last_failure: None,
            from_scan,
            created: now,
            updated: now,
        }
    }

    /// Merge a concurrent update into this live operation.
    pub fn absorb_update(&mut self, parent: Option<PoolIndex>) {
        self.op_count += 1;
        // a scan update adopts the operation so the scan waits for it
        if self.parent.is_none() {
            self.parent = parent;
        }
        self.updated = Instant::now();
    }

    /// Record the decision of a verification pass.
    pub fn note_action(
        &mut self,
        action: VerifyResult,
        source: Option<PoolIndex>,
        target: Option<PoolIndex>,
    ) {
        self.last_action = Some(action);
        self.source = source;
        self.target = target;
        self.updated = Instant::now();
    }

    /// One pass finished successfully; returns true when passes remain and
    /// the operation should requeue for another verification.
    pub fn pass_succeeded(&mut self) -> bool {
        self.op_count = self.op_count.saturating_sub(1);
        self.retried = 0;
        self.last_failure = None;
        self.updated = Instant::now();
        if self.op_count > 0 {
            self.state = FileOpState::Waiting;
            true
        } else {
            self.state = FileOpState::Done;
            false
        }
    }

    /// Route a failed pass. Returns true when the operation should requeue
    /// (at the head of its queue), false when it is abandoned.
    ///
    /// `max_retries` bounds same-pair retries; once exhausted, a retriable
    /// failure escalates to a new-target attempt.
    pub fn pass_failed(&mut self, kind: FailureKind, max_retries: u32) -> bool {
        self.last_failure = Some(kind);
        self.updated = Instant::now();
        match kind {
            FailureKind::Fatal => {
                self.state = FileOpState::Failed;
                false
            }
            FailureKind::SourceBroken | FailureKind::SourcePoolFailed => {
                if let Some(source) = self.source.take() {
                    self.tried.insert(source);
                }
                self.retried = 0;
                self.state = FileOpState::Waiting;
                true
            }
            FailureKind::TargetRejected => {
                if let Some(target) = self.target.take() {
                    self.tried.insert(target);
                }
                self.retried = 0;
                self.state = FileOpState::Waiting;
                true
            }
            FailureKind::Retriable => {
                if self.retried < max_retries {
                    self.retried += 1;
                    self.state = FileOpState::Waiting;
                    true
                } else {
                    // budget exhausted; rule out the target and start over
                    if let Some(target) = self.target.take() {
                        self.tried.insert(target);
                    }
                    self.retried = 0;
                    self.state = FileOpState::Waiting;
                    true
                }
            }
        }
    }

    pub fn cancel(&mut self) {
        self.state = FileOpState::Canceled;
        self.updated = Instant::now();
    }

    /// Abandon after selection found no legal alternative.
    pub fn abandon(&mut self) {
        self.state = FileOpState::Failed;
        self.updated = Instant::now();
    }
}
