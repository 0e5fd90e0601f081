// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! Per-pool scan record and its state machine
//!
//! A pool operation tracks the scan lifecycle of one pool: idle until a
//! status change or the watchdog makes it eligible, waiting through its
//! grace period, then running while its child file operations drain.

use std::time::{Duration, Instant};

use crate::types::{GroupIndex, PoolStatus, UnitIndex};

/// What made the pool eligible for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTrigger {
    /// The pool went down; replicas it held may now be deficient.
    Down,
    /// The pool came (back) up; files it holds may now be redundant.
    Restart,
    /// The watchdog found the pool idle longer than the rescan window.
    Periodic,
    /// Operator request; bypasses grace periods.
    Admin,
}

impl ScanTrigger {
    pub fn bypasses_grace(self) -> bool {
        matches!(self, ScanTrigger::Periodic | ScanTrigger::Admin)
    }
}

/// Scan lifecycle of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOpState {
    /// Nothing pending.
    Idle,
    /// Scan pending, possibly sitting out a grace period.
    Waiting,
    /// Enumeration or child operations in flight.
    Running,
    /// Enumeration failed; left for the watchdog or an operator.
    Failed,
    /// Scan canceled by an operator or a conflicting status change.
    Canceled,
    /// Excluded from all scan activity by an operator.
    Excluded,
}

#[derive(Debug, Clone)]
pub struct PoolOperation {
    pub state: PoolOpState,
    pub current_status: PoolStatus,
    pub previous_status: PoolStatus,
    /// When the triggering status change (or watchdog decision) happened;
    /// grace periods count from here.
    pub last_update: Instant,
    /// Completion time of the last finished scan.
    pub last_scan: Option<Instant>,
    pub trigger: Option<ScanTrigger>,
    /// Scan restrictions carried from the triggering update.
    pub group: Option<GroupIndex>,
    pub unit: Option<UnitIndex>,
    /// Child accounting. `children_total` is set once enumeration is done;
    /// the scan completes when `children_done` catches up.
    pub children_total: Option<usize>,
    pub children_done: usize,
    pub children_failed: usize,
}

impl PoolOperation {
    pub fn new() -> Self {
        Self {
            state: PoolOpState::Idle,
            current_status: PoolStatus::Uninitialized,
            previous_status: PoolStatus::Uninitialized,
            last_update: Instant::now(),
            last_scan: None,
            trigger: None,
            group: None,
            unit: None,
            children_total: None,
            children_done: 0,
            children_failed: 0,
        }
    }

    /// Record a status transition and decide whether a scan is now pending.
    ///
    /// DOWN schedules a down scan; a readable status after a prior DOWN
    /// schedules a restart scan. Read-only flips and the first observed
    /// baseline need no scan; a never-scanned pool is picked up by the
    /// watchdog.
    pub fn status_changed(
        &mut self,
        status: PoolStatus,
        group: Option<GroupIndex>,
        unit: Option<UnitIndex>,
    ) {
        self.previous_status = self.current_status;
        self.current_status = status;
        self.last_update = Instant::now();
        if self.state == PoolOpState::Excluded {
            return;
        }
        let trigger = if status.is_down() {
            ScanTrigger::Down
        } else if status.is_readable() && self.previous_status.is_down() {
            ScanTrigger::Restart
        } else {
            return;
        };
        self.trigger = Some(trigger);
        self.group = group;
        self.unit = unit;
        self.state = PoolOpState::Waiting;
    }

    /// A DOWN pool already scanned as down needs no repeat scan; replicas
    /// it held were handled the first time.
    pub fn is_redundant_down_scan(&self) -> bool {
        self.current_status.is_down() && self.previous_status.is_down()
    }

    /// Whether the grace period for the pending trigger has elapsed.
    pub fn grace_elapsed(&self, down_grace: Duration, restart_grace: Duration) -> bool {
        let trigger = match self.trigger {
            Some(t) => t,
            None => return true,
        };
        if trigger.bypasses_grace() {
            return true;
        }
        let grace = match trigger {
            ScanTrigger::Down => down_grace,
            _ => restart_grace,
        };
        self.last_update.elapsed() >= grace
    }

    /// Watchdog eligibility: idle, readable and not scanned within the
    /// window.
    pub fn rescan_due(&self, window: Duration) -> bool {
        if self.state != PoolOpState::Idle || !self.current_status.is_readable() {
            return false;
        }
        match self.last_scan {
            Some(at) => at.elapsed() >= window,
            // a pool never scanned is always due
            None => true,
        }
    }

    pub fn begin_scan(&mut self) {
        self.state = PoolOpState::Running;
        self.children_total = None;
        self.children_done = 0;
        self.children_failed = 0;
    }

    /// True once enumeration is done and every child has reported.
    pub fn children_drained(&self) -> bool {
        matches!(self.children_total, Some(total) if self.children_done >= total)
    }

    pub fn finish_scan(&mut self) {
        self.state = PoolOpState::Idle;
        self.last_scan = Some(Instant::now());
        self.trigger = None;
        self.group = None;
        self.unit = None;
    }
}

impl Default for PoolOperation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn down_transition_marks_waiting() {
        let mut op = PoolOperation::new();
        op.status_changed(PoolStatus::Down, None, None);
        assert_eq!(op.state, PoolOpState::Waiting);
        assert_eq!(op.trigger, Some(ScanTrigger::Down));
        assert!(!op.is_redundant_down_scan());
    }

    #[test]
    fn second_down_is_redundant() {
        let mut op = PoolOperation::new();
        op.status_changed(PoolStatus::Down, None, None);
        op.status_changed(PoolStatus::Down, None, None);
        assert!(op.is_redundant_down_scan());
    }

    #[test]
    fn read_only_flip_needs_no_scan() {
        let mut op = PoolOperation::new();
        op.current_status = PoolStatus::Enabled;
        op.status_changed(PoolStatus::ReadOnly, None, None);
        assert_eq!(op.state, PoolOpState::Idle);
        assert_eq!(op.trigger, None);
    }

    #[test]
    fn restart_after_down_marks_waiting() {
        let mut op = PoolOperation::new();
        op.status_changed(PoolStatus::Down, None, None);
        op.status_changed(PoolStatus::Enabled, None, None);
        assert_eq!(op.state, PoolOpState::Waiting);
        assert_eq!(op.trigger, Some(ScanTrigger::Restart));
    }

    #[test]
    fn initial_enabled_baseline_is_silent() {
        let mut op = PoolOperation::new();
        op.status_changed(PoolStatus::Enabled, None, None);
        assert_eq!(op.state, PoolOpState::Idle);
        assert_eq!(op.trigger, None);
    }

    #[test]
    fn excluded_pool_ignores_status_changes() {
        let mut op = PoolOperation::new();
        op.state = PoolOpState::Excluded;
        op.status_changed(PoolStatus::Down, None, None);
        assert_eq!(op.state, PoolOpState::Excluded);
        // the status itself is still tracked
        assert_eq!(op.current_status, PoolStatus::Down);
    }

    #[test]
    fn grace_applies_only_to_status_triggers() {
        let mut op = PoolOperation::new();
        op.status_changed(PoolStatus::Down, None, None);
        let hour = Duration::from_secs(3600);
        assert!(!op.grace_elapsed(hour, hour));
        op.trigger = Some(ScanTrigger::Admin);
        assert!(op.grace_elapsed(hour, hour));
        op.trigger = Some(ScanTrigger::Periodic);
        assert!(op.grace_elapsed(hour, hour));
    }

    #[test]
    fn never_scanned_readable_pool_is_due() {
        let mut op = PoolOperation::new();
        op.current_status = PoolStatus::Enabled;
        assert!(op.rescan_due(Duration::from_secs(86400)));
        op.finish_scan();
        assert!(!op.rescan_due(Duration::from_secs(86400)));
    }

    #[test]
    fn child_accounting_completes_the_scan() {
        let mut op = PoolOperation::new();
        op.begin_scan();
        assert!(!op.children_drained());
        op.children_total = Some(2);
        op.children_done = 1;
        assert!(!op.children_drained());
        op.children_done = 2;
        assert!(op.children_drained());
    }
}
