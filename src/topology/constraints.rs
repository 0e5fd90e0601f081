// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! Storage-unit placement constraints

use serde::{Deserialize, Serialize};

/// Placement policy of one storage unit.
///
/// `required` is the target replica count. `one_copy_per` lists pool tags
/// (e.g. `hostname`, `rack`) whose values must differ across all replicas
/// of one file, when enough distinct values exist among the candidate
/// pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUnitConstraints {
    pub required: usize,
    pub one_copy_per: Vec<String>,
}

impl StorageUnitConstraints {
    pub fn new(required: usize, one_copy_per: Vec<String>) -> Self {
        Self {
            required,
            one_copy_per,
        }
    }

    /// A unit requiring a single copy with no tag constraints is outside
    /// the engine's remit entirely.
    pub fn is_resilient(&self) -> bool {
        self.required > 1 || !self.one_copy_per.is_empty()
    }
}

impl Default for StorageUnitConstraints {
    /// The "invisible" policy: one copy, no constraints. Used when a unit
    /// has lost its explicit constraints (e.g. after a configuration
    /// change), so that no action is ever taken for its files.
    fn default() -> Self {
        Self {
            required: 1,
            one_copy_per: Vec::new(),
        }
    }
}
