// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! Pool-level scan scheduling and execution.

pub mod handler;
pub mod map;
pub mod operation;

pub use handler::PoolScanHandler;
pub use map::{PoolOperationMap, ScanRequest};
pub use operation::{PoolOpState, PoolOperation, ScanTrigger};
