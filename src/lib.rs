// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

// Enforce no unwrap/expect/panic in production code only (tests can use them)
#![cfg_attr(not(test), warn(clippy::unwrap_used))]
#![cfg_attr(not(test), warn(clippy::expect_used))]
#![cfg_attr(not(test), warn(clippy::panic))]

//! # Resilience Core
//!
//! A replica-reconciliation engine for clusters of storage pools. The
//! engine watches pool status transitions and file location updates,
//! verifies each affected file against the replica-count and tag-diversity
//! constraints of its storage unit, and issues the minimal corrective
//! action: copy a replica, remove one, or pin a cached copy in place.
//!
//! ## Structure
//!
//! - [`topology`]: pools, pool groups and storage units under stable
//!   integer indices, reconciled against live snapshots
//! - [`selection`]: deterministic source/target/victim choice honoring
//!   exclusive-tag diversity
//! - [`pool_ops`]: per-pool scan state machine, grace periods, watchdog
//! - [`file_ops`]: per-file operation state machine and the
//!   bounded-concurrency scheduler
//! - [`checkpoint`]: crash-recovery snapshots of queued work
//! - [`engine`]: wiring and the background loops
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use resilience_core::{ResilienceConfig, ResilienceEngine, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ResilienceConfig::from_env()?;
//!     let engine = ResilienceEngine::new(config, namespace, pools)?;
//!     engine.reload_topology(&snapshot);
//!     engine.restore().await;
//!     engine.start();
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod file_ops;
pub mod pool_ops;
pub mod selection;
pub mod topology;
pub mod traits;
pub mod types;

pub use config::ResilienceConfig;
pub use engine::ResilienceEngine;
pub use error::{ActionFailure, FailureKind, ResilienceError, Result};
pub use selection::{FreeSpaceStrategy, LocationSelector, SelectionError, SelectionStrategy};
pub use topology::{LiveGroup, LivePool, LiveTopology, LiveUnit, TopologyMap};
pub use traits::{NamespaceAccess, PoolCommands};
pub use types::{FileAttributes, FileId, FileUpdate, MessageType, PoolStateUpdate, PoolStatus};
