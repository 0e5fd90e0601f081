// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! # Resilience Engine
//!
//! Wires the topology map, the two operation maps and their handlers, and
//! drives them with three background loops: the pool sweep (scheduler plus
//! watchdog), the file sweep (consumer), and the checkpointer. External
//! feeds push pool status transitions and file location updates through
//! `handle_pool_status` and `handle_file_update`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::checkpoint;
use crate::config::ResilienceConfig;
use crate::error::{ResilienceError, Result};
use crate::file_ops::{FileOperationHandler, FileOperationMap};
use crate::pool_ops::{PoolOperationMap, PoolScanHandler};
use crate::topology::{LiveTopology, TopologyMap};
use crate::traits::{NamespaceAccess, PoolCommands};
use crate::types::{FileUpdate, MessageType, PoolStateUpdate};

pub struct ResilienceEngine {
    config: ResilienceConfig,
    namespace: Arc<dyn NamespaceAccess>,
    topology: Arc<TopologyMap>,
    pool_ops: Arc<PoolOperationMap>,
    file_ops: Arc<FileOperationMap>,
    file_handler: Arc<FileOperationHandler>,
    scan_handler: Arc<PoolScanHandler>,
    enabled: AtomicBool,
    shutdown: CancellationToken,
}

impl ResilienceEngine {
    pub fn new(
        config: ResilienceConfig,
        namespace: Arc<dyn NamespaceAccess>,
        pools: Arc<dyn PoolCommands>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let topology = Arc::new(TopologyMap::new());
        let file_ops = Arc::new(FileOperationMap::new(topology.clone(), config.files.clone()));
        let pool_ops = Arc::new(PoolOperationMap::new(topology.clone(), &config.pools));
        file_ops.set_pool_ops(pool_ops.clone());
        pool_ops.set_file_ops(file_ops.clone());

        let file_handler = Arc::new(FileOperationHandler::new(
            topology.clone(),
            namespace.clone(),
            pools,
            file_ops.clone(),
        ));
        let scan_handler = Arc::new(PoolScanHandler::new(
            namespace.clone(),
            file_ops.clone(),
            pool_ops.clone(),
        ));

        Ok(Arc::new(Self {
            config,
            namespace,
            topology,
            pool_ops,
            file_ops,
            file_handler,
            scan_handler,
            enabled: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
        }))
    }

    pub fn topology(&self) -> &Arc<TopologyMap> {
        &self.topology
    }

    pub fn pool_operations(&self) -> &Arc<PoolOperationMap> {
        &self.pool_ops
    }

    pub fn file_operations(&self) -> &Arc<FileOperationMap> {
        &self.file_ops
    }

    // ---- external feeds ----------------------------------------------

    /// Reconcile against a live topology snapshot. New resilient pools
    /// are tracked, removed pools dropped, and implied status transitions
    /// forwarded to the scan scheduler.
    pub fn reload_topology(&self, live: &LiveTopology) {
        let diff = self.topology.compare(live);
        let removed = diff.removed_pools.clone();
        let updates = self.topology.apply(diff);
        for pool in &removed {
            self.pool_ops.remove_pool(pool);
        }
        for pool in self.topology.resilient_pools() {
            self.pool_ops.ensure_pool(&pool);
        }
        for update in &updates {
            self.pool_ops.update(update);
        }
        info!(
            pools = self.pool_ops.len(),
            transitions = updates.len(),
            "topology reloaded"
        );
    }

    /// Ingest one pool status transition from the live feed.
    pub fn handle_pool_status(&self, update: PoolStateUpdate) {
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }
        self.topology.update_pool_status(&update.pool, update.status);
        self.pool_ops.update(&update);
    }

    /// Ingest one file location update. Returns true when a new operation
    /// was created.
    pub async fn handle_file_update(&self, update: FileUpdate) -> Result<bool> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Err(ResilienceError::Disabled);
        }
        self.file_handler.handle_update(update).await
    }

    /// Request an immediate scan of one pool, bypassing grace periods.
    pub fn request_scan(&self, pool: &str) -> Result<()> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Err(ResilienceError::Disabled);
        }
        self.pool_ops.scan(pool)
    }

    // ---- lifecycle ----------------------------------------------------

    /// Spawn the background loops. Call once; loops stop on `shutdown`.
    pub fn start(self: &Arc<Self>) {
        self.spawn_pool_loop();
        self.spawn_file_loop();
        if self.config.checkpoint.enabled {
            self.spawn_checkpoint_loop();
        }
        info!("resilience engine started");
    }

    fn spawn_pool_loop(self: &Arc<Self>) {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(engine.config.pool_sweep_interval());
            loop {
                tokio::select! {
                    _ = engine.shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if !engine.enabled.load(Ordering::SeqCst) {
                    continue;
                }
                for req in engine.pool_ops.sweep() {
                    let handler = engine.scan_handler.clone();
                    tokio::spawn(async move {
                        handler.scan(req).await;
                    });
                }
            }
            debug!("pool sweep loop stopped");
        });
    }

    fn spawn_file_loop(self: &Arc<Self>) {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(engine.config.file_sweep_interval());
            loop {
                tokio::select! {
                    _ = engine.shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                    _ = engine.file_ops.notified() => {}
                }
                if !engine.enabled.load(Ordering::SeqCst) {
                    continue;
                }
                for op in engine.file_ops.sweep() {
                    let handler = engine.file_handler.clone();
                    tokio::spawn(async move {
                        handler.run_pass(op).await;
                    });
                }
            }
            debug!("file sweep loop stopped");
        });
    }

    fn spawn_checkpoint_loop(self: &Arc<Self>) {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(engine.config.checkpoint_interval());
            // the first tick fires immediately; skip it
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = engine.shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(e) = engine.checkpoint_now() {
                    error!(error = %e, "checkpoint write failed");
                }
            }
            debug!("checkpoint loop stopped");
        });
    }

    /// Drive all pending work to completion inline, without the background
    /// loops. Used by tests and by controlled shutdown drains. Grace
    /// periods still apply; work sitting one out is not forced.
    pub async fn drain(&self) {
        loop {
            let mut progress = false;
            for req in self.pool_ops.sweep() {
                progress = true;
                self.scan_handler.scan(req).await;
            }
            for op in self.file_ops.sweep() {
                progress = true;
                self.file_handler.run_pass(op).await;
            }
            if !progress {
                break;
            }
        }
    }

    /// Write the checkpoint and the excluded-pool sidecar now.
    pub fn checkpoint_now(&self) -> Result<()> {
        let records = self.file_ops.checkpoint_records();
        checkpoint::save(&self.config.checkpoint.path, &records)?;
        checkpoint::save_excluded(
            &self.config.excluded_pools_path(),
            &self.pool_ops.excluded_pools(),
        )?;
        Ok(())
    }

    /// Recover state written before a restart: reinstate exclusions and
    /// re-admit every checkpointed operation as a fresh update, to be
    /// re-verified against the namespace.
    pub async fn restore(&self) {
        let excluded = checkpoint::load_excluded(&self.config.excluded_pools_path());
        if !excluded.is_empty() {
            self.pool_ops.restore_excluded(&excluded);
        }
        let records = checkpoint::load(&self.config.checkpoint.path);
        let mut admitted = 0usize;
        for record in records {
            // a record without a recorded pool is located via the namespace
            let pool = match record.parent.clone().or_else(|| record.source.clone()) {
                Some(pool) => Some(pool),
                None => match self.namespace.required_attributes(&record.file_id).await {
                    Ok(Some(attrs)) => attrs
                        .locations
                        .first()
                        .or_else(|| attrs.cached_locations.first())
                        .cloned(),
                    _ => None,
                },
            };
            let Some(pool) = pool else {
                continue;
            };
            let file_id = record.file_id.clone();
            let mut update =
                FileUpdate::new(record.file_id, pool, MessageType::AddCacheLocation);
            update.from_scan = record.from_scan;
            match self.file_handler.handle_update(update).await {
                Ok(created) => {
                    // carry the recorded pass and retry counts across the
                    // restart
                    self.file_ops
                        .restore_counters(&file_id, record.op_count, record.retried);
                    if created {
                        admitted += 1;
                    }
                }
                Err(e) => warn!(error = %e, "checkpointed operation not re-admitted"),
            }
        }
        info!(admitted, excluded = excluded.len(), "recovery complete");
    }

    /// Stop accepting new work. With `strict`, cancel everything in
    /// flight as well.
    pub fn disable(&self, strict: bool) {
        self.enabled.store(false, Ordering::SeqCst);
        if strict {
            self.file_ops.cancel_all();
        }
        info!(strict, "engine disabled");
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
        info!("engine enabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Stop the background loops. A final checkpoint is written so queued
    /// work survives the restart.
    pub fn stop(&self) {
        if self.config.checkpoint.enabled {
            if let Err(e) = self.checkpoint_now() {
                error!(error = %e, "final checkpoint failed");
            }
        }
        self.shutdown.cancel();
        info!("resilience engine stopped");
    }
}
