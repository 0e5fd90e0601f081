// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! End-to-end tests of the engine against a scripted in-memory cluster.
//!
//! The mock namespace and pool command implementations share one cluster
//! state, so a dispatched copy/remove/pin is visible to the next
//! verification pass exactly as it would be in a live system.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use resilience_core::error::ActionFailure;
use resilience_core::file_ops::FileOpState;
use resilience_core::pool_ops::PoolOpState;
use resilience_core::topology::{LiveGroup, LivePool, LiveTopology, LiveUnit};
use resilience_core::{
    FailureKind, FileAttributes, FileId, FileUpdate, MessageType, NamespaceAccess, PoolCommands,
    PoolStateUpdate, PoolStatus, ResilienceConfig, ResilienceEngine, ResilienceError,
};

#[derive(Default)]
struct ClusterState {
    files: HashMap<FileId, FileAttributes>,
    actions: Vec<String>,
    /// Scripted failures per target/victim pool, consumed in order.
    failures: HashMap<String, VecDeque<ActionFailure>>,
}

#[derive(Clone, Default)]
struct MockCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MockCluster {
    fn put_file(&self, id: &str, storage_class: &str, locations: &[&str], cached: &[&str]) {
        let attrs = FileAttributes::new(storage_class)
            .with_locations(locations.iter().map(|s| s.to_string()).collect())
            .with_cached(cached.iter().map(|s| s.to_string()).collect());
        self.state.lock().files.insert(FileId::from(id), attrs);
    }

    fn fail_next(&self, pool: &str, kind: FailureKind) {
        self.state
            .lock()
            .failures
            .entry(pool.to_string())
            .or_default()
            .push_back(ActionFailure::new(kind, "scripted"));
    }

    fn actions(&self) -> Vec<String> {
        self.state.lock().actions.clone()
    }

    fn locations_of(&self, id: &str) -> Vec<String> {
        let mut locations = self
            .state
            .lock()
            .files
            .get(&FileId::from(id))
            .map(|a| a.locations.clone())
            .unwrap_or_default();
        locations.sort();
        locations
    }

    fn take_failure(&self, pool: &str) -> Option<ActionFailure> {
        self.state
            .lock()
            .failures
            .get_mut(pool)
            .and_then(|q| q.pop_front())
    }
}

#[async_trait]
impl NamespaceAccess for MockCluster {
    async fn required_attributes(
        &self,
        file_id: &FileId,
    ) -> resilience_core::Result<Option<FileAttributes>> {
        Ok(self.state.lock().files.get(file_id).cloned())
    }

    async fn files_on_pool(&self, pool: &str) -> resilience_core::Result<Vec<FileId>> {
        let state = self.state.lock();
        let mut files: Vec<FileId> = state
            .files
            .iter()
            .filter(|(_, attrs)| {
                attrs.locations.iter().any(|l| l == pool)
                    || attrs.cached_locations.iter().any(|l| l == pool)
            })
            .map(|(id, _)| id.clone())
            .collect();
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl PoolCommands for MockCluster {
    async fn copy(
        &self,
        file_id: &FileId,
        source: &str,
        target: &str,
    ) -> Result<(), ActionFailure> {
        if let Some(failure) = self.take_failure(target) {
            return Err(failure);
        }
        let mut state = self.state.lock();
        state.actions.push(format!("copy {source}->{target}"));
        if let Some(attrs) = state.files.get_mut(file_id) {
            attrs.locations.push(target.to_string());
        }
        Ok(())
    }

    async fn remove(&self, file_id: &FileId, pool: &str) -> Result<(), ActionFailure> {
        if let Some(failure) = self.take_failure(pool) {
            return Err(failure);
        }
        let mut state = self.state.lock();
        state.actions.push(format!("remove {pool}"));
        if let Some(attrs) = state.files.get_mut(file_id) {
            attrs.locations.retain(|l| l != pool);
            attrs.cached_locations.retain(|l| l != pool);
        }
        Ok(())
    }

    async fn set_sticky(&self, file_id: &FileId, pool: &str) -> Result<(), ActionFailure> {
        if let Some(failure) = self.take_failure(pool) {
            return Err(failure);
        }
        let mut state = self.state.lock();
        state.actions.push(format!("pin {pool}"));
        if let Some(attrs) = state.files.get_mut(file_id) {
            attrs.cached_locations.retain(|l| l != pool);
            attrs.locations.push(pool.to_string());
        }
        Ok(())
    }
}

/// Three enabled pools on distinct hosts, one resilient group, one unit
/// requiring two host-diverse copies, plus a pool outside any resilient
/// group.
fn snapshot() -> LiveTopology {
    LiveTopology {
        pools: vec![
            LivePool::new("p0", PoolStatus::Enabled)
                .with_tag("hostname", "h0")
                .with_cost(3000, 0),
            LivePool::new("p1", PoolStatus::Enabled)
                .with_tag("hostname", "h1")
                .with_cost(2000, 0),
            LivePool::new("p2", PoolStatus::Enabled)
                .with_tag("hostname", "h2")
                .with_cost(1000, 0),
            LivePool::new("outsider", PoolStatus::Enabled),
        ],
        groups: vec![
            LiveGroup::new("resilient", true)
                .with_pools(["p0", "p1", "p2"])
                .with_units(["tape:exp@osm"]),
            LiveGroup::new("plain", false).with_pools(["outsider"]),
        ],
        units: vec![LiveUnit::new("tape:exp@osm", 2, vec!["hostname".into()])],
    }
}

fn test_config(dir: &tempfile::TempDir) -> ResilienceConfig {
    let mut config = ResilienceConfig::default();
    config.pools.down_grace_period = 0;
    config.pools.restart_grace_period = 0;
    config.checkpoint.path = dir.path().join("ops.ckpt");
    config
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn engine_with(cluster: &MockCluster, dir: &tempfile::TempDir) -> Arc<ResilienceEngine> {
    init_tracing();
    let engine = ResilienceEngine::new(
        test_config(dir),
        Arc::new(cluster.clone()),
        Arc::new(cluster.clone()),
    )
    .unwrap();
    engine.reload_topology(&snapshot());
    engine
}

async fn admit(engine: &ResilienceEngine, id: &str, pool: &str) -> bool {
    engine
        .handle_file_update(FileUpdate::new(
            FileId::from(id),
            pool,
            MessageType::AddCacheLocation,
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn deficient_file_is_copied_to_a_diverse_pool() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    cluster.put_file("f1", "tape:exp@osm", &["p0"], &[]);
    let engine = engine_with(&cluster, &dir);

    assert!(admit(&engine, "f1", "p0").await);
    engine.drain().await;

    assert_eq!(cluster.locations_of("f1").len(), 2);
    assert!(cluster
        .actions()
        .iter()
        .any(|a| a.starts_with("copy p0->")));
    assert!(engine.file_operations().is_empty());
}

#[tokio::test]
async fn redundant_replica_is_removed() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    cluster.put_file("f1", "tape:exp@osm", &["p0", "p1", "p2"], &[]);
    let engine = engine_with(&cluster, &dir);

    assert!(admit(&engine, "f1", "p0").await);
    engine.drain().await;

    assert_eq!(cluster.locations_of("f1").len(), 2);
    assert_eq!(
        cluster
            .actions()
            .iter()
            .filter(|a| a.starts_with("remove"))
            .count(),
        1
    );
}

#[tokio::test]
async fn compliant_file_needs_nothing() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    cluster.put_file("f1", "tape:exp@osm", &["p0", "p1"], &[]);
    let engine = engine_with(&cluster, &dir);

    assert!(admit(&engine, "f1", "p0").await);
    engine.drain().await;

    assert!(cluster.actions().is_empty());
    assert!(engine.file_operations().is_empty());
}

#[tokio::test]
async fn update_for_non_resilient_pool_is_dropped() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    cluster.put_file("f1", "tape:exp@osm", &["outsider"], &[]);
    let engine = engine_with(&cluster, &dir);

    assert!(!admit(&engine, "f1", "outsider").await);
    assert!(engine.file_operations().is_empty());
}

#[tokio::test]
async fn update_for_non_resilient_storage_class_is_dropped() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    cluster.put_file("f1", "disk:other@osm", &["p0"], &[]);
    let engine = engine_with(&cluster, &dir);

    // unknown unit falls back to the single-copy policy
    assert!(!admit(&engine, "f1", "p0").await);
    assert!(engine.file_operations().is_empty());
}

#[tokio::test]
async fn clear_leaving_no_locations_is_dropped() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    // the last replica was just cleared; nothing remains to reconcile
    cluster.put_file("f1", "tape:exp@osm", &[], &[]);
    let engine = engine_with(&cluster, &dir);

    let created = engine
        .handle_file_update(FileUpdate::new(
            FileId::from("f1"),
            "p0",
            MessageType::ClearCacheLocation,
        ))
        .await
        .unwrap();
    assert!(!created);
    assert!(engine.file_operations().is_empty());
}

#[tokio::test]
async fn cached_replica_is_pinned_instead_of_copied() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    cluster.put_file("f1", "tape:exp@osm", &["p0"], &["p1"]);
    let engine = engine_with(&cluster, &dir);

    assert!(admit(&engine, "f1", "p0").await);
    engine.drain().await;

    let actions = cluster.actions();
    assert_eq!(actions, vec!["pin p1".to_string()]);
    assert_eq!(cluster.locations_of("f1"), vec!["p0", "p1"]);
}

#[tokio::test]
async fn tag_violation_is_fixed_by_evict_and_recopy() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    let engine = {
        // p0 and p1 share a host for this test
        let mut live = snapshot();
        live.pools[1] = LivePool::new("p1", PoolStatus::Enabled)
            .with_tag("hostname", "h0")
            .with_cost(2000, 0);
        let engine = ResilienceEngine::new(
            test_config(&dir),
            Arc::new(cluster.clone()),
            Arc::new(cluster.clone()),
        )
        .unwrap();
        engine.reload_topology(&live);
        engine
    };
    cluster.put_file("f1", "tape:exp@osm", &["p0", "p1"], &[]);

    assert!(admit(&engine, "f1", "p0").await);
    engine.drain().await;

    let actions = cluster.actions();
    assert_eq!(
        actions
            .iter()
            .filter(|a| a.starts_with("remove"))
            .count(),
        1
    );
    assert!(actions.iter().any(|a| a.ends_with("->p2")));
    let locations = cluster.locations_of("f1");
    assert_eq!(locations.len(), 2);
    assert!(locations.contains(&"p2".to_string()));
}

#[tokio::test]
async fn retriable_failures_exhaust_budget_then_switch_target() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    cluster.put_file("f1", "tape:exp@osm", &["p2"], &[]);
    let engine = engine_with(&cluster, &dir);

    // first choice is p0 (most free space, host-diverse); fail it three
    // times: initial attempt plus max_retries=2, then a new target
    cluster.fail_next("p0", FailureKind::Retriable);
    cluster.fail_next("p0", FailureKind::Retriable);
    cluster.fail_next("p0", FailureKind::Retriable);

    assert!(admit(&engine, "f1", "p2").await);
    engine.drain().await;

    assert!(cluster.actions().iter().any(|a| a.ends_with("->p1")));
    assert_eq!(cluster.locations_of("f1").len(), 2);
    assert!(engine.file_operations().is_empty());
}

#[tokio::test]
async fn broken_source_switches_to_another_replica() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    // three copies required for this file; two exist, p0 will refuse to
    // serve as a source
    let mut live = snapshot();
    live.units[0] = LiveUnit::new("tape:exp@osm", 3, vec![]);
    let engine = ResilienceEngine::new(
        test_config(&dir),
        Arc::new(cluster.clone()),
        Arc::new(cluster.clone()),
    )
    .unwrap();
    engine.reload_topology(&live);
    cluster.put_file("f1", "tape:exp@osm", &["p0", "p1"], &[]);

    cluster.fail_next("p2", FailureKind::SourceBroken);

    assert!(admit(&engine, "f1", "p0").await);
    engine.drain().await;

    // the first attempt used p0 as source (more free space); after the
    // broken-source failure the copy succeeded from p1
    let copies: Vec<String> = cluster
        .actions()
        .iter()
        .filter(|a| a.starts_with("copy"))
        .cloned()
        .collect();
    assert_eq!(copies.last().unwrap(), "copy p1->p2");
    assert_eq!(cluster.locations_of("f1").len(), 3);
}

#[tokio::test]
async fn no_viable_target_abandons_the_operation() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    let mut live = snapshot();
    live.units[0] = LiveUnit::new("tape:exp@osm", 4, vec![]);
    let engine = ResilienceEngine::new(
        test_config(&dir),
        Arc::new(cluster.clone()),
        Arc::new(cluster.clone()),
    )
    .unwrap();
    engine.reload_topology(&live);
    // every group member already holds a copy; a fourth is impossible
    cluster.put_file("f1", "tape:exp@osm", &["p0", "p1", "p2"], &[]);

    assert!(admit(&engine, "f1", "p0").await);
    engine.drain().await;

    assert!(cluster.actions().is_empty());
    assert!(engine.file_operations().is_empty());
}

#[tokio::test]
async fn corrupt_replica_does_not_count_and_is_replaced() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    cluster.put_file("f1", "tape:exp@osm", &["p0", "p1"], &[]);
    let engine = engine_with(&cluster, &dir);

    let created = engine
        .handle_file_update(FileUpdate::new(
            FileId::from("f1"),
            "p0",
            MessageType::CorruptFile,
        ))
        .await
        .unwrap();
    assert!(created);
    engine.drain().await;

    // p0's replica is written off; the copy came from p1 onto p2
    assert!(cluster.actions().iter().any(|a| a == "copy p1->p2"));
}

#[tokio::test]
async fn down_pool_scan_replicates_its_files() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    cluster.put_file("f1", "tape:exp@osm", &["p0", "p1"], &[]);
    let engine = engine_with(&cluster, &dir);
    // settle the initial periodic scans first
    engine.drain().await;
    let before = cluster.actions().len();

    engine.handle_pool_status(PoolStateUpdate::new("p0", PoolStatus::Down));
    engine.drain().await;

    let actions = cluster.actions()[before..].to_vec();
    assert!(actions.iter().any(|a| a.starts_with("copy p1->")));
    assert_eq!(cluster.locations_of("f1").len(), 3);
    assert_eq!(
        engine.pool_operations().state_of("p0"),
        Some(PoolOpState::Idle)
    );
}

#[tokio::test]
async fn excluded_pool_replicas_still_count() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    cluster.put_file("f1", "tape:exp@osm", &["p0", "p1"], &[]);
    let engine = engine_with(&cluster, &dir);

    assert!(engine.pool_operations().exclude("p1"));
    assert!(admit(&engine, "f1", "p0").await);
    engine.drain().await;

    // no churn: the excluded replica is trusted
    assert!(cluster.actions().is_empty());
}

#[tokio::test]
async fn forced_scan_is_refused_on_excluded_pool() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(&cluster, &dir);

    assert!(engine.pool_operations().exclude("p0"));
    let err = engine.request_scan("p0").unwrap_err();
    assert!(matches!(err, ResilienceError::ScanFailed { .. }));
}

#[tokio::test]
async fn checkpoint_survives_restart() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    cluster.put_file("f1", "tape:exp@osm", &["p0"], &[]);
    let engine = engine_with(&cluster, &dir);

    assert!(admit(&engine, "f1", "p0").await);
    // a merged second update raises the pass count to 2
    assert!(!admit(&engine, "f1", "p0").await);
    engine.pool_operations().exclude("p2");
    // queued but not yet executed
    assert_eq!(engine.file_operations().len(), 1);
    engine.checkpoint_now().unwrap();

    let restarted = engine_with(&cluster, &dir);
    restarted.restore().await;
    assert_eq!(restarted.file_operations().len(), 1);
    // the pass count rides along in the checkpoint
    let op = restarted
        .file_operations()
        .operation(&FileId::from("f1"))
        .unwrap();
    assert_eq!(op.op_count, 2);
    assert_eq!(
        restarted.pool_operations().state_of("p2"),
        Some(PoolOpState::Excluded)
    );

    // the recovered operation still resolves correctly
    restarted.drain().await;
    assert_eq!(cluster.locations_of("f1").len(), 2);
}

#[tokio::test]
async fn disabled_engine_refuses_new_work() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    cluster.put_file("f1", "tape:exp@osm", &["p0"], &[]);
    let engine = engine_with(&cluster, &dir);

    engine.disable(false);
    let err = engine
        .handle_file_update(FileUpdate::new(
            FileId::from("f1"),
            "p0",
            MessageType::AddCacheLocation,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ResilienceError::Disabled));
    assert!(engine.request_scan("p0").is_err());

    engine.enable();
    assert!(admit(&engine, "f1", "p0").await);
}

#[tokio::test]
async fn strict_disable_cancels_queued_work() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    cluster.put_file("f1", "tape:exp@osm", &["p0"], &[]);
    let engine = engine_with(&cluster, &dir);

    assert!(admit(&engine, "f1", "p0").await);
    assert_eq!(engine.file_operations().len(), 1);
    engine.disable(true);
    assert!(engine.file_operations().is_empty());
}

#[tokio::test]
async fn merged_updates_drive_repeated_verification() {
    let cluster = MockCluster::default();
    let dir = tempfile::tempdir().unwrap();
    cluster.put_file("f1", "tape:exp@osm", &["p0"], &[]);
    let engine = engine_with(&cluster, &dir);

    assert!(admit(&engine, "f1", "p0").await);
    assert!(!admit(&engine, "f1", "p0").await);
    let op = engine
        .file_operations()
        .operation(&FileId::from("f1"))
        .unwrap();
    assert_eq!(op.op_count, 2);
    assert_eq!(op.state, FileOpState::Waiting);

    engine.drain().await;
    // first pass copies, second pass verifies and finds compliance
    assert_eq!(
        cluster
            .actions()
            .iter()
            .filter(|a| a.starts_with("copy"))
            .count(),
        1
    );
    assert!(engine.file_operations().is_empty());
}
