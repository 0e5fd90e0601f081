// Copyright (c) 2025 Saorsa Labs Limited
//
// This file is part of the Saorsa resilience engine.
//
// Licensed under the AGPL-3.0 license:
// <https://www.gnu.org/licenses/agpl-3.0.html>

//! Scan execution: enumerate a pool's files and fan out child operations.

use std::sync::Arc;

use tracing::{info, warn};

use crate::file_ops::map::{FileOpRegistration, FileOperationMap};
use crate::pool_ops::map::{PoolOperationMap, ScanRequest};
use crate::traits::NamespaceAccess;

pub struct PoolScanHandler {
    namespace: Arc<dyn NamespaceAccess>,
    file_ops: Arc<FileOperationMap>,
    pool_ops: Arc<PoolOperationMap>,
}

impl PoolScanHandler {
    pub fn new(
        namespace: Arc<dyn NamespaceAccess>,
        file_ops: Arc<FileOperationMap>,
        pool_ops: Arc<PoolOperationMap>,
    ) -> Self {
        Self {
            namespace,
            file_ops,
            pool_ops,
        }
    }

    /// Run one scan: enumerate the pool and register a child operation per
    /// file. The scan completes once all children report back; a scan with
    /// no children completes immediately.
    pub async fn scan(&self, req: ScanRequest) {
        let files = match self.namespace.files_on_pool(&req.pool).await {
            Ok(files) => files,
            Err(e) => {
                warn!(pool = %req.pool, error = %e, "pool enumeration failed");
                self.pool_ops.scan_failed(&req.pool);
                return;
            }
        };
        let total = files.len();
        let mut children = 0;
        for file_id in files {
            let admission = self.file_ops.register(FileOpRegistration {
                file_id,
                parent: Some(req.index),
                group: req.group,
                unit: req.unit,
                from_scan: true,
                broken_source: None,
            });
            // a merged operation reports to this scan only if it adopted
            // the parent; one already owned by another scan reports there
            if admission.parent == Some(req.index) {
                children += 1;
            }
        }
        info!(
            pool = %req.pool,
            trigger = ?req.trigger,
            files = total,
            children,
            "scan enumerated"
        );
        self.pool_ops.set_children(&req.pool, children);
    }
}
