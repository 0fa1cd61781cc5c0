//! Archive and host-entry garbage collection.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;

use crate::archive::{ArchiveKey, ArchiveManager};
use crate::error::{CleanupFailure, Error, Result};
use crate::hosts::HostTable;
use crate::observability::metrics;
use crate::site::Registry;

/// What one collection pass removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed_keys: Vec<ArchiveKey>,
    pub removed_hostnames: Vec<String>,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Removes archives and host entries the current registry no longer needs.
pub struct GarbageCollector {
    archives: Arc<dyn ArchiveManager>,
    hosts: Arc<HostTable>,
}

impl GarbageCollector {
    pub fn new(archives: Arc<dyn ArchiveManager>, hosts: Arc<HostTable>) -> Self {
        Self { archives, hosts }
    }

    /// Collect everything unreferenced by `registry`.
    ///
    /// Every step is attempted; failures are gathered and returned together
    /// as `Error::ResourceCleanup`.
    pub async fn clean(&self, registry: &Registry) -> Result<CleanupReport> {
        let referenced = registry.referenced_keys();
        let orphans: BTreeSet<ArchiveKey> = self
            .archives
            .list()
            .into_iter()
            .map(|h| h.key().clone())
            .filter(|k| !referenced.contains(k))
            .collect();

        let mut report = CleanupReport::default();
        let outcomes = join_all(orphans.iter().map(|key| self.remove_archive(key))).await;
        for (key, outcome) in orphans.iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.removed_keys.push(key.clone()),
                Err(failure) => report.failures.push(failure),
            }
        }

        match self.hosts.entries().await {
            Ok(ledger) => {
                for (hostname, key) in ledger {
                    if !orphans.contains(&key) || registry.serves_hosted(&hostname) {
                        continue;
                    }
                    match self.hosts.release(&hostname).await {
                        Ok(()) => {
                            tracing::info!(hostname = %hostname, key = %key, "Removed host entry");
                            report.removed_hostnames.push(hostname);
                        }
                        Err(e) => report.failures.push(CleanupFailure {
                            target: hostname,
                            stage: "unhost",
                            reason: e.to_string(),
                        }),
                    }
                }
            }
            Err(e) => report.failures.push(CleanupFailure {
                target: "host ledger".to_string(),
                stage: "read",
                reason: e.to_string(),
            }),
        }

        metrics::record_gc(
            report.removed_keys.len(),
            report.removed_hostnames.len(),
            report.failures.len(),
        );
        tracing::info!(
            archives = report.removed_keys.len(),
            hosts = report.removed_hostnames.len(),
            failures = report.failures.len(),
            "Garbage collection finished"
        );

        if report.is_clean() {
            Ok(report)
        } else {
            Err(Error::ResourceCleanup(report.failures))
        }
    }

    /// close → forget → delete `<directory>/<key>`.
    async fn remove_archive(&self, key: &ArchiveKey) -> Result<(), CleanupFailure> {
        let fail = |stage: &'static str, reason: String| CleanupFailure {
            target: key.to_string(),
            stage,
            reason,
        };

        self.archives
            .close(key)
            .await
            .map_err(|e| fail("close", e.to_string()))?;
        self.archives
            .forget(key)
            .await
            .map_err(|e| fail("forget", e.to_string()))?;

        let dir: PathBuf = self.archives.storage_dir(key);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(fail("delete", e.to_string())),
        }
        tracing::info!(key = %key, path = ?dir, "Removed archive");
        Ok(())
    }
}
