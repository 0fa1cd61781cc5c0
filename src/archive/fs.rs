//! Filesystem archive manager.
//!
//! Layout:
//! ```text
//! <root>/
//!   archives.json     registry: key → { path, writable, sparse }
//!   <key>/            storage for archives opened by key (mirrors, site-lists)
//! ```
//!
//! Published archives live in the operator's own directory; only their
//! registry entry is kept under `<root>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::archive::import::{import_dir, MANIFEST_FILE};
use crate::archive::network::GatewayClient;
use crate::archive::{
    ArchiveError, ArchiveHandle, ArchiveKey, ArchiveManager, CreateOptions, ImportSummary,
    NetworkError,
};
use crate::config::{ArchiveOptions, NetworkOptions};

/// Registry file name under the root.
pub const REGISTRY_FILE: &str = "archives.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ArchiveEntry {
    path: PathBuf,
    #[serde(default)]
    writable: bool,
    #[serde(default)]
    sparse: bool,
}

/// Archive manager keeping content on the local filesystem.
pub struct FsArchiveManager {
    root: PathBuf,
    live: DashMap<ArchiveKey, ArchiveHandle>,
    entries: Mutex<BTreeMap<ArchiveKey, ArchiveEntry>>,
    ignore: Vec<String>,
    gateway: Option<Arc<GatewayClient>>,
    poll_interval: Option<Duration>,
}

impl FsArchiveManager {
    pub fn new(
        root: impl Into<PathBuf>,
        archive: &ArchiveOptions,
        network: &NetworkOptions,
    ) -> Result<Self, NetworkError> {
        Ok(Self {
            root: root.into(),
            live: DashMap::new(),
            entries: Mutex::new(BTreeMap::new()),
            ignore: archive.ignore.clone(),
            gateway: GatewayClient::from_options(network)?.map(Arc::new),
            poll_interval: (network.poll_interval_secs > 0)
                .then(|| Duration::from_secs(network.poll_interval_secs)),
        })
    }

    fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    async fn load_entries(&self) -> Result<BTreeMap<ArchiveKey, ArchiveEntry>, ArchiveError> {
        let path = self.registry_path();
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|source| ArchiveError::Registry { path, source }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(ArchiveError::Io { path, source }),
        }
    }

    async fn save_entries(&self, entries: &BTreeMap<ArchiveKey, ArchiveEntry>) -> Result<(), ArchiveError> {
        let path = self.registry_path();
        let json = serde_json::to_vec_pretty(entries).map_err(|source| ArchiveError::Registry {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| ArchiveError::Io { path, source })
    }

    async fn register(&self, handle: &ArchiveHandle) -> Result<(), ArchiveError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            handle.key().clone(),
            ArchiveEntry {
                path: handle.path().to_path_buf(),
                writable: handle.is_writable(),
                sparse: handle.is_sparse(),
            },
        );
        self.save_entries(&entries).await?;
        self.live.insert(handle.key().clone(), handle.clone());
        Ok(())
    }

    fn manifest_path(handle: &ArchiveHandle) -> PathBuf {
        handle.path().join(MANIFEST_FILE)
    }

    /// Background replication of a full (non-sparse) mirror.
    fn spawn_sync(&self, gateway: Arc<GatewayClient>, handle: &ArchiveHandle) {
        let h = handle.clone();
        let task = tokio::spawn(async move {
            match gateway.replicate(h.key(), h.path()).await {
                Ok(files) => {
                    tracing::info!(key = %h.key(), files, "Archive replicated");
                    h.notify_updated();
                }
                Err(e) => tracing::warn!(key = %h.key(), error = %e, "Archive replication failed"),
            }
        });
        handle.attach(task);
    }

    /// Periodic manifest refresh of a sparse archive; signals on change.
    fn spawn_poll(&self, gateway: Arc<GatewayClient>, handle: &ArchiveHandle, every: Duration) {
        let h = handle.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let fresh = match gateway.fetch_manifest(h.key()).await {
                    Ok(manifest) => manifest,
                    Err(e) => {
                        tracing::debug!(key = %h.key(), error = %e, "Manifest poll failed");
                        continue;
                    }
                };
                match cache_manifest(&h, &fresh).await {
                    Ok(true) => tracing::info!(key = %h.key(), "Manifest updated"),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(key = %h.key(), error = %e, "Failed to store manifest"),
                }
            }
        });
        handle.attach(task);
    }
}

/// Store `fresh` as the cached manifest of `handle`. Signals the handle and
/// returns true when the content changed.
async fn cache_manifest(handle: &ArchiveHandle, fresh: &Value) -> Result<bool, NetworkError> {
    let path = FsArchiveManager::manifest_path(handle);
    let current = tokio::fs::read(&path)
        .await
        .ok()
        .and_then(|b| serde_json::from_slice::<Value>(&b).ok());
    if current.as_ref() == Some(fresh) {
        return Ok(false);
    }
    write_manifest(&path, fresh).await?;
    handle.notify_updated();
    Ok(true)
}

/// The cached manifest, if any.
async fn read_cached_manifest(handle: &ArchiveHandle) -> Result<Option<Value>, NetworkError> {
    let path = FsArchiveManager::manifest_path(handle);
    match tokio::fs::read(&path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| NetworkError::InvalidManifest {
                key: handle.key().clone(),
                source,
            }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(NetworkError::Io { path, source }),
    }
}

async fn write_manifest(path: &Path, manifest: &Value) -> Result<(), NetworkError> {
    let io_err = |source| NetworkError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let bytes = serde_json::to_vec_pretty(manifest).unwrap_or_default();
    tokio::fs::write(path, bytes).await.map_err(io_err)
}

#[async_trait]
impl ArchiveManager for FsArchiveManager {
    async fn open(&self) -> Result<(), ArchiveError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| ArchiveError::Io {
                path: self.root.clone(),
                source,
            })?;

        let loaded = self.load_entries().await?;
        for (key, entry) in &loaded {
            self.live.entry(key.clone()).or_insert_with(|| {
                ArchiveHandle::new(key.clone(), &entry.path, entry.writable, entry.sparse)
            });
        }
        tracing::debug!(archives = loaded.len(), root = ?self.root, "Archive registry opened");
        *self.entries.lock().await = loaded;
        Ok(())
    }

    fn list(&self) -> Vec<ArchiveHandle> {
        self.live.iter().map(|e| e.value().clone()).collect()
    }

    fn get(&self, key: &ArchiveKey) -> Option<ArchiveHandle> {
        self.live.get(key).map(|e| e.value().clone())
    }

    async fn create(&self, path: &Path, options: CreateOptions) -> Result<ArchiveHandle, ArchiveError> {
        match options.key {
            Some(key) => {
                if let Some(existing) = self.get(&key) {
                    return Ok(existing);
                }
                tokio::fs::create_dir_all(path)
                    .await
                    .map_err(|source| ArchiveError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
                let handle = ArchiveHandle::new(key, path, false, options.sparse);
                self.register(&handle).await?;
                tracing::debug!(key = %handle.key(), path = ?path, sparse = options.sparse, "Archive created");
                Ok(handle)
            }
            None => {
                let summary = import_dir(path, &self.ignore).await?;
                if let Some(existing) = self.get(&summary.key) {
                    return Ok(existing);
                }
                let handle = ArchiveHandle::new(summary.key.clone(), path, true, false);
                self.register(&handle).await?;
                tracing::debug!(
                    key = %handle.key(),
                    path = ?path,
                    files = summary.files,
                    "Archive created from directory"
                );
                Ok(handle)
            }
        }
    }

    async fn close(&self, key: &ArchiveKey) -> Result<(), ArchiveError> {
        if let Some((_, handle)) = self.live.remove(key) {
            handle.release();
            tracing::debug!(key = %key, "Archive closed");
        }
        Ok(())
    }

    async fn forget(&self, key: &ArchiveKey) -> Result<(), ArchiveError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.save_entries(&entries).await?;
        }
        Ok(())
    }

    fn storage_dir(&self, key: &ArchiveKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    async fn join_network(&self, handle: &ArchiveHandle) -> Result<(), NetworkError> {
        if !handle.mark_joined() {
            return Ok(());
        }
        let Some(gateway) = self.gateway.clone() else {
            tracing::debug!(key = %handle.key(), "No gateways configured, archive stays local");
            return Ok(());
        };
        if handle.is_writable() {
            tracing::debug!(key = %handle.key(), "Serving local archive");
            return Ok(());
        }
        if handle.is_sparse() {
            if let Some(every) = self.poll_interval {
                self.spawn_poll(gateway, handle, every);
            }
        } else {
            self.spawn_sync(gateway, handle);
        }
        tracing::debug!(key = %handle.key(), sparse = handle.is_sparse(), "Joined network");
        Ok(())
    }

    async fn import_files(&self, handle: &ArchiveHandle) -> Result<ImportSummary, ArchiveError> {
        if !handle.is_writable() {
            return Err(ArchiveError::ReadOnly(handle.key().clone()));
        }
        let summary = import_dir(handle.path(), &self.ignore).await?;
        if &summary.key != handle.key() {
            tracing::warn!(
                key = %handle.key(),
                content_key = %summary.key,
                "Directory changed since the archive was opened"
            );
        }
        handle.notify_updated();
        Ok(summary)
    }

    async fn read_manifest(&self, handle: &ArchiveHandle) -> Result<Value, NetworkError> {
        let Some(gateway) = &self.gateway else {
            return read_cached_manifest(handle)
                .await?
                .ok_or_else(|| NetworkError::Unavailable(handle.key().clone()));
        };

        match gateway.fetch_manifest(handle.key()).await {
            Ok(manifest) => {
                if cache_manifest(handle, &manifest).await? {
                    tracing::debug!(key = %handle.key(), "Fetched newer manifest");
                }
                Ok(manifest)
            }
            Err(e) => match read_cached_manifest(handle).await? {
                Some(cached) => {
                    tracing::warn!(key = %handle.key(), error = %e, "Manifest fetch failed, using cached copy");
                    Ok(cached)
                }
                None => Err(e),
            },
        }
    }
}
