//! The archive manager seam.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::archive::{ArchiveHandle, ArchiveKey, CreateOptions, NetworkError};

/// Archive storage failures.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive registry {path} is corrupt: {source}")]
    Registry {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("archive {0} is not writable")]
    ReadOnly(ArchiveKey),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("invalid ignore rules: {0}")]
    IgnoreRules(#[from] ignore::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Result of importing a directory into an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    /// Content address of the imported files.
    pub key: ArchiveKey,
    pub files: usize,
    pub bytes: u64,
}

/// Creates, tracks and replicates content-addressed archives.
#[async_trait]
pub trait ArchiveManager: Send + Sync {
    /// Load the manager's own registry and reopen every known archive.
    async fn open(&self) -> Result<(), ArchiveError>;

    /// Live handles.
    fn list(&self) -> Vec<ArchiveHandle>;

    /// Live handle for `key`.
    fn get(&self, key: &ArchiveKey) -> Option<ArchiveHandle> {
        self.list().into_iter().find(|h| h.key() == key)
    }

    /// Open the archive at `options.key`, or import `path` when no key is
    /// given. Returns the existing live handle when one matches.
    async fn create(&self, path: &Path, options: CreateOptions) -> Result<ArchiveHandle, ArchiveError>;

    /// Release a live handle. The archive stays registered and is reopened by
    /// the next `open`.
    async fn close(&self, key: &ArchiveKey) -> Result<(), ArchiveError>;

    /// Drop an archive from the registry.
    async fn forget(&self, key: &ArchiveKey) -> Result<(), ArchiveError>;

    /// Per-key storage directory under the working area.
    fn storage_dir(&self, key: &ArchiveKey) -> PathBuf;

    /// Start replicating the archive.
    async fn join_network(&self, handle: &ArchiveHandle) -> Result<(), NetworkError>;

    /// Re-import the archive's directory.
    async fn import_files(&self, handle: &ArchiveHandle) -> Result<ImportSummary, ArchiveError>;

    /// The archive's current `dat.json`. Gateways are asked first; the local
    /// copy is used when none is configured or none answers.
    async fn read_manifest(&self, handle: &ArchiveHandle) -> Result<Value, NetworkError>;
}
