//! Live archive handles.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::archive::ArchiveKey;

/// How to create or open an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Open the archive at this key. `None` imports the directory and derives
    /// the key from its content.
    pub key: Option<ArchiveKey>,

    /// Metadata only; content is fetched on demand.
    pub sparse: bool,
}

/// A shared reference to an open archive.
///
/// Cloning is cheap. The core only ever holds handles; the manager owns the
/// bytes on disk.
#[derive(Debug, Clone)]
pub struct ArchiveHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    key: ArchiveKey,
    path: PathBuf,
    writable: bool,
    sparse: bool,
    joined: AtomicBool,
    version: watch::Sender<u64>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ArchiveHandle {
    pub fn new(key: ArchiveKey, path: impl Into<PathBuf>, writable: bool, sparse: bool) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(HandleInner {
                key,
                path: path.into(),
                writable,
                sparse,
                joined: AtomicBool::new(false),
                version,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn key(&self) -> &ArchiveKey {
        &self.inner.key
    }

    /// Directory the archive content lives in.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Created here by importing a local directory.
    pub fn is_writable(&self) -> bool {
        self.inner.writable
    }

    pub fn is_sparse(&self) -> bool {
        self.inner.sparse
    }

    pub fn is_joined(&self) -> bool {
        self.inner.joined.load(Ordering::Acquire)
    }

    /// Mark the handle as joined. Returns false if it already was.
    pub fn mark_joined(&self) -> bool {
        !self.inner.joined.swap(true, Ordering::AcqRel)
    }

    /// Subscribe to metadata updates. The receiver starts with the current
    /// version marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    /// Current metadata version.
    pub fn version(&self) -> u64 {
        *self.inner.version.borrow()
    }

    /// Signal that the archive's metadata changed.
    pub fn notify_updated(&self) {
        self.inner.version.send_modify(|v| *v += 1);
    }

    /// Tie a background task to the handle's lifetime.
    pub fn attach(&self, task: JoinHandle<()>) {
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            tasks.retain(|t| !t.is_finished());
            tasks.push(task);
        }
    }

    /// Stop background work. Idempotent.
    pub fn release(&self) {
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.inner.joined.store(false, Ordering::Release);
    }

    /// Whether two handles refer to the same open archive.
    pub fn same(&self, other: &ArchiveHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> ArchiveHandle {
        ArchiveHandle::new(ArchiveKey::from_digest(&[1u8; 32]), "/tmp/x", false, true)
    }

    #[test]
    fn test_join_once() {
        let h = handle();
        assert!(!h.is_joined());
        assert!(h.mark_joined());
        assert!(!h.mark_joined());
        h.release();
        assert!(!h.is_joined());
    }

    #[tokio::test]
    async fn test_update_notifications() {
        let h = handle();
        let mut rx = h.subscribe();
        assert!(!rx.has_changed().unwrap());

        h.notify_updated();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
        assert_eq!(h.version(), 1);
    }

    #[tokio::test]
    async fn test_release_aborts_tasks() {
        let h = handle();
        let task = tokio::spawn(std::future::pending::<()>());
        h.attach(task);
        h.release();
        // A second release has nothing left to abort.
        h.release();
    }
}
