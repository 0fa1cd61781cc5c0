//! Restart triggers while running.
//!
//! Watches the config record and the metadata of every federated site-list.
//! The first event sends one restart request; the daemon loop performs it.

use std::path::Path;

use futures_util::future::select_all;
use notify::RecommendedWatcher;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::archive::{ArchiveHandle, ArchiveKey};
use crate::config::watcher::ConfigWatcher;

/// Why a restart was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartReason {
    ConfigChanged,
    SiteListUpdated(ArchiveKey),
    Signal,
}

/// Live watch over the config record and site-list archives.
pub struct ChangeWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ChangeWatcher {
    pub fn start(
        config_path: &Path,
        sitelists: &[ArchiveHandle],
        restart_tx: mpsc::UnboundedSender<RestartReason>,
    ) -> Result<Self, notify::Error> {
        let (config_watcher, mut config_rx) = ConfigWatcher::new(config_path);
        let watcher = config_watcher.run()?;

        let updates: Vec<_> = sitelists
            .iter()
            .map(|handle| {
                let key = handle.key().clone();
                let mut rx = handle.subscribe();
                Box::pin(async move {
                    // A closed channel means the handle was released; never fire.
                    if rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                    key
                })
            })
            .collect();

        let task = tokio::spawn(async move {
            let any_update = async move {
                if updates.is_empty() {
                    std::future::pending().await
                } else {
                    select_all(updates).await.0
                }
            };
            let reason = tokio::select! {
                Some(()) = config_rx.recv() => RestartReason::ConfigChanged,
                key = any_update => RestartReason::SiteListUpdated(key),
                else => return,
            };
            tracing::info!(reason = ?reason, "Restart requested");
            let _ = restart_tx.send(reason);
        });

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }

    /// Stop watching.
    pub fn close(self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sitelist_update_requests_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.json");
        let handle = ArchiveHandle::new(ArchiveKey::from_digest(&[8; 32]), dir.path(), false, true);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let watcher = ChangeWatcher::start(&config, std::slice::from_ref(&handle), tx).unwrap();
        handle.notify_updated();

        let reason = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(reason, Some(RestartReason::SiteListUpdated(handle.key().clone())));
        watcher.close();
    }

    #[tokio::test]
    async fn test_config_change_requests_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.json");
        std::fs::write(&config, "{}").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let watcher = ChangeWatcher::start(&config, &[], tx).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        std::fs::write(&config, r#"{"sites": {}}"#).unwrap();

        let reason = tokio::time::timeout(std::time::Duration::from_secs(10), rx.recv())
            .await
            .unwrap();
        assert_eq!(reason, Some(RestartReason::ConfigChanged));
        watcher.close();
    }
}
