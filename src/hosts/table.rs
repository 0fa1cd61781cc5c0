//! Host ledger: which hostnames this host registered, and for which key.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::archive::ArchiveKey;
use crate::config::store::{read_record, write_record};
use crate::config::JsonFileStore;
use crate::hosts::{HostResolver, HostsError};

/// Ledger file name under the working directory.
pub const LEDGER_FILE: &str = "hosts.json";

const LEDGER_RECORD: &str = "hosts";

/// Hostname → backing key of every host entry we created.
pub type HostLedger = BTreeMap<String, ArchiveKey>;

/// Serializes host-file edits and keeps the ledger in step with them.
pub struct HostTable {
    resolver: Arc<dyn HostResolver>,
    ip: IpAddr,
    ledger: JsonFileStore,
    lock: Mutex<()>,
}

impl HostTable {
    pub fn new(resolver: Arc<dyn HostResolver>, ip: IpAddr, ledger_path: impl Into<PathBuf>) -> Self {
        Self {
            resolver,
            ip,
            ledger: JsonFileStore::new(ledger_path),
            lock: Mutex::new(()),
        }
    }

    /// Point `hostname` at the loopback address and record its key.
    pub async fn register(&self, hostname: &str, key: &ArchiveKey) -> Result<(), HostsError> {
        let _guard = self.lock.lock().await;
        self.resolver.set(self.ip, hostname).await?;

        let mut ledger: HostLedger = read_record(&self.ledger, LEDGER_RECORD).await?;
        if ledger.get(hostname) != Some(key) {
            ledger.insert(hostname.to_string(), key.clone());
            write_record(&self.ledger, LEDGER_RECORD, &ledger).await?;
        }
        Ok(())
    }

    /// Remove the entry for `hostname` and forget it.
    pub async fn release(&self, hostname: &str) -> Result<(), HostsError> {
        let _guard = self.lock.lock().await;
        self.resolver.remove(self.ip, hostname).await?;

        let mut ledger: HostLedger = read_record(&self.ledger, LEDGER_RECORD).await?;
        if ledger.remove(hostname).is_some() {
            write_record(&self.ledger, LEDGER_RECORD, &ledger).await?;
        }
        Ok(())
    }

    pub async fn entries(&self) -> Result<HostLedger, HostsError> {
        let _guard = self.lock.lock().await;
        Ok(read_record(&self.ledger, LEDGER_RECORD).await?)
    }
}
