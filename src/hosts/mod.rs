//! Local name resolution.
//!
//! # Data Flow
//! ```text
//! SiteOrchestrator ──register(host, key)──▶ HostTable ──set──▶ HostResolver (hosts file)
//!                                              │
//!                                              └──▶ ledger (<directory>/hosts.json)
//! GarbageCollector ──release(host)───────▶ HostTable ──remove──▶ HostResolver
//! ```
//!
//! The ledger remembers which archive key each hostname was registered for,
//! so cleanup only touches entries this host created.

use std::net::IpAddr;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::StoreError;

pub mod file;
pub mod table;

pub use file::HostsFile;
pub use table::HostTable;

/// Hosts file and ledger failures.
#[derive(Debug, Error)]
pub enum HostsError {
    #[error("failed to update {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("host ledger: {0}")]
    Ledger(#[from] StoreError),
}

/// Edits the shared hostname → IP override table.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn set(&self, ip: IpAddr, hostname: &str) -> Result<(), HostsError>;
    async fn remove(&self, ip: IpAddr, hostname: &str) -> Result<(), HostsError>;
}

/// Resolver used when host editing is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResolver;

#[async_trait]
impl HostResolver for NoopResolver {
    async fn set(&self, _ip: IpAddr, _hostname: &str) -> Result<(), HostsError> {
        Ok(())
    }

    async fn remove(&self, _ip: IpAddr, _hostname: &str) -> Result<(), HostsError> {
        Ok(())
    }
}
