//! Durable record store for the site configuration.
//!
//! The store is a flat map of named JSON records kept in one file. The site
//! host only ever touches two records, `sites` and `sitelists`; the host
//! ledger reuses the same store type for its own file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::schema::{SiteConfigMap, SITELISTS_RECORD, SITES_RECORD};

/// Config store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a JSON object of records: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("record {record:?} has an unexpected shape: {source}")]
    Record {
        record: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Key-value persistence for named records.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read one record. Absent records are `None`.
    async fn read(&self, record: &str) -> Result<Option<Value>, StoreError>;

    /// Replace one record.
    async fn write(&self, record: &str, value: Value) -> Result<(), StoreError>;

    /// Names of the records present.
    async fn records(&self) -> Result<Vec<String>, StoreError>;
}

/// A `ConfigStore` backed by a single JSON file.
///
/// Writes go to a sibling temp file and are renamed into place.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Map<String, Value>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let json = serde_json::to_vec_pretty(map).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn read(&self, record: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(record))
    }

    async fn write(&self, record: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut map = self.load().await?;
        map.insert(record.to_string(), value);
        self.save(&map).await
    }

    async fn records(&self) -> Result<Vec<String>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.keys().cloned().collect())
    }
}

/// Read a typed record, defaulting when absent.
pub async fn read_record<T>(store: &dyn ConfigStore, record: &str) -> Result<T, StoreError>
where
    T: DeserializeOwned + Default,
{
    match store.read(record).await? {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|source| StoreError::Record {
            record: record.to_string(),
            source,
        }),
    }
}

/// Write a typed record.
pub async fn write_record<T>(store: &dyn ConfigStore, record: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value).map_err(|source| StoreError::Record {
        record: record.to_string(),
        source,
    })?;
    store.write(record, value).await
}

pub async fn read_sites(store: &dyn ConfigStore) -> Result<SiteConfigMap, StoreError> {
    read_record(store, SITES_RECORD).await
}

pub async fn write_sites(store: &dyn ConfigStore, sites: &SiteConfigMap) -> Result<(), StoreError> {
    write_record(store, SITES_RECORD, sites).await
}

pub async fn read_sitelists(store: &dyn ConfigStore) -> Result<Vec<String>, StoreError> {
    read_record(store, SITELISTS_RECORD).await
}

pub async fn write_sitelists(store: &dyn ConfigStore, sitelists: &[String]) -> Result<(), StoreError> {
    write_record(store, SITELISTS_RECORD, sitelists).await
}

/// First run: create empty `sites` and `sitelists` records if missing.
pub async fn bootstrap(store: &dyn ConfigStore) -> Result<bool, StoreError> {
    let present = store.records().await?;
    let mut created = false;
    if !present.iter().any(|r| r == SITES_RECORD) {
        write_sites(store, &SiteConfigMap::new()).await?;
        created = true;
    }
    if !present.iter().any(|r| r == SITELISTS_RECORD) {
        write_sitelists(store, &[]).await?;
        created = true;
    }
    if created {
        tracing::info!("Initialized empty site configuration");
    }
    Ok(created)
}
