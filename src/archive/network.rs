//! Gateway replication.
//!
//! Archives are replicated from plain HTTP gateways that expose each archive
//! under its key:
//!
//! ```text
//! <gateway>/<key>/dat.json      manifest
//! <gateway>/<key>/.index.json   {"files": ["index.html", "css/site.css", ...]}
//! <gateway>/<key>/<path>        file bytes
//! ```
//!
//! Gateways are tried in order; each request is retried with backoff.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::archive::ArchiveKey;
use crate::config::NetworkOptions;
use crate::resilience::backoff::Backoff;
use crate::resilience::retries::is_retryable_status;

/// Index document name on gateways.
pub const INDEX_FILE: &str = ".index.json";

/// Network failures while joining or fetching.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// No local copy and no gateway could serve it.
    #[error("archive {0} is not available from any peer")]
    Unavailable(ArchiveKey),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("manifest of {key} is not valid JSON: {source}")]
    InvalidManifest {
        key: ArchiveKey,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid gateway url {0:?}")]
    InvalidGateway(String),

    #[error("refusing to write outside the archive: {0:?}")]
    UnsafePath(String),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Deserialize)]
struct GatewayIndex {
    #[serde(default)]
    files: Vec<String>,
}

/// HTTP client for a list of gateways.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    gateways: Vec<Url>,
    backoff: Backoff,
}

impl GatewayClient {
    /// Build a client, or `None` when no gateways are configured.
    pub fn from_options(options: &NetworkOptions) -> Result<Option<Self>, NetworkError> {
        if options.gateways.is_empty() {
            return Ok(None);
        }
        let gateways = options
            .gateways
            .iter()
            .map(|raw| {
                let normalized = if raw.ends_with('/') {
                    raw.clone()
                } else {
                    format!("{raw}/")
                };
                Url::parse(&normalized).map_err(|_| NetworkError::InvalidGateway(raw.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = reqwest::Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(secs) = options.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|source| NetworkError::Request {
            url: String::new(),
            source,
        })?;

        Ok(Some(Self {
            client,
            gateways,
            backoff: Backoff::from_options(options),
        }))
    }

    /// Fetch and parse `dat.json`.
    pub async fn fetch_manifest(&self, key: &ArchiveKey) -> Result<Value, NetworkError> {
        let bytes = self.fetch(key, crate::archive::import::MANIFEST_FILE).await?;
        serde_json::from_slice(&bytes).map_err(|source| NetworkError::InvalidManifest {
            key: key.clone(),
            source,
        })
    }

    /// Copy every indexed file of `key` into `dest`. Returns the file count.
    pub async fn replicate(&self, key: &ArchiveKey, dest: &Path) -> Result<usize, NetworkError> {
        let index = self.fetch(key, INDEX_FILE).await?;
        let index: GatewayIndex =
            serde_json::from_slice(&index).map_err(|source| NetworkError::InvalidManifest {
                key: key.clone(),
                source,
            })?;

        for rel in &index.files {
            let target = safe_join(dest, rel)?;
            let bytes = self.fetch(key, rel).await?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| NetworkError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
            tokio::fs::write(&target, &bytes)
                .await
                .map_err(|source| NetworkError::Io {
                    path: target.clone(),
                    source,
                })?;
        }
        Ok(index.files.len())
    }

    /// GET `<gateway>/<key>/<rel>` from the first gateway that serves it.
    async fn fetch(&self, key: &ArchiveKey, rel: &str) -> Result<Vec<u8>, NetworkError> {
        let mut last_err = NetworkError::Unavailable(key.clone());
        for gateway in &self.gateways {
            let url = gateway
                .join(&format!("{key}/{rel}"))
                .map_err(|_| NetworkError::InvalidGateway(gateway.to_string()))?;
            match self.fetch_with_retries(&url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "Gateway fetch failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    async fn fetch_with_retries(&self, url: &Url) -> Result<Vec<u8>, NetworkError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match self.client.get(url.clone()).send().await {
                Ok(res) if res.status().is_success() => {
                    res.bytes().await.map(|b| b.to_vec()).map_err(|source| {
                        NetworkError::Request {
                            url: url.to_string(),
                            source,
                        }
                    })
                }
                Ok(res) => Err(NetworkError::Status {
                    url: url.to_string(),
                    status: res.status().as_u16(),
                }),
                Err(source) => Err(NetworkError::Request {
                    url: url.to_string(),
                    source,
                }),
            };

            if result.is_ok() {
                return result;
            }
            let retryable = match &result {
                Err(NetworkError::Status { status, .. }) => is_retryable_status(*status),
                _ => true,
            };
            let delay = match self.backoff.next_delay(attempt) {
                Some(delay) if retryable => delay,
                _ => return result,
            };
            tracing::debug!(url = %url, attempt, delay = ?delay, "Retrying gateway fetch");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Join a gateway-supplied relative path under `root`, rejecting escapes.
pub fn safe_join(root: &Path, rel: &str) -> Result<PathBuf, NetworkError> {
    let rel_path = Path::new(rel);
    let clean = !rel.is_empty()
        && rel_path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if clean {
        Ok(root.join(rel_path))
    } else {
        Err(NetworkError::UnsafePath(rel.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_join() {
        let root = Path::new("/srv/k");
        assert_eq!(
            safe_join(root, "css/site.css").unwrap(),
            PathBuf::from("/srv/k/css/site.css")
        );
        assert!(safe_join(root, "../etc/passwd").is_err());
        assert!(safe_join(root, "/etc/passwd").is_err());
        assert!(safe_join(root, "").is_err());
    }

    #[test]
    fn test_no_gateways_means_no_client() {
        let options = NetworkOptions::default();
        assert!(GatewayClient::from_options(&options).unwrap().is_none());
    }

    #[test]
    fn test_gateway_urls_are_normalized() {
        let options = NetworkOptions {
            gateways: vec!["http://mirror.example/archives".into()],
            ..Default::default()
        };
        let client = GatewayClient::from_options(&options).unwrap().unwrap();
        let key = ArchiveKey::from_digest(&[0xab; 32]);
        let url = client.gateways[0].join(&format!("{key}/dat.json")).unwrap();
        assert_eq!(
            url.as_str(),
            format!("http://mirror.example/archives/{key}/dat.json")
        );
    }

    #[tokio::test]
    async fn test_unreachable_gateway() {
        let options = NetworkOptions {
            gateways: vec!["http://127.0.0.1:9/".into()],
            max_attempts: 1,
            timeout_secs: Some(2),
            ..Default::default()
        };
        let client = GatewayClient::from_options(&options).unwrap().unwrap();
        let key = ArchiveKey::from_digest(&[1; 32]);
        assert!(client.fetch_manifest(&key).await.is_err());
    }
}
