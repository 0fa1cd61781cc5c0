//! Turns configured site maps into live archives, routes and host entries.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::try_join_all;

use crate::archive::{ArchiveHandle, ArchiveKey, ArchiveManager};
use crate::config::{validate_site_cfg, ArchiveOptions, SiteConfig, SiteConfigMap, ValidationError};
use crate::error::Result;
use crate::hosts::HostTable;
use crate::http::{hosted_app, proxied_app, ProxyClient, VhostTable};
use crate::site::{Site, SiteMap, SiteMode, SiteOrigin, SiteSource};

/// How one configured site will be brought up.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Plan {
    Mirror { key: ArchiveKey, directory: PathBuf },
    Publish { directory: PathBuf },
    Proxy { target: Option<String> },
}

/// Brings configured sites up: archive, host entry, virtual host mount.
pub struct SiteOrchestrator {
    archives: Arc<dyn ArchiveManager>,
    hosts: Arc<HostTable>,
    vhosts: Arc<VhostTable>,
    options: ArchiveOptions,
    proxy_client: ProxyClient,
}

impl SiteOrchestrator {
    pub fn new(
        archives: Arc<dyn ArchiveManager>,
        hosts: Arc<HostTable>,
        vhosts: Arc<VhostTable>,
        options: ArchiveOptions,
        proxy_client: ProxyClient,
    ) -> Self {
        Self {
            archives,
            hosts,
            vhosts,
            options,
            proxy_client,
        }
    }

    pub fn archives(&self) -> &Arc<dyn ArchiveManager> {
        &self.archives
    }

    pub fn vhosts(&self) -> &Arc<VhostTable> {
        &self.vhosts
    }

    /// Load every site in `sites`, tagging each with `source`.
    ///
    /// The whole map is validated before any archive is touched. Sites load
    /// concurrently and the first failure is returned; archives created by
    /// the other loads are left for the next garbage collection.
    pub async fn load_sites(&self, sites: &SiteConfigMap, source: SiteSource) -> Result<SiteMap> {
        for (hostname, config) in sites {
            validate_site_cfg(hostname, config)?;
        }

        let loads = sites.iter().map(|(hostname, config)| {
            self.load_site(hostname.to_ascii_lowercase(), config, source.clone())
        });
        let loaded = try_join_all(loads).await?;

        tracing::debug!(count = loaded.len(), source = ?source, "Sites loaded");
        Ok(loaded
            .into_iter()
            .map(|site| (site.hostname.clone(), site))
            .collect())
    }

    fn plan(&self, hostname: &str, config: &SiteConfig) -> Result<Plan, ValidationError> {
        if config.is_proxy() {
            return Ok(Plan::Proxy {
                target: config.proxy.as_ref().and_then(|p| p.target()).map(str::to_string),
            });
        }

        match (&config.url, &config.directory) {
            (Some(url), directory) => {
                let key = ArchiveKey::from_url(url).map_err(|_| ValidationError::InvalidUrl {
                    hostname: hostname.to_string(),
                    url: url.clone(),
                })?;
                if let Some(directory) = directory {
                    let published_here = self
                        .archives
                        .get(&key)
                        .is_some_and(|h| h.is_writable() && h.path() == directory.as_path());
                    if published_here {
                        return Ok(Plan::Publish {
                            directory: directory.clone(),
                        });
                    }
                }
                let directory = directory
                    .clone()
                    .unwrap_or_else(|| self.archives.storage_dir(&key));
                Ok(Plan::Mirror { key, directory })
            }
            (None, Some(directory)) => Ok(Plan::Publish {
                directory: directory.clone(),
            }),
            (None, None) => Err(ValidationError::MissingBacking(hostname.to_string())),
        }
    }

    async fn load_site(&self, hostname: String, config: &SiteConfig, source: SiteSource) -> Result<Site> {
        let plan = self.plan(&hostname, config)?;
        let local = source == SiteSource::Local;

        let mode = match plan {
            Plan::Mirror { key, directory } => {
                let handle = match self.archives.get(&key) {
                    Some(handle) => handle,
                    None => {
                        self.archives
                            .create(&directory, self.options.mirror(key))
                            .await?
                    }
                };
                self.archives.join_network(&handle).await?;
                self.hosted_mode(handle, SiteOrigin::Mirror)
            }
            Plan::Publish { directory } => {
                let handle = self
                    .archives
                    .create(&directory, self.options.publish())
                    .await?;
                if handle.is_writable() {
                    let summary = self.archives.import_files(&handle).await?;
                    tracing::info!(
                        hostname = %hostname,
                        key = %handle.key(),
                        files = summary.files,
                        bytes = summary.bytes,
                        "Imported site directory"
                    );
                }
                self.archives.join_network(&handle).await?;
                self.hosted_mode(handle, SiteOrigin::Published)
            }
            Plan::Proxy { target } => SiteMode::Proxied { target },
        };

        let app = match &mode {
            SiteMode::Hosted { key, directory, .. } => {
                self.hosts.register(&hostname, key).await?;
                hosted_app(key, directory)
            }
            SiteMode::Proxied { target } => proxied_app(target.as_deref(), self.proxy_client.clone()),
        };
        self.vhosts.mount(&hostname, app, local);

        tracing::info!(hostname = %hostname, mode = ?mode, "Site ready");
        Ok(Site {
            hostname,
            mode,
            source,
        })
    }

    fn hosted_mode(&self, handle: ArchiveHandle, origin: SiteOrigin) -> SiteMode {
        SiteMode::Hosted {
            key: handle.key().clone(),
            directory: handle.path().to_path_buf(),
            origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::FsArchiveManager;
    use crate::config::{NetworkOptions, ProxySetting};
    use crate::error::Error;
    use crate::hosts::{HostsFile, table::LEDGER_FILE};
    use crate::http::proxy_client;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        orchestrator: SiteOrchestrator,
        hosts: Arc<HostTable>,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("work");
        let archives = Arc::new(
            FsArchiveManager::new(&root, &ArchiveOptions::default(), &NetworkOptions::default())
                .unwrap(),
        );
        archives.open().await.unwrap();
        let hosts = Arc::new(HostTable::new(
            Arc::new(HostsFile::new(dir.path().join("hosts"))),
            "127.0.0.1".parse().unwrap(),
            root.join(LEDGER_FILE),
        ));
        let orchestrator = SiteOrchestrator::new(
            archives,
            hosts.clone(),
            Arc::new(VhostTable::new()),
            ArchiveOptions::default(),
            proxy_client(),
        );
        Fixture {
            _dir: dir,
            root,
            orchestrator,
            hosts,
        }
    }

    fn site_dir(root: &std::path::Path, content: &str) -> PathBuf {
        let dir = root.join("site");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.html"), content).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_one_entry_per_hostname() {
        let f = fixture().await;
        let key = ArchiveKey::from_digest(&[3; 32]);
        let mut sites = SiteConfigMap::new();
        sites.insert(
            "m.test".into(),
            SiteConfig {
                url: Some(key.to_url()),
                ..Default::default()
            },
        );
        sites.insert(
            "p.test".into(),
            SiteConfig {
                proxy: Some(ProxySetting::Enabled(true)),
                ..Default::default()
            },
        );
        sites.insert(
            "d.test".into(),
            SiteConfig {
                directory: Some(site_dir(&f.root, "hi")),
                ..Default::default()
            },
        );

        let loaded = f.orchestrator.load_sites(&sites, SiteSource::Local).await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded["m.test"].key(), Some(&key));
        assert_eq!(
            loaded["m.test"].directory(),
            Some(f.root.join(key.as_str()).as_path())
        );
        assert!(matches!(loaded["p.test"].mode, SiteMode::Proxied { target: None }));
        assert!(matches!(
            loaded["d.test"].mode,
            SiteMode::Hosted { origin: SiteOrigin::Published, .. }
        ));

        let ledger = f.hosts.entries().await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(!ledger.contains_key("p.test"));
        assert_eq!(f.orchestrator.vhosts().len(), 3);
    }

    #[tokio::test]
    async fn test_publish_key_is_deterministic() {
        let f = fixture().await;
        let mut sites = SiteConfigMap::new();
        sites.insert(
            "a.test".into(),
            SiteConfig {
                directory: Some(site_dir(&f.root, "same")),
                ..Default::default()
            },
        );

        let first = f.orchestrator.load_sites(&sites, SiteSource::Local).await.unwrap();
        let second = f.orchestrator.load_sites(&sites, SiteSource::Local).await.unwrap();
        assert_eq!(first["a.test"].key(), second["a.test"].key());
        assert_eq!(f.orchestrator.archives().list().len(), 1);
    }

    #[tokio::test]
    async fn test_published_url_reimports_directory() {
        let f = fixture().await;
        let directory = site_dir(&f.root, "v1");
        let mut sites = SiteConfigMap::new();
        sites.insert(
            "a.test".into(),
            SiteConfig {
                directory: Some(directory.clone()),
                ..Default::default()
            },
        );
        let first = f.orchestrator.load_sites(&sites, SiteSource::Local).await.unwrap();
        let old_key = first["a.test"].key().unwrap().clone();

        // The persisted url now points at the published key; new content
        // yields a new key instead of mirroring the old one.
        std::fs::write(directory.join("index.html"), "v2").unwrap();
        sites.get_mut("a.test").unwrap().url = Some(old_key.to_url());
        let second = f.orchestrator.load_sites(&sites, SiteSource::Local).await.unwrap();
        assert_ne!(second["a.test"].key(), Some(&old_key));
        assert!(matches!(
            second["a.test"].mode,
            SiteMode::Hosted { origin: SiteOrigin::Published, .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_site_aborts_before_any_archive() {
        let f = fixture().await;
        let mut sites = SiteConfigMap::new();
        sites.insert(
            "good.test".into(),
            SiteConfig {
                url: Some(ArchiveKey::from_digest(&[4; 32]).to_url()),
                ..Default::default()
            },
        );
        sites.insert(
            "bad_host".into(),
            SiteConfig {
                url: Some(ArchiveKey::from_digest(&[5; 32]).to_url()),
                ..Default::default()
            },
        );

        let err = f.orchestrator.load_sites(&sites, SiteSource::Local).await.unwrap_err();
        assert!(matches!(err, Error::ConfigValidation(ValidationError::InvalidHostname(_))));
        assert!(f.orchestrator.archives().list().is_empty());
    }

    #[tokio::test]
    async fn test_existing_handle_is_reused() {
        let f = fixture().await;
        let key = ArchiveKey::from_digest(&[6; 32]);
        let mut sites = SiteConfigMap::new();
        sites.insert(
            "m.test".into(),
            SiteConfig {
                url: Some(key.to_url()),
                ..Default::default()
            },
        );
        f.orchestrator.load_sites(&sites, SiteSource::Local).await.unwrap();
        let handle = f.orchestrator.archives().get(&key).unwrap();

        f.orchestrator.load_sites(&sites, SiteSource::Local).await.unwrap();
        assert!(f.orchestrator.archives().get(&key).unwrap().same(&handle));
    }
}
