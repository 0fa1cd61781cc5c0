//! Site-list resolution.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::{join_all, try_join_all};
use serde::Deserialize;

use crate::archive::{ArchiveKey, ArchiveManager, NetworkError};
use crate::config::{ArchiveOptions, SiteConfigMap, ValidationError};
use crate::error::{Error, Result};
use crate::site::{SiteMap, SiteOrchestrator, SiteSource};

/// The manifest of a site-list archive.
#[derive(Debug, Default, Deserialize)]
pub struct SiteManifest {
    #[serde(default)]
    pub sites: SiteConfigMap,
}

/// Resolves site-list keys into federated sites.
pub struct FederationResolver {
    archives: Arc<dyn ArchiveManager>,
    orchestrator: Arc<SiteOrchestrator>,
    options: ArchiveOptions,
    skip_failed: bool,
}

impl FederationResolver {
    pub fn new(
        orchestrator: Arc<SiteOrchestrator>,
        options: ArchiveOptions,
        skip_failed: bool,
    ) -> Self {
        Self {
            archives: Arc::clone(orchestrator.archives()),
            orchestrator,
            options,
            skip_failed,
        }
    }

    /// Resolve every site-list concurrently.
    ///
    /// By default the first failing list fails the call. With `skip_failed`
    /// a failing list is logged and contributes no sites.
    pub async fn resolve(&self, sitelists: &[String]) -> Result<BTreeMap<ArchiveKey, SiteMap>> {
        let mut keys = Vec::new();
        for link in sitelists {
            let key = ArchiveKey::from_link(link)
                .map_err(|_| ValidationError::InvalidSiteList(link.clone()))?;
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let resolved: BTreeMap<ArchiveKey, SiteMap> = if self.skip_failed {
            join_all(keys.into_iter().map(|key| async move {
                match self.resolve_one(&key).await {
                    Ok(sites) => Some((key, sites)),
                    Err(e) => {
                        tracing::warn!(sitelist = %key, error = %e, "Skipping site-list");
                        None
                    }
                }
            }))
            .await
            .into_iter()
            .flatten()
            .collect()
        } else {
            try_join_all(keys.into_iter().map(|key| async move {
                let sites = self.resolve_one(&key).await?;
                Ok::<_, Error>((key, sites))
            }))
            .await?
            .into_iter()
            .collect()
        };
        Ok(resolved)
    }

    /// open → join → read manifest → load, in order.
    async fn resolve_one(&self, key: &ArchiveKey) -> Result<SiteMap> {
        let handle = match self.archives.get(key) {
            Some(handle) => handle,
            None => {
                self.archives
                    .create(
                        &self.archives.storage_dir(key),
                        self.options.sitelist(key.clone()),
                    )
                    .await?
            }
        };
        self.archives.join_network(&handle).await?;

        let manifest = self.archives.read_manifest(&handle).await?;
        let manifest: SiteManifest =
            serde_json::from_value(manifest).map_err(|source| NetworkError::InvalidManifest {
                key: key.clone(),
                source,
            })?;
        tracing::info!(sitelist = %key, sites = manifest.sites.len(), "Resolved site-list");

        self.orchestrator
            .load_sites(&manifest.sites, SiteSource::SiteList(key.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::FsArchiveManager;
    use crate::config::NetworkOptions;
    use crate::hosts::{HostTable, NoopResolver};
    use crate::http::{proxy_client, VhostTable};

    fn resolver(root: &std::path::Path, skip_failed: bool) -> (FederationResolver, Arc<FsArchiveManager>) {
        let archives = Arc::new(
            FsArchiveManager::new(root, &ArchiveOptions::default(), &NetworkOptions::default())
                .unwrap(),
        );
        let hosts = Arc::new(HostTable::new(
            Arc::new(NoopResolver),
            "127.0.0.1".parse().unwrap(),
            root.join("hosts.json"),
        ));
        let orchestrator = Arc::new(SiteOrchestrator::new(
            archives.clone(),
            hosts,
            Arc::new(VhostTable::new()),
            ArchiveOptions::default(),
            proxy_client(),
        ));
        (
            FederationResolver::new(orchestrator, ArchiveOptions::default(), skip_failed),
            archives,
        )
    }

    fn seed_manifest(root: &std::path::Path, list: &ArchiveKey, body: &str) {
        let dir = root.join(list.as_str());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("dat.json"), body).unwrap();
    }

    #[tokio::test]
    async fn test_resolves_sites_from_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, archives) = resolver(dir.path(), false);
        archives.open().await.unwrap();

        let list = ArchiveKey::from_digest(&[0x11; 32]);
        let site = ArchiveKey::from_digest(&[0x22; 32]);
        seed_manifest(
            dir.path(),
            &list,
            &format!(r#"{{"sites": {{"b.test": {{"url": "{}"}}}}}}"#, site.to_url()),
        );

        // The same list given twice, once as a url.
        let resolved = resolver
            .resolve(&[list.to_string(), list.to_url()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        let b = &resolved[&list]["b.test"];
        assert_eq!(b.key(), Some(&site));
        assert_eq!(b.source, SiteSource::SiteList(list.clone()));
        assert!(archives.get(&list).unwrap().is_sparse());
    }

    #[tokio::test]
    async fn test_unreachable_list_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, archives) = resolver(dir.path(), false);
        archives.open().await.unwrap();

        let missing = ArchiveKey::from_digest(&[0x33; 32]);
        let err = resolver.resolve(&[missing.to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::Network(NetworkError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_unreachable_list_skipped_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, archives) = resolver(dir.path(), true);
        archives.open().await.unwrap();

        let good = ArchiveKey::from_digest(&[0x44; 32]);
        seed_manifest(dir.path(), &good, r#"{"sites": {}}"#);
        let missing = ArchiveKey::from_digest(&[0x55; 32]);

        let resolved = resolver
            .resolve(&[good.to_string(), missing.to_string()])
            .await
            .unwrap();
        assert_eq!(resolved.keys().collect::<Vec<_>>(), vec![&good]);
    }

    #[tokio::test]
    async fn test_invalid_list_key() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, _) = resolver(dir.path(), false);
        let err = resolver.resolve(&["nope".to_string()]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ConfigValidation(ValidationError::InvalidSiteList(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, archives) = resolver(dir.path(), false);
        archives.open().await.unwrap();
        let list = ArchiveKey::from_digest(&[0x66; 32]);
        seed_manifest(dir.path(), &list, r#"{"sites": ["not", "a", "map"]}"#);

        let err = resolver.resolve(&[list.to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::Network(NetworkError::InvalidManifest { .. })));
    }
}
