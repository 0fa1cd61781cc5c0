//! Served sites and the registry rebuilt on every start.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::archive::ArchiveKey;

/// A hostname and what backs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Site {
    pub hostname: String,
    pub mode: SiteMode,
    pub source: SiteSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SiteMode {
    /// Served from an archive.
    Hosted {
        key: ArchiveKey,
        directory: PathBuf,
        origin: SiteOrigin,
    },
    /// Forwarded to an upstream, or a placeholder when there is none.
    Proxied { target: Option<String> },
}

/// Where a hosted site's archive came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteOrigin {
    /// Replicated from a `dat://` url.
    Mirror,
    /// Imported from a local directory.
    Published,
}

/// Who declared the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteSource {
    Local,
    SiteList(ArchiveKey),
}

impl Site {
    pub fn key(&self) -> Option<&ArchiveKey> {
        match &self.mode {
            SiteMode::Hosted { key, .. } => Some(key),
            SiteMode::Proxied { .. } => None,
        }
    }

    /// `dat://<key>` for hosted sites.
    pub fn url(&self) -> Option<String> {
        self.key().map(ArchiveKey::to_url)
    }

    pub fn directory(&self) -> Option<&Path> {
        match &self.mode {
            SiteMode::Hosted { directory, .. } => Some(directory),
            SiteMode::Proxied { .. } => None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.source == SiteSource::Local
    }
}

/// Hostname → site.
pub type SiteMap = BTreeMap<String, Site>;

/// Every site served by one run of the host.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub local: SiteMap,
    pub federated: BTreeMap<ArchiveKey, SiteMap>,
    /// Archive publishing the local site map to peers.
    pub peer_archive: Option<ArchiveKey>,
}

impl Registry {
    /// Local sites, then federated ones. A hostname declared locally shadows
    /// the same hostname from any site-list.
    pub fn sites(&self) -> impl Iterator<Item = &Site> {
        let federated = self
            .federated
            .values()
            .flat_map(|m| m.values())
            .filter(|s| !self.local.contains_key(&s.hostname));
        self.local.values().chain(federated)
    }

    /// Archive keys the current registry depends on.
    pub fn referenced_keys(&self) -> BTreeSet<ArchiveKey> {
        self.local
            .values()
            .chain(self.federated.values().flat_map(|m| m.values()))
            .filter_map(Site::key)
            .chain(self.federated.keys())
            .chain(self.peer_archive.iter())
            .cloned()
            .collect()
    }

    /// Whether `hostname` is served from an archive. Only such names need a
    /// host entry; proxied names never had one registered.
    pub fn serves_hosted(&self, hostname: &str) -> bool {
        self.sites()
            .any(|s| s.hostname == hostname && s.key().is_some())
    }

    pub fn len(&self) -> usize {
        self.sites().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosted(hostname: &str, byte: u8, source: SiteSource) -> Site {
        Site {
            hostname: hostname.into(),
            mode: SiteMode::Hosted {
                key: ArchiveKey::from_digest(&[byte; 32]),
                directory: PathBuf::from("/srv"),
                origin: SiteOrigin::Mirror,
            },
            source,
        }
    }

    #[test]
    fn test_referenced_keys() {
        let list = ArchiveKey::from_digest(&[9; 32]);
        let mut registry = Registry::default();
        registry.local.insert("a.test".into(), hosted("a.test", 1, SiteSource::Local));
        registry.local.insert(
            "p.test".into(),
            Site {
                hostname: "p.test".into(),
                mode: SiteMode::Proxied { target: None },
                source: SiteSource::Local,
            },
        );
        registry.federated.insert(
            list.clone(),
            SiteMap::from([(
                "b.test".into(),
                hosted("b.test", 2, SiteSource::SiteList(list.clone())),
            )]),
        );

        let keys = registry.referenced_keys();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&list));
        assert!(registry.serves_hosted("b.test"));
        assert!(!registry.serves_hosted("p.test"));
        assert!(!registry.serves_hosted("c.test"));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_local_shadows_federated() {
        let list = ArchiveKey::from_digest(&[9; 32]);
        let mut registry = Registry::default();
        registry.local.insert("a.test".into(), hosted("a.test", 1, SiteSource::Local));
        registry.federated.insert(
            list.clone(),
            SiteMap::from([(
                "a.test".into(),
                hosted("a.test", 2, SiteSource::SiteList(list)),
            )]),
        );

        let sites: Vec<_> = registry.sites().collect();
        assert_eq!(sites.len(), 1);
        assert!(sites[0].is_local());
        // The shadowed archive is still loaded, so it stays referenced.
        assert!(registry
            .referenced_keys()
            .contains(&ArchiveKey::from_digest(&[2; 32])));
    }
}
