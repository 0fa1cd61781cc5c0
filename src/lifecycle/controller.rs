//! The site host: lifecycle sequencing and management operations.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::future::join_all;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};

use crate::archive::{ArchiveError, ArchiveKey, ArchiveManager, FsArchiveManager};
use crate::archive::import::{IGNORE_FILE, MANIFEST_FILE};
use crate::config::store::{bootstrap, read_sitelists, read_sites, write_sitelists, write_sites};
use crate::config::{
    validate_site_cfg, ConfigStore, HostOptions, JsonFileStore, SiteConfig, ValidationError,
};
use crate::error::{Error, Result};
use crate::federation::FederationResolver;
use crate::gc::GarbageCollector;
use crate::hosts::table::LEDGER_FILE;
use crate::hosts::{HostResolver, HostTable, HostsFile, NoopResolver};
use crate::http::{proxy_client, HttpServer, RunningServer, VhostTable};
use crate::lifecycle::watch::{ChangeWatcher, RestartReason};
use crate::lifecycle::LifecycleState;
use crate::observability::metrics;
use crate::site::{Registry, SiteMap, SiteOrchestrator, SiteSource};

/// Ignore rules of the peer-publishing archive: only the top-level manifest.
const PEER_IGNORE: &str = "*\n**/*\n!dat.json\n";

#[derive(Default)]
struct Inner {
    state: LifecycleState,
    vhosts: Option<Arc<VhostTable>>,
    server: Option<RunningServer>,
    watcher: Option<ChangeWatcher>,
}

/// Hosts every configured site from one process.
pub struct SiteHost {
    options: HostOptions,
    store: Arc<dyn ConfigStore>,
    archives: Arc<dyn ArchiveManager>,
    hosts: Arc<HostTable>,
    registry: ArcSwap<Registry>,
    inner: Mutex<Inner>,
    config_lock: Mutex<()>,
    restart_tx: mpsc::UnboundedSender<RestartReason>,
    restart_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<RestartReason>>>,
}

/// Builds a [`SiteHost`], optionally with alternative collaborators.
pub struct SiteHostBuilder {
    options: HostOptions,
    store: Option<Arc<dyn ConfigStore>>,
    archives: Option<Arc<dyn ArchiveManager>>,
    resolver: Option<Arc<dyn HostResolver>>,
}

impl SiteHostBuilder {
    pub fn store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn archives(mut self, archives: Arc<dyn ArchiveManager>) -> Self {
        self.archives = Some(archives);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Result<SiteHost> {
        let options = self.options;
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(JsonFileStore::new(&options.config_path)),
        };
        let archives = match self.archives {
            Some(archives) => archives,
            None => Arc::new(FsArchiveManager::new(
                &options.directory,
                &options.archive,
                &options.network,
            )?),
        };
        let resolver: Arc<dyn HostResolver> = match self.resolver {
            Some(resolver) => resolver,
            None if options.hosts.enabled => Arc::new(HostsFile::new(&options.hosts.path)),
            None => Arc::new(NoopResolver),
        };
        let hosts = Arc::new(HostTable::new(
            resolver,
            options.hosts.ip,
            options.directory.join(LEDGER_FILE),
        ));
        let (restart_tx, restart_rx) = mpsc::unbounded_channel();

        Ok(SiteHost {
            options,
            store,
            archives,
            hosts,
            registry: ArcSwap::from_pointee(Registry::default()),
            inner: Mutex::new(Inner::default()),
            config_lock: Mutex::new(()),
            restart_tx,
            restart_rx: std::sync::Mutex::new(Some(restart_rx)),
        })
    }
}

impl SiteHost {
    pub fn new(options: HostOptions) -> Result<Self> {
        Self::builder(options).build()
    }

    pub fn builder(options: HostOptions) -> SiteHostBuilder {
        SiteHostBuilder {
            options,
            store: None,
            archives: None,
            resolver: None,
        }
    }

    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    /// Sites of the current run. Empty while stopped.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.load_full()
    }

    pub async fn state(&self) -> LifecycleState {
        self.inner.lock().await.state
    }

    /// Address the listener is bound to while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .lock()
            .await
            .server
            .as_ref()
            .map(RunningServer::local_addr)
    }

    /// Restart requests from the change watcher. Can be taken once.
    pub fn take_restart_requests(&self) -> Option<mpsc::UnboundedReceiver<RestartReason>> {
        self.restart_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Ask the owner of the restart receiver to restart.
    pub fn request_restart(&self, reason: RestartReason) {
        let _ = self.restart_tx.send(reason);
    }

    // --- lifecycle -------------------------------------------------------

    /// Build the registry: bootstrap the store, open archives, load local and
    /// federated sites, persist derived fields, publish to peers.
    pub async fn init(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.init_locked(&mut inner).await
    }

    /// `init` if needed, collect garbage, bind the listener.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.start_locked(&mut inner).await
    }

    /// Release the watcher, then close archives and the listener.
    pub async fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner).await
    }

    /// `stop` then `start`, with nothing in between.
    pub async fn restart(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        tracing::info!("Restarting");
        self.stop_locked(&mut inner).await?;
        self.start_locked(&mut inner).await
    }

    async fn init_locked(&self, inner: &mut Inner) -> Result<()> {
        if inner.state != LifecycleState::Stopped {
            return Err(Error::InvalidTransition {
                operation: "init",
                state: inner.state,
            });
        }

        match self.build_registry().await {
            Ok((registry, vhosts)) => {
                tracing::info!(
                    local = registry.local.len(),
                    sitelists = registry.federated.len(),
                    sites = registry.len(),
                    mounts = vhosts.len(),
                    "Initialized"
                );
                tracing::debug!(hostnames = ?vhosts.hostnames(), "Mounted sites");
                self.registry.store(Arc::new(registry));
                inner.vhosts = Some(vhosts);
                inner.state = LifecycleState::Initialized;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Initialization failed");
                self.close_archives().await;
                Err(e)
            }
        }
    }

    async fn start_locked(&self, inner: &mut Inner) -> Result<()> {
        match inner.state {
            LifecycleState::Running => {
                return Err(Error::InvalidTransition {
                    operation: "start",
                    state: inner.state,
                })
            }
            LifecycleState::Stopped => self.init_locked(inner).await?,
            LifecycleState::Initialized => {}
        }

        let registry = self.registry.load_full();
        GarbageCollector::new(Arc::clone(&self.archives), Arc::clone(&self.hosts))
            .clean(&registry)
            .await?;

        let vhosts = inner.vhosts.clone().unwrap_or_default();
        let server = HttpServer::new(
            &vhosts,
            Duration::from_secs(self.options.request_timeout_secs),
        )
        .spawn((self.options.bind_address.as_str(), self.options.port))
        .await
        .map_err(Error::Listener)?;
        inner.server = Some(server);
        inner.state = LifecycleState::Running;

        if self.options.watch {
            let sitelists: Vec<_> = registry
                .federated
                .keys()
                .filter_map(|key| self.archives.get(key))
                .collect();
            match ChangeWatcher::start(&self.options.config_path, &sitelists, self.restart_tx.clone()) {
                Ok(watcher) => inner.watcher = Some(watcher),
                Err(e) => tracing::warn!(error = %e, "Change watcher unavailable"),
            }
        }

        tracing::info!(sites = registry.len(), "Started");
        Ok(())
    }

    async fn stop_locked(&self, inner: &mut Inner) -> Result<()> {
        if inner.state == LifecycleState::Stopped {
            return Ok(());
        }
        if let Some(watcher) = inner.watcher.take() {
            watcher.close();
        }

        let server = inner.server.take();
        let close_server = async move {
            match server {
                Some(server) => server.close().await.map_err(Error::Listener),
                None => Ok(()),
            }
        };
        let handles = self.archives.list();
        let close_archives = join_all(handles.iter().map(|h| self.archives.close(h.key())));
        let (server_result, archive_results) = tokio::join!(close_server, close_archives);

        let mut errors: Vec<Error> = archive_results
            .into_iter()
            .filter_map(|r| r.err().map(Error::from))
            .collect();
        if let Err(e) = server_result {
            errors.push(e);
        }

        inner.vhosts = None;
        inner.state = LifecycleState::Stopped;
        self.registry.store(Arc::new(Registry::default()));
        tracing::info!(archives = handles.len(), "Stopped");
        Error::from_many(errors)
    }

    async fn close_archives(&self) {
        for handle in self.archives.list() {
            if let Err(e) = self.archives.close(handle.key()).await {
                tracing::warn!(key = %handle.key(), error = %e, "Failed to close archive");
            }
        }
    }

    async fn build_registry(&self) -> Result<(Registry, Arc<VhostTable>)> {
        bootstrap(self.store.as_ref()).await?;
        self.archives.open().await?;
        let sites = read_sites(self.store.as_ref()).await?;
        let sitelists = read_sitelists(self.store.as_ref()).await?;

        let vhosts = Arc::new(VhostTable::new());
        let orchestrator = Arc::new(SiteOrchestrator::new(
            Arc::clone(&self.archives),
            Arc::clone(&self.hosts),
            Arc::clone(&vhosts),
            self.options.archive.clone(),
            proxy_client(),
        ));
        let federation = FederationResolver::new(
            Arc::clone(&orchestrator),
            self.options.archive.clone(),
            self.options.network.skip_failed_sitelists,
        );

        let (local, federated) = tokio::try_join!(
            orchestrator.load_sites(&sites, SiteSource::Local),
            federation.resolve(&sitelists),
        )?;

        self.persist_derived(&local).await?;
        let peer_archive = if self.options.peersites {
            Some(self.publish_peer_sites(&local).await?)
        } else {
            None
        };

        metrics::record_sites_loaded(
            local.len(),
            federated.values().map(BTreeMap::len).sum(),
        );
        Ok((
            Registry {
                local,
                federated,
                peer_archive,
            },
            vhosts,
        ))
    }

    /// Write `url` and `key` of hosted local sites back to the store.
    async fn persist_derived(&self, local: &SiteMap) -> Result<()> {
        let _guard = self.config_lock.lock().await;
        let mut sites = read_sites(self.store.as_ref()).await?;
        let mut changed = Vec::new();
        for (hostname, config) in sites.iter_mut() {
            let Some(site) = local.get(&hostname.to_ascii_lowercase()) else {
                continue;
            };
            let Some(key) = site.key() else {
                continue;
            };
            let url = key.to_url();
            if config.url.as_deref() != Some(url.as_str())
                || config.key.as_deref() != Some(key.as_str())
            {
                config.url = Some(url);
                config.key = Some(key.to_string());
                changed.push(hostname.clone());
            }
        }
        if !changed.is_empty() {
            write_sites(self.store.as_ref(), &sites).await?;
            tracing::debug!(sites = ?changed, "Persisted derived site fields");
        }
        Ok(())
    }

    /// Publish the hosted local sites as a site-list archive rooted at the
    /// working directory.
    async fn publish_peer_sites(&self, local: &SiteMap) -> Result<ArchiveKey> {
        let directory = &self.options.directory;
        let sites: BTreeMap<&str, serde_json::Value> = local
            .values()
            .filter_map(|site| site.url().map(|url| (site.hostname.as_str(), json!({ "url": url }))))
            .collect();
        let manifest = serde_json::to_vec_pretty(&json!({ "sites": sites }))
            .map_err(std::io::Error::other)
            .map_err(|source| ArchiveError::Io {
                path: directory.join(MANIFEST_FILE),
                source,
            })?;

        for (name, bytes) in [(MANIFEST_FILE, manifest), (IGNORE_FILE, PEER_IGNORE.as_bytes().to_vec())] {
            let path = directory.join(name);
            tokio::fs::write(&path, bytes)
                .await
                .map_err(|source| ArchiveError::Io { path, source })?;
        }

        let handle = self
            .archives
            .create(directory, self.options.archive.publish())
            .await?;
        if handle.is_writable() {
            self.archives.import_files(&handle).await?;
        }
        self.archives.join_network(&handle).await?;
        tracing::info!(url = %handle.key().to_url(), sites = sites.len(), "Publishing site list to peers");
        Ok(handle.key().clone())
    }

    // --- management ------------------------------------------------------

    /// Add or update a local site. `key` may be a raw key or a `dat://` url.
    /// Takes effect on the next start.
    pub async fn add_site(&self, hostname: &str, key: Option<&str>, options: SiteConfig) -> Result<()> {
        let hostname = hostname.to_ascii_lowercase();
        let _guard = self.config_lock.lock().await;
        let mut sites = read_sites(self.store.as_ref()).await?;

        let mut entry = sites.get(&hostname).cloned().unwrap_or_default();
        if options.url.is_some() && options.key.is_none() {
            entry.key = None;
        }
        entry.merge(options);
        if let Some(link) = key {
            let key = ArchiveKey::from_link(link).map_err(|_| ValidationError::InvalidUrl {
                hostname: hostname.clone(),
                url: link.to_string(),
            })?;
            entry.url = Some(key.to_url());
            entry.key = Some(key.to_string());
        }
        validate_site_cfg(&hostname, &entry)?;

        sites.insert(hostname.clone(), entry);
        write_sites(self.store.as_ref(), &sites).await?;
        tracing::info!(hostname = %hostname, "Site added");
        Ok(())
    }

    /// Remove a local site. Absent sites are ignored.
    pub async fn remove_site(&self, hostname: &str) -> Result<()> {
        let hostname = hostname.to_ascii_lowercase();
        let _guard = self.config_lock.lock().await;
        let mut sites = read_sites(self.store.as_ref()).await?;
        if sites.remove(&hostname).is_some() {
            write_sites(self.store.as_ref(), &sites).await?;
            tracing::info!(hostname = %hostname, "Site removed");
        }
        Ok(())
    }

    /// Subscribe to a site-list. Adding one twice keeps a single entry.
    pub async fn add_site_list(&self, link: &str) -> Result<()> {
        let key = ArchiveKey::from_link(link)
            .map_err(|_| ValidationError::InvalidSiteList(link.to_string()))?;
        let _guard = self.config_lock.lock().await;
        let mut sitelists = read_sitelists(self.store.as_ref()).await?;
        if sitelists.iter().any(|s| same_list(s, &key)) {
            return Ok(());
        }
        sitelists.push(key.to_string());
        write_sitelists(self.store.as_ref(), &sitelists).await?;
        tracing::info!(sitelist = %key, "Site-list added");
        Ok(())
    }

    /// Unsubscribe from a site-list. Absent lists are ignored.
    pub async fn remove_site_list(&self, link: &str) -> Result<()> {
        let key = ArchiveKey::from_link(link)
            .map_err(|_| ValidationError::InvalidSiteList(link.to_string()))?;
        let _guard = self.config_lock.lock().await;
        let mut sitelists = read_sitelists(self.store.as_ref()).await?;
        let before = sitelists.len();
        sitelists.retain(|s| !same_list(s, &key));
        if sitelists.len() != before {
            write_sitelists(self.store.as_ref(), &sitelists).await?;
            tracing::info!(sitelist = %key, "Site-list removed");
        }
        Ok(())
    }
}

fn same_list(stored: &str, key: &ArchiveKey) -> bool {
    ArchiveKey::from_link(stored).is_ok_and(|k| &k == key)
}
