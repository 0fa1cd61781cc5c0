//! Configuration schema definitions.
//!
//! Two kinds of configuration live here:
//! - `HostOptions`: process options, read once from a TOML file at startup.
//! - `ConfigRecord` / `SiteConfig`: the persisted JSON record of sites and
//!   site-lists that the management commands edit.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::archive::{ArchiveKey, CreateOptions};

/// Default location of the persisted site record.
pub const DEFAULT_CONFIG_PATH: &str = "~/.peerhost.json";

/// Default working area for archives.
pub const DEFAULT_DIRECTORY: &str = "~/.peerhost";

/// Root options for a site host.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HostOptions {
    /// JSON record holding `sites` and `sitelists`.
    pub config_path: PathBuf,

    /// Working area: archive storage, archive registry, host ledger.
    pub directory: PathBuf,

    /// Publish the local site map as an archive of its own.
    pub peersites: bool,

    /// Address the HTTP listener binds to.
    pub bind_address: String,

    /// HTTP listener port.
    pub port: u16,

    /// Restart when the config record or a site-list archive changes.
    pub watch: bool,

    /// Per-request timeout for hosted sites.
    pub request_timeout_secs: u64,

    pub archive: ArchiveOptions,

    pub network: NetworkOptions,

    pub hosts: HostsConfig,

    pub observability: ObservabilityConfig,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            directory: PathBuf::from(DEFAULT_DIRECTORY),
            peersites: false,
            bind_address: "0.0.0.0".to_string(),
            port: 80,
            watch: false,
            request_timeout_secs: 30,
            archive: ArchiveOptions::default(),
            network: NetworkOptions::default(),
            hosts: HostsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Archive creation defaults.
///
/// Never mutated after load; each site builds its own `CreateOptions` from it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ArchiveOptions {
    /// Open mirrored site archives metadata-only.
    pub sparse: bool,

    /// Extra ignore patterns applied to every import, after `.datignore`.
    pub ignore: Vec<String>,
}

impl ArchiveOptions {
    /// Fresh options for a mirrored archive at `key`.
    pub fn mirror(&self, key: ArchiveKey) -> CreateOptions {
        CreateOptions {
            key: Some(key),
            sparse: self.sparse,
        }
    }

    /// Fresh options for a metadata-only site-list archive.
    pub fn sitelist(&self, key: ArchiveKey) -> CreateOptions {
        CreateOptions {
            key: Some(key),
            sparse: true,
        }
    }

    /// Fresh options for an archive created by importing a local directory.
    pub fn publish(&self) -> CreateOptions {
        CreateOptions {
            key: None,
            sparse: false,
        }
    }
}

/// Replication settings.
///
/// Archives are fetched from HTTP gateways laid out as `<gateway>/<key>/...`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkOptions {
    /// Gateway base URLs, tried in order.
    pub gateways: Vec<String>,

    /// Per-request timeout. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,

    /// How often joined site-list archives re-check their manifest (0 = never).
    pub poll_interval_secs: u64,

    /// Attempts per gateway request.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Log and skip site-lists whose manifest cannot be read instead of
    /// failing startup.
    pub skip_failed_sitelists: bool,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            gateways: Vec::new(),
            timeout_secs: None,
            poll_interval_secs: 60,
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5000,
            skip_failed_sitelists: false,
        }
    }
}

/// Host-resolution file settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HostsConfig {
    /// Edit the hosts file at all.
    pub enabled: bool,

    /// Hosts file to edit.
    pub path: PathBuf,

    /// Address hosted names resolve to.
    pub ip: IpAddr,
}

impl Default for HostsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("/etc/hosts"),
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Persisted record names.
pub const SITES_RECORD: &str = "sites";
pub const SITELISTS_RECORD: &str = "sitelists";

/// Configured sites keyed by hostname.
pub type SiteConfigMap = BTreeMap<String, SiteConfig>;

/// The persisted configuration record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigRecord {
    pub sites: SiteConfigMap,
    pub sitelists: Vec<String>,
}

/// One site as written in the config record or a site-list manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SiteConfig {
    /// `dat://<key>` link of a mirrored archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Local directory to publish, or to mirror into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Forward requests instead of serving an archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxySetting>,

    /// Content address, derived from `url` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl SiteConfig {
    /// Overlay the fields set in `other`.
    pub fn merge(&mut self, other: SiteConfig) {
        if other.url.is_some() {
            self.url = other.url;
        }
        if other.directory.is_some() {
            self.directory = other.directory;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.key.is_some() {
            self.key = other.key;
        }
    }

    pub fn is_proxy(&self) -> bool {
        self.proxy.as_ref().is_some_and(ProxySetting::is_enabled)
    }
}

/// `"proxy": true` or `"proxy": "127.0.0.1:3000"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ProxySetting {
    Enabled(bool),
    Target(String),
}

impl ProxySetting {
    pub fn is_enabled(&self) -> bool {
        match self {
            ProxySetting::Enabled(on) => *on,
            ProxySetting::Target(_) => true,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            ProxySetting::Target(t) => Some(t),
            ProxySetting::Enabled(_) => None,
        }
    }
}
