//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! options file (TOML) + PEERHOST_* env
//!     → loader.rs (parse, env overrides, ~ expansion)
//!     → validation.rs (semantic checks)
//!     → HostOptions (validated, immutable)
//!
//! config record (JSON, via store.rs)
//!     → { sites, sitelists } read at every start
//!     → validation.rs per site, inside the orchestrator
//!     ← management commands (read-modify-write)
//!
//! watcher.rs detects record changes → restart request
//! ```
//!
//! # Design Decisions
//! - Options are immutable once loaded; changes require a restart
//! - The record is the only durable state; registries are rebuilt per start
//! - Absent records default to empty structures

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use schema::{
    ArchiveOptions, ConfigRecord, HostOptions, HostsConfig, NetworkOptions, ObservabilityConfig,
    ProxySetting, SiteConfig, SiteConfigMap,
};
pub use store::{ConfigStore, JsonFileStore, StoreError};
pub use validation::{validate_site_cfg, ValidationError};
