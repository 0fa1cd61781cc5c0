//! Federation: sites declared by remote site-list archives.
//!
//! # Data Flow
//! ```text
//! sitelists (persisted keys)
//!     → resolver.rs, per key: sparse archive → join → dat.json → SiteManifest
//!     → SiteOrchestrator::load_sites(.., SiteSource::SiteList(key))
//!     → sitelist key → SiteMap
//! ```
//!
//! Federated sites are never persisted; they are recomputed on every start.

pub mod resolver;

pub use resolver::{FederationResolver, SiteManifest};
