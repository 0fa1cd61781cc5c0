//! Sites and their reconciliation.
//!
//! # Data Flow
//! ```text
//! SiteConfigMap (persisted) ──orchestrator.rs──▶ SiteMap (derived)
//!                                 │
//!                                 ├─▶ ArchiveManager (create / import / join)
//!                                 ├─▶ HostTable (hosted sites only)
//!                                 └─▶ VhostTable (every site)
//! ```

pub mod orchestrator;
pub mod types;

pub use orchestrator::SiteOrchestrator;
pub use types::{Registry, Site, SiteMap, SiteMode, SiteOrigin, SiteSource};
