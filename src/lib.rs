//! peerhost: serve many peer-replicated websites from one machine.
//!
//! Sites are declared in a small JSON record (`sites` and `sitelists`). Each
//! start reconciles that record against live archives, virtual hosts and the
//! local hosts file, then collects whatever is no longer referenced.

// Core subsystems
pub mod archive;
pub mod config;
pub mod federation;
pub mod gc;
pub mod site;

// Serving
pub mod hosts;
pub mod http;
pub mod routing;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use archive::{ArchiveKey, ArchiveManager, FsArchiveManager};
pub use config::{HostOptions, SiteConfig};
pub use error::{Error, Result};
pub use lifecycle::{LifecycleState, SiteHost};
pub use site::{Registry, Site, SiteMode, SiteSource};
