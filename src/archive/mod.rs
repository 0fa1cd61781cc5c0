//! Content-addressed archive subsystem.
//!
//! # Data Flow
//! ```text
//! directory ──import.rs──▶ sha-256 key ──▶ FsArchiveManager registry
//!                                              │
//!                      dat://<key> ◀──────────┘
//!                           │
//!   gateways ──network.rs──▶ <directory>/<key>/  (mirrors, site-lists)
//! ```
//!
//! # Design Decisions
//! - The core only holds `ArchiveHandle`s and talks to `ArchiveManager`
//! - Keys are validated once, at the edge, into `ArchiveKey`
//! - Replication runs as tasks owned by the handle and stops on `close`

pub mod fs;
pub mod handle;
pub mod import;
pub mod key;
pub mod manager;
pub mod network;

pub use fs::FsArchiveManager;
pub use handle::{ArchiveHandle, CreateOptions};
pub use key::{ArchiveKey, InvalidKey};
pub use manager::{ArchiveError, ArchiveManager, ImportSummary};
pub use network::{GatewayClient, NetworkError};
