//! Garbage collection of unreferenced archives and host entries.
//!
//! # Data Flow
//! ```text
//! live handles − Registry::referenced_keys() = orphan keys
//!     → per key, concurrently: close → forget → rm -r <directory>/<key>
//!     → ledger hostnames backed by an orphan and no longer served → unhost
//! ```
//!
//! Runs after the registry is fully populated and before the listener binds.

pub mod collector;

pub use collector::{CleanupReport, GarbageCollector};
