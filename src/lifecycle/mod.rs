//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! start (controller.rs):
//!     init: bootstrap store → open archives
//!           → { local sites ‖ site-lists } → persist derived → peer publish
//!     → garbage collection → bind listener → watcher (watch.rs)
//!
//! stop:
//!     watcher off → { close archives ‖ close listener }
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → stop and exit
//!     SIGHUP, watcher events → restart
//! ```
//!
//! # Design Decisions
//! - One async mutex serializes every transition; `restart` holds it throughout
//! - Management operations only edit the store; a restart applies them
//! - A failed `init` releases what it opened and leaves the host stopped

pub mod controller;
pub mod shutdown;
pub mod signals;
pub mod state;
pub mod watch;

pub use controller::{SiteHost, SiteHostBuilder};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::{next_signal, SignalEvent};
pub use state::LifecycleState;
pub use watch::{ChangeWatcher, RestartReason};
