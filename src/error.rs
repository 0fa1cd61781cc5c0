//! Crate-wide error type.
//!
//! Every subsystem owns a narrow error enum; `Error` folds them into the
//! taxonomy the host reports to its caller (validation, persistence, network,
//! cleanup) plus the lifecycle and listener failures.

use std::fmt;

use thiserror::Error;

use crate::archive::{ArchiveError, NetworkError};
use crate::config::store::StoreError;
use crate::config::validation::ValidationError;
use crate::hosts::HostsError;
use crate::lifecycle::LifecycleState;

/// Errors surfaced by the site host.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed hostname/URL/key or a site without any backing.
    #[error("invalid config: {0}")]
    ConfigValidation(#[from] ValidationError),

    /// Config store read/write failure.
    #[error("config store error: {0}")]
    Persistence(#[from] StoreError),

    /// Manifest fetch or network join failure.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Archive create/import/registry failure.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Host-resolution file failure.
    #[error("hosts error: {0}")]
    Hosts(#[from] HostsError),

    /// One or more garbage collection steps failed.
    #[error("cleanup failed: {}", join(.0))]
    ResourceCleanup(Vec<CleanupFailure>),

    /// Failed to bind or run the HTTP listener.
    #[error("listener error: {0}")]
    Listener(#[source] std::io::Error),

    /// Lifecycle method called from a state that does not allow it.
    #[error("cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: LifecycleState,
    },

    /// Several independent steps failed (teardown).
    #[error("{} errors: {}", .0.len(), join(.0))]
    Aggregate(Vec<Error>),
}

/// Result type for site host operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Collapse a list of errors: none is `Ok`, one is itself, more aggregate.
    pub fn from_many(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Aggregate(errors)),
        }
    }
}

/// A single failed cleanup step for an archive key or hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    /// Archive key or hostname the step was acting on.
    pub target: String,
    /// Step that failed (`close`, `forget`, `delete`, `unhost`).
    pub stage: &'static str,
    pub reason: String,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.stage, self.target, self.reason)
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
