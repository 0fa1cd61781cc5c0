//! Resilience helpers for replication traffic.
//!
//! # Data Flow
//! ```text
//! Gateway request:
//!     → request timeout (network.timeout_secs, optional)
//!     → On failure: retries.rs (classify), backoff.rs (delay with jitter)
//!     → Next gateway once attempts are exhausted
//! ```
//!
//! # Design Decisions
//! - No deadline by default; a manifest that never arrives blocks start
//! - Retries only for transient failures

pub mod backoff;
pub mod retries;
