//! Host-based request routing.
//!
//! # Data Flow
//! ```text
//! Request → matcher.rs (normalize Host) → VhostTable lookup → site sub-app
//! ```

pub mod matcher;

pub use matcher::{normalize_host, request_host};
