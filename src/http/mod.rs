//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → vhost.rs (dispatch on Host header)
//!     → site_app.rs (well-known, static files, listing, or proxy)
//!     → Send to client
//! ```

pub mod request;
pub mod server;
pub mod site_app;
pub mod vhost;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{HttpServer, RunningServer};
pub use site_app::{hosted_app, proxied_app, proxy_client, ProxyClient};
pub use vhost::VhostTable;
