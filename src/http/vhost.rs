//! Virtual hosting: one sub-application per hostname.
//!
//! # Design Decisions
//! - Dispatch on the `Host` header, port stripped, case-insensitive
//! - A locally declared hostname is never replaced by a federated one
//! - Unknown hosts get a plain 404

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tower::ServiceExt;

use crate::http::request::RequestIdExt;
use crate::observability::metrics;
use crate::routing::matcher::request_host;

#[derive(Clone)]
struct Mount {
    local: bool,
    app: Router,
}

/// Hostname → mounted sub-application.
#[derive(Default)]
pub struct VhostTable {
    mounts: DashMap<String, Mount>,
}

impl VhostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `app` under `hostname`. Returns false when a local mount already
    /// owns the hostname and `local` is false.
    pub fn mount(&self, hostname: &str, app: Router, local: bool) -> bool {
        match self.mounts.entry(hostname.to_ascii_lowercase()) {
            Entry::Occupied(entry) if entry.get().local && !local => {
                tracing::warn!(hostname = %entry.key(), "Federated site shadowed by a local one");
                false
            }
            Entry::Occupied(mut entry) => {
                entry.insert(Mount { local, app });
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(Mount { local, app });
                true
            }
        }
    }

    pub fn hostnames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.mounts.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    fn lookup(&self, hostname: &str) -> Option<Router> {
        self.mounts.get(hostname).map(|m| m.app.clone())
    }

    /// Router dispatching every request to the mount for its Host header.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new().fallback(dispatch).with_state(Arc::clone(self))
    }
}

async fn dispatch(State(table): State<Arc<VhostTable>>, request: Request) -> Response {
    let start = Instant::now();
    let host = request_host(&request).unwrap_or_default();
    let request_id = request.request_id().unwrap_or("unknown").to_string();
    let method = request.method().to_string();

    let response = match table.lookup(&host) {
        Some(app) => match app.oneshot(request).await {
            Ok(response) => response,
            Err(e) => match e {},
        },
        None => {
            tracing::debug!(request_id = %request_id, host = %host, "No site for host");
            (StatusCode::NOT_FOUND, "Unknown host").into_response()
        }
    };

    metrics::record_request(&method, response.status().as_u16(), &host, start);
    response
}
