//! HTTP server setup.
//!
//! # Responsibilities
//! - Wrap the virtual host router with middleware (timeout, request ID, tracing)
//! - Bind the listener
//! - Serve until the shutdown signal, then drain

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::JoinHandle;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::VhostTable;
use crate::lifecycle::Shutdown;

/// HTTP front end for every mounted site.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(vhosts: &Arc<VhostTable>, request_timeout: Duration) -> Self {
        Self {
            router: Self::build_router(vhosts, request_timeout),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(vhosts: &Arc<VhostTable>, request_timeout: Duration) -> Router {
        vhosts
            .router()
            .layer(TimeoutLayer::new(request_timeout))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Bind `addr` and serve in a background task.
    pub async fn spawn(self, addr: impl ToSocketAddrs) -> Result<RunningServer, std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(address = %local_addr, "HTTP server listening");

        let shutdown = Shutdown::new();
        let stop = shutdown.subscribe();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(stop.wait())
                .await;
            tracing::info!("HTTP server stopped");
            result
        });

        Ok(RunningServer {
            local_addr,
            shutdown,
            task,
        })
    }
}

/// A bound, serving listener.
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<Result<(), std::io::Error>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, drain in-flight requests and wait for the task.
    pub async fn close(self) -> Result<(), std::io::Error> {
        self.shutdown.trigger();
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(std::io::Error::other(e)),
        }
    }
}
