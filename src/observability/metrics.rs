//! Metrics collection and exposition.
//!
//! # Metrics
//! - `peerhost_requests_total` (counter): requests by method, status, host
//! - `peerhost_request_duration_seconds` (histogram): latency distribution
//! - `peerhost_sites_loaded` (gauge): sites by source (`local`, `federated`)
//! - `peerhost_gc_archives_removed_total` (counter)
//! - `peerhost_gc_hosts_removed_total` (counter)
//! - `peerhost_gc_failures_total` (counter)
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, host: &str, start: Instant) {
    let status = status.to_string();
    counter!(
        "peerhost_requests_total",
        "method" => method.to_string(),
        "status" => status.clone(),
        "host" => host.to_string()
    )
    .increment(1);
    histogram!(
        "peerhost_request_duration_seconds",
        "method" => method.to_string(),
        "status" => status,
        "host" => host.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_sites_loaded(local: usize, federated: usize) {
    gauge!("peerhost_sites_loaded", "source" => "local").set(local as f64);
    gauge!("peerhost_sites_loaded", "source" => "federated").set(federated as f64);
}

pub fn record_gc(archives_removed: usize, hosts_removed: usize, failures: usize) {
    counter!("peerhost_gc_archives_removed_total").increment(archives_removed as u64);
    counter!("peerhost_gc_hosts_removed_total").increment(hosts_removed as u64);
    counter!("peerhost_gc_failures_total").increment(failures as u64);
}
