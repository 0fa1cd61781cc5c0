//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::path::Path;

use peerhost::HostOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Options rooted in `dir`: ephemeral port, private hosts file, no watcher.
#[allow(dead_code)]
pub fn options(dir: &Path) -> HostOptions {
    let mut options = HostOptions::default();
    options.config_path = dir.join("config.json");
    options.directory = dir.join("work");
    options.hosts.path = dir.join("hosts");
    options.bind_address = "127.0.0.1".into();
    options.port = 0;
    options
}

/// Issue a `GET` with the given `Host` header and return status and body.
#[allow(dead_code)]
pub async fn get(addr: SocketAddr, host: &str, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

/// Hosts file lines, comments excluded.
#[allow(dead_code)]
pub fn hosts_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.trim_start().starts_with('#') && !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}
