//! Host header normalization.
//!
//! # Design Decisions
//! - Host matching is case-insensitive
//! - The port is never part of the match
//! - No regex to guarantee O(n) matching

use axum::http::{header, Request};

/// Lowercase `host` and strip any `:port` suffix. Bracketed IPv6 literals
/// keep their brackets.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = if host.starts_with('[') {
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        }
    };
    without_port.trim_end_matches('.').to_ascii_lowercase()
}

/// Normalized host of a request: the `Host` header, or the URI authority for
/// absolute-form requests.
pub fn request_host<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().host())
        .map(normalize_host)
        .filter(|h| !h.is_empty())
}
