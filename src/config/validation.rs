//! Configuration validation.
//!
//! # Responsibilities
//! - Hostname grammar (dot-separated DNS labels, case-insensitive)
//! - Archive links (`dat://` scheme + 64 hex key)
//! - Exactly one backing per site: content (`url`/`directory`) or `proxy`
//! - Process option ranges (bind address, gateways)
//!
//! # Design Decisions
//! - Site validation is a pure function and stops at the first problem, so
//!   the diagnostic names the offending hostname or URL
//! - Option validation returns all errors, not just first
//! - No regex: labels are checked byte by byte

use std::net::IpAddr;
use std::str::FromStr;

use axum::http::uri::Authority;
use thiserror::Error;

use crate::archive::ArchiveKey;
use crate::config::schema::{HostOptions, SiteConfig};

/// A configuration value that cannot be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid hostname {0:?}")]
    InvalidHostname(String),

    #[error(
        "invalid url {url:?} for {hostname}: urls must use the dat:// scheme and the raw 64-character hex key"
    )]
    InvalidUrl { hostname: String, url: String },

    #[error("invalid key {key:?} for {hostname}")]
    InvalidKey { hostname: String, key: String },

    #[error("key {key} for {hostname} does not match url {url}")]
    KeyMismatch {
        hostname: String,
        url: String,
        key: String,
    },

    #[error("invalid config for {0:?}: must have a url, directory or proxy configured")]
    MissingBacking(String),

    #[error("invalid config for {0:?}: a proxied site cannot also have a url or directory")]
    ConflictingModes(String),

    #[error("invalid proxy target {target:?} for {hostname}")]
    InvalidProxyTarget { hostname: String, target: String },

    #[error("invalid site-list key {0:?}")]
    InvalidSiteList(String),

    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("invalid gateway url {0:?}")]
    InvalidGateway(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Check a hostname against the DNS label grammar.
///
/// Each label is `[a-z0-9]([a-z0-9-]*[a-z0-9])?`, compared case-insensitively.
pub fn is_valid_hostname(hostname: &str) -> bool {
    !hostname.is_empty() && hostname.split('.').all(is_valid_label)
}

fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
}

/// Validate one configured site.
pub fn validate_site_cfg(hostname: &str, site: &SiteConfig) -> Result<(), ValidationError> {
    if !is_valid_hostname(hostname) {
        return Err(ValidationError::InvalidHostname(hostname.to_string()));
    }

    let url_key = match &site.url {
        Some(url) => Some(ArchiveKey::from_url(url).map_err(|_| ValidationError::InvalidUrl {
            hostname: hostname.to_string(),
            url: url.clone(),
        })?),
        None => None,
    };

    if let Some(raw) = &site.key {
        let key = ArchiveKey::parse(raw).map_err(|_| ValidationError::InvalidKey {
            hostname: hostname.to_string(),
            key: raw.clone(),
        })?;
        if let (Some(url), Some(url_key)) = (&site.url, &url_key) {
            if *url_key != key {
                return Err(ValidationError::KeyMismatch {
                    hostname: hostname.to_string(),
                    url: url.clone(),
                    key: raw.clone(),
                });
            }
        }
    }

    let has_content = site.url.is_some() || site.directory.is_some();
    if site.is_proxy() {
        if has_content {
            return Err(ValidationError::ConflictingModes(hostname.to_string()));
        }
        if let Some(target) = site.proxy.as_ref().and_then(|p| p.target()) {
            parse_proxy_target(target).ok_or_else(|| ValidationError::InvalidProxyTarget {
                hostname: hostname.to_string(),
                target: target.to_string(),
            })?;
        }
        return Ok(());
    }

    if !has_content {
        return Err(ValidationError::MissingBacking(hostname.to_string()));
    }
    Ok(())
}

/// Parse `host:port` or `http://host:port[/]` into an authority.
pub fn parse_proxy_target(target: &str) -> Option<Authority> {
    let bare = target.strip_prefix("http://").unwrap_or(target);
    let bare = bare.strip_suffix('/').unwrap_or(bare);
    if bare.is_empty() || bare.contains('/') || bare.contains("://") {
        return None;
    }
    Authority::from_str(bare).ok()
}

/// Validate process options. Returns every problem found.
pub fn validate_options(options: &HostOptions) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if IpAddr::from_str(&options.bind_address).is_err() && options.bind_address != "localhost" {
        errors.push(ValidationError::InvalidBindAddress(options.bind_address.clone()));
    }
    for gateway in &options.network.gateways {
        match url::Url::parse(gateway) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => errors.push(ValidationError::InvalidGateway(gateway.clone())),
        }
    }
    if options.network.max_attempts == 0 {
        errors.push(ValidationError::Zero("network.max_attempts"));
    }
    if options.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("request_timeout_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ProxySetting;

    const KEY: &str = "6ca0e8b9b0d2d8ee1d3a5d9c0e64bd1b4c9a2f5e07c3c8a1e2a4e1e3b9f0d7a1";

    fn url_site(url: &str) -> SiteConfig {
        SiteConfig {
            url: Some(url.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_hostname_grammar() {
        assert!(is_valid_hostname("foo.bar-baz.example"));
        assert!(is_valid_hostname("LOCALHOST"));
        assert!(is_valid_hostname("a"));
        assert!(!is_valid_hostname("foo_bar"));
        assert!(!is_valid_hostname("-foo.example"));
        assert!(!is_valid_hostname("foo-.example"));
        assert!(!is_valid_hostname("foo..example"));
        assert!(!is_valid_hostname(""));
    }

    #[test]
    fn test_rejects_bad_hostname() {
        let err = validate_site_cfg("foo_bar", &url_site(&format!("dat://{KEY}"))).unwrap_err();
        assert_eq!(err, ValidationError::InvalidHostname("foo_bar".into()));
        assert!(validate_site_cfg("foo.bar-baz.example", &url_site(&format!("dat://{KEY}"))).is_ok());
    }

    #[test]
    fn test_rejects_bad_urls() {
        for url in ["http://abc", "dat://short"] {
            let err = validate_site_cfg("a.test", &url_site(url)).unwrap_err();
            assert!(matches!(err, ValidationError::InvalidUrl { .. }), "{url}");
            assert!(err.to_string().contains(url));
        }
    }

    #[test]
    fn test_rejects_site_without_backing() {
        let err = validate_site_cfg("a.test", &SiteConfig::default()).unwrap_err();
        assert_eq!(err, ValidationError::MissingBacking("a.test".into()));

        let disabled = SiteConfig {
            proxy: Some(ProxySetting::Enabled(false)),
            ..Default::default()
        };
        assert!(validate_site_cfg("a.test", &disabled).is_err());
    }

    #[test]
    fn test_directory_and_proxy_sites() {
        let dir = SiteConfig {
            directory: Some("/tmp/a".into()),
            ..Default::default()
        };
        assert!(validate_site_cfg("a.test", &dir).is_ok());

        let proxy = SiteConfig {
            proxy: Some(ProxySetting::Enabled(true)),
            ..Default::default()
        };
        assert!(validate_site_cfg("p.test", &proxy).is_ok());

        let both = SiteConfig {
            directory: Some("/tmp/a".into()),
            proxy: Some(ProxySetting::Enabled(true)),
            ..Default::default()
        };
        assert_eq!(
            validate_site_cfg("x.test", &both).unwrap_err(),
            ValidationError::ConflictingModes("x.test".into())
        );
    }

    #[test]
    fn test_key_must_match_url() {
        let mut site = url_site(&format!("dat://{KEY}"));
        site.key = Some(KEY.to_uppercase());
        assert!(validate_site_cfg("a.test", &site).is_ok());

        site.key = Some("f".repeat(64));
        assert!(matches!(
            validate_site_cfg("a.test", &site),
            Err(ValidationError::KeyMismatch { .. })
        ));

        site.key = Some("nothex".into());
        assert!(matches!(
            validate_site_cfg("a.test", &site),
            Err(ValidationError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_proxy_targets() {
        assert!(parse_proxy_target("127.0.0.1:3000").is_some());
        assert!(parse_proxy_target("http://localhost:8080/").is_some());
        assert!(parse_proxy_target("https://example.com").is_none());
        assert!(parse_proxy_target("http://host/path").is_none());
        assert!(parse_proxy_target("").is_none());
    }

    #[test]
    fn test_validate_options() {
        assert!(validate_options(&HostOptions::default()).is_ok());

        let mut options = HostOptions::default();
        options.bind_address = "not an ip".into();
        options.network.gateways = vec!["ftp://mirror".into(), "http://ok.example/".into()];
        options.network.max_attempts = 0;
        let errors = validate_options(&options).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
