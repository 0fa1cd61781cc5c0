//! Content-address keys and `dat://` URLs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// URL scheme prefix for archive links.
pub const URL_SCHEME: &str = "dat://";

/// Length of a hex-encoded key.
pub const KEY_LEN: usize = 64;

/// A 64-character lowercase hex content address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchiveKey(String);

/// Returned when a string is not a valid key or archive URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid archive key {0:?}")]
pub struct InvalidKey(pub String);

impl ArchiveKey {
    /// Parse a raw hex key. Upper-case digits are accepted and normalized.
    pub fn parse(raw: &str) -> Result<Self, InvalidKey> {
        if raw.len() == KEY_LEN && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(raw.to_ascii_lowercase()))
        } else {
            Err(InvalidKey(raw.to_string()))
        }
    }

    /// Extract the key from `dat://<key>[/path]`. Only the key is significant.
    pub fn from_url(url: &str) -> Result<Self, InvalidKey> {
        let scheme_ok = url
            .get(..URL_SCHEME.len())
            .is_some_and(|s| s.eq_ignore_ascii_case(URL_SCHEME));
        if !scheme_ok {
            return Err(InvalidKey(url.to_string()));
        }
        let rest = &url[URL_SCHEME.len()..];
        let host = rest.split('/').next().unwrap_or_default();
        Self::parse(host).map_err(|_| InvalidKey(url.to_string()))
    }

    /// Accept either a raw key or an archive URL.
    pub fn from_link(link: &str) -> Result<Self, InvalidKey> {
        Self::parse(link).or_else(|_| Self::from_url(link))
    }

    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `dat://<key>`
    pub fn to_url(&self) -> String {
        format!("{URL_SCHEME}{}", self.0)
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ArchiveKey {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ArchiveKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ArchiveKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
