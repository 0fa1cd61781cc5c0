//! Retry classification for gateway fetches.
//!
//! # Design Decisions
//! - Gateway fetches are GETs, so every attempt is idempotent
//! - Connection errors are always retryable
//! - 5xx, 408 and 429 are retryable; other 4xx mean the gateway does not
//!   have the archive and the next gateway should be tried instead

/// Whether an HTTP status from a gateway is worth retrying.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429) || (500..600).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(408));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }
}
