//! # swkit Common
//!
//! Shared plumbing for the swkit offline agent crates.
//!
//! ## Features
//!
//! - Logging configuration and setup
//! - Wall-clock timestamps for cached entries and notifications

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    // Clocks set before 1970 report zero rather than wrapping.
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_now_millis_monotonic_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(b >= a);
    }
}
