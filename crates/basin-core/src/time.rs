//! Wall-clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current time in milliseconds since the Unix epoch.
///
/// Saturates to zero if the system clock reads before the epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_is_positive() {
        assert!(now_millis() > 0);
    }
}
