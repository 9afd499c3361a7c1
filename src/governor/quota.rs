//! Reactive pacing on provider quota headers
//!
//! After every provider call the response headers are inspected. When the
//! remaining request budget of any window drops below the threshold, the
//! calling reconcile is held back for the advertised reset time plus one
//! second. The call that crossed the threshold has already succeeded; the
//! delay only postpones whatever that reconcile does next.

use std::time::Duration;

use reqwest::header::HeaderMap;
use tracing::{debug, info};

/// Pingdom short window quota header
pub const PINGDOM_SHORT_WINDOW_HEADER: &str = "Req-Limit-Short";

/// Pingdom long window quota header
pub const PINGDOM_LONG_WINDOW_HEADER: &str = "Req-Limit-Long";

/// Remaining budget below which the governor starts waiting
pub const DEFAULT_QUOTA_THRESHOLD: u64 = 25;

/// Quota state reported by a provider for one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSignal {
    pub remaining: u64,
    pub reset_after: Duration,
}

/// Parse a header of the form `Remaining: 394 Time until reset: 3589`
pub fn parse_quota_header(value: &str) -> Option<QuotaSignal> {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    match tokens.as_slice() {
        ["Remaining:", remaining, "Time", "until", "reset:", reset] => Some(QuotaSignal {
            remaining: remaining.parse().ok()?,
            reset_after: Duration::from_secs(reset.parse().ok()?),
        }),
        _ => None,
    }
}

/// Inspects quota headers and pauses the caller when the budget runs low
#[derive(Debug, Clone)]
pub struct QuotaGovernor {
    headers: Vec<&'static str>,
    threshold: u64,
}

impl QuotaGovernor {
    pub fn new(headers: Vec<&'static str>, threshold: u64) -> Self {
        Self { headers, threshold }
    }

    /// Governor for Pingdom's short and long window headers
    pub fn pingdom() -> Self {
        Self::new(
            vec![PINGDOM_SHORT_WINDOW_HEADER, PINGDOM_LONG_WINDOW_HEADER],
            DEFAULT_QUOTA_THRESHOLD,
        )
    }

    /// How long to hold the caller back, if at all
    ///
    /// With several windows below the threshold the longest wait wins.
    pub fn backoff_for(&self, headers: &HeaderMap) -> Option<Duration> {
        self.headers
            .iter()
            .filter_map(|name| {
                let raw = headers.get(*name)?.to_str().ok()?;
                let signal = parse_quota_header(raw);
                if signal.is_none() {
                    debug!("Ignoring unparseable quota header {}: {:?}", name, raw);
                }
                signal
            })
            .filter(|signal| signal.remaining < self.threshold)
            .map(|signal| signal.reset_after + Duration::from_secs(1))
            .max()
    }

    /// Sleep when the response signals a nearly exhausted quota
    pub async fn observe(&self, headers: &HeaderMap) {
        if let Some(wait) = self.backoff_for(headers) {
            info!(
                "Waiting for {} seconds to avoid hitting the provider rate limit",
                wait.as_secs()
            );
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(short: &str, long: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(PINGDOM_SHORT_WINDOW_HEADER, HeaderValue::from_str(short).unwrap());
        map.insert(PINGDOM_LONG_WINDOW_HEADER, HeaderValue::from_str(long).unwrap());
        map
    }

    #[test]
    fn test_parse_quota_header() {
        assert_eq!(
            parse_quota_header("Remaining: 394 Time until reset: 3589"),
            Some(QuotaSignal {
                remaining: 394,
                reset_after: Duration::from_secs(3589)
            })
        );
        assert_eq!(parse_quota_header(""), None);
        assert_eq!(parse_quota_header("Remaining: lots Time until reset: 1"), None);
        assert_eq!(parse_quota_header("Remaining: 3"), None);
    }

    #[test]
    fn test_no_backoff_above_threshold() {
        let governor = QuotaGovernor::pingdom();
        let map = headers(
            "Remaining: 25 Time until reset: 10",
            "Remaining: 1000 Time until reset: 3000",
        );
        assert_eq!(governor.backoff_for(&map), None);
        assert_eq!(governor.backoff_for(&HeaderMap::new()), None);
    }

    #[test]
    fn test_backoff_uses_reset_plus_one_second() {
        let governor = QuotaGovernor::pingdom();
        let map = headers(
            "Remaining: 24 Time until reset: 10",
            "Remaining: 1000 Time until reset: 3000",
        );
        assert_eq!(governor.backoff_for(&map), Some(Duration::from_secs(11)));

        let map = headers(
            "Remaining: 3 Time until reset: 10",
            "Remaining: 2 Time until reset: 60",
        );
        assert_eq!(governor.backoff_for(&map), Some(Duration::from_secs(61)));
    }

    #[test]
    fn test_malformed_header_is_ignored() {
        let governor = QuotaGovernor::pingdom();
        let map = headers("garbage", "Remaining: 5 Time until reset: 2");
        assert_eq!(governor.backoff_for(&map), Some(Duration::from_secs(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_delays_by_reset_time() {
        let governor = QuotaGovernor::pingdom();
        let map = headers(
            "Remaining: 10 Time until reset: 4",
            "Remaining: 1000 Time until reset: 3000",
        );
        let start = tokio::time::Instant::now();
        governor.observe(&map).await;
        assert!(start.elapsed() >= Duration::from_secs(4));

        let start = tokio::time::Instant::now();
        governor.observe(&HeaderMap::new()).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
