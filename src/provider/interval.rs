//! Mapping of requested check intervals onto provider supported values

/// Check frequencies accepted by Better Stack, in seconds
pub const BETTERSTACK_INTERVALS_SECS: &[u32] = &[30, 45, 60, 120, 180, 300, 600, 900, 1800];

/// Check resolutions accepted by Pingdom, in seconds
pub const PINGDOM_RESOLUTIONS_SECS: &[u32] = &[60, 300, 900, 1800, 3600];

/// Nearest supported interval in seconds for an interval requested in minutes
///
/// `supported_secs` must be ascending and non-empty. Requests of zero or less
/// get the smallest value, requests above the largest value get the largest.
/// On a tie the earlier (smaller) value wins.
pub fn quantize(requested_minutes: i64, supported_secs: &[u32]) -> u32 {
    let (Some(&smallest), Some(&largest)) = (supported_secs.first(), supported_secs.last()) else {
        return 0;
    };

    let requested_secs = requested_minutes.saturating_mul(60);
    if requested_secs <= 0 {
        return smallest;
    }
    if requested_secs > i64::from(largest) {
        return largest;
    }

    let mut nearest = smallest;
    let mut nearest_diff = i64::MAX;
    for &candidate in supported_secs {
        let diff = (requested_secs - i64::from(candidate)).abs();
        if diff < nearest_diff {
            nearest_diff = diff;
            nearest = candidate;
        }
    }
    nearest
}
