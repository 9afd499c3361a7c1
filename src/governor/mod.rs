//! Rate governors for outbound calls
//!
//! Two independent strategies:
//! - [`QuotaGovernor`] reacts to quota headers returned by uptime providers
//! - [`TokenBucket`] proactively paces notifications

mod bucket;
mod quota;

pub use bucket::TokenBucket;
pub use quota::{
    parse_quota_header, QuotaGovernor, QuotaSignal, DEFAULT_QUOTA_THRESHOLD,
    PINGDOM_LONG_WINDOW_HEADER, PINGDOM_SHORT_WINDOW_HEADER,
};
