//! Default values for [`crate::options::SubscriptionOptions`], broken out so they can be
//! referenced both from the builder and from `serde(default = ...)` attributes.

use std::time::Duration;

pub const fn max_docs_per_batch() -> u32 {
    4096
}

pub const fn time_to_wait_before_connection_retry() -> Duration {
    Duration::from_secs(5)
}

pub const fn max_erroneous_period() -> Duration {
    Duration::from_secs(5 * 60)
}

pub const fn ignore_subscriber_errors() -> bool {
    false
}

pub const fn close_when_no_docs_left() -> bool {
    false
}

pub const fn with_revisions() -> bool {
    false
}

/// The TCP subscription protocol version this worker negotiates with the server.
pub const SUBSCRIPTION_TCP_VERSION: i32 = 53;

/// A negotiated version at or below this sentinel means the server cannot serve any version this
/// client supports.
pub const OUT_OF_RANGE_STATUS: i32 = -1;
