//! Messages.app stores `message.date` as "Mac absolute time": nanoseconds
//! since 2001-01-01 00:00:00 UTC.

use chrono::{DateTime, Utc};

/// 2001-01-01T00:00:00Z as a Unix timestamp.
pub const MAC_EPOCH_UNIX: i64 = 978_307_200;

const NANOS_PER_SEC: i64 = 1_000_000_000;

pub fn mac_absolute_to_utc(mac_time: i64) -> Option<DateTime<Utc>> {
    let secs = mac_time.div_euclid(NANOS_PER_SEC);
    let nanos = mac_time.rem_euclid(NANOS_PER_SEC) as u32;
    DateTime::from_timestamp(MAC_EPOCH_UNIX + secs, nanos)
}

pub fn utc_to_mac_absolute(dt: DateTime<Utc>) -> i64 {
    let secs = dt.timestamp() - MAC_EPOCH_UNIX;
    secs * NANOS_PER_SEC + i64::from(dt.timestamp_subsec_nanos())
}
