// src/utils/time.rs
//! Archive-style timestamps (`YYYYMMDDhhmmss`)

use chrono::{DateTime, Utc};

const TIMESTAMP14: &str = "%Y%m%d%H%M%S";

/// Current time as a 14-digit timestamp
pub fn timestamp_now() -> String {
    Utc::now().format(TIMESTAMP14).to_string()
}

/// Current time as a 20-digit timestamp (microsecond precision)
pub fn timestamp20_now() -> String {
    Utc::now().format("%Y%m%d%H%M%S%6f").to_string()
}

/// Current time as unix seconds
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Render unix seconds as an ISO 8601 date
pub fn to_iso_date(secs: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}
