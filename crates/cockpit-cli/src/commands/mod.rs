//! CLI 명령어 구현.

pub mod account;
pub mod bot;
pub mod market;
pub mod watch;

use chrono::{DateTime, Local, Utc};

/// ms 단위 Unix timestamp를 로컬 시간 문자열로.
pub(crate) fn format_ms(timestamp_ms: u64) -> String {
    i64::try_from(timestamp_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// 초 단위 Unix timestamp를 로컬 시간 문자열로.
pub(crate) fn format_secs(timestamp_secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp_secs, 0)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}
