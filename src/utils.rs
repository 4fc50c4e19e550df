//! Utility functions for timestamps, string truncation and file system checks.
//!
//! All feed timestamps are rendered in UTC+8 as `YYYY-MM-DD HH:MM:SS`,
//! regardless of where the spider runs.

use chrono::{DateTime, FixedOffset, Utc};
use serde_json::Value;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Format used for `pub_date`.
pub const PUB_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn feed_offset() -> FixedOffset {
    // 8 * 3600 is always in range
    FixedOffset::east_opt(8 * 3600).unwrap()
}

/// Render a UTC instant as a feed timestamp in UTC+8.
pub fn to_local_string(t: DateTime<Utc>) -> String {
    t.with_timezone(&feed_offset()).format(PUB_DATE_FORMAT).to_string()
}

/// Current time as a feed timestamp.
pub fn current_time_string() -> String {
    to_local_string(Utc::now())
}

/// Convert Unix seconds (fractional allowed) to a feed timestamp.
pub fn epoch_to_local(secs: f64) -> Option<String> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor() as i64;
    let nanos = ((secs - secs.floor()) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(whole, nanos).map(to_local_string)
}

/// Read a Unix timestamp that a site may send as a number or a numeric string.
pub fn epoch_from_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and the number
/// of dropped bytes appended. Cuts always land on a character boundary.
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    let head = truncate_chars(s, max);
    if head.len() == s.len() {
        s.to_string()
    } else {
        format!("{}…(+{} bytes)", head, s.len() - head.len())
    }
}

/// First `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Data directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
