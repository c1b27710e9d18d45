//! Shared utilities for CLI commands.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use cl_db::Database;

/// Opens the database, creating its parent directory if needed.
pub fn open_database(path: &Path) -> Result<Database> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Database::open(path).with_context(|| format!("failed to open {}", path.display()))
}

/// Converts a counter for storage, saturating at `i64::MAX`.
pub fn saturating_i64<T: TryInto<i64>>(n: T) -> i64 {
    n.try_into().unwrap_or(i64::MAX)
}

/// Formats whole seconds as `Xh Ym`, or `Ym` under an hour.
pub fn format_duration(seconds: i64) -> String {
    if seconds < 0 {
        return "0m".to_string();
    }
    let total_minutes = seconds / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m")
    }
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    #[test]
    fn format_duration_handles_hours_and_minutes() {
        assert_eq!(format_duration(-5), "0m");
        assert_eq!(format_duration(59), "0m");
        assert_eq!(format_duration(45 * 60), "45m");
        assert_eq!(format_duration(2 * 3600 + 5 * 60), "2h 05m");
        assert_eq!(format_duration(130 * 3600), "130h 00m");
    }

    #[test]
    fn format_timestamp_is_utc() {
        let ts = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_timestamp(ts), "2020-01-02 03:04:05 UTC");
    }
}
