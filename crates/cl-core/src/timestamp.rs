//! Timestamp prefix parsing for chat log lines and log file names.
//!
//! Every substantive line starts with `[YYYY/MM/DD, HH:MM:SS UTC]` followed by
//! optional padding. The payload offset is taken from the end of the match,
//! so a change in padding or in the comma spacing does not shift the payload.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;

const PREFIX_PATTERN: &str =
    r"^\[(\d{4})/(\d{2})/(\d{2}), ?(\d{2}):(\d{2}):(\d{2}) UTC\] *";

/// Length of the ISO date that log file names start with (`2020-01-31`).
const FILE_DATE_LEN: usize = 10;

/// A line split into its timestamp and the text after the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StampedLine<'a> {
    pub timestamp: DateTime<Utc>,
    pub text: &'a str,
}

/// Compiled matcher for the timestamp prefix.
#[derive(Debug, Clone)]
pub struct TimestampParser {
    prefix: Regex,
}

impl TimestampParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            prefix: Regex::new(PREFIX_PATTERN)?,
        })
    }

    /// Splits a line into timestamp and payload.
    ///
    /// Returns `None` for lines without a prefix or with an impossible date
    /// (blank lines, partial writes, `2020/13/45`).
    pub fn split<'a>(&self, line: &'a str) -> Option<StampedLine<'a>> {
        let caps = self.prefix.captures(line)?;
        let whole = caps.get(0)?;
        let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

        let year = i32::try_from(field(1)?).ok()?;
        let date = NaiveDate::from_ymd_opt(year, field(2)?, field(3)?)?;
        let time = NaiveTime::from_hms_opt(field(4)?, field(5)?, field(6)?)?;
        let timestamp = NaiveDateTime::new(date, time).and_utc();

        Some(StampedLine {
            timestamp,
            text: &line[whole.end()..],
        })
    }
}

/// Derives the nominal date of a log file from its name (`2020-01-31` or
/// `2020-01-31.txt`).
pub fn file_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let date = name.get(..FILE_DATE_LEN)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}
