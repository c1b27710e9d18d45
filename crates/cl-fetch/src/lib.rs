//! Download client for the public chat log archive.
//!
//! The archive serves one HTML page per day. The log text sits in the first
//! `<pre>` element with HTML entities escaped; [`Client::fetch_day`] returns it
//! decoded and ready to be written as a daily log file.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;

/// Default request timeout for archive requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Value of the archive form's submit button.
const SUBMIT_LABEL: &str = "Show Log From Date";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Fetch errors.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// Failed to compile the page extraction pattern.
    #[error("invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The archive answered with a non-success status.
    #[error("archive returned status {status} for {date}")]
    Status { status: u16, date: NaiveDate },
    /// The page had no `<pre>` element.
    #[error("no log found in archive page for {date}")]
    MissingLog { date: NaiveDate },
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(err) => err.is_timeout() || err.is_connect(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::ClientBuild(_) | Self::Pattern(_) | Self::MissingLog { .. } => false,
        }
    }
}

/// How often and how patiently to retry transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Runs `op` until it succeeds, fails permanently, or runs out of attempts.
///
/// A policy with `max_attempts == 0` still makes one attempt.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                tracing::warn!(attempt, max_attempts, error = %err, "transient fetch failure, retrying");
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Archive client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    url: String,
    pre: Regex,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client for the archive page at `url`.
    pub fn new(url: impl Into<String>) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(FetchError::ClientBuild)?;

        Ok(Self {
            http,
            url: url.into(),
            pre: pre_pattern()?,
        })
    }

    /// Downloads the log for one day.
    pub async fn fetch_day(&self, date: NaiveDate) -> Result<String, FetchError> {
        let date_param = date.format(DATE_FORMAT).to_string();
        let response = self
            .http
            .post(&self.url)
            .form(&[("date", date_param.as_str()), ("submit", SUBMIT_LABEL)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                date,
            });
        }

        let body = response.text().await?;
        extract_log(&self.pre, &body).ok_or(FetchError::MissingLog { date })
    }
}

fn pre_pattern() -> Result<Regex, regex::Error> {
    Regex::new(r"(?is)<pre(?:\s[^>]*)?>(.*?)</pre>")
}

/// Returns the decoded text of the first `<pre>` element.
fn extract_log(pre: &Regex, html: &str) -> Option<String> {
    let body = pre.captures(html)?.get(1)?.as_str();
    Some(unescape_html(body))
}

/// Decodes the character references an HTML serializer emits for text.
///
/// Unknown or malformed references are kept verbatim.
pub fn unescape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&rest[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = entity.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Days in `from..=to` that have no file in `dir` yet, oldest first.
pub fn missing_days(dir: &Path, from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    from.iter_days()
        .take_while(|day| *day <= to)
        .filter(|day| !day_path(dir, *day).exists())
        .collect()
}

/// Path of the log file for `date` inside `dir`.
pub fn day_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(date.format(DATE_FORMAT).to_string())
}
