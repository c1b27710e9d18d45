//! Fetch command: download missing daily logs from the archive.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};

use cl_fetch::{Client, RetryPolicy, day_path, missing_days, with_retry};

use crate::Config;

/// Resolves the requested range against the configured defaults.
///
/// The range ends yesterday by default because today's log is still growing.
fn resolve_range(
    config: &Config,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    let from = from.unwrap_or(config.fetch.first_date);
    let to = to.unwrap_or_else(|| today.pred_opt().unwrap_or(today));
    (from, to)
}

pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let dir = &config.chatlog_dir;
    prepare_dir(dir)?;

    let (from, to) = resolve_range(config, from, to, Utc::now().date_naive());
    let days = missing_days(dir, from, to);
    if days.is_empty() {
        writeln!(writer, "All logs from {from} to {to} are present.")?;
        return Ok(());
    }

    let client = Client::new(config.fetch.url.clone()).context("failed to create HTTP client")?;
    let policy = RetryPolicy {
        max_attempts: config.fetch.max_attempts,
        delay: Duration::from_secs(config.fetch.retry_delay_secs),
    };

    let runtime = tokio::runtime::Runtime::new()?;
    for &day in &days {
        let text = runtime
            .block_on(with_retry(policy, || client.fetch_day(day)))
            .with_context(|| format!("failed to download log for {day}"))?;
        let path = day_path(dir, day);
        std::fs::write(&path, text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(%day, "downloaded log");
    }

    writeln!(
        writer,
        "Downloaded {} logs into {}",
        days.len(),
        dir.display()
    )?;
    Ok(())
}

fn prepare_dir(dir: &Path) -> Result<()> {
    if dir.exists() && !dir.is_dir() {
        anyhow::bail!("{} exists but is not a directory", dir.display());
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))
}
