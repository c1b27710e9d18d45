//! Analyze command: ingest every log file and replace the stored results.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;

use cl_core::{ConsistencyReport, LogState, Pipeline, RunStats, check_sessions, list_log_files};
use cl_db::AnalysisSummary;

use super::util::{open_database, saturating_i64};
use crate::Config;

/// Everything a finished ingestion pass produced.
#[derive(Debug)]
pub struct Analysis {
    pub state: LogState,
    pub stats: RunStats,
    pub report: ConsistencyReport,
}

impl Analysis {
    /// Classifier anomalies plus suspicious sessions.
    pub fn anomaly_count(&self) -> u64 {
        self.state
            .anomalies
            .total()
            .saturating_add(self.report.anomaly_count() as u64)
    }
}

/// Runs the whole pipeline over `dir` without touching storage.
pub fn analyze_dir(dir: &Path) -> Result<Analysis> {
    let files = list_log_files(dir)
        .with_context(|| format!("failed to list log files in {}", dir.display()))?;
    if files.is_empty() {
        tracing::warn!(dir = %dir.display(), "no log files found");
    }

    let pipeline = Pipeline::new().context("failed to compile line patterns")?;
    let mut state = LogState::new();
    let stats = pipeline
        .run(&files, &mut state)
        .context("analysis aborted, nothing was stored")?;
    state.finalize();
    let report = check_sessions(&state);

    Ok(Analysis {
        state,
        stats,
        report,
    })
}

pub fn run<W: Write>(writer: &mut W, config: &Config, dir: Option<&Path>) -> Result<()> {
    let dir = dir.unwrap_or(&config.chatlog_dir);
    let analysis = analyze_dir(dir)?;

    let summary = AnalysisSummary {
        analyzed_at: Utc::now(),
        files: saturating_i64(analysis.stats.files),
        lines: saturating_i64(analysis.stats.lines),
        anomalies: saturating_i64(analysis.anomaly_count()),
    };
    let mut db = open_database(&config.database_path)?;
    db.store_analysis(&analysis.state, &summary)
        .context("failed to store analysis results")?;

    render(writer, &analysis)?;
    writeln!(writer, "Stored in {}", config.database_path.display())?;
    Ok(())
}

fn render<W: Write>(writer: &mut W, analysis: &Analysis) -> Result<()> {
    let stats = &analysis.stats;
    writeln!(
        writer,
        "Analyzed {} log files ({} lines)",
        stats.files, stats.lines
    )?;
    writeln!(
        writer,
        "Matched: {}  Unmatched: {}  No timestamp: {}  Other day: {}",
        stats.matched(),
        stats.unmatched,
        stats.no_timestamp,
        stats.foreign_date
    )?;

    if !stats.matches.is_empty() {
        writeln!(writer, "Events:")?;
        for (kind, count) in &stats.matches {
            writeln!(writer, "- {kind}: {count}")?;
        }
    }

    writeln!(writer, "Players: {}", analysis.state.players.len())?;

    let anomalies = &analysis.state.anomalies;
    writeln!(writer, "Anomalies:")?;
    for (label, count) in [
        ("unmatched leaves", anomalies.unmatched_leaves),
        ("duplicate joins", anomalies.duplicate_joins),
        ("unknown players", anomalies.unknown_players),
        ("ambiguous renames", anomalies.ambiguous_renames),
        ("malformed names", anomalies.malformed_names),
    ] {
        writeln!(writer, "- {label}: {count}")?;
    }

    let report = &analysis.report;
    writeln!(
        writer,
        "Sessions: {} checked, {} without end, {} over 24h",
        report.sessions_checked, report.missing_end, report.overlong
    )?;
    Ok(())
}
