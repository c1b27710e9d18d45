//! Chronological ingestion of daily chat log files.
//!
//! Files are processed in ascending date order and lines in file order. That
//! order is the only notion of "happens before" the session tracker has, so
//! nothing here runs concurrently.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::classify::ClassifierSet;
use crate::event_kind::EventKind;
use crate::state::LogState;
use crate::timestamp::{TimestampParser, file_date};

/// Buffer size for `BufReader` (64KB, log files are read once front to back).
const BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid line pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A daily log file and the date its name claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub path: PathBuf,
    pub date: NaiveDate,
}

/// Lists the log files in `dir`, sorted by their date.
///
/// Entries whose names do not start with an ISO date are skipped.
pub fn list_log_files(dir: &Path) -> Result<Vec<LogFile>, PipelineError> {
    let io_err = |source| PipelineError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !path.is_file() {
            continue;
        }
        match file_date(&path) {
            Some(date) => files.push(LogFile { path, date }),
            None => tracing::warn!(path = ?path, "skipping file without a date in its name"),
        }
    }

    files.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.path.cmp(&b.path)));
    Ok(files)
}

/// What happened to a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Matched(EventKind),
    NoTimestamp,
    ForeignDate,
    Unmatched,
}

/// Counters for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub files: usize,
    pub lines: u64,
    pub no_timestamp: u64,
    pub foreign_date: u64,
    pub unmatched: u64,
    pub matches: BTreeMap<EventKind, u64>,
}

impl RunStats {
    fn record(&mut self, outcome: LineOutcome) {
        self.lines += 1;
        match outcome {
            LineOutcome::Matched(kind) => *self.matches.entry(kind).or_insert(0) += 1,
            LineOutcome::NoTimestamp => self.no_timestamp += 1,
            LineOutcome::ForeignDate => self.foreign_date += 1,
            LineOutcome::Unmatched => self.unmatched += 1,
        }
    }

    pub fn matched(&self) -> u64 {
        self.matches.values().sum()
    }
}

/// The ingestion driver: timestamp parsing plus the classifier set, both
/// compiled once per run.
#[derive(Debug)]
pub struct Pipeline {
    timestamps: TimestampParser,
    classifiers: ClassifierSet,
}

impl Pipeline {
    pub fn new() -> Result<Self, PipelineError> {
        Ok(Self {
            timestamps: TimestampParser::new()?,
            classifiers: ClassifierSet::standard()?,
        })
    }

    /// Processes every file in order.
    ///
    /// Any read failure aborts the run; the caller must discard `state`.
    pub fn run(&self, files: &[LogFile], state: &mut LogState) -> Result<RunStats, PipelineError> {
        let mut stats = RunStats::default();
        for file in files {
            self.process_file(file, state, &mut stats)?;
        }
        tracing::info!(
            files = stats.files,
            lines = stats.lines,
            matched = stats.matched(),
            "ingestion complete"
        );
        Ok(stats)
    }

    pub fn process_file(
        &self,
        file: &LogFile,
        state: &mut LogState,
        stats: &mut RunStats,
    ) -> Result<(), PipelineError> {
        let io_err = |source| PipelineError::Io {
            path: file.path.clone(),
            source,
        };
        let reader = BufReader::with_capacity(BUFFER_SIZE, File::open(&file.path).map_err(io_err)?);
        self.process_reader(file.date, reader, state, stats)
            .map_err(io_err)?;
        tracing::debug!(path = ?file.path, date = %file.date, "processed log file");
        Ok(())
    }

    /// Streams lines from `reader`, which holds the log for `date`.
    ///
    /// Invalid UTF-8 is replaced rather than treated as an error.
    pub fn process_reader<R: BufRead>(
        &self,
        date: NaiveDate,
        mut reader: R,
        state: &mut LogState,
        stats: &mut RunStats,
    ) -> std::io::Result<()> {
        stats.files += 1;
        state.seed_day(date);

        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            let outcome = self.process_line(date, line, state);
            stats.record(outcome);
        }
        Ok(())
    }

    /// Classifies one line of the log for `date`.
    pub fn process_line(&self, date: NaiveDate, line: &str, state: &mut LogState) -> LineOutcome {
        let Some(stamped) = self.timestamps.split(line) else {
            return LineOutcome::NoTimestamp;
        };
        // A line pasted from another day carries a stale timestamp.
        if stamped.timestamp.date_naive() != date {
            return LineOutcome::ForeignDate;
        }
        self.classifiers
            .classify(state, stamped.text, stamped.timestamp)
            .map_or(LineOutcome::Unmatched, LineOutcome::Matched)
    }
}
