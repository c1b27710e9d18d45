//! Core engine for chat log statistics.
//!
//! This crate contains the fundamental types and logic for:
//! - Timestamp prefix parsing and per-day log file discovery
//! - Line classification: an ordered set of event matchers
//! - Aggregation: per-player records, sessions and world counters
//! - Consistency checks over the finished session data

pub mod check;
pub mod classify;
pub mod event_kind;
pub mod mob;
pub mod pipeline;
mod session;
pub mod state;
pub mod timestamp;

pub use check::{ConsistencyReport, FindingKind, SessionFinding, check_sessions};
pub use classify::{Classifier, ClassifierSet};
pub use event_kind::{EventKind, UnknownEventKind};
pub use pipeline::{LineOutcome, LogFile, Pipeline, PipelineError, RunStats, list_log_files};
pub use session::{SessionEnd, SessionStart};
pub use state::{
    AnomalyCounts, CleanupEvent, LogState, PlayerRecord, Rename, Session, WorldStats,
};
