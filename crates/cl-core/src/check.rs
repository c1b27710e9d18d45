//! Post-run consistency checks over session data.
//!
//! The checker is advisory: it reports sessions that look wrong and never
//! changes them. Sessions always carry a start because they are only created
//! by join events, so the checks concern missing ends and implausible
//! lengths.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::state::LogState;

/// Sessions longer than this many hours almost certainly missed their leave
/// event.
pub const MAX_PLAUSIBLE_SESSION_HOURS: i64 = 24;

/// What is wrong with a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    MissingEnd,
    OverlongSession,
}

/// One flagged session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFinding {
    pub player: String,
    /// Position of the session in the player's session list.
    pub index: usize,
    pub start: DateTime<Utc>,
    pub kind: FindingKind,
}

/// Summary of a consistency pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub sessions_checked: usize,
    pub missing_end: usize,
    pub overlong: usize,
    pub findings: Vec<SessionFinding>,
}

impl ConsistencyReport {
    pub const fn anomaly_count(&self) -> usize {
        self.missing_end + self.overlong
    }
}

/// Flags sessions without an end and sessions longer than 24 hours.
pub fn check_sessions(state: &LogState) -> ConsistencyReport {
    let limit = Duration::hours(MAX_PLAUSIBLE_SESSION_HOURS);
    let mut report = ConsistencyReport::default();

    for player in state.players.values() {
        for (index, session) in player.sessions.iter().enumerate() {
            report.sessions_checked += 1;
            let kind = match session.duration() {
                None => FindingKind::MissingEnd,
                Some(length) if length > limit => FindingKind::OverlongSession,
                Some(_) => continue,
            };
            match kind {
                FindingKind::MissingEnd => report.missing_end += 1,
                FindingKind::OverlongSession => report.overlong += 1,
            }
            tracing::debug!(player = %player.name, index, ?kind, "suspicious session");
            report.findings.push(SessionFinding {
                player: player.name.clone(),
                index,
                start: session.start,
                kind,
            });
        }
    }

    report
}
