//! Aggregate state built during a single ingestion pass.
//!
//! [`LogState`] is created empty at the start of a run, mutated only by the
//! classifier set, finalized after the last line, and then handed to the
//! storage sink. Nothing survives between runs.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

/// One connected interval of a player.
///
/// `end` is `None` while the session is open, or permanently when the log
/// never recorded how it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Session {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl Session {
    pub const fn open(start: DateTime<Utc>) -> Self {
        Self { start, end: None }
    }

    pub const fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Length of a closed session; `None` while either bound is missing.
    ///
    /// Reversed bounds count as zero.
    pub fn duration(&self) -> Option<Duration> {
        let end = self.end?;
        Some((end - self.start).max(Duration::zero()))
    }
}

/// Aggregate record for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerRecord {
    pub name: String,
    /// Timestamp of the first event that created the record. Never changes.
    pub first_seen: DateTime<Utc>,
    /// Latest event timestamp. Only ever moves forward.
    pub last_seen: DateTime<Utc>,
    pub n_logins: u64,
    pub n_messages: u64,
    pub n_shouts: u64,
    pub n_suicides: u64,
    pub n_deaths: u64,
    pub n_chunks_generated: u64,
    pub n_kicks: u64,
    pub n_marks: u64,
    pub n_duct_tapes: u64,
    pub n_soliloquies: u64,
    /// Sum of closed session lengths, filled in by [`LogState::finalize`].
    #[serde(serialize_with = "serialize_seconds")]
    pub total_active: Duration,
    pub planes: BTreeSet<String>,
    /// Names this record carried before renames, oldest first.
    pub former_names: Vec<String>,
    pub sessions: Vec<Session>,
}

impl PlayerRecord {
    /// Creates an empty record first observed at `timestamp`.
    pub fn new(name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            first_seen: timestamp,
            last_seen: timestamp,
            n_logins: 0,
            n_messages: 0,
            n_shouts: 0,
            n_suicides: 0,
            n_deaths: 0,
            n_chunks_generated: 0,
            n_kicks: 0,
            n_marks: 0,
            n_duct_tapes: 0,
            n_soliloquies: 0,
            total_active: Duration::zero(),
            planes: BTreeSet::new(),
            former_names: Vec::new(),
            sessions: Vec::new(),
        }
    }

    /// Advances `last_seen` if `timestamp` is newer.
    pub fn touch(&mut self, timestamp: DateTime<Utc>) {
        if timestamp > self.last_seen {
            self.last_seen = timestamp;
        }
    }

    /// Sum of `end - start` over sessions with both bounds present.
    pub fn total_active_duration(&self) -> Duration {
        self.sessions
            .iter()
            .filter_map(Session::duration)
            .fold(Duration::zero(), |acc, d| acc + d)
    }

    pub fn open_session(&self) -> Option<&Session> {
        self.sessions.last().filter(|s| s.is_open())
    }
}

fn serialize_seconds<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_i64(duration.num_seconds())
}

/// An administrative account cleanup broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupEvent {
    pub timestamp: DateTime<Utc>,
    pub accounts_kept: u64,
}

/// Process-wide counters that are not tied to one player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorldStats {
    /// Mob name → number of times that mob kind was slain by a player.
    pub deaths_by_mob: BTreeMap<String, u64>,
    /// Mob name → number of players it killed.
    pub kills_by_mob: BTreeMap<String, u64>,
    pub cleanups: Vec<CleanupEvent>,
    /// Calendar day → chunks generated server-wide.
    pub chunks_by_date: BTreeMap<NaiveDate, u64>,
}

/// Non-fatal inconsistencies seen while classifying lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnomalyCounts {
    /// Leave line for an unknown player or one without an open session.
    pub unmatched_leaves: u64,
    /// Join line while the player already had an open session.
    pub duplicate_joins: u64,
    /// Kick, mark, mute, death, chunk or emote line naming an unknown player.
    pub unknown_players: u64,
    /// Rename whose old name is unknown or whose new name is taken.
    pub ambiguous_renames: u64,
    /// Chat name still containing an unparsed position annotation.
    pub malformed_names: u64,
}

impl AnomalyCounts {
    pub const fn total(&self) -> u64 {
        self.unmatched_leaves
            + self.duplicate_joins
            + self.unknown_players
            + self.ambiguous_renames
            + self.malformed_names
    }
}

/// Result of a rename event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rename {
    Moved,
    Unchanged,
    UnknownPlayer,
    NameTaken,
}

/// Everything a run accumulates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogState {
    pub players: BTreeMap<String, PlayerRecord>,
    pub world: WorldStats,
    /// Players with a currently open session.
    pub active_sessions: BTreeSet<String>,
    pub anomalies: AnomalyCounts,
}

impl LogState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `name`, creating it on first sight.
    ///
    /// Only events that legitimately originate a player (join, chat, plane
    /// shift, suicide) go through here.
    pub fn ensure_player(&mut self, name: &str, timestamp: DateTime<Utc>) -> &mut PlayerRecord {
        self.players
            .entry(name.to_string())
            .or_insert_with(|| PlayerRecord::new(name, timestamp))
    }

    /// Returns an existing record, counting an anomaly when it is missing.
    ///
    /// Used by events that must never invent a player.
    pub fn known_player(&mut self, name: &str, event: &str) -> Option<&mut PlayerRecord> {
        let Self {
            players, anomalies, ..
        } = self;
        let player = players.get_mut(name);
        if player.is_none() {
            anomalies.unknown_players += 1;
            tracing::debug!(player = name, event, "event for unknown player");
        }
        player
    }

    pub fn player(&self, name: &str) -> Option<&PlayerRecord> {
        self.players.get(name)
    }

    /// Adds chunks to the server-wide bucket for the timestamp's day.
    pub fn add_chunks_for_day(&mut self, timestamp: DateTime<Utc>, chunks: u64) {
        *self
            .world
            .chunks_by_date
            .entry(timestamp.date_naive())
            .or_insert(0) += chunks;
    }

    /// Makes sure a day appears in the chunk timeline, even with no chunks.
    pub fn seed_day(&mut self, date: NaiveDate) {
        self.world.chunks_by_date.entry(date).or_insert(0);
    }

    /// Moves a player's record, counters and sessions to a new name.
    ///
    /// The record keeps its history and remembers the old name. An open
    /// session moves with it, so a later leave under the new name closes it.
    /// Renames from an unknown name or onto a taken name change nothing.
    pub fn rename_player(&mut self, old: &str, new: &str, timestamp: DateTime<Utc>) -> Rename {
        if old == new {
            return Rename::Unchanged;
        }
        if self.players.contains_key(new) {
            self.anomalies.ambiguous_renames += 1;
            tracing::debug!(old, new, "rename onto an existing player");
            return Rename::NameTaken;
        }
        let Some(mut record) = self.players.remove(old) else {
            self.anomalies.ambiguous_renames += 1;
            tracing::debug!(old, new, "rename of unknown player");
            return Rename::UnknownPlayer;
        };

        record.former_names.push(record.name.clone());
        record.name = new.to_string();
        record.touch(timestamp);
        self.players.insert(new.to_string(), record);

        if self.active_sessions.remove(old) {
            self.active_sessions.insert(new.to_string());
        }
        Rename::Moved
    }

    /// Computes derived fields once ingestion is complete.
    pub fn finalize(&mut self) {
        for player in self.players.values_mut() {
            player.total_active = player.total_active_duration();
        }
    }
}
