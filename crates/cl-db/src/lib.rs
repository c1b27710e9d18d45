//! Storage layer for chat log statistics.
//!
//! Persists the result of an analysis run using `rusqlite`. The stored data is
//! a snapshot, not a history: every run replaces all tables in one
//! transaction, so readers either see the previous run or the new one.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but not shared without
//! external synchronization.
//!
//! # Schema
//!
//! Timestamps are stored as TEXT in RFC 3339 format (e.g. `2020-01-15T10:30:00Z`),
//! so lexicographic order matches chronological order. Dates are stored as
//! `YYYY-MM-DD`. Durations are stored as whole seconds.

use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use cl_core::LogState;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored timestamp could not be parsed back.
    #[error("invalid timestamp in {table}: {value}")]
    TimestampParse {
        table: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// Run-level facts stored alongside the results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisSummary {
    pub analyzed_at: DateTime<Utc>,
    pub files: i64,
    pub lines: i64,
    pub anomalies: i64,
}

/// A player as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredPlayer {
    pub name: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_time_s: i64,
    pub n_logins: i64,
    pub n_messages: i64,
    pub n_shouts: i64,
    pub n_suicides: i64,
    pub n_deaths: i64,
    pub n_chunks: i64,
    pub n_kicks: i64,
    pub n_marks: i64,
    pub n_duct_tapes: i64,
    pub n_soliloquies: i64,
    pub n_sessions: i64,
    pub planes: Vec<String>,
    pub former_names: Vec<String>,
}

/// A mob name with a count, used for both death and kill rankings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MobCount {
    pub name: String,
    pub count: i64,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS players (
                name TEXT PRIMARY KEY,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                total_time_s INTEGER NOT NULL DEFAULT 0,
                n_logins INTEGER NOT NULL DEFAULT 0,
                n_messages INTEGER NOT NULL DEFAULT 0,
                n_shouts INTEGER NOT NULL DEFAULT 0,
                n_suicides INTEGER NOT NULL DEFAULT 0,
                n_deaths INTEGER NOT NULL DEFAULT 0,
                n_chunks INTEGER NOT NULL DEFAULT 0,
                n_kicks INTEGER NOT NULL DEFAULT 0,
                n_marks INTEGER NOT NULL DEFAULT 0,
                n_duct_tapes INTEGER NOT NULL DEFAULT 0,
                n_soliloquies INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_players_last_seen ON players(last_seen);

            CREATE TABLE IF NOT EXISTS player_planes (
                player TEXT NOT NULL,
                plane TEXT NOT NULL,
                PRIMARY KEY (player, plane),
                FOREIGN KEY (player) REFERENCES players(name) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS player_aliases (
                player TEXT NOT NULL,
                former_name TEXT NOT NULL,
                seq INTEGER NOT NULL,
                PRIMARY KEY (player, seq),
                FOREIGN KEY (player) REFERENCES players(name) ON DELETE CASCADE
            );

            -- ended_at is NULL for sessions that never saw a leave or shutdown
            CREATE TABLE IF NOT EXISTS sessions (
                player TEXT NOT NULL,
                seq INTEGER NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                PRIMARY KEY (player, seq),
                FOREIGN KEY (player) REFERENCES players(name) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);

            CREATE TABLE IF NOT EXISTS mobs (
                name TEXT PRIMARY KEY,
                n_deaths INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS mob_kills (
                name TEXT PRIMARY KEY,
                n_kills INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS account_cleanups (
                timestamp TEXT NOT NULL,
                accounts_kept INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunk_generations (
                date TEXT PRIMARY KEY,
                chunks INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                analyzed_at TEXT NOT NULL,
                files INTEGER NOT NULL,
                lines INTEGER NOT NULL,
                anomalies INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Replaces all stored results with `state`.
    ///
    /// Runs in a single transaction; on any error nothing is changed.
    pub fn store_analysis(
        &mut self,
        state: &LogState,
        summary: &AnalysisSummary,
    ) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "
            DELETE FROM player_planes;
            DELETE FROM player_aliases;
            DELETE FROM sessions;
            DELETE FROM players;
            DELETE FROM mobs;
            DELETE FROM mob_kills;
            DELETE FROM account_cleanups;
            DELETE FROM chunk_generations;
            DELETE FROM meta;
            ",
        )?;
        {
            let mut player_stmt = tx.prepare(
                "
                INSERT INTO players
                (name, first_seen, last_seen, total_time_s, n_logins, n_messages, n_shouts,
                 n_suicides, n_deaths, n_chunks, n_kicks, n_marks, n_duct_tapes, n_soliloquies)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            let mut plane_stmt =
                tx.prepare("INSERT INTO player_planes (player, plane) VALUES (?, ?)")?;
            let mut alias_stmt = tx.prepare(
                "INSERT INTO player_aliases (player, former_name, seq) VALUES (?, ?, ?)",
            )?;
            let mut session_stmt =
                tx.prepare("INSERT INTO sessions (player, seq, started_at, ended_at) VALUES (?, ?, ?, ?)")?;

            for player in state.players.values() {
                player_stmt.execute(params![
                    player.name,
                    format_timestamp(player.first_seen),
                    format_timestamp(player.last_seen),
                    player.total_active.num_seconds(),
                    count(player.n_logins),
                    count(player.n_messages),
                    count(player.n_shouts),
                    count(player.n_suicides),
                    count(player.n_deaths),
                    count(player.n_chunks_generated),
                    count(player.n_kicks),
                    count(player.n_marks),
                    count(player.n_duct_tapes),
                    count(player.n_soliloquies),
                ])?;
                for plane in &player.planes {
                    plane_stmt.execute(params![player.name, plane])?;
                }
                for (seq, former) in player.former_names.iter().enumerate() {
                    alias_stmt.execute(params![player.name, former, count(seq)])?;
                }
                for (seq, session) in player.sessions.iter().enumerate() {
                    session_stmt.execute(params![
                        player.name,
                        count(seq),
                        format_timestamp(session.start),
                        session.end.map(format_timestamp),
                    ])?;
                }
            }

            let mut mob_stmt = tx.prepare("INSERT INTO mobs (name, n_deaths) VALUES (?, ?)")?;
            for (mob, deaths) in &state.world.deaths_by_mob {
                mob_stmt.execute(params![mob, count(*deaths)])?;
            }

            let mut kill_stmt =
                tx.prepare("INSERT INTO mob_kills (name, n_kills) VALUES (?, ?)")?;
            for (mob, kills) in &state.world.kills_by_mob {
                kill_stmt.execute(params![mob, count(*kills)])?;
            }

            let mut cleanup_stmt = tx.prepare(
                "INSERT INTO account_cleanups (timestamp, accounts_kept) VALUES (?, ?)",
            )?;
            for cleanup in &state.world.cleanups {
                cleanup_stmt.execute(params![
                    format_timestamp(cleanup.timestamp),
                    count(cleanup.accounts_kept),
                ])?;
            }

            let mut chunk_stmt =
                tx.prepare("INSERT INTO chunk_generations (date, chunks) VALUES (?, ?)")?;
            for (date, chunks) in &state.world.chunks_by_date {
                chunk_stmt.execute(params![format_date(*date), count(*chunks)])?;
            }

            tx.execute(
                "INSERT INTO meta (analyzed_at, files, lines, anomalies) VALUES (?, ?, ?, ?)",
                params![
                    format_timestamp(summary.analyzed_at),
                    summary.files,
                    summary.lines,
                    summary.anomalies,
                ],
            )?;
        }
        tx.commit()?;
        tracing::debug!(players = state.players.len(), "stored analysis");
        Ok(())
    }

    /// Returns the summary of the most recent run, if any run has been stored.
    pub fn last_analysis(&self) -> Result<Option<AnalysisSummary>, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT analyzed_at, files, lines, anomalies FROM meta LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(analyzed_at, files, lines, anomalies)| {
            Ok(AnalysisSummary {
                analyzed_at: parse_timestamp(&analyzed_at, "meta")?,
                files,
                lines,
                anomalies,
            })
        })
        .transpose()
    }

    /// Looks up one player with their planes, former names and session count.
    pub fn get_player(&self, name: &str) -> Result<Option<StoredPlayer>, DbError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT name, first_seen, last_seen, total_time_s, n_logins, n_messages,
                       n_shouts, n_suicides, n_deaths, n_chunks, n_kicks, n_marks,
                       n_duct_tapes, n_soliloquies,
                       (SELECT COUNT(*) FROM sessions WHERE sessions.player = players.name)
                FROM players
                WHERE name = ?
                ",
                [name],
                PlayerRow::from_row,
            )
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };

        let planes = self.list_strings(
            "SELECT plane FROM player_planes WHERE player = ? ORDER BY plane ASC",
            name,
        )?;
        let former_names = self.list_strings(
            "SELECT former_name FROM player_aliases WHERE player = ? ORDER BY seq ASC",
            name,
        )?;
        row.into_player(planes, former_names).map(Some)
    }

    /// Mobs most often slain by players, highest count first.
    pub fn top_mob_deaths(&self, limit: usize) -> Result<Vec<MobCount>, DbError> {
        self.ranked_mobs(
            "SELECT name, n_deaths FROM mobs ORDER BY n_deaths DESC, name ASC LIMIT ?",
            limit,
        )
    }

    /// Mobs that killed the most players, highest count first.
    pub fn top_mob_kills(&self, limit: usize) -> Result<Vec<MobCount>, DbError> {
        self.ranked_mobs(
            "SELECT name, n_kills FROM mob_kills ORDER BY n_kills DESC, name ASC LIMIT ?",
            limit,
        )
    }

    pub fn count_players(&self) -> Result<i64, DbError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))?)
    }

    /// Total chunks generated per day, oldest first.
    pub fn chunk_timeline(&self) -> Result<Vec<(NaiveDate, i64)>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, chunks FROM chunk_generations ORDER BY date ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut timeline = Vec::new();
        for row in rows {
            let (date, chunks) = row?;
            let date = NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|source| {
                DbError::TimestampParse {
                    table: "chunk_generations",
                    value: date.clone(),
                    source,
                }
            })?;
            timeline.push((date, chunks));
        }
        Ok(timeline)
    }

    fn ranked_mobs(&self, sql: &str, limit: usize) -> Result<Vec<MobCount>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([count(limit)], |row| {
            Ok(MobCount {
                name: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        let mut mobs = Vec::new();
        for row in rows {
            mobs.push(row?);
        }
        Ok(mobs)
    }

    fn list_strings(&self, sql: &str, key: &str) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([key], |row| row.get::<_, String>(0))?;
        let mut values = Vec::new();
        for row in rows {
            values.push(row?);
        }
        Ok(values)
    }
}

/// Raw `players` row before timestamp parsing.
struct PlayerRow {
    name: String,
    first_seen: String,
    last_seen: String,
    counters: [i64; 12],
}

impl PlayerRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mut counters = [0; 12];
        for (i, slot) in counters.iter_mut().enumerate() {
            *slot = row.get(i + 3)?;
        }
        Ok(Self {
            name: row.get(0)?,
            first_seen: row.get(1)?,
            last_seen: row.get(2)?,
            counters,
        })
    }

    fn into_player(
        self,
        planes: Vec<String>,
        former_names: Vec<String>,
    ) -> Result<StoredPlayer, DbError> {
        let [
            total_time_s,
            n_logins,
            n_messages,
            n_shouts,
            n_suicides,
            n_deaths,
            n_chunks,
            n_kicks,
            n_marks,
            n_duct_tapes,
            n_soliloquies,
            n_sessions,
        ] = self.counters;
        Ok(StoredPlayer {
            first_seen: parse_timestamp(&self.first_seen, "players")?,
            last_seen: parse_timestamp(&self.last_seen, "players")?,
            name: self.name,
            total_time_s,
            n_logins,
            n_messages,
            n_shouts,
            n_suicides,
            n_deaths,
            n_chunks,
            n_kicks,
            n_marks,
            n_duct_tapes,
            n_soliloquies,
            n_sessions,
            planes,
            former_names,
        })
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite integers are signed; saturate instead of wrapping.
fn count<T: TryInto<i64>>(n: T) -> i64 {
    n.try_into().unwrap_or(i64::MAX)
}

fn parse_timestamp(timestamp: &str, table: &'static str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            table,
            value: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};
    use cl_core::{CleanupEvent, Session};

    fn ts(d: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, d, hour, 0, 0).unwrap()
    }

    fn summary(files: i64) -> AnalysisSummary {
        AnalysisSummary {
            analyzed_at: ts(5, 0),
            files,
            lines: 100,
            anomalies: 2,
        }
    }

    fn sample_state() -> LogState {
        let mut state = LogState::new();
        let alice = state.ensure_player("Alice", ts(1, 10));
        alice.n_messages = 4;
        alice.n_logins = 1;
        alice.n_chunks_generated = 12;
        alice.planes.insert("Nether".to_string());
        alice.planes.insert("Caverns".to_string());
        alice.former_names = vec!["Al".to_string(), "Ally".to_string()];
        alice.sessions.push(Session {
            start: ts(1, 10),
            end: Some(ts(1, 12)),
        });
        alice.sessions.push(Session::open(ts(2, 10)));
        alice.last_seen = ts(2, 10);
        state.ensure_player("Bob", ts(1, 11)).n_suicides = 1;

        state.world.deaths_by_mob.insert("Oerkki".to_string(), 3);
        state.world.deaths_by_mob.insert("Flying Menace".to_string(), 5);
        state.world.deaths_by_mob.insert("Goblin".to_string(), 3);
        state.world.kills_by_mob.insert("Sand Monster".to_string(), 1);
        state.world.cleanups.push(CleanupEvent {
            timestamp: ts(3, 0),
            accounts_kept: 1234,
        });
        state.world.chunks_by_date.insert(ts(1, 0).date_naive(), 12);
        state.world.chunks_by_date.insert(ts(2, 0).date_naive(), 0);
        state.finalize();
        state
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    fn row_count(db: &Database, table: &str) -> i64 {
        db.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("count rows")
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");

        assert_eq!(
            table_columns(&db.conn, "players"),
            vec![
                "name",
                "first_seen",
                "last_seen",
                "total_time_s",
                "n_logins",
                "n_messages",
                "n_shouts",
                "n_suicides",
                "n_deaths",
                "n_chunks",
                "n_kicks",
                "n_marks",
                "n_duct_tapes",
                "n_soliloquies",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "sessions"),
            vec!["player", "seq", "started_at", "ended_at"]
        );
        assert_eq!(table_columns(&db.conn, "mobs"), vec!["name", "n_deaths"]);
        assert_eq!(
            table_columns(&db.conn, "meta"),
            vec!["analyzed_at", "files", "lines", "anomalies"]
        );
    }

    #[test]
    fn reopening_file_database_keeps_schema_and_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chatlog.db");
        {
            let mut db = Database::open(&path).expect("open db");
            db.store_analysis(&sample_state(), &summary(2))
                .expect("store");
        }
        let db = Database::open(&path).expect("reopen db");
        assert_eq!(db.count_players().expect("count"), 2);
    }

    #[test]
    fn stored_player_round_trips() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.store_analysis(&sample_state(), &summary(2))
            .expect("store");

        let alice = db.get_player("Alice").expect("query").expect("alice");
        assert_eq!(alice.first_seen, ts(1, 10));
        assert_eq!(alice.last_seen, ts(2, 10));
        assert_eq!(alice.total_time_s, Duration::hours(2).num_seconds());
        assert_eq!(alice.n_messages, 4);
        assert_eq!(alice.n_chunks, 12);
        assert_eq!(alice.n_sessions, 2);
        assert_eq!(alice.planes, vec!["Caverns", "Nether"]);
        assert_eq!(alice.former_names, vec!["Al", "Ally"]);

        assert!(db.get_player("Nobody").expect("query").is_none());
    }

    #[test]
    fn open_session_is_stored_with_null_end() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.store_analysis(&sample_state(), &summary(2))
            .expect("store");

        let open: i64 = db
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sessions WHERE ended_at IS NULL",
                [],
                |row| row.get(0),
            )
            .expect("count open sessions");
        assert_eq!(open, 1);
    }

    #[test]
    fn store_replaces_previous_run() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.store_analysis(&sample_state(), &summary(2))
            .expect("first store");

        let mut state = LogState::new();
        state.ensure_player("Carol", ts(4, 0));
        db.store_analysis(&state, &summary(1)).expect("second store");

        assert_eq!(db.count_players().expect("count"), 1);
        assert!(db.get_player("Alice").expect("query").is_none());
        assert_eq!(row_count(&db, "sessions"), 0);
        assert_eq!(row_count(&db, "mobs"), 0);
        assert_eq!(row_count(&db, "meta"), 1);
        assert_eq!(db.last_analysis().expect("meta").expect("summary").files, 1);
    }

    #[test]
    fn failed_store_leaves_previous_run_intact() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.store_analysis(&sample_state(), &summary(2))
            .expect("first store");

        db.conn
            .execute_batch("DROP TABLE account_cleanups;")
            .expect("drop table");
        let err = db.store_analysis(&LogState::new(), &summary(1));
        assert!(err.is_err());

        assert_eq!(db.count_players().expect("count"), 2);
        assert_eq!(db.last_analysis().expect("meta").expect("summary").files, 2);
    }

    #[test]
    fn last_analysis_is_none_before_first_run() {
        let db = Database::open_in_memory().expect("open in-memory db");
        assert!(db.last_analysis().expect("meta").is_none());
    }

    #[test]
    fn mob_rankings_order_by_count_then_name() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.store_analysis(&sample_state(), &summary(2))
            .expect("store");

        let names: Vec<_> = db
            .top_mob_deaths(2)
            .expect("top deaths")
            .into_iter()
            .map(|m| (m.name, m.count))
            .collect();
        assert_eq!(
            names,
            vec![("Flying Menace".to_string(), 5), ("Goblin".to_string(), 3)]
        );
        assert_eq!(
            db.top_mob_kills(10).expect("top kills"),
            vec![MobCount {
                name: "Sand Monster".to_string(),
                count: 1
            }]
        );
    }

    #[test]
    fn chunk_timeline_includes_empty_days() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.store_analysis(&sample_state(), &summary(2))
            .expect("store");

        assert_eq!(
            db.chunk_timeline().expect("timeline"),
            vec![(ts(1, 0).date_naive(), 12), (ts(2, 0).date_naive(), 0)]
        );
    }
}
