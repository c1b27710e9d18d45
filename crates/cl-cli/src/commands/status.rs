//! Status command for showing the last analysis and world totals.

use std::io::Write;

use anyhow::Result;

use super::util::{format_timestamp, open_database};
use crate::Config;

/// How many mobs each ranking lists.
const TOP_MOBS: usize = 5;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let db = open_database(&config.database_path)?;

    writeln!(writer, "Chat log status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;

    let Some(summary) = db.last_analysis()? else {
        writeln!(writer, "No analysis stored yet. Run `chatlog analyze`.")?;
        return Ok(());
    };

    writeln!(
        writer,
        "Last analysis: {}",
        format_timestamp(summary.analyzed_at)
    )?;
    writeln!(
        writer,
        "Files: {}  Lines: {}  Anomalies: {}",
        summary.files, summary.lines, summary.anomalies
    )?;
    writeln!(writer, "Players: {}", db.count_players()?)?;

    let total_chunks: i64 = db.chunk_timeline()?.iter().map(|(_, chunks)| chunks).sum();
    writeln!(writer, "Chunks generated: {total_chunks}")?;

    for (title, mobs) in [
        ("Most slain mobs:", db.top_mob_deaths(TOP_MOBS)?),
        ("Deadliest mobs:", db.top_mob_kills(TOP_MOBS)?),
    ] {
        if mobs.is_empty() {
            continue;
        }
        writeln!(writer, "{title}")?;
        for mob in mobs {
            writeln!(writer, "- {}: {}", mob.name, mob.count)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use insta::assert_snapshot;

    use cl_core::LogState;
    use cl_db::{AnalysisSummary, Database};

    use crate::FetchConfig;

    fn test_config(temp: &tempfile::TempDir) -> Config {
        Config {
            database_path: temp.path().join("chatlog.db"),
            chatlog_dir: temp.path().join("logs"),
            fetch: FetchConfig::default(),
        }
    }

    fn redact(output: Vec<u8>, config: &Config) -> String {
        String::from_utf8(output).unwrap().replace(
            &config.database_path.display().to_string(),
            "[TEMP]/chatlog.db",
        )
    }

    #[test]
    fn status_before_first_analysis() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(&temp);

        let mut output = Vec::new();
        run(&mut output, &config).unwrap();

        assert_snapshot!(redact(output, &config), @r"
        Chat log status
        Database: [TEMP]/chatlog.db
        No analysis stored yet. Run `chatlog analyze`.
        ");
    }

    #[test]
    fn status_command_outputs_totals_and_rankings() {
        let temp = tempfile::tempdir().unwrap();
        let config = test_config(&temp);
        let at = |d| Utc.with_ymd_and_hms(2020, 1, d, 0, 0, 0).unwrap();

        let mut state = LogState::new();
        state.ensure_player("Alice", at(1));
        state.ensure_player("Bob", at(1));
        for (mob, n) in [("Oerkki", 7), ("Goblin", 2), ("Flying Menace", 7)] {
            state.world.deaths_by_mob.insert(mob.to_string(), n);
        }
        state.world.kills_by_mob.insert("Sand Monster".to_string(), 3);
        state.add_chunks_for_day(at(1), 40);
        state.add_chunks_for_day(at(2), 2);

        let mut db = Database::open(&config.database_path).unwrap();
        db.store_analysis(
            &state,
            &AnalysisSummary {
                analyzed_at: Utc.with_ymd_and_hms(2020, 1, 3, 12, 0, 0).unwrap(),
                files: 2,
                lines: 345,
                anomalies: 1,
            },
        )
        .unwrap();

        let mut output = Vec::new();
        run(&mut output, &config).unwrap();

        assert_snapshot!(redact(output, &config), @r"
        Chat log status
        Database: [TEMP]/chatlog.db
        Last analysis: 2020-01-03 12:00:00 UTC
        Files: 2  Lines: 345  Anomalies: 1
        Players: 2
        Chunks generated: 42
        Most slain mobs:
        - Flying Menace: 7
        - Oerkki: 7
        - Goblin: 2
        Deadliest mobs:
        - Sand Monster: 3
        ");
    }
}
