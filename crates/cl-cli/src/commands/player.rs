//! Player command for looking up one player's stored statistics.

use std::io::Write;

use anyhow::{Context, Result};

use cl_db::StoredPlayer;

use super::util::{format_duration, format_timestamp, open_database};
use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config, name: &str, json: bool) -> Result<()> {
    let db = open_database(&config.database_path)?;
    let player = db
        .get_player(name)
        .with_context(|| format!("failed to look up player {name}"))?
        .with_context(|| format!("no player named {name}, has `chatlog analyze` run?"))?;

    if json {
        let json = serde_json::to_string_pretty(&player)?;
        writeln!(writer, "{json}")?;
    } else {
        render(writer, &player)?;
    }
    Ok(())
}

fn render<W: Write>(writer: &mut W, player: &StoredPlayer) -> Result<()> {
    writeln!(writer, "Player: {}", player.name)?;
    if !player.former_names.is_empty() {
        writeln!(writer, "Formerly: {}", player.former_names.join(", "))?;
    }
    writeln!(writer, "Last seen: {}", format_timestamp(player.last_seen))?;
    writeln!(writer, "First seen: {}", format_timestamp(player.first_seen))?;
    writeln!(
        writer,
        "Time played: {} in {} sessions ({} logins)",
        format_duration(player.total_time_s),
        player.n_sessions,
        player.n_logins
    )?;
    writeln!(
        writer,
        "Messages: {} ({} shouted)",
        player.n_messages, player.n_shouts
    )?;
    writeln!(writer, "Chunks generated: {}", player.n_chunks)?;
    writeln!(
        writer,
        "Deaths: {}  Suicides: {}",
        player.n_deaths, player.n_suicides
    )?;
    writeln!(
        writer,
        "Kicks: {}  Marks: {}  Duct-tapes: {}  Soliloquies: {}",
        player.n_kicks, player.n_marks, player.n_duct_tapes, player.n_soliloquies
    )?;
    if player.planes.is_empty() {
        writeln!(writer, "Realms: none")?;
    } else {
        writeln!(writer, "Realms: {}", player.planes.join(", "))?;
    }
    Ok(())
}
