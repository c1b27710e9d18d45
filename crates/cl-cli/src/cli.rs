//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Chat log statistics.
///
/// Reads a directory of daily server chat logs, reconstructs per-player
/// activity and stores the aggregate results in a local database.
#[derive(Debug, Parser)]
#[command(name = "chatlog", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze every log file and replace the stored results.
    Analyze {
        /// Log directory to read instead of the configured one.
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Show the stored statistics of one player.
    Player {
        /// Player name as it appears in the log.
        name: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show when the last analysis ran and a few world totals.
    Status,

    /// Download missing daily logs from the archive.
    Fetch {
        /// First day to download (defaults to the first day of the archive).
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day to download (defaults to yesterday).
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_player_with_global_flags() {
        let cli = Cli::try_parse_from(["chatlog", "player", "Alice", "--json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Some(Commands::Player { ref name, json: true }) if name == "Alice"
        ));
    }

    #[test]
    fn parses_fetch_dates() {
        let cli =
            Cli::try_parse_from(["chatlog", "fetch", "--from", "2020-01-01", "--to", "2020-01-03"])
                .unwrap();
        let Some(Commands::Fetch { from, to }) = cli.command else {
            panic!("expected fetch command");
        };
        assert_eq!(from, NaiveDate::from_ymd_opt(2020, 1, 1));
        assert_eq!(to, NaiveDate::from_ymd_opt(2020, 1, 3));
    }

    #[test]
    fn rejects_malformed_date() {
        assert!(Cli::try_parse_from(["chatlog", "fetch", "--from", "01/01/2020"]).is_err());
    }
}
