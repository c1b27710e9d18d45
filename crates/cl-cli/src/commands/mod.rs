//! CLI subcommand implementations.

pub mod analyze;
pub mod fetch;
pub mod player;
pub mod status;
mod util;
