//! Chat log statistics CLI library.
//!
//! This crate provides the CLI interface for the chat log analyzer.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::{Config, FetchConfig};
