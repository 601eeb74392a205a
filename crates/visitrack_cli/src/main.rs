//! Visitrack CLI
//!
//! Command-line tools for inspecting access-activity views offline.
//!
//! # Commands
//!
//! - `replay` - Load a query snapshot, apply a push-event log, print the view
//! - `check-events` - Validate every payload of a push-event log
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use time::macros::format_description;
use time::Date;
use tracing_subscriber::EnvFilter;

/// Visitrack command-line tools.
#[derive(Parser)]
#[command(name = "visitrack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a push-event log on top of a query snapshot
    Replay {
        /// Query response JSON used as the initial load
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Push-event log, one {"topic", "payload"} object per line
        #[arg(short, long)]
        events: Option<PathBuf>,

        /// Rows per page
        #[arg(short, long, default_value = "10")]
        page_size: u32,

        /// Day of interest (YYYY-MM-DD)
        #[arg(short, long, value_parser = parse_date)]
        date: Option<Date>,

        /// Restrict the view to one access point
        #[arg(short, long)]
        access: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check a push-event log for malformed payloads
    CheckEvents {
        /// Push-event log, one {"topic", "payload"} object per line
        #[arg(short, long)]
        events: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn parse_date(value: &str) -> Result<Date, String> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map_err(|e| format!("invalid date {value:?}: {e}"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Replay {
            snapshot,
            events,
            page_size,
            date,
            access,
            format,
        } => {
            let options = commands::replay::ReplayOptions {
                page_size,
                date,
                access_scope: access,
            };
            commands::replay::run(&snapshot, events.as_deref(), &options, &format)?;
        }
        Commands::CheckEvents { events, format } => {
            commands::check_events::run(&events, &format)?;
        }
        Commands::Version => {
            println!("Visitrack CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Visitrack Protocol v{}", visitrack_protocol::VERSION);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_replay_arguments() {
        let cli = Cli::try_parse_from([
            "visitrack",
            "replay",
            "--snapshot",
            "snap.json",
            "--date",
            "2024-05-01",
            "--access",
            "lab",
        ])
        .unwrap();
        match cli.command {
            Commands::Replay {
                date, access, page_size, ..
            } => {
                assert_eq!(date.map(|d| d.day()), Some(1));
                assert_eq!(access.as_deref(), Some("lab"));
                assert_eq!(page_size, 10);
            }
            _ => panic!("expected replay"),
        }
    }

    #[test]
    fn rejects_bad_dates() {
        assert!(parse_date("05/01/2024").is_err());
        assert!(parse_date("2024-02-30").is_err());
    }
}
