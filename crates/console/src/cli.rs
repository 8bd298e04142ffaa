//! Command-line interface handling for the console front-end.
//!
//! Flags given here override the matching settings of the configuration file.

use clap::{Arg, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Server whose console should be opened
    pub server_id: Option<String>,
    /// Optional override for the panel base URL
    pub panel_url: Option<String>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    fn command() -> Command {
        Command::new("console")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Live console for a hosted server process")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("console.toml"),
            )
            .arg(
                Arg::new("server")
                    .short('s')
                    .long("server")
                    .value_name("ID")
                    .help("Identifier of the server to attach to"),
            )
            .arg(
                Arg::new("panel-url")
                    .short('u')
                    .long("panel-url")
                    .value_name("URL")
                    .help("Base URL of the management API (e.g., https://panel.example.com)"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output diagnostic logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
    }

    /// Parses the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    fn from_matches(matches: &clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("console.toml")),
            server_id: matches.get_one::<String>("server").cloned(),
            panel_url: matches.get_one::<String>("panel-url").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}
