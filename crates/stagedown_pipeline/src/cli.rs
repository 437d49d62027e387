//! Command-line interface handling for the pipeline process.
//!
//! Command-line options override the matching configuration file settings.

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional override for the force-kill window, in milliseconds
    pub force_kill_window_ms: Option<u64>,
}

impl CliArgs {
    fn command() -> Command {
        Command::new("Stagedown Pipeline")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Multi-stage pipeline that shuts down stage by stage on SIGINT/SIGTERM")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("pipeline.toml"),
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
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("force-kill-window-ms")
                    .short('k')
                    .long("force-kill-window-ms")
                    .value_name("MILLIS")
                    .help("Time allowed for the whole shutdown before the process is forced out")
                    .value_parser(clap::value_parser!(u64)),
            )
    }

    /// Parses the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    /// Parses an explicit argument list.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        Ok(Self::from_matches(&matches))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("pipeline.toml")),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            force_kill_window_ms: matches.get_one::<u64>("force-kill-window-ms").copied(),
        }
    }
}
