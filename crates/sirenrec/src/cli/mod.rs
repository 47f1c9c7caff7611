//! Command-line interface for sirenrec.
//!
//! This module provides the CLI structure for the `sirenrec` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AlertsCommand, ConfigCommand, PendingCommand, RecordCommand, StatusCommand,
};

/// sirenrec - Record panic alerts and upload them as they are captured
///
/// Records microphone audio in short segments and pushes each finished
/// segment to durable storage while the recording continues.
#[derive(Debug, Parser)]
#[command(name = "sirenrec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record an alert until interrupted
    Record(RecordCommand),

    /// Inspect recorded alerts
    #[command(subcommand)]
    Alerts(AlertsCommand),

    /// List segments still waiting on local storage
    Pending(PendingCommand),

    /// Show store statistics and locations
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn status_cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Status(StatusCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "sirenrec");
    }

    #[test]
    fn test_verbosity_levels() {
        use crate::logging::Verbosity;

        assert_eq!(status_cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(status_cli(3, true).verbosity(), Verbosity::Quiet);
        assert_eq!(status_cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(status_cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(status_cli(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_record() {
        let cli = Cli::try_parse_from(["sirenrec", "record"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Record(RecordCommand { duration: None })
        ));

        let cli = Cli::try_parse_from(["sirenrec", "record", "--duration", "30"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Record(RecordCommand { duration: Some(30) })
        ));
    }

    #[test]
    fn test_parse_alerts_list() {
        let cli = Cli::try_parse_from(["sirenrec", "alerts", "list", "--limit", "5", "--json"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::Alerts(AlertsCommand::List {
                limit: 5,
                json: true
            })
        ));
    }

    #[test]
    fn test_parse_alerts_show() {
        let cli = Cli::try_parse_from(["sirenrec", "alerts", "show", "abc123"]).unwrap();
        match cli.command {
            Command::Alerts(AlertsCommand::Show { id, json }) => {
                assert_eq!(id, "abc123");
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_alerts_show_requires_id() {
        assert!(Cli::try_parse_from(["sirenrec", "alerts", "show"]).is_err());
    }

    #[test]
    fn test_parse_pending_and_status() {
        let cli = Cli::try_parse_from(["sirenrec", "pending", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Pending(PendingCommand { json: true })));

        let cli = Cli::try_parse_from(["sirenrec", "status"]).unwrap();
        assert!(matches!(cli.command, Command::Status(_)));
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = Cli::try_parse_from(["sirenrec", "config", "validate", "-f", "/tmp/c.toml"])
            .unwrap();
        match cli.command {
            Command::Config(ConfigCommand::Validate { file }) => {
                assert_eq!(file, Some(PathBuf::from("/tmp/c.toml")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from(["sirenrec", "-c", "/custom/config.toml", "-vv", "status"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["sirenrec", "status", "-q"]).unwrap();
        assert!(cli.quiet);
    }
}
