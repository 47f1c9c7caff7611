//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Record command arguments.
#[derive(Debug, Args)]
pub struct RecordCommand {
    /// Stop automatically after this many seconds
    #[arg(short, long, value_name = "SECS")]
    pub duration: Option<u64>,
}

/// Alert inspection commands.
#[derive(Debug, Subcommand)]
pub enum AlertsCommand {
    /// List the most recent alerts
    List {
        /// Maximum number of alerts
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show one alert and its chunks
    Show {
        /// The alert id
        id: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Pending command arguments.
#[derive(Debug, Args)]
pub struct PendingCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alerts_command_debug() {
        let cmd = AlertsCommand::List {
            limit: 20,
            json: false,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("List"));
        assert!(debug_str.contains("limit"));
    }

    #[test]
    fn test_record_command_debug() {
        let cmd = RecordCommand { duration: Some(60) };
        assert!(format!("{cmd:?}").contains("duration"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        assert!(format!("{cmd:?}").contains("Show"));
    }
}
