//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::config::Config;

/// Shutdown Timer - countdown to shutdown, one instance per session
#[derive(Parser)]
#[command(
    name = "st",
    about = "Countdown-to-shutdown timer; launching it again restarts the running countdown",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Instance channel name (overrides config)
    #[arg(short, long, global = true)]
    pub name: Option<String>,

    /// Directory for the instance socket and lock file (overrides config)
    #[arg(long = "runtime-dir", global = true)]
    pub runtime_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Fold command-line overrides into the loaded config
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(name) = &self.name {
            debug!(%name, "apply_overrides: instance name");
            config.instance.name = name.clone();
        }
        if let Some(dir) = &self.runtime_dir {
            debug!(?dir, "apply_overrides: runtime dir");
            config.instance.runtime_dir = Some(dir.clone());
        }
        if let Some(Command::Run {
            duration_secs: Some(secs),
        }) = &self.command
        {
            debug!(secs, "apply_overrides: duration");
            config.timer.duration_secs = *secs;
        }
    }
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the countdown, or restart it if already running (default)
    Run {
        /// Countdown length in seconds
        #[arg(short, long)]
        duration_secs: Option<u64>,
    },

    /// Restart the running countdown without ever starting a new one
    Restart,

    /// Show whether a countdown is running
    Status,

    /// Stop the running countdown without running the expire commands
    Cancel,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shutdown-timer")
        .join("logs")
        .join("shutdown-timer.log")
}

/// Generate the after_help text
pub fn generate_after_help() -> String {
    format!("Logs are written to: {}\n", get_log_path().display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["st"]);
        assert!(cli.command.is_none());
        assert!(cli.name.is_none());
    }

    #[test]
    fn test_cli_parse_run_with_duration() {
        let cli = Cli::parse_from(["st", "run", "--duration-secs", "90"]);
        assert!(matches!(
            cli.command,
            Some(Command::Run {
                duration_secs: Some(90)
            })
        ));
    }

    #[test]
    fn test_cli_parse_restart_and_status() {
        assert!(matches!(Cli::parse_from(["st", "restart"]).command, Some(Command::Restart)));
        assert!(matches!(Cli::parse_from(["st", "status"]).command, Some(Command::Status)));
        assert!(matches!(Cli::parse_from(["st", "cancel"]).command, Some(Command::Cancel)));
    }

    #[test]
    fn test_cli_global_options_after_subcommand() {
        let cli = Cli::parse_from(["st", "restart", "--name", "X", "--runtime-dir", "/tmp/x", "-l", "debug"]);
        assert_eq!(cli.name.as_deref(), Some("X"));
        assert_eq!(cli.runtime_dir, Some(PathBuf::from("/tmp/x")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_apply_overrides() {
        let cli = Cli::parse_from(["st", "run", "-d", "5", "--name", "X", "--runtime-dir", "/tmp/x"]);
        let mut config = Config::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.instance.name, "X");
        assert_eq!(config.instance.runtime_dir, Some(PathBuf::from("/tmp/x")));
        assert_eq!(config.timer.duration_secs, 5);
    }

    #[test]
    fn test_log_path() {
        assert!(get_log_path().ends_with("shutdown-timer/logs/shutdown-timer.log"));
    }
}
