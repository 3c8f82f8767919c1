//! Command-line surface.

use clap::{Args, Parser, Subcommand};

use crate::config::Settings;
use crate::logger::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "synapse", version)]
#[command(about = "Long-running worker with a heartbeat and graceful shutdown", long_about = None)]
pub struct Cli {
    /// Minimum log level (overrides SYNAPSE_LOG_LEVEL)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the worker until interrupted
    Pulse(PulseArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct PulseArgs {
    /// Seconds between heartbeats
    #[arg(long = "heartrate", visible_alias = "hr", env = "SYNAPSE_HEARTRATE", default_value_t = 2)]
    pub heartrate: u64,

    /// Retries for a failed task
    #[arg(short, long, env = "SYNAPSE_RETRIES", default_value_t = 3)]
    pub retries: u32,

    /// Tasks allowed to run at once
    #[arg(short, long, env = "SYNAPSE_PROCESSES", default_value_t = 1)]
    pub processes: u32,

    /// Seconds shutdown waits for each activity before aborting it
    #[arg(long, env = "SYNAPSE_SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout: u64,
}

impl PulseArgs {
    pub fn settings(&self) -> Settings {
        Settings {
            max_retries: self.retries,
            max_processes: self.processes,
            heartbeat_interval_secs: self.heartrate,
            shutdown_timeout_secs: self.shutdown_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse(args: &[&str]) -> (Option<LogLevel>, PulseArgs) {
        let cli = Cli::try_parse_from(args).unwrap();
        let Command::Pulse(pulse) = cli.command;
        (cli.log_level, pulse)
    }

    #[test]
    fn verifies_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn pulse_flags_map_to_settings() {
        let (level, args) = pulse(&[
            "synapse",
            "--log-level",
            "warning",
            "pulse",
            "--hr",
            "7",
            "-r",
            "0",
            "-p",
            "4",
            "--shutdown-timeout",
            "9",
        ]);
        assert_eq!(level, Some(LogLevel::Warn));
        assert_eq!(
            args.settings(),
            Settings {
                max_retries: 0,
                max_processes: 4,
                heartbeat_interval_secs: 7,
                shutdown_timeout_secs: 9,
            }
        );
    }

    #[test]
    fn log_level_after_subcommand() {
        let (level, _) = pulse(&["synapse", "pulse", "--log-level", "debug"]);
        assert_eq!(level, Some(LogLevel::Debug));
    }

    #[test]
    fn unknown_level_rejected() {
        assert!(Cli::try_parse_from(["synapse", "--log-level", "loud", "pulse"]).is_err());
    }

    #[test]
    fn missing_subcommand_rejected() {
        assert!(Cli::try_parse_from(["synapse"]).is_err());
    }
}
