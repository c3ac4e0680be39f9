// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `taskwarden`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskwarden",
    version,
    about = "Validate task graphs and keep agent task leases healthy.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKWARDEN_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Check a JSON task batch for orphans, cycles and terminal tasks.
    Validate {
        /// JSON file holding an array of tasks.
        #[arg(long, value_name = "PATH")]
        tasks: PathBuf,

        /// Repair the batch and print the fixed tasks as JSON.
        #[arg(long)]
        fix: bool,

        /// Inject same-feature phase dependencies before validating.
        #[arg(long)]
        enforce_phases: bool,

        /// Do not auto-fix terminal tasks without dependencies.
        #[arg(long)]
        strict: bool,
    },

    /// Print statistics for the persisted leases.
    Leases {
        /// Path to the config file (TOML).
        #[arg(long, value_name = "PATH", default_value = "Taskwarden.toml")]
        config: PathBuf,
    },

    /// Run the lease and recovery monitors over a JSON-file board until Ctrl-C.
    Monitor {
        /// Path to the config file (TOML).
        #[arg(long, value_name = "PATH", default_value = "Taskwarden.toml")]
        config: PathBuf,

        /// JSON file holding the board's tasks.
        #[arg(long, value_name = "PATH")]
        tasks: PathBuf,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_flags_parse() {
        let args = CliArgs::try_parse_from([
            "taskwarden",
            "validate",
            "--tasks",
            "batch.json",
            "--fix",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        match args.command {
            Command::Validate { tasks, fix, strict, .. } => {
                assert_eq!(tasks, PathBuf::from("batch.json"));
                assert!(fix);
                assert!(!strict);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn leases_defaults_config_path() {
        let args = CliArgs::try_parse_from(["taskwarden", "leases"]).unwrap();
        match args.command {
            Command::Leases { config } => assert_eq!(config, PathBuf::from("Taskwarden.toml")),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
