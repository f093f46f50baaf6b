// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `execlane`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "execlane",
    version,
    about = "Run a command for every inbound event, streaming its output as JSON lines.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Execlane.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Execlane.toml")]
    pub config: String,

    /// Read trigger events (JSON lines) from this file instead of stdin.
    #[arg(long, value_name = "PATH")]
    pub input: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `EXECLANE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate the config, print it, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,
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
