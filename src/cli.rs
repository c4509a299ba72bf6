// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `convoy`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "convoy",
    version,
    about = "Stage, launch and feed dependency-ordered batches of work items.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `$CONVOY_CONFIG`, else `Convoy.toml` in the working
    /// directory, else built-in single-store defaults.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CONVOY_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Stage a container, explicit items, or re-stage a staged convoy.
    Stage {
        #[arg(required = true, value_name = "ROOT")]
        roots: Vec<String>,
        /// Launch immediately after staging.
        #[arg(long)]
        launch: bool,
        /// Convoy title (defaults to the container title or a batch title).
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Launch a staged convoy, or stage and launch the given roots.
    Launch {
        #[arg(required = true, value_name = "CONVOY_OR_ROOT")]
        roots: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Create an open convoy tracking the given items.
    Create {
        title: String,
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Group items into one open convoy with a generated title.
    Group {
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Track more items; reopens a closed convoy.
    Add {
        convoy: String,
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Auto-close check for one convoy, or every open convoy.
    Check { convoy: Option<String> },
    /// Close (or cancel, if staged) a convoy.
    Close {
        convoy: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// List open and staged convoys.
    List {
        /// Include closed convoys.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show a convoy's tracked items and progress.
    Status {
        convoy: String,
        #[arg(long)]
        json: bool,
    },
    /// Open convoys with ready work and nothing in flight.
    Stranded {
        #[arg(long)]
        json: bool,
    },
    /// Run the event feeder and stranded scanner until Ctrl-C.
    Daemon,
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
