//! Command-line interface definition using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use savegame_engine::{default_save_root, SAVE_DIR_ENV};
use savegame_models::LoadStrategy;

/// Version with git hash and build date, e.g. "0.1.0 (abc1234, 2026-10-19)".
fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");
    const BUILD_DATE: &str = env!("BUILD_DATE");

    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION_STRING.get_or_init(|| format!("{} ({}, {})", VERSION, GIT_HASH, BUILD_DATE))
}

/// savegame - inspect and manage save slots
#[derive(Parser, Debug)]
#[command(name = "savegame")]
#[command(author, version = version_string(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Slot root directory
    #[arg(short, long, env = SAVE_DIR_ENV, global = true)]
    pub root: Option<PathBuf>,

    /// JSON settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List save slots, newest first
    List {
        /// Rescan the slot directory instead of using the cache
        #[arg(long)]
        refresh: bool,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show descriptor, integrity and size of a slot
    Info {
        #[arg(required = true)]
        slot: String,
    },

    /// Write a fresh record into a slot
    New {
        #[arg(required = true)]
        slot: String,

        /// Display name (default: slot name)
        #[arg(short, long)]
        name: Option<String>,

        #[arg(long, default_value_t = 0)]
        credits: i64,

        /// Play time in hours
        #[arg(long, default_value_t = 0.0)]
        play_time: f64,

        #[arg(long, default_value_t = 0)]
        contracts: u32,
    },

    /// Load a slot through the full recovery pipeline
    Load {
        #[arg(required = true)]
        slot: String,

        #[arg(short, long, default_value = "full")]
        strategy: StrategyArg,
    },

    /// Delete a slot and its backups
    Delete {
        #[arg(required = true)]
        slot: String,
    },

    /// List backups of a slot, oldest first
    Backups {
        #[arg(required = true)]
        slot: String,
    },

    /// Replace a slot with one of its backups
    Restore {
        #[arg(required = true)]
        slot: String,

        /// Backup id as shown by `backups`
        #[arg(required = true)]
        backup_id: String,
    },
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StrategyArg {
    #[default]
    Full,
    Lazy,
    Streaming,
}

impl From<StrategyArg> for LoadStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Full => LoadStrategy::Full,
            StrategyArg::Lazy => LoadStrategy::Lazy,
            StrategyArg::Streaming => LoadStrategy::Streaming,
        }
    }
}

impl Cli {
    /// Returns the slot root, using the default if not specified.
    pub fn root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(default_save_root)
    }

    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
