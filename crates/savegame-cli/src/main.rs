//! savegame CLI entry point.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use savegame_cli::cli::Cli;
use savegame_cli::commands;

#[tokio::main]
async fn main() {
    // Load .env.local if it exists (for SAVEGAME_* overrides)
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));

    fmt().with_env_filter(filter).with_target(false).init();

    let root = cli.root();
    let result = match commands::load_config(cli.config.as_deref()) {
        Ok(config) => commands::execute(cli.command, &root, config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
