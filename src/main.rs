// src/main.rs — listbot entry point

use clap::Parser;

use listbot::cli::{Cli, Commands};
use listbot::infra::config::Config;
use listbot::infra::logger;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config (falls back to defaults if no config.toml)
    let config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    // Respects RUST_LOG
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    logger::init_logging(level);

    match cli.command {
        Some(Commands::CheckConfig) => listbot::cli::check::check_config(&config),
        Some(Commands::Run) | None => listbot::cli::run::run_bot(config).await,
    }
}
