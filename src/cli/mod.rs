// src/cli/mod.rs — CLI definition (clap derive)

pub mod check;
pub mod run;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "listbot", about = "Turn photos into marketplace listings over Telegram", version)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the bot (default)
    Run,
    /// Print the resolved configuration and exit
    CheckConfig,
}
