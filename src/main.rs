//! VoiceFX CLI
//!
//! Command-line interface for the VoiceFX voice filter engine.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;

use voicefx::cli::commands;
use voicefx::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    info!("VoiceFX v{}", env!("CARGO_PKG_VERSION"));
    let config = commands::load_config(cli.config.as_deref())?;

    let result = match cli.command {
        Some(cmd) => handle_command(cmd, config).await,
        None => {
            println!("VoiceFX v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    };

    if let Err(err) = &result {
        for hint in commands::failure_hints(err) {
            eprintln!("hint: {}", hint);
        }
    }
    result
}

async fn handle_command(cmd: Commands, config: voicefx::SessionConfig) -> Result<()> {
    match cmd {
        Commands::Filters => commands::list_filters(),
        Commands::Render {
            input,
            output,
            filter,
            block_capacity,
            json,
        } => commands::render(&config, &input, &output, filter, block_capacity, json),
        Commands::Preview {
            input,
            filter,
            seconds,
        } => commands::preview(&config, &input, filter, seconds),
        Commands::Process {
            video,
            filter,
            export_dir,
            work_dir,
        } => commands::process(config, &video, filter, export_dir, work_dir).await,
    }
}
