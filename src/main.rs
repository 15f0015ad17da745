//! Lektor CLI entry point.

use anyhow::Result;
use clap::Parser;
use lektor::cli::{commands, Cli, Commands};
use lektor::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli
        .config
        .as_ref()
        .map(|p| Settings::expand_path(p))
        .unwrap_or_else(Settings::default_config_path);
    let settings = Settings::load_from(Some(config_path.as_path()))?;

    // Initialize logging
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("lektor={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    std::fs::create_dir_all(settings.data_dir())?;

    // Execute command
    match cli.command {
        Commands::Ask {
            question,
            model,
            max_rounds,
        } => {
            commands::run_ask(&question, model, max_rounds, settings).await?;
        }

        Commands::Chat { model, max_rounds } => {
            commands::run_chat(model, max_rounds, settings).await?;
        }

        Commands::Ingest { path, clear } => {
            commands::run_ingest(&path, clear, settings).await?;
        }

        Commands::Courses { lessons } => {
            commands::run_courses(lessons, settings).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host, port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(&action, settings, &config_path)?;
        }
    }

    Ok(())
}
