//! Wiseone CLI entry point.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wiseone::cli::{commands, Cli, Commands};
use wiseone::config::Settings;
use wiseone::orchestrator::IngestOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_deref()
        .map(Settings::expand_path)
        .unwrap_or_else(Settings::default_config_path);
    let settings = Settings::load_from(Some(&config_path))?;

    // -v flags win over the configured level; RUST_LOG wins over both.
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("wiseone={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    std::fs::create_dir_all(settings.data_dir())?;

    match &cli.command {
        Commands::Ingest {
            dir,
            dry_run,
            force,
            file,
        } => {
            let options = IngestOptions {
                dry_run: *dry_run,
                force: *force,
                file: file.clone(),
            };
            commands::run_ingest(dir, options, settings).await?;
        }

        Commands::Ask {
            question,
            top_k,
            threshold,
        } => {
            commands::run_ask(question, *top_k, *threshold, settings).await?;
        }

        Commands::Chat { conversation } => {
            commands::run_chat(conversation.clone(), settings).await?;
        }

        Commands::Search {
            query,
            limit,
            threshold,
        } => {
            commands::run_search(query, *limit, *threshold, settings).await?;
        }

        Commands::List => {
            commands::run_list(settings).await?;
        }

        Commands::Show { filename } => {
            commands::run_show(filename, settings).await?;
        }

        Commands::Remove { filename } => {
            commands::run_remove(filename, settings).await?;
        }

        Commands::Themes => {
            commands::run_themes(settings).await?;
        }

        Commands::History { limit } => {
            commands::run_history(*limit, settings).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host, *port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings, config_path)?;
        }
    }

    Ok(())
}
