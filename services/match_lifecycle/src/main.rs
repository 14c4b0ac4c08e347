use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use match_lifecycle::{
    postgres_store::PgMatchStore, server, Collaborators, Pipeline, PipelineConfig,
};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one poll cycle and print the report
    Poll,
    /// Pre-submit pages for matches kicking off soon
    Preindex,
    /// Serve the webhook and cron endpoints
    Serve,
    /// Apply database migrations
    Migrate,
}

fn print_report<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

async fn connect(config: &PipelineConfig) -> Result<PgMatchStore> {
    PgMatchStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to database")
}

async fn build_pipeline(config: &PipelineConfig) -> Result<Pipeline> {
    let store = connect(config).await?;
    let parts = Collaborators::http(config).context("Failed to build HTTP clients")?;
    Ok(Pipeline::assemble(config, Arc::new(store), parts))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env();

    match cli.command {
        Commands::Poll => {
            let pipeline = build_pipeline(&config).await?;
            let report = pipeline.monitor.run_cycle().await.context("Poll cycle aborted")?;
            print_report(&report)?;
        }
        Commands::Preindex => {
            let pipeline = build_pipeline(&config).await?;
            let report = pipeline.presubmitter.run().await.context("Pre-submit pass aborted")?;
            print_report(&report)?;
        }
        Commands::Serve => {
            let pipeline = build_pipeline(&config).await?;
            server::serve(&config.server, pipeline.app_state(&config.server))
                .await
                .context("Server error")?;
        }
        Commands::Migrate => {
            connect(&config).await?.migrate().await?;
            info!("Migrations complete");
        }
    }

    Ok(())
}
