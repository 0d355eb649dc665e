use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use turnier_pipeline::{build_orchestrator, run_scheduled, PipelineConfig, RunReport, RunStatus};
use turnier_store::{PgStore, TournamentStore};

#[derive(Debug, Parser)]
#[command(name = "turnier-cli")]
#[command(about = "Schachinter tournament tracker command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one crawl and exit.
    Crawl,
    /// Crawl on the configured interval until ctrl-c.
    Schedule,
    /// Serve the read API (with a manual crawl trigger attached).
    Serve,
    /// Apply database migrations and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env();

    match cli.command.unwrap_or(Commands::Crawl) {
        Commands::Crawl => {
            let store = connect_store(&config).await?;
            let (_shutdown_tx, shutdown_rx) = watch::channel(false);
            let orchestrator = build_orchestrator(&config, store, shutdown_rx)?;
            match orchestrator.run_once().await {
                RunReport::Skipped => println!("crawl skipped: another run is in progress"),
                RunReport::Finished(summary) => {
                    match &summary.status {
                        RunStatus::Completed => println!(
                            "crawl complete: run_id={} extracted={} inserted={} updated={} \
                             unchanged={} skipped_blocks={} enrichment_failures={}",
                            summary.run_id,
                            summary.counts.extracted,
                            summary.counts.inserted,
                            summary.counts.updated,
                            summary.counts.unchanged,
                            summary.counts.skipped_blocks,
                            summary.counts.enrichment_failures,
                        ),
                        RunStatus::Failed { stage, message } => {
                            anyhow::bail!("crawl failed while {stage}: {message}")
                        }
                    }
                }
            }
        }
        Commands::Schedule => {
            let store = connect_store(&config).await?;
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let orchestrator = Arc::new(build_orchestrator(&config, store, shutdown_rx)?);
            run_scheduled(orchestrator, config.crawl_interval_hours, shutdown_tx).await?;
        }
        Commands::Serve => {
            let store = connect_store(&config).await?;
            let (_shutdown_tx, shutdown_rx) = watch::channel(false);
            let orchestrator = Arc::new(build_orchestrator(&config, store.clone(), shutdown_rx)?);
            turnier_web::serve(
                turnier_web::AppState {
                    store,
                    orchestrator: Some(orchestrator),
                },
                config.web_port,
            )
            .await?;
        }
        Commands::Migrate => {
            let store = PgStore::connect(&config.database_url)
                .await
                .context("connecting to database")?;
            store.migrate().await.context("applying migrations")?;
            println!("migrations applied");
        }
    }

    Ok(())
}

async fn connect_store(config: &PipelineConfig) -> Result<Arc<dyn TournamentStore>> {
    let store = PgStore::connect(&config.database_url)
        .await
        .context("connecting to database")?;
    store.migrate().await.context("applying migrations")?;
    Ok(Arc::new(store))
}
