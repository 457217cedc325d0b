use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ticker_pipeline::database::FirestoreRegistry;
use ticker_pipeline::error::is_rate_limited;
use ticker_pipeline::importer::{Importer, SourceCatalog};
use ticker_pipeline::models::{Config, UniverseStrategy};
use ticker_pipeline::screener::Screener;

#[derive(Parser, Debug)]
#[command(author, version, about = "Symbol importer and stock screener", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect tickers from public listings into the symbols table
    Import {
        /// JSON source catalog replacing the built-in one
        #[arg(long)]
        sources: Option<PathBuf>,

        /// Also drop preferred-share tickers
        #[arg(long)]
        exclude_preferred: bool,
    },
    /// Score the symbol universe and publish the top 20
    Screen {
        /// Where the candidate symbols come from
        #[arg(long, value_enum)]
        universe: Option<UniverseStrategy>,

        /// Number of candidate symbols to score
        #[arg(long)]
        limit: Option<usize>,

        /// Log the ranking without publishing
        #[arg(long)]
        dry_run: bool,
    },
}

async fn run(command: Command, mut config: Config) -> Result<()> {
    match command {
        Command::Import {
            sources,
            exclude_preferred,
        } => {
            let catalog = match sources {
                Some(path) => SourceCatalog::from_json_file(path)?,
                None => SourceCatalog::default(),
            };
            info!("🚀 Starting symbol import ({} categories)", catalog.categories.len());

            let importer = Importer::from_config(&config, catalog, exclude_preferred).await?;
            let report = importer.run().await?;
            info!(
                "📊 Raw: {}  Final: {}  Failed sources: {:?}",
                report.raw_count, report.filtered_count, report.failed_sources
            );
        }
        Command::Screen {
            universe,
            limit,
            dry_run,
        } => {
            if let Some(universe) = universe {
                config.universe = universe;
            }
            if let Some(limit) = limit {
                config.target_symbol_count = limit;
            }
            info!("🚀 Starting screener ({:?} universe, {} symbols)", config.universe, config.target_symbol_count);

            let registry = FirestoreRegistry::new();
            let screener = Screener::from_config(&config, &registry).await?;
            let report = screener.run(dry_run).await?;
            info!(
                "📊 Scored {} of {} candidates{}",
                report.scored,
                report.universe_size,
                if report.rate_limited { " (stopped on rate limit)" } else { "" }
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ticker_pipeline=info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("❌ Failed to install logging: {}", e);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("❌ Configuration Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if is_rate_limited(&e) => {
            error!("🛑 Rate limit budget exhausted: {:#}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("❌ Workflow failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
