use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "movies-cli")]
#[command(about = "Migrate the legacy movie catalog into the normalized schema")]
struct Cli {
    /// YAML file overriding environment configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Read, resolve and load the whole legacy catalog.
    Migrate,
    /// Read and resolve only; print what a migration would insert.
    Plan,
    /// Summarize the most recent run reports.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;
    let config_path = cli.config.as_deref();

    match cli.command.unwrap_or(Commands::Migrate) {
        Commands::Migrate => {
            let summary = movies_sync::run_migration_from_env(config_path).await?;
            println!(
                "migration complete: run_id={} movies={} persons={} genres={} person_links={} genre_links={} report={}",
                summary.run_id,
                summary.counts.movies,
                summary.counts.persons,
                summary.counts.genres,
                summary.counts.movie_persons,
                summary.counts.movie_genres,
                summary.report_path.as_deref().unwrap_or("-")
            );
        }
        Commands::Plan => {
            let plan = movies_sync::plan_migration_from_env(config_path).await?;
            println!("legacy movies: {}", plan.legacy_movies);
            for batch in &plan.load_plan.batches {
                println!("{}.{}: {} rows", plan.load_plan.schema, batch.table, batch.rows);
            }
        }
        Commands::Report { runs } => {
            let config = movies_sync::load_config(config_path)?;
            println!("{}", movies_sync::report_markdown(runs, &config.reports_dir)?);
        }
    }

    Ok(())
}
