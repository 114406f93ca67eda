//! f1sync - OpenF1 season sync

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use f1sync::{graph, Config, EntityType, SyncPipeline};
use f1sync_common::logging::{init_logging, LogConfig, LogLevel};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "f1sync")]
#[command(author, version, about = "Sync an OpenF1 season into PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the season from the API into the raw landing zone
    Extract {
        /// Season year (defaults to SYNC_YEAR)
        #[arg(short, long)]
        year: Option<i32>,
    },

    /// Normalize raw blobs, upsert rows and export snapshots
    Transform {
        /// Single entity type; all when omitted
        #[arg(short, long, value_enum)]
        entity: Option<EntityType>,
    },

    /// Bulk load processed snapshots, skipping existing keys
    Load {
        /// Single entity type; all when omitted
        #[arg(short, long, value_enum)]
        entity: Option<EntityType>,
    },

    /// Extract, transform and load in stage-graph order
    Run {
        /// Season year (defaults to SYNC_YEAR)
        #[arg(short, long)]
        year: Option<i32>,
    },

    /// Print the stage execution order
    Plan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("f1sync")
        .filter_directives("sqlx=warn,aws_config=warn,hyper=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    if let Command::Plan = cli.command {
        let graph = graph::default_graph()?;
        for (idx, stage) in graph.order()?.iter().enumerate() {
            println!("{:>2}. {}", idx + 1, stage);
        }
        return Ok(());
    }

    let config = Config::load().context("Failed to load configuration")?;
    let pipeline = SyncPipeline::from_config(&config)
        .await
        .context("Failed to initialize pipeline")?;

    match cli.command {
        Command::Extract { year } => {
            let pipeline = pipeline.with_year(year.unwrap_or(config.fetch.year));
            let report = pipeline.extract().await?;
            info!(
                meetings = report.meeting_keys.len(),
                sessions = report.session_pairs.len(),
                failed_fetches = report.failed_fetches,
                "Extract finished"
            );
        },
        Command::Transform { entity } => {
            let reports = match entity {
                Some(entity) => vec![pipeline.transform(entity).await?],
                None => pipeline.transform_all().await?,
            };
            for report in reports {
                info!(
                    entity = %report.entity,
                    processed = report.records_seen,
                    skipped = report.rejected,
                    upserted = report.upserted,
                    "Transform finished"
                );
            }
        },
        Command::Load { entity } => match entity {
            Some(entity) => {
                let report = pipeline.load(entity).await?;
                info!(%entity, loaded = report.loaded, files_skipped = report.files_skipped, "Load finished");
            },
            None => {
                for load in pipeline.load_all().await? {
                    info!(
                        entity = %load.entity,
                        loaded = load.report.loaded,
                        files_skipped = load.report.files_skipped,
                        "Load finished"
                    );
                }
            },
        },
        Command::Run { year } => {
            let pipeline = pipeline.with_year(year.unwrap_or(config.fetch.year));
            let report = pipeline.run().await?;
            info!(
                run_id = %report.run_id,
                started_at = %report.started_at,
                finished_at = %report.finished_at,
                "Run finished"
            );
        },
        Command::Plan => {},
    }

    Ok(())
}
