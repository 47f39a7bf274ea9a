//! # Pipeline CLI
//!
//! Runs the controlled ingestion and scoring pipeline against the
//! configured datastore and external catalog API.
//!
//! Exit codes: 0 completed, 2 degraded, 3 failed, 130 cancelled.

use clap::{Args, Parser, Subcommand};
use nicheradar_connector::HttpCatalogApi;
use nicheradar_core::{Asin, Config, DatabasePool};
use nicheradar_market_data::events::{EventRepository, PostgresEventRepository};
use nicheradar_market_data::snapshots::{PostgresSnapshotRepository, SnapshotRepository};
use nicheradar_pipeline::{Orchestrator, RunOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nicheradar-run", about = "Marketplace opportunity pipeline runner")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run_args: RunArgs,

    /// Append logs to this file in addition to stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Verbose logging (-v for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Execute one pipeline run (the default)
    Run(RunArgs),
    /// Delete event and snapshot rows past their retention windows
    Prune,
    /// Apply pending database migrations
    Migrate,
}

#[derive(Args, Clone, Default)]
struct RunArgs {
    /// Cap on products processed this run
    #[arg(long)]
    max_asins: Option<usize>,

    /// Record the shortlist but keep the previous one active
    #[arg(long, overrides_with = "no_freeze")]
    freeze: bool,

    /// Allow shortlist activation even if configuration freezes it
    #[arg(long = "no-freeze", overrides_with = "freeze")]
    no_freeze: bool,

    /// Skip category discovery and refresh tracked products
    #[arg(long)]
    skip_discovery: bool,

    /// Explicit comma-separated ASIN list, bypassing discovery
    #[arg(long, value_delimiter = ',')]
    asins: Option<Vec<String>>,
}

impl RunArgs {
    fn freeze_override(&self) -> Option<bool> {
        if self.freeze {
            Some(true)
        } else if self.no_freeze {
            Some(false)
        } else {
            None
        }
    }

    fn parsed_asins(&self) -> anyhow::Result<Option<Vec<Asin>>> {
        let Some(raw) = &self.asins else {
            return Ok(None);
        };
        let mut asins = Vec::with_capacity(raw.len());
        for item in raw {
            asins.push(Asin::parse(item).map_err(|e| anyhow::anyhow!(e))?);
        }
        Ok(Some(asins))
    }
}

fn init_tracing(verbose: u8, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let default_filter = if verbose > 0 {
        "nicheradar_pipeline=debug,nicheradar_connector=debug,nicheradar_market_data=debug,nicheradar_core=debug"
    } else {
        "nicheradar_pipeline=info,nicheradar_connector=info,nicheradar_market_data=info,nicheradar_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => registry.init(),
    }
    Ok(())
}

async fn run_pipeline(config: Config, db: DatabasePool, args: RunArgs) -> anyhow::Result<i32> {
    let api = Arc::new(HttpCatalogApi::new(&config.connector)?);

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current batch");
            signal_token.cancel();
        }
    });

    let orchestrator = Orchestrator::postgres(config, api, db, cancel);
    let options = RunOptions {
        run_id: None,
        max_asins: args.max_asins,
        freeze: args.freeze_override(),
        skip_discovery: args.skip_discovery,
        asins: args.parsed_asins()?,
    };

    let report = orchestrator.run(options).await?;
    info!(
        run_id = %report.run_id,
        status = ?report.status,
        opportunities = report.opportunities_found,
        shortlist = report.shortlist_size,
        "run report"
    );
    Ok(report.status.exit_code())
}

async fn prune(config: &Config, db: DatabasePool) -> anyhow::Result<()> {
    let now = chrono::Utc::now();
    let events = PostgresEventRepository::new(db.clone());
    let removed = events
        .prune(now - chrono::Duration::days(config.ingestion.retention_days))
        .await?;
    let snapshots = PostgresSnapshotRepository::new(db);
    let pruned = snapshots
        .prune(now - chrono::Duration::days(config.ingestion.snapshot_retention_days))
        .await?;
    info!(events = removed, snapshots = pruned, "retention prune complete");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.verbose, cli.log_file.as_ref()) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(3);
    }

    let exit_code = match run_command(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "command failed");
            3
        }
    };
    std::process::exit(exit_code);
}

async fn run_command(cli: Cli) -> anyhow::Result<i32> {
    let config = Config::load()?;
    let db = DatabasePool::new(&config.database).await?;

    match cli.command {
        Some(Command::Migrate) => {
            db.run_migrations().await?;
            Ok(0)
        }
        Some(Command::Prune) => {
            prune(&config, db).await?;
            Ok(0)
        }
        Some(Command::Run(args)) => run_pipeline(config, db, args).await,
        None => run_pipeline(config, db, cli.run_args).await,
    }
}
