use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ev_charge_pipeline::app::DailyRunUseCase;
use ev_charge_pipeline::config::Config;
use ev_charge_pipeline::infra::{EnvSecretSource, FileRunReportAdapter, FsArchiveStore, ReqwestHttp, SqliteStagingStore};
use ev_charge_pipeline::observability::{self, metrics};
use ev_charge_pipeline::pipeline::daily::{build_daily_graph, Collaborators};
use ev_charge_pipeline::pipeline::processing::ConnectionNormalizer;
use ev_charge_pipeline::pipeline::storage::{InMemoryArchiveStore, InMemoryStagingStore};

#[derive(Parser)]
#[command(name = "ev_charge_pipeline")]
#[command(about = "Daily EV charging point ingestion pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daily pipeline for one logical date
    Run {
        /// Logical run date (YYYY-MM-DD); defaults to today in UTC
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Path to the TOML configuration file
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print the task graph in execution order
    Plan {
        /// Path to the TOML configuration file
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match run_cli(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_cli(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Plan { config } => {
            let config = Config::load_from(&config).context("loading configuration")?;
            print_plan(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { date, config } => {
            let config = Config::load_from(&config).context("loading configuration")?;
            let _guard = observability::init_logging(&config.pipeline.log_dir);
            if let Some(addr) = config.metrics.listen_addr {
                metrics::install_prometheus_exporter(addr).context("starting metrics exporter")?;
            }

            let logical_date = date.unwrap_or_else(|| Utc::now().date_naive());
            let use_case = build_use_case(config)?;

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("🛑 Interrupt received; finishing in-flight tasks and skipping the rest");
                    on_signal.cancel();
                }
            });

            let run = use_case
                .run_daily(logical_date, cancel)
                .await
                .context("starting daily run")?;

            println!("\n📊 {}", run.summary());
            for line in run.report_lines() {
                println!("{}", serde_json::to_string(&line)?);
            }

            if run.succeeded() {
                info!("✅ Run {} succeeded", run.run_id);
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

fn build_use_case(config: Config) -> anyhow::Result<DailyRunUseCase> {
    let http = ReqwestHttp::new(Duration::from_secs(config.provider.timeout_seconds))?;
    let staging = SqliteStagingStore::open(&config.staging.database_path, config.staging.procedures_dir.clone())
        .context("opening staging database")?
        .with_parameters(config.staging.procedure_parameters());
    let collaborators = Collaborators {
        http: Arc::new(http),
        normalizer: Arc::new(ConnectionNormalizer::new()),
        staging: Arc::new(staging),
        archive: Arc::new(FsArchiveStore::new()),
    };
    let report = Arc::new(FileRunReportAdapter::new(config.pipeline.report_dir.clone()));
    Ok(DailyRunUseCase::new(config, Arc::new(EnvSecretSource::new()), collaborators).with_report(report))
}

/// Build the graph against inert collaborators and print it
fn print_plan(config: &Config) -> anyhow::Result<()> {
    let collaborators = Collaborators {
        http: Arc::new(ReqwestHttp::new(Duration::from_secs(config.provider.timeout_seconds))?),
        normalizer: Arc::new(ConnectionNormalizer::new()),
        staging: Arc::new(InMemoryStagingStore::new()),
        archive: Arc::new(InMemoryArchiveStore::new()),
    };
    let graph = build_daily_graph(config, "", &collaborators)?;

    println!("📋 {} ({} tasks)", graph.name(), graph.len());
    for (rank, node) in graph.nodes().iter().enumerate() {
        let upstream = graph.upstream_names(rank);
        if upstream.is_empty() {
            println!("  {}. {}", rank + 1, node.name());
        } else {
            println!("  {}. {} <- {}", rank + 1, node.name(), upstream.join(", "));
        }
    }
    Ok(())
}
