use ans_pipeline::config::PipelineConfig;
use ans_pipeline::infra::http_client::ReqwestHttp;
use ans_pipeline::pipeline::{Orchestrator, RunSummary, Stage};
use ans_pipeline::server::{self, ApiState};
use ans_pipeline::{logging, metrics};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_METRICS_PORT: u16 = 9000;

#[derive(Parser)]
#[command(name = "ans_pipeline")]
#[command(about = "ANS quarterly expense disclosures: download, consolidate, enrich, validate, aggregate")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline, optionally resuming at a later stage
    Run {
        #[arg(long, value_enum, default_value = "fetch")]
        from: Stage,
    },
    /// List the archives the next fetch would download
    Scan,
    /// Download the recent archives and the operator registry
    Fetch,
    /// Unpack archives and write the consolidated CSV
    Extract,
    /// Join the consolidated CSV with the registry
    Enrich,
    /// Drop rows with an invalid CNPJ, empty name or non-positive amount
    Validate,
    /// Per operator and UF expense statistics
    Aggregate,
    /// Zip the final outputs
    Package,
    /// Serve the read API over the processed data
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

fn print_summary(summary: &RunSummary) {
    println!("\nPipeline results:");
    let counts = [
        ("Archives fetched", summary.archives),
        ("Consolidated rows", summary.consolidated_rows),
        ("Skipped files", summary.skipped_files),
        ("Enriched rows", summary.enriched_rows),
        ("Validated rows", summary.validated_rows),
        ("Aggregate groups", summary.groups),
    ];
    for (label, value) in counts {
        if let Some(v) = value {
            println!("   {label}: {v}");
        }
    }
    if let Some(bundle) = &summary.bundle {
        println!("   Bundle: {}", bundle.display());
    }
}

async fn run_single(orchestrator: &Orchestrator<'_>, stage: Stage) -> ans_pipeline::error::Result<RunSummary> {
    let mut summary = RunSummary::default();
    orchestrator.run_stage(stage, &mut summary).await?;
    Ok(summary)
}

async fn run(cli: Cli, config: PipelineConfig) -> anyhow::Result<()> {
    let http = ReqwestHttp::new(config.source.timeout_seconds)?;
    let orchestrator = Orchestrator::new(&http, &config);

    let summary = match cli.command {
        Commands::Run { from } => {
            if let Some(port) = metrics::port_from_env() {
                metrics::init_metrics(port);
            }
            info!("Running pipeline from stage {}", from);
            orchestrator.run_from(from).await?
        }
        Commands::Scan => {
            for entry in orchestrator.scan().await? {
                println!("{}\t{}", entry.period(), entry.remote_url);
            }
            return Ok(());
        }
        Commands::Fetch => run_single(&orchestrator, Stage::Fetch).await?,
        Commands::Extract => run_single(&orchestrator, Stage::Extract).await?,
        Commands::Enrich => run_single(&orchestrator, Stage::Enrich).await?,
        Commands::Validate => run_single(&orchestrator, Stage::Validate).await?,
        Commands::Aggregate => run_single(&orchestrator, Stage::Aggregate).await?,
        Commands::Package => run_single(&orchestrator, Stage::Package).await?,
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.api.port);
            metrics::init_metrics(metrics::port_from_env().unwrap_or(DEFAULT_METRICS_PORT));
            let state = ApiState::load(orchestrator.paths()).context("loading API data")?;
            server::start_server(Arc::new(state), port).await?;
            return Ok(());
        }
    };

    print_summary(&summary);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let _guard = logging::init_logging(&config.storage.log_dir);

    if let Err(e) = run(cli, config).await {
        error!("Pipeline failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}
