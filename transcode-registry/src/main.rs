use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use transcode_registry::config::RegistryConfig;
use transcode_registry::database::models::{JobFilters, Pagination};
use transcode_registry::database::{self, repositories::SqlxJobRepository};
use transcode_registry::domain::{JobState, NewTranscodeJob, StatusReport};
use transcode_registry::gateway::{HttpGatewayConfig, HttpWorkerGateway};
use transcode_registry::logging;
use transcode_registry::registry::RegistryService;

/// Operator tool for the transcode job registry.
///
/// Settings come from the environment (and `.env`), see `RegistryConfig`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a job and dispatch it to a transcoder
    Create {
        /// Source file path
        #[arg(long)]
        input: String,
        /// Destination file path
        #[arg(long)]
        output: String,
        /// Transcoder preset identifier
        #[arg(long)]
        preset: String,
        /// URL notified by the transcoder on completion
        #[arg(long)]
        callback_url: Option<String>,
    },
    /// Apply a status report, e.g. '{"state":"processing","progress":10}'
    Report { job_id: String, payload: String },
    /// Show a job, refreshing it from its transcoder first
    Get { job_id: String },
    /// List jobs, newest first
    List {
        /// Only jobs in this state (scheduled, accepted, processing, on_hold, success, failed)
        #[arg(long)]
        state: Option<JobState>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 25)]
        per_page: u32,
    },
    /// Count jobs per state
    Stats,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = RegistryConfig::from_env()?;

    let (logging_config, _log_guard) =
        logging::init_logging(&config.log_dir, config.log_filter.as_deref())?;
    let shutdown = CancellationToken::new();
    logging_config.start_retention_cleanup(shutdown.clone());

    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let gateway = HttpWorkerGateway::new(
        HttpGatewayConfig::new(&config.worker_base_url)?
            .with_request_timeout(config.service.dispatch_timeout),
    )?;
    let service = RegistryService::with_config(
        Arc::new(SqlxJobRepository::new(pool.clone())),
        Arc::new(gateway),
        config.service.clone(),
    );

    let result = match args.command {
        Commands::Create {
            input,
            output,
            preset,
            callback_url,
        } => {
            let mut request = NewTranscodeJob::new(input, output, preset);
            if let Some(url) = callback_url {
                request = request.with_callback_url(url);
            }
            print_json(&service.create(request).await?)
        }
        Commands::Report { job_id, payload } => {
            let report: StatusReport = serde_json::from_str(&payload)?;
            print_json(&service.report_update(&job_id, report).await?)
        }
        Commands::Get { job_id } => print_json(&service.get(&job_id).await?),
        Commands::List {
            state,
            page,
            per_page,
        } => {
            let filters = JobFilters { state };
            let jobs = service
                .list(&filters, &Pagination::page(page, per_page))
                .await?;
            print_json(&jobs)
        }
        Commands::Stats => print_json(&service.stats().await?),
    };

    shutdown.cancel();
    pool.close().await;

    result
}
