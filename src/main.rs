//! Outline Export - download knowledge-base exports from an Outline instance.
//!
//! Starts (or reuses) an export of all collections, waits for the server to
//! build it, then saves the zip or unpacks it into a sanitized directory tree.
//!
//!   outline-export export --format markdown --export-path kb.zip
//!   outline-export export --format markdown --extract --export-path kb --filters '*.md'
//!   outline-export jobs --limit 10
//!   outline-export delete <id>

mod application;
mod cli;
mod domain;
mod infrastructure;

use clap::Parser;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::client::{DEFAULT_PAGE_DELAY, DEFAULT_PAGE_SIZE};
use application::{format_jobs_table, format_outcome, ExportService, JobClient};
use cli::{Cli, Commands, ExportArgs};
use infrastructure::{load_config, ReqwestTransport};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            trigger.cancel();
        }
    });

    if let Err(e) = run(cli, &cancel).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(cli: Cli, cancel: &CancellationToken) -> domain::Result<()> {
    let file = load_config(cli.config.as_deref())?;
    let client_config = cli.client_config(&file)?;

    match &cli.command {
        Commands::Export(args) => cmd_export(client_config, args, &file, cancel).await,
        Commands::Jobs { limit } => cmd_jobs(client_config, *limit, cancel).await,
        Commands::Delete { id } => cmd_delete(client_config, id, cancel).await,
    }
}

async fn cmd_export(
    client_config: domain::ClientConfig,
    args: &ExportArgs,
    file: &domain::FileConfig,
    cancel: &CancellationToken,
) -> domain::Result<()> {
    let export_config = args.export_config(file)?;
    tracing::debug!(url = %client_config.base_url, format = %export_config.format, "Starting export");

    let client = JobClient::new(ReqwestTransport::new(client_config)?);
    let outcome = ExportService::new(client, export_config).run(cancel).await?;

    println!("{}", format_outcome(&outcome));
    Ok(())
}

async fn cmd_jobs(
    client_config: domain::ClientConfig,
    limit: usize,
    cancel: &CancellationToken,
) -> domain::Result<()> {
    let client = JobClient::new(ReqwestTransport::new(client_config)?)
        .with_paging(limit.clamp(1, DEFAULT_PAGE_SIZE), DEFAULT_PAGE_DELAY);
    let mut pages = client.list_jobs(cancel);
    let mut jobs = Vec::new();

    while jobs.len() < limit {
        match pages.next().await {
            Some(job) => jobs.push(job?),
            None => break,
        }
    }

    if jobs.is_empty() {
        println!("No export jobs found.");
        return Ok(());
    }

    println!("{}", format_jobs_table(&jobs));
    println!("\nShowing {} job(s)", jobs.len().to_string().cyan());
    Ok(())
}

async fn cmd_delete(
    client_config: domain::ClientConfig,
    id: &str,
    cancel: &CancellationToken,
) -> domain::Result<()> {
    let client = JobClient::new(ReqwestTransport::new(client_config)?);
    client.delete_job(id, cancel).await?;

    println!("{} Deleted export job {}", "✓".green(), id.cyan());
    Ok(())
}

/// Setup tracing subscriber for logging.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
