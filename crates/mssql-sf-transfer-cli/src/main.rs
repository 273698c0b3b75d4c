//! mssql-sf-transfer CLI - batch MSSQL to Snowflake table transfers.
//!
//! Exit codes: 0 when every mapping succeeded; 1-8 for errors before the
//! run starts (config, connectivity, IO); 9 when the run completed but at
//! least one mapping failed.

use clap::Parser;
use mssql_sf_transfer::{Config, Orchestrator, SourceCredentials, TargetCredentials, TransferError};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit code for a completed run with one or more failed mappings.
const EXIT_PARTIAL_FAILURE: u8 = 9;

#[derive(Parser)]
#[command(name = "mssql-sf-transfer")]
#[command(about = "Batch table transfer from MSSQL to Snowflake")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to a JSON document overriding source credentials
    #[arg(long)]
    source_credentials: Option<PathBuf>,

    /// Path to a JSON document overriding target credentials
    #[arg(long)]
    target_credentials: Option<PathBuf>,

    /// Validate configuration and print the transfer plan without running
    #[arg(long)]
    dry_run: bool,

    /// Output the run report as JSON to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, TransferError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    if let Some(path) = &cli.source_credentials {
        config.apply_source_credentials(SourceCredentials::load(path)?);
        info!("Applied source credentials from {:?}", path);
    }
    if let Some(path) = &cli.target_credentials {
        config.apply_target_credentials(TargetCredentials::load(path)?);
        info!("Applied target credentials from {:?}", path);
    }
    config.validate()?;

    if cli.dry_run {
        print_plan(&config);
        return Ok(ExitCode::SUCCESS);
    }

    let cancel_token = setup_signal_handler();

    let orchestrator = Orchestrator::connect(config, cancel_token).await?;
    let report = orchestrator.run().await;

    if cli.output_json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.render_summary());
    }

    if report.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_PARTIAL_FAILURE))
    }
}

fn print_plan(config: &Config) {
    println!("Dry run: configuration is valid.");
    println!(
        "Source: {}:{}/{}",
        config.source.host, config.source.port, config.source.database
    );
    println!(
        "Target: account={} warehouse={} database={} schema={}",
        config.target.account,
        config.target.warehouse,
        config.target.database,
        config.target.schema
    );
    println!(
        "Transfer: chunk_size={} connect_retries={} atomic={}",
        config.transfer.chunk_size, config.transfer.connect_retries, config.transfer.atomic
    );
    match &config.notification {
        Some(n) => println!(
            "Notification: integration={} recipients={}",
            n.integration,
            n.recipients.join(", ")
        ),
        None => println!("Notification: log only"),
    }
    println!("Mappings ({}):", config.mappings.len());
    for mapping in &config.mappings {
        println!("  {} ({} columns)", mapping.display(), mapping.columns.len());
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM (scheduler shutdown).
/// Returns a CancellationToken that is cancelled when a signal arrives.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    let token_int = cancel_token.clone();
    let token_term = cancel_token.clone();

    tokio::spawn(async move {
        if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
            sigint.recv().await;
            eprintln!("\nReceived SIGINT. Finishing the current batch, then stopping...");
            token_int.cancel();
        }
    });

    tokio::spawn(async move {
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            sigterm.recv().await;
            eprintln!("\nReceived SIGTERM. Finishing the current batch, then stopping...");
            token_term.cancel();
        }
    });

    cancel_token
}

/// Signal handler for Windows (only Ctrl-C).
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Finishing the current batch, then stopping...");
            token.cancel();
        }
    });

    cancel_token
}
