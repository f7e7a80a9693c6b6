//! mssql-pg-reconcile CLI - MSSQL to PostgreSQL data reconciliation.

use clap::{Parser, Subcommand};
use mssql_pg_reconcile::{Config, ProgressUpdate, ReconcileError, RunStatus, ValidationEngine};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mssql-pg-reconcile")]
#[command(about = "Compare table data between MSSQL and PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configured tables between source and target
    Validate {
        /// Tables to validate, overriding the configured list
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,

        /// Override batch size
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), ReconcileError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(ReconcileError::Config)?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Validate { tables, batch_size } => {
            if let Some(batch) = batch_size {
                config.validation.batch_size = batch;
            }
            let tables = tables.unwrap_or_else(|| config.validation.tables.clone());

            let engine = ValidationEngine::connect(&config).await?;
            setup_signal_handler(engine.cancel_flag());

            let emit_progress = cli.progress;
            let progress = move |update: ProgressUpdate| {
                if emit_progress {
                    eprintln!(
                        "{{\"rows_processed\":{},\"total_estimated\":{},\"tables_processed\":{}}}",
                        update.rows_processed, update.total_estimated, update.tables_processed
                    );
                }
            };

            let summary = engine.run_all(&tables, Some(&progress)).await?;

            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                let status_msg = match summary.status {
                    RunStatus::Completed => "Validation completed!",
                    RunStatus::Cancelled => "Validation cancelled - partial results below.",
                };
                println!("\n{}", status_msg);
                println!("  Duration: {:.2}s", summary.duration_seconds);
                println!("  Tables: {}", summary.tables_validated);
                println!("  Rows: {}", summary.rows_processed);
                println!("  Mismatched rows: {}", summary.mismatched_rows);
                println!("  Output: {}", summary.output_mode);
                for table in &summary.tables {
                    println!(
                        "    {} {} (source: {}, target: {}, missing: {}, extra: {}, mismatched: {})",
                        table.status, table.table, table.source_rows, table.target_rows,
                        table.missing, table.extra, table.mismatched
                    );
                }
            }
        }

        Commands::HealthCheck => {
            // connect() runs a SELECT 1 against both databases.
            ValidationEngine::connect(&config).await?;
            println!("Health Check Results:");
            println!("  Source (MSSQL): OK");
            println!("  Target (PostgreSQL): OK");
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
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
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// SIGINT requests a graceful stop via the engine's cancel flag; the run
/// then finishes its current batch and reports partial results. A second
/// SIGINT aborts outright.
#[cfg(unix)]
fn setup_signal_handler(cancel: mssql_pg_reconcile::CancelFlag) {
    tokio::spawn(async move {
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGINT handler");
                return;
            }
        };
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Finishing current batch, then reporting partial results...");
        cancel.set();
        sigint.recv().await;
        eprintln!("\nReceived second SIGINT. Aborting.");
        std::process::exit(130);
    });
}

#[cfg(not(unix))]
fn setup_signal_handler(cancel: mssql_pg_reconcile::CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Finishing current batch, then reporting partial results...");
            cancel.set();
        }
    });
}
