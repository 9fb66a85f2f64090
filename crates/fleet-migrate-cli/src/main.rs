//! fleet-migrate CLI - document store to PostgreSQL migration for the fleet gateway.

use clap::{Parser, Subcommand};
use fleet_migrate::{Config, MigrateError, Migrator, ProgressUpdate};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "fleet-migrate")]
#[command(about = "Migrate fleet gateway data from a document store dump to PostgreSQL")]
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
    /// Run the migration, resuming after any interrupted table
    Run {
        /// Override target schema
        #[arg(long)]
        target_schema: Option<String>,

        /// Override rows per insert batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Validate row counts, relationships and sampled rows of a finished migration
    Validate,

    /// Show per-table migration state
    Status,
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

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let cancel_token = setup_signal_handler();

    match cli.command {
        Commands::Run {
            target_schema,
            batch_size,
        } => {
            if let Some(schema) = target_schema {
                config.target.schema = schema;
            }
            if let Some(size) = batch_size {
                config.migration.batch_size = Some(size);
            }
            config.validate()?;

            let mut migrator = Migrator::connect(&config).await?;
            if cli.progress {
                migrator = migrator.with_progress(spawn_progress_printer());
            }

            let result = migrator.run(cancel_token).await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nMigration completed!");
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!(
                    "  Tables: {} migrated, {} skipped",
                    result.tables_migrated, result.tables_skipped
                );
                println!("  Rows: {}", result.rows_transferred);
                println!("  Throughput: {} rows/sec", result.rows_per_second);
                println!(
                    "  Validation: {} tables counted, {} relationships, {} rows sampled",
                    result.validation.counts.len(),
                    result.validation.relationships.len(),
                    result.validation.rows_sampled()
                );
            }
        }

        Commands::Validate => {
            let migrator = Migrator::connect(&config).await?;
            let report = migrator.validate(cancel_token).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Validation completed successfully");
                for check in &report.counts {
                    println!(
                        "  {:<16} {} rows",
                        check.table, check.target_count
                    );
                }
                for check in &report.relationships {
                    println!("  {} ({} rows)", check.relation, check.target_count);
                }
                println!("  Rows sampled: {}", report.rows_sampled());
            }
        }

        Commands::Status => {
            let migrator = Migrator::connect(&config).await?;
            let states = migrator.status().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&states)?);
            } else {
                println!("{:<16} {:<12} {:>10} {:>10}", "TABLE", "STATUS", "SOURCE", "TARGET");
                for state in &states {
                    let count = |c: Option<i64>| c.map_or_else(|| "-".to_string(), |n| n.to_string());
                    println!(
                        "{:<16} {:<12} {:>10} {:>10}",
                        state.table_name,
                        state.status.to_string(),
                        count(state.source_count),
                        count(state.target_count)
                    );
                }
            }
        }
    }

    Ok(())
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
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Print each progress update as one JSON line on stderr.
fn spawn_progress_printer() -> mpsc::Sender<ProgressUpdate> {
    let (tx, mut rx) = mpsc::channel::<ProgressUpdate>(64);
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            if let Ok(line) = serde_json::to_string(&update) {
                eprintln!("{}", line);
            }
        }
    });
    tx
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to install {} handler: {}", name, e);
                    return;
                }
            };
            stream.recv().await;
            eprintln!("\nReceived {}. Shutting down gracefully...", name);
            token.cancel();
        });
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl-C handler: {}", e);
            return;
        }
        eprintln!("\nReceived Ctrl-C. Shutting down gracefully...");
        token.cancel();
    });

    cancel_token
}
