//! sqlite-sync CLI - Last-write-wins sync between two SQLite databases.

use clap::{Parser, Subcommand};
use sqlite_sync::{
    introspect, open_database_read_only, Orchestrator, Side, SyncConfig, SyncError, SyncResult,
    TableOutcome, TableSchema,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "sqlite-sync")]
#[command(about = "Bidirectional last-write-wins sync between two SQLite databases")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync rows between two databases in both directions
    Sync {
        /// Source database file
        source: PathBuf,

        /// Destination database file
        destination: PathBuf,

        /// Column holding each row's last-modified timestamp [default: updated_at]
        #[arg(long)]
        updated_field: Option<String>,

        /// Only sync tables matching this glob (repeatable)
        #[arg(long = "include", value_name = "GLOB")]
        include: Vec<String>,

        /// Skip tables matching this glob (repeatable)
        #[arg(long = "exclude", value_name = "GLOB")]
        exclude: Vec<String>,

        /// Do not create source-only tables on the destination
        #[arg(long)]
        no_create_tables: bool,

        /// Exit non-zero unless every table and row synced
        #[arg(long)]
        strict: bool,

        /// Dry run: plan and report without writing to either database
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the schema of a database as seen by the sync engine
    Inspect {
        /// Database file
        database: PathBuf,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.verbosity, &cli.log_format).map_err(SyncError::Config)?;

    let mut config = match &cli.config {
        Some(path) => {
            let config = SyncConfig::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => SyncConfig::default(),
    };

    match cli.command {
        Commands::Sync {
            source,
            destination,
            updated_field,
            include,
            exclude,
            no_create_tables,
            strict,
            dry_run,
        } => {
            // Apply overrides
            if let Some(field) = updated_field {
                config.updated_field = field;
            }
            if !include.is_empty() {
                config.include_tables = include;
            }
            if !exclude.is_empty() {
                config.exclude_tables = exclude;
            }
            if no_create_tables {
                config.create_missing_tables = false;
            }
            if strict {
                config.require_full_success = true;
            }
            if dry_run {
                config.dry_run = true;
            }
            config.validate()?;

            check_exists(&source, Side::Source)?;
            check_exists(&destination, Side::Destination)?;

            let mut orchestrator = Orchestrator::open(config, &source, &destination)?;
            let outcome = orchestrator.run();

            // A strict-mode failure still reports what was written
            let result = match &outcome {
                Ok(result) => Some(result),
                Err(SyncError::Incomplete { result }) => Some(result.as_ref()),
                Err(_) => None,
            };
            if let Some(result) = result {
                if cli.output_json {
                    println!("{}", result.to_json()?);
                } else {
                    print_summary(result);
                }
            }
            outcome?;
        }

        Commands::Inspect { database } => {
            check_exists(&database, Side::Source)?;
            let conn = open_database_read_only(&database)?;
            let tables = introspect(&conn, Side::Source)?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                print_schema(&database, &tables);
            }
        }
    }

    Ok(())
}

fn check_exists(path: &Path, side: Side) -> Result<(), SyncError> {
    if path.is_file() {
        return Ok(());
    }
    Err(SyncError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{} database not found: {}", side, path.display()),
    )))
}

fn print_summary(result: &SyncResult) {
    let status_msg = match result.status {
        sqlite_sync::RunStatus::DryRun => "Dry run completed!",
        sqlite_sync::RunStatus::Completed => "Sync completed!",
        sqlite_sync::RunStatus::CompletedWithErrors => "Sync completed with errors!",
    };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!(
        "  Tables: {} synced, {} skipped, {} failed",
        result.tables_synced, result.tables_skipped, result.tables_failed
    );
    println!(
        "  Rows: {} to destination, {} to source",
        result.rows_to_destination, result.rows_to_source
    );
    println!("  Collisions: {}", result.collisions);
    if result.failed_rows > 0 {
        println!("  Failed rows: {}", result.failed_rows);
    }

    println!();
    for report in &result.tables {
        match &report.outcome {
            TableOutcome::Synced => {
                let c = &report.counts;
                let created = if report.created_on_destination {
                    " (created on destination)"
                } else {
                    ""
                };
                println!(
                    "  {}: +{}/~{} to destination, +{}/~{} to source, {} unchanged, {} collisions{}",
                    report.table,
                    c.inserted_into_destination,
                    c.updated_destination,
                    c.inserted_into_source,
                    c.updated_source,
                    c.unchanged,
                    c.collisions,
                    created
                );
            }
            TableOutcome::Skipped { violation } => {
                println!("  {}: skipped - {}", report.table, violation);
            }
            TableOutcome::Failed { error } => {
                println!("  {}: FAILED - {}", report.table, error);
            }
        }
        for error in &report.errors {
            println!("    - {}", error);
        }
    }
}

fn print_schema(path: &Path, tables: &[TableSchema]) {
    println!("{}: {} tables", path.display(), tables.len());
    for table in tables {
        let pk = table.primary_key_columns();
        let pk = if pk.is_empty() {
            "none".to_string()
        } else {
            pk.join(", ")
        };
        println!("\n  {} (primary key: {})", table.name, pk);
        for column in &table.columns {
            let mut flags = Vec::new();
            if column.not_null {
                flags.push("NOT NULL".to_string());
            }
            if let Some(default) = &column.default_value {
                flags.push(format!("DEFAULT {}", default));
            }
            println!(
                "    {} {} {}",
                column.name,
                column.declared_type,
                flags.join(" ")
            );
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json stays parseable
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}' (expected text or json)", other)),
    }

    Ok(())
}
