//! hms-mirror CLI - Hive metastore migration between clusters.

use clap::{Parser, Subcommand};
use hms_mirror::error::EXIT_RUN_ISSUES;
use hms_mirror::{
    Config, DataStrategy, Environment, MirrorError, Orchestrator, RunState, TableType, TestData, Translator,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "hms-mirror")]
#[command(about = "Hive metastore migration between clusters")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to the run state file
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: trace, debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate the configured databases
    Run {
        /// Override the data strategy (e.g. SCHEMA_ONLY, SQL, EXPORT_IMPORT)
        #[arg(long)]
        data_strategy: Option<DataStrategy>,

        /// Override the number of concurrent tasks
        #[arg(long)]
        max_threads: Option<usize>,

        /// Execute statements instead of only recording them
        #[arg(long)]
        execute: bool,

        /// YAML file of databases and tables served by in-memory clusters
        #[arg(long)]
        test_data: Option<PathBuf>,

        /// Database to migrate (repeatable, replaces the configured list)
        #[arg(long = "database")]
        databases: Vec<String>,
    },

    /// Validate configuration and location translation rules
    Validate,

    /// Show how a table and its location are translated
    Translate {
        /// Source database
        #[arg(long)]
        database: String,

        /// Source table
        #[arg(long)]
        table: String,

        /// Source table location
        #[arg(long)]
        location: String,

        /// Table type: managed, external or any
        #[arg(long, default_value = "external", value_parser = parse_table_type)]
        table_type: TableType,
    },

    /// Print a saved run state
    ShowState,
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

async fn run() -> Result<ExitCode, MirrorError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(MirrorError::Config)?;

    // State inspection does not need a configuration
    if let Commands::ShowState = cli.command {
        let path = cli
            .state_file
            .ok_or_else(|| MirrorError::Config("--state-file is required for show-state".to_string()))?;
        let state = RunState::load(&path)?;
        if cli.output_json {
            println!("{}", serde_json::to_string_pretty(&state)?);
        } else {
            println!("Run ID: {}", state.run_id);
            println!("  Status: {}", state.status);
            println!("  Started: {}", state.started_at);
            if let Some(completed) = state.completed_at {
                println!("  Completed: {}", completed);
            }
            println!("  Outcome code: {}", state.outcome.bits());
            for (db, table) in state.conversion.tables() {
                println!("  {}.{}: {:?}", db.name, table.name, table.phase);
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = Config::load(&cli.config)?.with_auto_tuning();
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::ShowState => unreachable!(), // Handled above
        Commands::Run {
            data_strategy,
            max_threads,
            execute,
            test_data,
            databases,
        } => {
            // Apply overrides
            if let Some(strategy) = data_strategy {
                config.data_strategy = strategy;
            }
            if let Some(n) = max_threads {
                config.concurrency.max_threads = Some(n);
            }
            if execute {
                config.execute = true;
            }
            if !databases.is_empty() {
                config.databases = databases;
            }
            config.validate()?;

            let Some(path) = test_data else {
                return Err(MirrorError::session(
                    Environment::Left,
                    "no cluster adapter is available; supply --test-data",
                ));
            };
            let data = TestData::load(&path)?;
            info!("Loaded {} test databases from {:?}", data.databases.len(), path);

            let mut orchestrator = Orchestrator::new(config.clone(), &data.connector()).await?;
            if config.databases.is_empty() {
                orchestrator = orchestrator.with_test_data(&data);
            }
            if let Some(ref path) = cli.state_file {
                orchestrator = orchestrator.with_state_file(path.clone());
            }

            let cancel_token = setup_signal_handler().await?;
            let result = orchestrator.run(Some(cancel_token)).await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                let status_msg = if config.execute { "Mirror completed!" } else { "Dry run completed!" };
                println!("\n{}", status_msg);
                println!("  Run ID: {}", result.run_id);
                println!("  Status: {}", result.status);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Databases: {}", result.databases_total);
                println!(
                    "  Tables: {}/{} ({} failed, {} removed)",
                    result.tables_success, result.tables_total, result.tables_failed, result.tables_removed
                );
                println!("  Outcome code: {}", result.outcome_code);
                for issue in &result.issues {
                    println!("  Issue: {}", issue);
                }
                for (db, plan) in &result.distcp {
                    for (target, sources) in plan {
                        println!("  Distcp {}: {:?} -> {}", db, sources, target);
                    }
                }
            }

            if result.outcome_code != 0 {
                warn!("Run finished with outcome code {}", result.outcome_code);
                return Ok(ExitCode::from(EXIT_RUN_ISSUES));
            }
        }

        Commands::Validate => {
            let translator = Translator::new(config.translator_config());
            let violations = translator.violations();
            if !violations.is_empty() {
                return Err(MirrorError::TranslationAmbiguity(violations));
            }
            println!("Configuration is valid");
            println!("  Strategy: {}", config.data_strategy);
            println!("  Target namespace: {}", translator.target_namespace());
            println!("  Databases: {}", config.databases.join(", "));
        }

        Commands::Translate {
            database,
            table,
            location,
            table_type,
        } => {
            let translator = Translator::new(config.translator_config());
            let target_db = translator.translate_database(&database);
            let target_table = translator.translate_table(&database, &table);
            let target_location = translator.translate_table_location(&database, &table, table_type, &location);

            if cli.output_json {
                let output = serde_json::json!({
                    "database": target_db,
                    "table": target_table,
                    "location": target_location,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("Database: {} -> {}", database, target_db);
                println!("Table: {} -> {}", table, target_table);
                println!("Location: {} -> {}", location, target_location.as_deref().unwrap_or("(none)"));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn parse_table_type(value: &str) -> Result<TableType, String> {
    match value.to_ascii_lowercase().as_str() {
        "managed" => Ok(TableType::Managed),
        "external" => Ok(TableType::External),
        "any" => Ok(TableType::Any),
        other => Err(format!("unknown table type '{other}' (expected managed, external or any)")),
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
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

/// Setup signal handlers for graceful shutdown.
/// Cancellation stops the run at the next phase or task boundary.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, MirrorError> {
    let cancel_token = CancellationToken::new();

    for kind in [SignalKind::interrupt(), SignalKind::terminate()] {
        let mut stream = signal(kind)?;
        let token = cancel_token.clone();
        tokio::spawn(async move {
            stream.recv().await;
            eprintln!("\nReceived shutdown signal. Stopping after in-flight tasks...");
            token.cancel();
        });
    }

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, MirrorError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after in-flight tasks...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
