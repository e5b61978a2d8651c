//! SALT archive ingester.
//!
//! Reads raw exposure files of a range of nights (or one file), derives
//! their observation metadata and inserts, updates or deletes the
//! corresponding records in the observation archive.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use ingester::{ErrorPolicy, IngesterConfig, Mode, Orchestrator, RunOptions, RunSummary, Selection, Task};
use ingestion::{DerivationContext, ExposureDeriver, FilterCurveLibrary, InstrumentRegistry};
use storage::{
    Archive, MemoryArchive, PgArchive, SaltScienceDatabase, ScienceDatabase,
    StaticScienceDatabase, UpdateScope,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Ingest SALT exposure metadata into the observation archive")]
struct Args {
    /// What to do with the selected files
    #[arg(long, value_enum, default_value = "insert")]
    task: Task,

    /// Write to the archive database or to a throwaway in-memory archive
    #[arg(long, value_enum, default_value = "production")]
    mode: Mode,

    /// First night (YYYY-MM-DD, "today" or "yesterday")
    #[arg(short, long)]
    start: Option<String>,

    /// Last night, exclusive unless configured otherwise
    #[arg(short, long)]
    end: Option<String>,

    /// Only process this instrument (repeatable)
    #[arg(short, long = "instrument")]
    instruments: Vec<String>,

    /// Process a single file instead of a date range
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Base directory of the raw data (overrides configuration)
    #[arg(long)]
    fits_base_dir: Option<PathBuf>,

    /// Part of existing observations to refresh when updating
    #[arg(long, default_value = "all")]
    scope: UpdateScope,

    /// Continue with the next file when a file fails
    #[arg(long)]
    skip_errors: bool,

    /// 0 errors only, 1 progress, 2 debug with full traces, 3 everything
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=3))]
    verbosity: u8,

    /// Log output format
    #[arg(long, value_enum, default_value = "json")]
    log_format: LogFormat,

    /// Files processed concurrently (overrides configuration)
    #[arg(short, long)]
    workers: Option<usize>,

    /// YAML configuration file (default: environment variables)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    if let Err(e) = init_tracing(args.verbosity, args.log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(summary) => {
            error!(failed = summary.failed(), "Some files could not be processed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "Ingestion run failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbosity: u8, format: LogFormat) -> Result<()> {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true);

    match format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }
    Ok(())
}

async fn run(args: Args) -> Result<RunSummary> {
    let mut config = match &args.config {
        Some(path) => IngesterConfig::from_yaml(path)?,
        None => IngesterConfig::from_env()?,
    };
    if let Some(dir) = &args.fits_base_dir {
        config.fits_base_dir = dir.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.validate()?;

    // A bad date range fails before anything is touched.
    let selection = Selection::parse(
        args.file.clone(),
        args.start.as_deref(),
        args.end.as_deref(),
        &args.instruments,
        Utc::now().date_naive(),
        config.end_date_inclusive,
    )?;

    info!(
        task = ?args.task,
        mode = ?args.mode,
        fits_base_dir = %config.fits_base_dir.display(),
        "Starting SALT archive ingester"
    );

    let registry = match &config.keyword_table_dir {
        Some(dir) => InstrumentRegistry::with_keyword_dir(dir)?,
        None => InstrumentRegistry::builtin()?,
    };
    let deriver = ExposureDeriver::new(
        registry,
        DerivationContext::new(FilterCurveLibrary::new(&config.filter_curve_dir)),
        &config.fits_base_dir,
    );

    let (archive, science): (Arc<dyn Archive>, Arc<dyn ScienceDatabase>) = match args.mode {
        Mode::Production => {
            let url = config
                .archive_database_url
                .as_deref()
                .context("SSDA_DSN must be set in production mode")?;
            let archive = PgArchive::connect(url, config.max_connections).await?;
            archive.migrate().await?;

            let science: Arc<dyn ScienceDatabase> = match &config.science_database_url {
                Some(url) => Arc::new(SaltScienceDatabase::connect(url, config.max_connections).await?),
                None => {
                    warn!("SDB_DSN not set; proposals are taken from file headers");
                    Arc::new(StaticScienceDatabase::new())
                }
            };
            (Arc::new(archive), science)
        }
        Mode::Dummy => (
            Arc::new(MemoryArchive::new()),
            Arc::new(StaticScienceDatabase::new()),
        ),
    };

    let options = RunOptions {
        task: args.task,
        scope: args.scope,
        policy: if args.skip_errors {
            ErrorPolicy::Continue
        } else {
            ErrorPolicy::Abort
        },
        workers: config.workers,
        verbosity: args.verbosity,
    };

    let orchestrator = Orchestrator::new(deriver, archive, science, options);
    orchestrator.run(&selection, &config.fits_base_dir).await
}
