use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chapterforge_core::{Config, StageError, Store};
use chapterforge_pipeline::{ingest, Dispatcher};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project root (overrides CHAPTERFORGE_ROOT)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project: creates the root, the database, and the
    /// jobs/ and logs/ subdirectories.
    Init,
    /// Create a Recording (if needed) and a Job with all stages pending.
    Ingest {
        #[arg(long)]
        url: String,
        #[arg(long, default_value_t = 0)]
        start: i64,
        #[arg(long, default_value_t = 0)]
        end: i64,
    },
    /// List Jobs eligible to advance a given stage.
    List { stage: String },
    /// Advance one Job's stage.
    Run {
        stage: String,
        #[arg(long)]
        job: i64,
    },
    /// Advance every eligible Job's stage.
    RunAll { stage: String },
    /// Print every Stage row for a Job.
    Status { job_id: i64 },
}

fn init_tracing(logs_dir: &std::path::Path) {
    let _ = std::fs::create_dir_all(logs_dir);
    let file_appender = tracing_appender::rolling::never(logs_dir, "chapterforge.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    // Leaked deliberately: the guard must outlive `main`, and this process
    // runs one command per invocation.
    Box::leak(Box::new(guard));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();
}

fn resolve_root(cli_root: Option<PathBuf>) -> PathBuf {
    cli_root.unwrap_or_else(|| std::env::var("CHAPTERFORGE_ROOT").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(".")))
}

fn run() -> Result<(), StageError> {
    let cli = Cli::parse();
    let root = resolve_root(cli.root.clone());

    if let Commands::Init = &cli.command {
        chapterforge_core::init_project(&root)?;
        println!("Initialized chapterforge project in {}", root.display());
        return Ok(());
    }

    init_tracing(&root.join("logs"));
    let mut config = Config::load().unwrap_or_else(|_| Config::for_root(root.clone()));
    config.root = root.clone();

    let store = Arc::new(Store::open(&config.db_path())?);
    let dispatcher = Dispatcher::new(store.clone(), config);
    let reclaimed = dispatcher.reclaim_abandoned()?;
    if reclaimed > 0 {
        tracing::info!(reclaimed, "reclaimed abandoned stages on startup");
    }

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Ingest { url, start, end } => {
            let job = ingest::ingest(&store, &url, start, end)?;
            println!("created job {} ({})", job.id, job.ulid);
        }
        Commands::List { stage } => {
            for job_id in dispatcher.list_eligible(&stage)? {
                println!("{job_id}");
            }
        }
        Commands::Run { stage, job } => {
            let advance = dispatcher.advance_one(job, &stage)?;
            println!("{stage} for job {job}: {advance:?}");
        }
        Commands::RunAll { stage } => {
            let advanced = dispatcher.advance_all(&stage)?;
            println!("advanced {advanced} job(s) through {stage}");
        }
        Commands::Status { job_id } => {
            for stage in store.list_stages_for_job(job_id)? {
                println!(
                    "{:<20} {:<10} attempts={} last_error={}",
                    stage.stage_name,
                    stage.state.as_str(),
                    stage.attempt_count,
                    stage.last_error.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
