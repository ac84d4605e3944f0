//! apptime: the command-line front-end. Manages tracked programs and
//! inspects session history; talks to the daemon only through the shared
//! database and by dropping `refresh` on the control channel (spec.md §1).

mod channel_client;
mod commands;
mod format;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use apptime_core::repository::sqlite::SqliteRepositories;
use apptime_core::Repositories;

const DB_FILE_NAME: &str = "apptime.db";

#[derive(Parser)]
#[command(name = "apptime")]
#[command(about = "Track how long your applications run")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start tracking a program.
    Add {
        name: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        project: Option<String>,
    },
    /// Stop tracking a program.
    Rm {
        name: String,
        /// Also delete its session history (kept by default).
        #[arg(long)]
        reset_history: bool,
    },
    /// List every tracked program with its lifetime total.
    List,
    /// Show programs currently running and their elapsed time.
    Status,
    /// Show today's sessions.
    Today,
    /// Show session history, optionally filtered by name and date range.
    Log {
        name: Option<String>,
        #[arg(long, value_name = "YYYY-MM-DD")]
        from: Option<NaiveDate>,
        #[arg(long, value_name = "YYYY-MM-DD")]
        to: Option<NaiveDate>,
    },
    /// Reset lifetime totals (all programs, or one by name).
    Reset { name: Option<String> },
    /// Ask the running daemon to reload configuration and the tracked set.
    Refresh,
    /// Print the host service-manager unit text for the daemon.
    Install,
    /// Print instructions for removing a previously installed unit.
    Uninstall,
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Refresh => run(commands::refresh()),
        Commands::Install => run(commands::install()),
        Commands::Uninstall => run(commands::uninstall()),
        other => run(dispatch_with_repositories(other)),
    }
}

fn dispatch_with_repositories(command: Commands) -> anyhow::Result<()> {
    let repos = open_repositories()?;
    match command {
        Commands::Add { name, category, project } => commands::add(&repos, &name, category, project),
        Commands::Rm { name, reset_history } => commands::remove(&repos, &name, reset_history),
        Commands::List => commands::list(&repos),
        Commands::Status => commands::status(&repos),
        Commands::Today => commands::today(&repos),
        Commands::Log { name, from, to } => commands::log(&repos, name, from, to),
        Commands::Reset { name } => commands::reset(&repos, name),
        Commands::Refresh | Commands::Install | Commands::Uninstall => unreachable!("handled in main"),
    }
}

fn run(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("apptime: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn open_repositories() -> anyhow::Result<Repositories> {
    let db_path = db_path()?;
    let shared = std::sync::Arc::new(SqliteRepositories::open(&db_path)?);
    Ok(Repositories {
        programs: Box::new(shared.clone()),
        active: Box::new(shared.clone()),
        history: Box::new(shared),
    })
}

fn db_path() -> apptime_core::Result<PathBuf> {
    Ok(apptime_core::config::config_dir()?.join(DB_FILE_NAME))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
