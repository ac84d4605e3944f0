//! apptime-daemon: the background process. Owns the Control Channel, the
//! Process Observer, the Heartbeat Scheduler, and the Lifecycle
//! Supervisor that serializes transitions between them.

mod cancel;
mod channel;
mod heartbeat;
mod identity;
mod observer;
mod supervisor;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use apptime_core::repository::sqlite::SqliteRepositories;
use apptime_core::Repositories;

use crate::supervisor::Supervisor;

const DB_FILE_NAME: &str = "apptime.db";

#[derive(Parser)]
#[command(name = "apptime-daemon")]
#[command(about = "Background daemon that tracks how long tracked programs run")]
#[command(version)]
struct Cli {
    /// Append daemon logs to this file in addition to stdout.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// At Start, close any ActiveSession row with no rediscovered live PID
    /// instead of leaving it for later adoption. Off by default: the
    /// source's intent here is ambiguous (see DESIGN.md).
    #[arg(long)]
    reap_orphans_on_start: bool,
}

fn main() {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_file.as_deref());

    let db_path = match db_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "failed to resolve database path");
            std::process::exit(1);
        }
    };

    let sqlite = match SqliteRepositories::open(&db_path) {
        Ok(repo) => Arc::new(repo),
        Err(err) => {
            error!(error = %err, path = %db_path.display(), "failed to open database");
            std::process::exit(1);
        }
    };

    let config = match apptime_core::config::load() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let supervisor = Arc::new(Supervisor::new(
        config,
        repositories(sqlite),
        cli.reap_orphans_on_start,
    ));
    supervisor.start();

    let socket_path = match channel::socket_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "failed to resolve control channel path");
            std::process::exit(1);
        }
    };

    let channel_handle = match channel::listen(&socket_path, supervisor.clone(), supervisor.root_token()) {
        Ok(handle) => handle,
        Err(err) => {
            error!(error = %err, "failed to bind control channel");
            std::process::exit(1);
        }
    };

    info!(pid = std::process::id(), "apptime daemon started");

    let mut signals = match Signals::new([SIGTERM, SIGINT, SIGHUP]) {
        Ok(signals) => signals,
        Err(err) => {
            error!(error = %err, "failed to install signal handlers");
            std::process::exit(1);
        }
    };

    if let Some(signal) = signals.forever().next() {
        info!(signal, "received shutdown signal");
    }

    supervisor.shutdown();
    let _ = channel_handle.join();
    let _ = fs_err::remove_file(&socket_path);

    info!("apptime daemon stopped");
}

fn repositories(shared: Arc<SqliteRepositories>) -> Repositories {
    Repositories {
        programs: Box::new(shared.clone()),
        active: Box::new(shared.clone()),
        history: Box::new(shared),
    }
}

fn db_path() -> Result<PathBuf, apptime_core::CoreError> {
    Ok(apptime_core::config::config_dir()?.join(DB_FILE_NAME))
}

/// Initializes logging: stdout always, plus an optional daily-rotated file
/// layer when `--log-file` is given. Exact rotation policy is out of
/// scope (spec.md §1); daily is the ambient default so the file doesn't
/// grow unbounded.
fn init_logging(log_file: Option<&std::path::Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("apptime-daemon.log"));
            if let Err(err) = fs_err::create_dir_all(dir) {
                eprintln!("failed to create log directory {}: {err}", dir.display());
            }
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();

            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
            None
        }
    }
}
