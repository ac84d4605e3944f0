//! The Control Channel: a Unix-domain socket accepting newline-delimited
//! JSON commands from the CLI. Mirrors the teacher daemon's socket-accept
//! loop (`main.rs`), generalized from one request/response message to a
//! connection that stays open and decodes a line at a time.

use std::io::{BufRead, BufReader};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use fs_err as fs;
use tracing::{error, info, warn};

use apptime_protocol::{parse_line, Command, MAX_LINE_BYTES};

use crate::cancel::CancelToken;
use crate::supervisor::Supervisor;

const SOCKET_NAME: &str = "apptime.sock";

pub fn socket_path() -> Result<PathBuf, String> {
    let dir = apptime_core::config::config_dir().map_err(|err| err.to_string())?;
    Ok(dir.join(SOCKET_NAME))
}

fn prepare_socket_dir(path: &Path) -> Result<(), String> {
    let parent = path
        .parent()
        .ok_or_else(|| "socket path has no parent directory".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("failed to create socket directory: {err}"))
}

fn remove_stale_socket(path: &Path) -> Result<(), String> {
    if path.exists() {
        fs::remove_file(path).map_err(|err| format!("failed to remove stale socket: {err}"))?;
    }
    Ok(())
}

/// Binds the listener and spawns the accept loop on its own thread.
/// Returns once bound; the accept loop runs until `token` is cancelled.
pub fn listen(
    path: &Path,
    supervisor: Arc<Supervisor>,
    token: CancelToken,
) -> Result<thread::JoinHandle<()>, String> {
    prepare_socket_dir(path)?;
    remove_stale_socket(path)?;

    let listener = UnixListener::bind(path).map_err(|err| format!("failed to bind control channel: {err}"))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| format!("failed to set control channel non-blocking: {err}"))?;

    info!(path = %path.display(), "control channel listening");

    let handle = thread::spawn(move || accept_loop(listener, supervisor, token));
    Ok(handle)
}

fn accept_loop(listener: UnixListener, supervisor: Arc<Supervisor>, token: CancelToken) {
    loop {
        if token.is_cancelled() {
            break;
        }
        match listener.accept() {
            Ok((stream, _addr)) => {
                let conn_token = token.clone();
                let conn_supervisor = supervisor.clone();
                thread::spawn(move || handle_connection(stream, conn_supervisor, conn_token));
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                if token.wait_timeout(std::time::Duration::from_millis(200)) {
                    break;
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to accept control channel connection");
            }
        }
    }
}

fn handle_connection(stream: UnixStream, supervisor: Arc<Supervisor>, token: CancelToken) {
    let _ = stream.set_nonblocking(false);
    let reader = BufReader::new(stream);

    for line in reader.lines() {
        if token.is_cancelled() {
            return;
        }
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "control channel read error, closing connection");
                return;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        if line.len() > MAX_LINE_BYTES {
            warn!(len = line.len(), "control channel line exceeded max size, skipping");
            continue;
        }

        match parse_line(&line) {
            Ok(command) => dispatch(&supervisor, command),
            Err(err) => {
                let capped: String = line.chars().take(200).collect();
                error!(error = %err, line = %capped, "malformed control channel line");
            }
        }
    }
}

fn dispatch(supervisor: &Supervisor, command: Command) {
    match command {
        Command::ProcessStart { name, pid } => supervisor.coordinator_create_session(&name, pid),
        Command::ProcessStop { name, pid } => supervisor.coordinator_end_session(&name, pid),
        Command::Refresh => supervisor.refresh(),
    }
}
