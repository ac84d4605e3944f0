//! The event-subscription back-end: used where the host offers a native
//! process creation/termination event source. A helper process is spawned
//! from a temporary script materialized in the data directory; it writes
//! newline-JSON events to its stdout, which this module forwards through
//! the same parsing path the Control Channel uses, so there is nothing
//! observer-specific in the handler logic — one dispatch function serves
//! both event sources.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command as ProcessCommand, Stdio};
use std::sync::Arc;
use std::thread;

use apptime_core::Coordinator;
use apptime_protocol::{parse_line, Command};
use fs_err as fs;
use tracing::{error, info, warn};

use crate::cancel::CancelToken;
use crate::observer::poll::CoreHandles;

use super::ObserverHandle;

/// Starts the helper process and a reader thread that decodes its
/// output. `helper_script` is the script text to materialize and run;
/// callers provide a host-specific body (e.g. a WMI subscription script).
pub fn start(
    helper_script: String,
    tracked_names: Vec<String>,
    core: Arc<CoreHandles>,
) -> Result<ObserverHandle, String> {
    let script_path = write_helper_script(&helper_script)?;

    let mut child = spawn_helper(&script_path, &tracked_names)?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "helper process had no stdout pipe".to_string())?;

    let token = CancelToken::new();
    let loop_token = token.clone();

    let join = thread::spawn(move || {
        reader_loop(stdout, core, loop_token);
        let _ = child.kill();
        let _ = child.wait();
        if let Err(err) = fs::remove_file(&script_path) {
            warn!(error = %err, path = %script_path.display(), "failed to remove helper script");
        }
    });

    Ok(ObserverHandle::new(token, join))
}

fn write_helper_script(body: &str) -> Result<PathBuf, String> {
    let dir = apptime_core::config::config_dir().map_err(|err| err.to_string())?.join("helpers");
    fs::create_dir_all(&dir).map_err(|err| format!("failed to create helper directory: {err}"))?;

    let path = dir.join(format!("observer-{}.helper", std::process::id()));
    fs::write(&path, body).map_err(|err| format!("failed to write helper script: {err}"))?;
    mark_executable(&path)?;
    Ok(path)
}

/// The helper is executed directly (`ProcessCommand::new(script_path)`),
/// so it needs its own executable bit set — a freshly written file isn't
/// executable on its own.
#[cfg(unix)]
fn mark_executable(path: &PathBuf) -> Result<(), String> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = std::fs::Permissions::from_mode(0o755);
    fs::set_permissions(path, permissions)
        .map_err(|err| format!("failed to mark helper script executable: {err}"))
}

#[cfg(not(unix))]
fn mark_executable(_path: &PathBuf) -> Result<(), String> {
    Ok(())
}

fn spawn_helper(script_path: &PathBuf, tracked_names: &[String]) -> Result<Child, String> {
    ProcessCommand::new(script_path)
        .args(tracked_names)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| format!("failed to spawn observer helper: {err}"))
}

fn reader_loop(stdout: std::process::ChildStdout, core: Arc<CoreHandles>, token: CancelToken) {
    let coordinator = Coordinator::new(&core.registry, &core.repos);
    let reader = BufReader::new(stdout);

    for line in reader.lines() {
        if token.is_cancelled() {
            return;
        }
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "observer helper stdout read error");
                return;
            }
        };

        match parse_line(&line) {
            Ok(Command::ProcessStart { name, pid }) => {
                coordinator.create_session(&name, pid, chrono::Utc::now())
            }
            Ok(Command::ProcessStop { name, pid }) => {
                coordinator.end_session(&name, pid, chrono::Utc::now())
            }
            Ok(Command::Refresh) => {
                // The helper has no business asking for a refresh; ignore.
            }
            Err(err) => {
                error!(error = %err, line = %line, "malformed line from observer helper");
            }
        }
    }

    info!("observer helper closed its stdout, exiting reader loop");
}
