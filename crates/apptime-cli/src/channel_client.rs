//! Sends a single control-channel command to the running daemon.
//!
//! The CLI is a thin collaborator (spec.md §1): it never touches the
//! Registry or Coordinator directly, only the persistence layer and this
//! one-line fire-and-forget drop onto the daemon's socket. A daemon that
//! isn't running is not an error worth failing the command over — the
//! persistence-layer change the CLI just made is still durable, and the
//! daemon will pick it up on its own next Start.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use apptime_protocol::Command;

const SOCKET_NAME: &str = "apptime.sock";
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

fn socket_path() -> Result<PathBuf, String> {
    Ok(apptime_core::config::config_dir()
        .map_err(|err| err.to_string())?
        .join(SOCKET_NAME))
}

/// Sends `command` to the daemon. Returns `Ok(())` even if nothing is
/// listening; callers log/ignore the `Err` case rather than failing the
/// whole CLI invocation, per the CLI's role as a thin collaborator.
pub fn send(command: &Command) -> Result<(), String> {
    let path = socket_path()?;
    let mut stream = UnixStream::connect(&path).map_err(|err| format!("daemon not reachable: {err}"))?;
    stream
        .set_write_timeout(Some(CONNECT_TIMEOUT))
        .map_err(|err| err.to_string())?;

    let line = command.to_line().map_err(|err| err.to_string())?;
    stream.write_all(line.as_bytes()).map_err(|err| err.to_string())?;
    stream.flush().map_err(|err| err.to_string())
}

/// Sends a `refresh` command, logging (not failing) if the daemon is down.
pub fn refresh() {
    if let Err(err) = send(&Command::Refresh) {
        tracing::warn!(error = %err, "could not notify daemon of refresh; it will pick up the change on next start");
    }
}
