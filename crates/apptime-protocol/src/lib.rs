//! Wire types for the apptime control channel.
//!
//! The daemon listens on a local unix-domain socket (or, on Windows, a named
//! pipe) and accepts newline-delimited JSON objects of the form
//! `{"action": ..., ...fields}`. This crate defines that schema so the
//! daemon and the CLI never drift out of sync.

use serde::{Deserialize, Serialize};

/// A line on the control channel exceeding this size is rejected without
/// being parsed, so a runaway client can't grow the daemon's read buffer
/// unbounded.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    ProcessStart { name: String, pid: u32 },
    ProcessStop { name: String, pid: u32 },
    Refresh,
}

impl Command {
    pub fn process_start(name: impl Into<String>, pid: u32) -> Self {
        Command::ProcessStart {
            name: name.into(),
            pid,
        }
    }

    pub fn process_stop(name: impl Into<String>, pid: u32) -> Self {
        Command::ProcessStop {
            name: name.into(),
            pid,
        }
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Parses a single line of the control channel wire format.
///
/// Unknown actions and malformed JSON are both reported as [`ParseError`];
/// the caller is expected to log the raw line and keep the connection open,
/// per the channel's tolerance for malformed input.
pub fn parse_line(line: &str) -> Result<Command, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }
    if trimmed.len() > MAX_LINE_BYTES {
        return Err(ParseError::TooLarge);
    }
    serde_json::from_str(trimmed).map_err(ParseError::InvalidJson)
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("line was empty")]
    Empty,
    #[error("line exceeded {MAX_LINE_BYTES} bytes")]
    TooLarge,
    #[error("invalid command: {0}")]
    InvalidJson(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_process_start() {
        let cmd = parse_line(r#"{"action":"process_start","name":"code","pid":4242}"#).unwrap();
        assert_eq!(cmd, Command::process_start("code", 4242));
    }

    #[test]
    fn parses_process_stop() {
        let cmd = parse_line(r#"{"action":"process_stop","name":"code","pid":4242}"#).unwrap();
        assert_eq!(cmd, Command::process_stop("code", 4242));
    }

    #[test]
    fn parses_refresh() {
        let cmd = parse_line(r#"{"action":"refresh"}"#).unwrap();
        assert_eq!(cmd, Command::Refresh);
    }

    #[test]
    fn name_is_case_preserved_on_the_wire() {
        // Case folding is the daemon's responsibility, not the wire format's.
        let cmd = parse_line(r#"{"action":"process_start","name":"Code.EXE","pid":1}"#).unwrap();
        assert_eq!(cmd, Command::process_start("Code.EXE", 1));
    }

    #[test]
    fn rejects_unknown_action() {
        assert!(parse_line(r#"{"action":"teleport"}"#).is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_line("not json").is_err());
    }

    #[test]
    fn rejects_empty_line() {
        assert!(matches!(parse_line(""), Err(ParseError::Empty)));
        assert!(matches!(parse_line("   "), Err(ParseError::Empty)));
    }

    #[test]
    fn round_trips_through_to_line() {
        let cmd = Command::process_start("chrome", 99);
        let line = cmd.to_line().unwrap();
        assert_eq!(parse_line(&line).unwrap(), cmd);
    }
}
