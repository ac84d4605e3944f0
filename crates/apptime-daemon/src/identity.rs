//! Resolves a tracked-program identity for a running process.
//!
//! Order of preference, per process: the executable link, then the first
//! argument of the command line, then the short command name. Whichever
//! resolves first wins; the result is lower-cased before it is ever
//! compared against a tracked name.

use std::path::Path;

use sysinfo::{Pid, Process, System};

pub fn resolve(sys: &System, pid: Pid) -> Option<String> {
    let process = sys.process(pid)?;
    identity_for(process)
}

fn identity_for(process: &Process) -> Option<String> {
    if let Some(exe) = process.exe() {
        if let Some(name) = base_name(exe) {
            return Some(name.to_lowercase());
        }
    }

    if let Some(first_arg) = process.cmd().first() {
        if let Some(name) = base_name(Path::new(first_arg)) {
            return Some(name.to_lowercase());
        }
    }

    let name = process.name();
    if name.is_empty() {
        None
    } else {
        Some(name.to_lowercase())
    }
}

fn base_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_directory_components() {
        assert_eq!(base_name(Path::new("/usr/bin/code")), Some("code"));
        assert_eq!(base_name(Path::new("code.exe")), Some("code.exe"));
    }

    #[test]
    fn base_name_of_root_is_none() {
        assert_eq!(base_name(Path::new("/")), None);
    }
}
