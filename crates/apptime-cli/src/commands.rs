//! Implementations of each `apptime` subcommand. Each function talks only
//! to the repository layer and, where the daemon's live state needs to
//! notice the change, drops a `refresh` on the control channel — the
//! contract spec.md §6 describes for "Removing a tracked program".

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, Utc};

use apptime_core::{ActiveRepository, HistoryRepository, ProgramRepository, Repositories};

use crate::channel_client;
use crate::format;

pub fn add(repos: &Repositories, name: &str, category: Option<String>, project: Option<String>) -> Result<()> {
    let folded = apptime_core::fold_name(name);
    repos
        .programs
        .add(&folded, category.as_deref(), project.as_deref())
        .with_context(|| format!("failed to add tracked program {folded}"))?;
    channel_client::refresh();
    println!("now tracking {folded}");
    Ok(())
}

pub fn remove(repos: &Repositories, name: &str, reset_history: bool) -> Result<()> {
    let folded = apptime_core::fold_name(name);

    if repos.programs.get(&folded)?.is_none() {
        bail!("no tracked program named {folded}");
    }

    // Order matters (spec.md §6): stop the daemon from tracking it via
    // refresh *after* the active session row is gone, so the daemon never
    // observes a tracked name with no row to archive against.
    repos
        .active
        .remove(&folded)
        .with_context(|| format!("failed to clear active session for {folded}"))?;

    if reset_history {
        repos
            .history
            .remove_for(&folded)
            .with_context(|| format!("failed to remove history for {folded}"))?;
    }

    repos
        .programs
        .remove(&folded)
        .with_context(|| format!("failed to remove tracked program {folded}"))?;

    channel_client::refresh();
    println!("stopped tracking {folded}");
    Ok(())
}

pub fn list(repos: &Repositories) -> Result<()> {
    let programs = repos.programs.list().context("failed to list tracked programs")?;
    if programs.is_empty() {
        println!("no tracked programs");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = programs.iter().map(format::program_row).collect();
    print!("{}", format::table(&["name", "category", "project", "lifetime"], &rows));
    Ok(())
}

pub fn status(repos: &Repositories) -> Result<()> {
    let active = repos.active.list().context("failed to list active sessions")?;
    if active.is_empty() {
        println!("nothing currently tracked is running");
        return Ok(());
    }

    let now = Utc::now();
    let rows: Vec<Vec<String>> = active
        .iter()
        .map(|(name, start)| {
            let elapsed = (now - *start).num_seconds().max(0);
            vec![name.clone(), format::timestamp(*start), format::duration(elapsed)]
        })
        .collect();
    print!("{}", format::table(&["name", "started", "elapsed"], &rows));
    Ok(())
}

pub fn today(repos: &Repositories) -> Result<()> {
    let today = Local::now().date_naive();
    log_for_range(repos, None, today, today)
}

pub fn log(repos: &Repositories, name: Option<String>, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<()> {
    match (from, to) {
        (None, None) => log_all(repos, name),
        (from, to) => {
            let to = to.unwrap_or_else(|| Local::now().date_naive());
            let from = from.unwrap_or(to);
            log_for_range(repos, name, from, to)
        }
    }
}

fn log_all(repos: &Repositories, name: Option<String>) -> Result<()> {
    let rows = match name {
        Some(name) => repos
            .history
            .list(&apptime_core::fold_name(&name), 50)
            .context("failed to list session history")?,
        None => repos
            .history
            .list_all(50)
            .context("failed to list session history")?,
    };
    print_history(&rows)
}

fn log_for_range(repos: &Repositories, name: Option<String>, from: NaiveDate, to: NaiveDate) -> Result<()> {
    let names = match name {
        Some(name) => vec![apptime_core::fold_name(&name)],
        None => repos.programs.list_names().context("failed to list tracked programs")?,
    };

    let mut rows = Vec::new();
    for name in names {
        rows.extend(
            repos
                .history
                .list_in_range(&name, from, to)
                .with_context(|| format!("failed to list history for {name}"))?,
        );
    }
    rows.sort_by_key(|row| std::cmp::Reverse(row.start));
    print_history(&rows)
}

fn print_history(rows: &[apptime_core::SessionHistoryRow]) -> Result<()> {
    if rows.is_empty() {
        println!("no sessions recorded");
        return Ok(());
    }
    let table_rows: Vec<Vec<String>> = rows.iter().map(format::history_row).collect();
    print!("{}", format::table(&["name", "start", "end", "duration"], &table_rows));
    Ok(())
}

pub fn reset(repos: &Repositories, name: Option<String>) -> Result<()> {
    match name {
        Some(name) => {
            let folded = apptime_core::fold_name(&name);
            repos
                .programs
                .reset_lifetime(&folded)
                .with_context(|| format!("failed to reset lifetime for {folded}"))?;
            println!("reset lifetime for {folded}");
        }
        None => {
            repos
                .programs
                .reset_all_lifetimes()
                .context("failed to reset all lifetimes")?;
            println!("reset lifetime for all tracked programs");
        }
    }
    Ok(())
}

pub fn refresh() -> Result<()> {
    channel_client::send(&apptime_protocol::Command::Refresh)
        .map_err(|err| anyhow::anyhow!(err))
        .context("failed to notify daemon")?;
    println!("sent refresh");
    Ok(())
}

/// Prints the host-specific service-manager unit text rather than
/// installing it (spec.md §1 scopes daemon registration out of the core;
/// this keeps the crate self-contained and root-free to build and test).
pub fn install() -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        println!("{}", launchd_plist());
    }
    #[cfg(not(target_os = "macos"))]
    {
        println!("{}", systemd_unit());
    }
    Ok(())
}

pub fn uninstall() -> Result<()> {
    println!("apptime does not manage service registration automatically; remove the unit/plist file printed by `install` manually.");
    Ok(())
}

#[cfg(target_os = "macos")]
fn launchd_plist() -> &'static str {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
<plist version=\"1.0\">\n<dict>\n\
  <key>Label</key><string>com.apptime.daemon</string>\n\
  <key>ProgramArguments</key><array><string>apptime-daemon</string></array>\n\
  <key>RunAtLoad</key><true/>\n\
  <key>KeepAlive</key><true/>\n\
</dict>\n</plist>\n"
}

#[cfg(not(target_os = "macos"))]
fn systemd_unit() -> String {
    "[Unit]\nDescription=apptime daemon\n\n[Service]\nExecStart=apptime-daemon\nRestart=on-failure\n\n[Install]\nWantedBy=default.target\n".to_string()
}
