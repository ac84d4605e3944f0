//! The Session Coordinator: turns Registry transitions into durable
//! writes. The Registry decides *whether* a PID set transition opens or
//! closes a session; the Coordinator decides what that means for the
//! three repositories and keeps them consistent with the Registry when a
//! write fails partway through.

use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::{is_unique_violation, CoreError, Result};
use crate::registry::{InsertOutcome, RemoveOutcome, Registry};
use crate::repository::Repositories;

pub struct Coordinator<'a> {
    registry: &'a Registry,
    repos: &'a Repositories,
}

impl<'a> Coordinator<'a> {
    pub fn new(registry: &'a Registry, repos: &'a Repositories) -> Self {
        Self { registry, repos }
    }

    /// A process belonging to `name` appeared. Opens a session if this is
    /// the first live PID for the program, otherwise just folds the PID
    /// into the existing set.
    pub fn create_session(&self, name: &str, pid: u32, now: chrono::DateTime<Utc>) {
        match self.registry.insert_pid(name, pid, now) {
            InsertOutcome::Duplicate => {
                info!(program = name, pid, "pid already tracked, ignoring");
            }
            InsertOutcome::Added => {
                info!(program = name, pid, "added pid to existing session");
            }
            InsertOutcome::First => self.open_active_session(name, pid, now),
        }
    }

    fn open_active_session(&self, name: &str, pid: u32, start: chrono::DateTime<Utc>) {
        match self.repos.active.create(name, start) {
            Ok(()) => {
                info!(program = name, pid, %start, "opened session");
            }
            Err(err) if is_unique_violation(&err) => {
                // A prior crash left an ActiveSession row behind. Adopt its
                // recorded start time instead of failing the transition:
                // the row already reflects when the program actually
                // started running.
                match self.repos.active.get(name) {
                    Ok(Some(stale_start)) => {
                        warn!(
                            program = name,
                            pid,
                            recovered_start = %stale_start,
                            "adopting stale active session row left by a prior crash"
                        );
                        self.registry.set_start_at(name, stale_start);
                    }
                    Ok(None) => {
                        // Row vanished between the failed insert and this
                        // read; nothing to adopt, fall back to `start`.
                        warn!(program = name, pid, "stale active session row disappeared, keeping fresh start");
                    }
                    Err(read_err) => {
                        error!(program = name, pid, error = %read_err, "failed to read stale active session row");
                    }
                }
            }
            Err(err) => {
                error!(program = name, pid, error = %err, "failed to create active session, rolling back");
                self.registry.rollback_insert(name, pid);
            }
        }
    }

    /// A process belonging to `name` exited. Closes the session and
    /// archives it if this was the last live PID.
    pub fn end_session(&self, name: &str, pid: u32, now: chrono::DateTime<Utc>) {
        match self.registry.remove_pid(name, pid, now) {
            RemoveOutcome::None => {
                info!(program = name, pid, "pid not tracked, ignoring");
            }
            RemoveOutcome::PresentMore => {
                info!(program = name, pid, "removed pid, session stays open");
            }
            RemoveOutcome::PresentLast => self.archive(name, now),
        }
    }

    /// Moves an active session into history once its last PID has exited.
    /// Also used by the shutdown flush, which calls this for every
    /// still-open program regardless of how its PIDs got cleared.
    pub fn archive(&self, name: &str, end: chrono::DateTime<Utc>) {
        let start = match self.repos.active.get(name) {
            Ok(Some(start)) => start,
            Ok(None) => {
                // The Registry believed a session was open but no
                // ActiveSession row exists. Log and recover by clearing
                // the Registry's idea of the session rather than panicking.
                error!(program = name, "archive found no active session row");
                self.registry.force_close(name);
                return;
            }
            Err(err) => {
                error!(program = name, error = %err, "failed to read active session for archive");
                return;
            }
        };

        let duration_seconds = (end - start).num_seconds().max(0);

        if let Err(err) = self.repos.history.append(name, start, end, duration_seconds) {
            error!(program = name, error = %err, "failed to append session history");
            return;
        }

        if let Err(err) = self.repos.programs.add_lifetime(name, duration_seconds) {
            error!(program = name, error = %err, "failed to update lifetime seconds");
        }

        if let Err(err) = self.repos.active.remove(name) {
            error!(program = name, error = %err, "failed to remove active session row");
        }

        info!(program = name, duration_seconds, "archived session");
    }

    /// Archives every program the Registry still believes has live PIDs.
    /// Used on shutdown: process-exit notifications may never arrive once
    /// the observer stops, so sessions are closed as of "now" instead.
    pub fn flush_open_sessions(&self, now: chrono::DateTime<Utc>) {
        for name in self.registry.snapshot_open_names() {
            self.archive(&name, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::MemoryRepositories;
    use crate::repository::{ActiveRepository, HistoryRepository, ProgramRepository};
    use chrono::TimeZone;

    fn repos() -> Repositories {
        Repositories {
            programs: Box::new(MemoryRepositories::new()),
            active: Box::new(MemoryRepositories::new()),
            history: Box::new(MemoryRepositories::new()),
        }
    }

    /// `Repositories` holds three independent boxed trait objects, but the
    /// in-memory backend here is one struct implementing all three, so
    /// exercising cross-repository behavior (e.g. adopting a stale row)
    /// needs all three fields backed by the *same* instance via `Arc`.
    fn shared_repos() -> (std::sync::Arc<MemoryRepositories>, Repositories) {
        let shared = std::sync::Arc::new(MemoryRepositories::new());
        let repos = Repositories {
            programs: Box::new(shared.clone()),
            active: Box::new(shared.clone()),
            history: Box::new(shared.clone()),
        };
        (shared, repos)
    }

    /// A fixed reference instant so tests can assert exact durations
    /// instead of tolerances around `Utc::now()`.
    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn first_pid_opens_a_session_in_the_repository() {
        let registry = Registry::new();
        let (shared, repos) = shared_repos();
        let coordinator = Coordinator::new(&registry, &repos);

        coordinator.create_session("code", 100, t0());

        assert!(registry.is_open("code"));
        assert!(shared.get("code").unwrap().is_some());
    }

    #[test]
    fn second_pid_does_not_touch_the_repository_again() {
        let registry = Registry::new();
        let (shared, repos) = shared_repos();
        let coordinator = Coordinator::new(&registry, &repos);

        coordinator.create_session("chrome", 1, t0());
        let first_start = shared.get("chrome").unwrap().unwrap();
        coordinator.create_session("chrome", 2, t0() + chrono::Duration::seconds(5));

        assert_eq!(shared.get("chrome").unwrap().unwrap(), first_start);
    }

    #[test]
    fn last_pid_exit_archives_the_session() {
        let registry = Registry::new();
        let (shared, repos) = shared_repos();
        let coordinator = Coordinator::new(&registry, &repos);

        coordinator.create_session("code", 100, t0());
        coordinator.end_session("code", 100, t0() + chrono::Duration::seconds(12));

        assert!(!registry.is_open("code"));
        assert!(shared.get("code").unwrap().is_none());
        assert_eq!(HistoryRepository::count(&*shared, "code").unwrap(), 1);
    }

    /// spec.md S1 / §8.3: a single-instance session of 12 seconds archives
    /// with exactly that duration, and lifetime reflects the same value.
    #[test]
    fn archived_duration_matches_the_seeded_start_and_end() {
        let registry = Registry::new();
        let (shared, repos) = shared_repos();
        let coordinator = Coordinator::new(&registry, &repos);
        shared.add("code", None, None).unwrap();

        let start = t0();
        let end = t0() + chrono::Duration::seconds(12);
        coordinator.create_session("code", 100, start);
        coordinator.end_session("code", 100, end);

        let last = HistoryRepository::last(&*shared, "code").unwrap().unwrap();
        assert_eq!(last.duration_seconds, 12);
        let program = shared.get("code").unwrap().unwrap();
        assert_eq!(program.lifetime_seconds, 12);
    }

    #[test]
    fn partial_pid_exit_keeps_session_open() {
        let registry = Registry::new();
        let (shared, repos) = shared_repos();
        let coordinator = Coordinator::new(&registry, &repos);

        coordinator.create_session("chrome", 1, t0());
        coordinator.create_session("chrome", 2, t0() + chrono::Duration::seconds(2));
        coordinator.end_session("chrome", 1, t0() + chrono::Duration::seconds(5));

        assert!(registry.is_open("chrome"));
        assert_eq!(HistoryRepository::count(&*shared, "chrome").unwrap(), 0);
    }

    #[test]
    fn archive_without_a_row_clears_the_registry_entry() {
        let registry = Registry::new();
        let repos = repos();
        let coordinator = Coordinator::new(&registry, &repos);

        registry.insert_pid("ghost", 1, t0());
        coordinator.archive("ghost", t0() + chrono::Duration::seconds(1));

        assert!(!registry.is_open("ghost"));
    }

    #[test]
    fn flush_open_sessions_archives_every_open_program() {
        let registry = Registry::new();
        let (shared, repos) = shared_repos();
        let coordinator = Coordinator::new(&registry, &repos);

        coordinator.create_session("code", 1, t0());
        coordinator.create_session("chrome", 2, t0());
        coordinator.flush_open_sessions(t0() + chrono::Duration::seconds(30));

        assert!(!registry.is_open("code"));
        assert!(!registry.is_open("chrome"));
        assert_eq!(HistoryRepository::count(&*shared, "code").unwrap(), 1);
        assert_eq!(HistoryRepository::count(&*shared, "chrome").unwrap(), 1);
    }

    #[test]
    fn lifetime_seconds_accumulate_across_sessions() {
        let registry = Registry::new();
        let (shared, repos) = shared_repos();
        let coordinator = Coordinator::new(&registry, &repos);
        shared.add("code", None, None).unwrap();

        coordinator.create_session("code", 1, t0());
        coordinator.end_session("code", 1, t0() + chrono::Duration::seconds(10));
        coordinator.create_session("code", 2, t0() + chrono::Duration::seconds(20));
        coordinator.end_session("code", 2, t0() + chrono::Duration::seconds(45));

        let program = shared.get("code").unwrap().unwrap();
        assert_eq!(program.lifetime_seconds, 35);
        assert_eq!(HistoryRepository::count(&*shared, "code").unwrap(), 2);
    }

    #[test]
    fn duplicate_pid_is_a_no_op() {
        let registry = Registry::new();
        let (shared, repos) = shared_repos();
        let coordinator = Coordinator::new(&registry, &repos);

        coordinator.create_session("code", 1, t0());
        coordinator.create_session("code", 1, t0());

        assert_eq!(HistoryRepository::count(&*shared, "code").unwrap(), 0);
        assert!(registry.is_open("code"));
    }
}
