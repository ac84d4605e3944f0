//! The Tracking Registry: an in-memory map from tracked program name to
//! [`Tracked`], guarded by a single mutex. No mutation here ever performs
//! I/O — all persistence happens outside the lock, in the Coordinator.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::types::{fold_name, Tracked};

/// Outcome of inserting a PID into a program's live set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The PID set transitioned from empty to non-empty: a session opens.
    First,
    /// The PID was already present; only `last_seen` was refreshed.
    Duplicate,
    /// The set already had at least one other PID.
    Added,
}

/// Outcome of removing a PID from a program's live set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The program has no entry, or the PID was never tracked for it.
    None,
    /// PIDs remain after removal; the session stays open.
    PresentMore,
    /// That was the last PID: the session closes.
    PresentLast,
}

#[derive(Default)]
pub struct Registry {
    programs: Mutex<HashMap<String, Tracked>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the entry if absent; if present, updates category/project in
    /// place without disturbing the PID set or timestamps. Used by refresh.
    pub fn ensure(&self, name: &str, category: Option<String>, project: Option<String>) {
        let name = fold_name(name);
        let now = Utc::now();
        let mut programs = self.programs.lock().expect("registry mutex poisoned");
        programs
            .entry(name)
            .and_modify(|tracked| {
                tracked.category = category.clone();
                tracked.project = project.clone();
            })
            .or_insert_with(|| Tracked::new(category, project, now));
    }

    /// A point-in-time list of tracked names, used by refresh to compute
    /// which names dropped out of the new configuration.
    pub fn snapshot_keys(&self) -> Vec<String> {
        let programs = self.programs.lock().expect("registry mutex poisoned");
        programs.keys().cloned().collect()
    }

    /// Deletes the entry if its PID set is empty. Returns `false` (and
    /// leaves the entry in place) if PIDs are still live; callers that
    /// want to force a removal must close the session via the Coordinator
    /// first.
    pub fn remove(&self, name: &str) -> bool {
        let name = fold_name(name);
        let mut programs = self.programs.lock().expect("registry mutex poisoned");
        match programs.get(&name) {
            Some(tracked) if tracked.is_open() => false,
            Some(_) => {
                programs.remove(&name);
                true
            }
            None => true,
        }
    }

    /// Atomically inserts `pid` into `name`'s live set.
    pub fn insert_pid(&self, name: &str, pid: u32, now: DateTime<Utc>) -> InsertOutcome {
        let name = fold_name(name);
        let mut programs = self.programs.lock().expect("registry mutex poisoned");
        let tracked = programs
            .entry(name)
            .or_insert_with(|| Tracked::new(None, None, now));

        if tracked.pids.contains(&pid) {
            tracked.last_seen = now;
            return InsertOutcome::Duplicate;
        }

        tracked.pids.insert(pid);
        tracked.last_seen = now;
        if tracked.pids.len() == 1 {
            tracked.start_at = Some(now);
            InsertOutcome::First
        } else {
            InsertOutcome::Added
        }
    }

    /// Inverse of [`Self::insert_pid`].
    pub fn remove_pid(&self, name: &str, pid: u32, now: DateTime<Utc>) -> RemoveOutcome {
        let name = fold_name(name);
        let mut programs = self.programs.lock().expect("registry mutex poisoned");
        let Some(tracked) = programs.get_mut(&name) else {
            return RemoveOutcome::None;
        };

        if !tracked.pids.remove(&pid) {
            return RemoveOutcome::None;
        }
        tracked.last_seen = now;

        if tracked.pids.is_empty() {
            RemoveOutcome::PresentLast
        } else {
            RemoveOutcome::PresentMore
        }
    }

    /// Rolls back a PID insertion, used when the repository write backing
    /// a "first PID" transition fails.
    pub fn rollback_insert(&self, name: &str, pid: u32) {
        let name = fold_name(name);
        let mut programs = self.programs.lock().expect("registry mutex poisoned");
        if let Some(tracked) = programs.get_mut(&name) {
            tracked.pids.remove(&pid);
            if tracked.pids.is_empty() {
                tracked.start_at = None;
            }
        }
    }

    /// Forces a program's PID set empty and clears its start time, used
    /// when `archive` discovers the Registry was inconsistent with
    /// persistence.
    pub fn force_close(&self, name: &str) {
        let name = fold_name(name);
        let mut programs = self.programs.lock().expect("registry mutex poisoned");
        if let Some(tracked) = programs.get_mut(&name) {
            tracked.pids.clear();
            tracked.start_at = None;
        }
    }

    /// Overwrites the recorded start time for an open session. Used when
    /// the Coordinator adopts a start time recovered from a stale
    /// `ActiveSession` row left by a prior crash.
    pub fn set_start_at(&self, name: &str, start: DateTime<Utc>) {
        let name = fold_name(name);
        let mut programs = self.programs.lock().expect("registry mutex poisoned");
        if let Some(tracked) = programs.get_mut(&name) {
            tracked.start_at = Some(start);
        }
    }

    pub fn touch_last_seen(&self, name: &str, now: DateTime<Utc>) {
        let name = fold_name(name);
        let mut programs = self.programs.lock().expect("registry mutex poisoned");
        if let Some(tracked) = programs.get_mut(&name) {
            tracked.last_seen = now;
        }
    }

    /// A point-in-time copy of (name, pid, last_seen) for every live PID,
    /// for the polling back-end's liveness pass. Never exposes a
    /// reference that could outlive the lock.
    pub fn iter_for_observer(&self) -> Vec<(String, u32, DateTime<Utc>)> {
        let programs = self.programs.lock().expect("registry mutex poisoned");
        programs
            .iter()
            .flat_map(|(name, tracked)| {
                tracked
                    .pids
                    .iter()
                    .map(move |pid| (name.clone(), *pid, tracked.last_seen))
            })
            .collect()
    }

    /// A point-in-time snapshot of every entry currently holding live
    /// PIDs, used by the Heartbeat Scheduler.
    pub fn snapshot_open(&self) -> Vec<(String, Option<String>, Option<String>)> {
        let programs = self.programs.lock().expect("registry mutex poisoned");
        programs
            .iter()
            .filter(|(_, tracked)| tracked.is_open())
            .map(|(name, tracked)| (name.clone(), tracked.category.clone(), tracked.project.clone()))
            .collect()
    }

    /// All entries with a non-empty PID set, for the shutdown flush.
    pub fn snapshot_open_names(&self) -> Vec<String> {
        let programs = self.programs.lock().expect("registry mutex poisoned");
        programs
            .iter()
            .filter(|(_, tracked)| tracked.is_open())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Whether `name` currently has any live PIDs (test/diagnostic helper).
    pub fn is_open(&self, name: &str) -> bool {
        let name = fold_name(name);
        let programs = self.programs.lock().expect("registry mutex poisoned");
        programs.get(&name).map(Tracked::is_open).unwrap_or(false)
    }

    pub fn start_at(&self, name: &str) -> Option<DateTime<Utc>> {
        let name = fold_name(name);
        let programs = self.programs.lock().expect("registry mutex poisoned");
        programs.get(&name).and_then(|tracked| tracked.start_at)
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = fold_name(name);
        let programs = self.programs.lock().expect("registry mutex poisoned");
        programs.contains_key(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn first_insert_opens_a_session() {
        let reg = Registry::new();
        assert_eq!(reg.insert_pid("code", 1, now()), InsertOutcome::First);
        assert!(reg.is_open("code"));
    }

    #[test]
    fn second_distinct_pid_is_added_not_first() {
        let reg = Registry::new();
        reg.insert_pid("chrome", 1, now());
        assert_eq!(reg.insert_pid("chrome", 2, now()), InsertOutcome::Added);
    }

    #[test]
    fn duplicate_insert_is_a_no_op() {
        let reg = Registry::new();
        reg.insert_pid("chrome", 1, now());
        assert_eq!(reg.insert_pid("chrome", 1, now()), InsertOutcome::Duplicate);
    }

    #[test]
    fn names_fold_to_lowercase() {
        let reg = Registry::new();
        reg.insert_pid("Code.EXE", 1, now());
        assert!(reg.is_open("code.exe"));
        assert_eq!(reg.remove_pid("CODE.EXE", 1, now()), RemoveOutcome::PresentLast);
    }

    #[test]
    fn remove_pid_reports_more_vs_last() {
        let reg = Registry::new();
        reg.insert_pid("chrome", 1, now());
        reg.insert_pid("chrome", 2, now());
        assert_eq!(reg.remove_pid("chrome", 1, now()), RemoveOutcome::PresentMore);
        assert_eq!(reg.remove_pid("chrome", 2, now()), RemoveOutcome::PresentLast);
        assert!(!reg.is_open("chrome"));
    }

    #[test]
    fn remove_pid_on_untracked_name_is_none() {
        let reg = Registry::new();
        assert_eq!(reg.remove_pid("ghost", 1, now()), RemoveOutcome::None);
    }

    #[test]
    fn remove_requires_empty_pid_set() {
        let reg = Registry::new();
        reg.insert_pid("code", 1, now());
        assert!(!reg.remove("code"));
        reg.remove_pid("code", 1, now());
        assert!(reg.remove("code"));
        assert!(!reg.contains("code"));
    }

    #[test]
    fn ensure_updates_category_without_touching_pids() {
        let reg = Registry::new();
        reg.insert_pid("code", 1, now());
        reg.ensure("code", Some("editor".to_string()), None);
        assert!(reg.is_open("code"));
        let snapshot = reg.snapshot_open();
        let (_, category, _) = snapshot.into_iter().find(|(n, _, _)| n == "code").unwrap();
        assert_eq!(category, Some("editor".to_string()));
    }

    #[test]
    fn rollback_insert_clears_start_when_it_was_the_only_pid() {
        let reg = Registry::new();
        reg.insert_pid("code", 1, now());
        reg.rollback_insert("code", 1);
        assert!(!reg.is_open("code"));
        assert_eq!(reg.start_at("code"), None);
    }
}
