//! An in-memory repository implementation used by the core's own tests.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};

use super::{ActiveRepository, HistoryRepository, ProgramRepository};
use crate::error::{CoreError, Result};
use crate::types::{SessionHistoryRow, TrackedProgram};

#[derive(Default)]
pub struct MemoryRepositories {
    programs: Mutex<HashMap<String, TrackedProgram>>,
    active: Mutex<HashMap<String, DateTime<Utc>>>,
    history: Mutex<Vec<SessionHistoryRow>>,
    next_history_id: Mutex<i64>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgramRepository for MemoryRepositories {
    fn add(&self, name: &str, category: Option<&str>, project: Option<&str>) -> Result<()> {
        let mut programs = self.programs.lock().unwrap();
        if programs.contains_key(name) {
            return Err(CoreError::ProgramAlreadyTracked(name.to_string()));
        }
        programs.insert(
            name.to_string(),
            TrackedProgram {
                name: name.to_string(),
                category: category.map(str::to_string),
                project: project.map(str::to_string),
                lifetime_seconds: 0,
            },
        );
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.programs.lock().unwrap().remove(name);
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        self.programs.lock().unwrap().clear();
        Ok(())
    }

    fn update(&self, name: &str, category: Option<&str>, project: Option<&str>) -> Result<()> {
        let mut programs = self.programs.lock().unwrap();
        let program = programs
            .get_mut(name)
            .ok_or_else(|| CoreError::ProgramNotFound(name.to_string()))?;
        program.category = category.map(str::to_string);
        program.project = project.map(str::to_string);
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<TrackedProgram>> {
        Ok(self.programs.lock().unwrap().get(name).cloned())
    }

    fn list(&self) -> Result<Vec<TrackedProgram>> {
        let mut rows: Vec<_> = self.programs.lock().unwrap().values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    fn list_names(&self) -> Result<Vec<String>> {
        Ok(self.list()?.into_iter().map(|row| row.name).collect())
    }

    fn reset_lifetime(&self, name: &str) -> Result<()> {
        if let Some(program) = self.programs.lock().unwrap().get_mut(name) {
            program.lifetime_seconds = 0;
        }
        Ok(())
    }

    fn reset_all_lifetimes(&self) -> Result<()> {
        for program in self.programs.lock().unwrap().values_mut() {
            program.lifetime_seconds = 0;
        }
        Ok(())
    }

    fn add_lifetime(&self, name: &str, seconds: i64) -> Result<()> {
        if let Some(program) = self.programs.lock().unwrap().get_mut(name) {
            program.lifetime_seconds += seconds;
        }
        Ok(())
    }
}

impl ActiveRepository for MemoryRepositories {
    fn create(&self, name: &str, start: DateTime<Utc>) -> Result<()> {
        let mut active = self.active.lock().unwrap();
        if active.contains_key(name) {
            // Mirrors the unique-violation path a real database would take;
            // adopting the stored start time is the caller's job.
            return Err(CoreError::Repository {
                context: "active session already exists".to_string(),
                source: rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
                    Some("UNIQUE constraint failed: active_sessions.name".to_string()),
                ),
            });
        }
        active.insert(name.to_string(), start);
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.active.lock().unwrap().get(name).copied())
    }

    fn list(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        Ok(self
            .active
            .lock()
            .unwrap()
            .iter()
            .map(|(name, start)| (name.clone(), *start))
            .collect())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.active.lock().unwrap().remove(name);
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        self.active.lock().unwrap().clear();
        Ok(())
    }
}

impl HistoryRepository for MemoryRepositories {
    fn append(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        duration_seconds: i64,
    ) -> Result<()> {
        let mut id_guard = self.next_history_id.lock().unwrap();
        *id_guard += 1;
        let id = *id_guard;
        self.history.lock().unwrap().push(SessionHistoryRow {
            id,
            name: name.to_string(),
            start,
            end,
            duration_seconds,
        });
        Ok(())
    }

    fn remove_for(&self, name: &str) -> Result<()> {
        self.history.lock().unwrap().retain(|row| row.name != name);
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        self.history.lock().unwrap().clear();
        Ok(())
    }

    fn count(&self, name: &str) -> Result<i64> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.name == name)
            .count() as i64)
    }

    fn last(&self, name: &str) -> Result<Option<SessionHistoryRow>> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.name == name)
            .max_by_key(|row| row.end)
            .cloned())
    }

    fn list(&self, name: &str, limit: i64) -> Result<Vec<SessionHistoryRow>> {
        let mut rows: Vec<_> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.name == name)
            .cloned()
            .collect();
        rows.sort_by_key(|row| std::cmp::Reverse(row.start));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    fn list_all(&self, limit: i64) -> Result<Vec<SessionHistoryRow>> {
        let mut rows: Vec<_> = self.history.lock().unwrap().clone();
        rows.sort_by_key(|row| std::cmp::Reverse(row.start));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    fn list_for_date(&self, name: &str, day: NaiveDate) -> Result<Vec<SessionHistoryRow>> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.name == name && row.start.date_naive() == day)
            .cloned()
            .collect())
    }

    fn list_in_range(
        &self,
        name: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SessionHistoryRow>> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|row| {
                row.name == name && row.start.date_naive() >= from && row.start.date_naive() <= to
            })
            .cloned()
            .collect())
    }
}
