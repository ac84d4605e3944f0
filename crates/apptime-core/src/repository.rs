//! The repository interfaces the core depends on. The core never reaches
//! for schema knowledge beyond these traits: a test harness supplies
//! [`memory`], production supplies [`sqlite`].

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{SessionHistoryRow, TrackedProgram};

pub trait ProgramRepository: Send + Sync {
    fn add(&self, name: &str, category: Option<&str>, project: Option<&str>) -> Result<()>;
    fn remove(&self, name: &str) -> Result<()>;
    fn remove_all(&self) -> Result<()>;
    fn update(&self, name: &str, category: Option<&str>, project: Option<&str>) -> Result<()>;
    fn get(&self, name: &str) -> Result<Option<TrackedProgram>>;
    fn list(&self) -> Result<Vec<TrackedProgram>>;
    fn list_names(&self) -> Result<Vec<String>>;
    fn reset_lifetime(&self, name: &str) -> Result<()>;
    fn reset_all_lifetimes(&self) -> Result<()>;
    fn add_lifetime(&self, name: &str, seconds: i64) -> Result<()>;
}

pub trait ActiveRepository: Send + Sync {
    fn create(&self, name: &str, start: DateTime<Utc>) -> Result<()>;
    fn get(&self, name: &str) -> Result<Option<DateTime<Utc>>>;
    fn list(&self) -> Result<Vec<(String, DateTime<Utc>)>>;
    fn remove(&self, name: &str) -> Result<()>;
    fn remove_all(&self) -> Result<()>;
}

pub trait HistoryRepository: Send + Sync {
    fn append(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        duration_seconds: i64,
    ) -> Result<()>;
    fn remove_for(&self, name: &str) -> Result<()>;
    fn remove_all(&self) -> Result<()>;
    fn count(&self, name: &str) -> Result<i64>;
    fn last(&self, name: &str) -> Result<Option<SessionHistoryRow>>;
    fn list(&self, name: &str, limit: i64) -> Result<Vec<SessionHistoryRow>>;
    fn list_all(&self, limit: i64) -> Result<Vec<SessionHistoryRow>>;
    fn list_for_date(&self, name: &str, day: chrono::NaiveDate) -> Result<Vec<SessionHistoryRow>>;
    fn list_in_range(
        &self,
        name: &str,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    ) -> Result<Vec<SessionHistoryRow>>;
}

/// Bundles the three repositories so the Coordinator and Supervisor can
/// take a single handle instead of threading three trait objects through
/// every call site.
pub struct Repositories {
    pub programs: Box<dyn ProgramRepository>,
    pub active: Box<dyn ActiveRepository>,
    pub history: Box<dyn HistoryRepository>,
}

// Lets one Arc<T>-backed store fill all three slots of `Repositories` at
// once (the sqlite and in-memory backends each implement all three traits
// on a single struct).
impl<T: ProgramRepository + ?Sized> ProgramRepository for std::sync::Arc<T> {
    fn add(&self, name: &str, category: Option<&str>, project: Option<&str>) -> Result<()> {
        (**self).add(name, category, project)
    }
    fn remove(&self, name: &str) -> Result<()> {
        (**self).remove(name)
    }
    fn remove_all(&self) -> Result<()> {
        (**self).remove_all()
    }
    fn update(&self, name: &str, category: Option<&str>, project: Option<&str>) -> Result<()> {
        (**self).update(name, category, project)
    }
    fn get(&self, name: &str) -> Result<Option<TrackedProgram>> {
        (**self).get(name)
    }
    fn list(&self) -> Result<Vec<TrackedProgram>> {
        (**self).list()
    }
    fn list_names(&self) -> Result<Vec<String>> {
        (**self).list_names()
    }
    fn reset_lifetime(&self, name: &str) -> Result<()> {
        (**self).reset_lifetime(name)
    }
    fn reset_all_lifetimes(&self) -> Result<()> {
        (**self).reset_all_lifetimes()
    }
    fn add_lifetime(&self, name: &str, seconds: i64) -> Result<()> {
        (**self).add_lifetime(name, seconds)
    }
}

impl<T: ActiveRepository + ?Sized> ActiveRepository for std::sync::Arc<T> {
    fn create(&self, name: &str, start: DateTime<Utc>) -> Result<()> {
        (**self).create(name, start)
    }
    fn get(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        (**self).get(name)
    }
    fn list(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        (**self).list()
    }
    fn remove(&self, name: &str) -> Result<()> {
        (**self).remove(name)
    }
    fn remove_all(&self) -> Result<()> {
        (**self).remove_all()
    }
}

impl<T: HistoryRepository + ?Sized> HistoryRepository for std::sync::Arc<T> {
    fn append(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        duration_seconds: i64,
    ) -> Result<()> {
        (**self).append(name, start, end, duration_seconds)
    }
    fn remove_for(&self, name: &str) -> Result<()> {
        (**self).remove_for(name)
    }
    fn remove_all(&self) -> Result<()> {
        (**self).remove_all()
    }
    fn count(&self, name: &str) -> Result<i64> {
        (**self).count(name)
    }
    fn last(&self, name: &str) -> Result<Option<SessionHistoryRow>> {
        (**self).last(name)
    }
    fn list(&self, name: &str, limit: i64) -> Result<Vec<SessionHistoryRow>> {
        (**self).list(name, limit)
    }
    fn list_all(&self, limit: i64) -> Result<Vec<SessionHistoryRow>> {
        (**self).list_all(limit)
    }
    fn list_for_date(&self, name: &str, day: chrono::NaiveDate) -> Result<Vec<SessionHistoryRow>> {
        (**self).list_for_date(name, day)
    }
    fn list_in_range(
        &self,
        name: &str,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    ) -> Result<Vec<SessionHistoryRow>> {
        (**self).list_in_range(name, from, to)
    }
}
