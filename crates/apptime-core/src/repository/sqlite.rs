//! SQLite-backed repositories for apptime.
//!
//! Mirrors the teacher daemon's `db.rs`: a single-writer connection pool of
//! one (guarded by a mutex), WAL journal mode, and a busy timeout so the
//! CLI and daemon can share the database file without starving each other.
//! The schema is created inline with `CREATE TABLE IF NOT EXISTS` — there
//! is no migration framework, since the migration mechanism is explicitly
//! out of scope (spec.md §1) and the schema here is small enough not to
//! need one.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::{params, Connection, OpenFlags};

use super::{ActiveRepository, HistoryRepository, ProgramRepository};
use crate::error::{CoreError, Result};
use crate::types::{SessionHistoryRow, TrackedProgram};

pub struct SqliteRepositories {
    path: PathBuf,
    conn: std::sync::Mutex<Connection>,
}

impl SqliteRepositories {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conn = Self::open_connection(&path)?;
        let repo = Self {
            path,
            conn: std::sync::Mutex::new(conn),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn open_connection(path: &Path) -> Result<Connection> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent).map_err(|source| CoreError::ConfigWriteFailed {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(path, flags).map_err(|source| CoreError::Repository {
            context: "open sqlite db".to_string(),
            source,
        })?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|source| CoreError::Repository {
                context: "enable WAL".to_string(),
                source,
            })?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|source| CoreError::Repository {
                context: "set synchronous".to_string(),
                source,
            })?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|source| CoreError::Repository {
                context: "set busy_timeout".to_string(),
                source,
            })?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|source| CoreError::Repository {
                context: "enable foreign keys".to_string(),
                source,
            })?;

        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS programs (
                    name TEXT PRIMARY KEY,
                    category TEXT,
                    project TEXT,
                    lifetime_seconds INTEGER NOT NULL DEFAULT 0
                 );
                 CREATE TABLE IF NOT EXISTS active_sessions (
                    name TEXT PRIMARY KEY REFERENCES programs(name) ON DELETE CASCADE,
                    start_time TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS session_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    start_time TEXT NOT NULL,
                    end_time TEXT NOT NULL,
                    duration_seconds INTEGER NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_session_history_name
                    ON session_history(name, start_time);
                 COMMIT;",
            )
            .map_err(|source| CoreError::Repository {
                context: "initialize schema".to_string(),
                source,
            })
        })
    }

    fn with_connection<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        op(&conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_timestamp(value: &str, context: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| CoreError::ConfigMalformed {
            path: PathBuf::from(context),
            details: format!("invalid timestamp {value:?}: {err}"),
        })
}

fn history_row_from(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionHistoryRow> {
    let start: String = row.get(2)?;
    let end: String = row.get(3)?;
    Ok(SessionHistoryRow {
        id: row.get(0)?,
        name: row.get(1)?,
        start: DateTime::parse_from_rfc3339(&start)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).single().unwrap()),
        end: DateTime::parse_from_rfc3339(&end)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).single().unwrap()),
        duration_seconds: row.get(4)?,
    })
}

impl ProgramRepository for SqliteRepositories {
    fn add(&self, name: &str, category: Option<&str>, project: Option<&str>) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO programs (name, category, project, lifetime_seconds) \
                 VALUES (?1, ?2, ?3, 0)",
                params![name, category, project],
            )
            .map_err(|source| CoreError::Repository {
                context: format!("add program {name}"),
                source,
            })?;
            Ok(())
        })
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM programs WHERE name = ?1", params![name])
                .map_err(|source| CoreError::Repository {
                    context: format!("remove program {name}"),
                    source,
                })?;
            Ok(())
        })
    }

    fn remove_all(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM programs", [])
                .map_err(|source| CoreError::Repository {
                    context: "remove all programs".to_string(),
                    source,
                })?;
            Ok(())
        })
    }

    fn update(&self, name: &str, category: Option<&str>, project: Option<&str>) -> Result<()> {
        self.with_connection(|conn| {
            let changed = conn
                .execute(
                    "UPDATE programs SET category = ?2, project = ?3 WHERE name = ?1",
                    params![name, category, project],
                )
                .map_err(|source| CoreError::Repository {
                    context: format!("update program {name}"),
                    source,
                })?;
            if changed == 0 {
                return Err(CoreError::ProgramNotFound(name.to_string()));
            }
            Ok(())
        })
    }

    fn get(&self, name: &str) -> Result<Option<TrackedProgram>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT name, category, project, lifetime_seconds FROM programs WHERE name = ?1",
                params![name],
                |row| {
                    Ok(TrackedProgram {
                        name: row.get(0)?,
                        category: row.get(1)?,
                        project: row.get(2)?,
                        lifetime_seconds: row.get(3)?,
                    })
                },
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                source => Err(CoreError::Repository {
                    context: format!("get program {name}"),
                    source,
                }),
            })
        })
    }

    fn list(&self) -> Result<Vec<TrackedProgram>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT name, category, project, lifetime_seconds FROM programs ORDER BY name",
                )
                .map_err(|source| CoreError::Repository {
                    context: "prepare list programs".to_string(),
                    source,
                })?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(TrackedProgram {
                        name: row.get(0)?,
                        category: row.get(1)?,
                        project: row.get(2)?,
                        lifetime_seconds: row.get(3)?,
                    })
                })
                .map_err(|source| CoreError::Repository {
                    context: "query list programs".to_string(),
                    source,
                })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|source| CoreError::Repository {
                    context: "read program rows".to_string(),
                    source,
                })
        })
    }

    fn list_names(&self) -> Result<Vec<String>> {
        Ok(self.list()?.into_iter().map(|row| row.name).collect())
    }

    fn reset_lifetime(&self, name: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE programs SET lifetime_seconds = 0 WHERE name = ?1",
                params![name],
            )
            .map_err(|source| CoreError::Repository {
                context: format!("reset lifetime for {name}"),
                source,
            })?;
            Ok(())
        })
    }

    fn reset_all_lifetimes(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("UPDATE programs SET lifetime_seconds = 0", [])
                .map_err(|source| CoreError::Repository {
                    context: "reset all lifetimes".to_string(),
                    source,
                })?;
            Ok(())
        })
    }

    fn add_lifetime(&self, name: &str, seconds: i64) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE programs SET lifetime_seconds = lifetime_seconds + ?2 WHERE name = ?1",
                params![name, seconds],
            )
            .map_err(|source| CoreError::Repository {
                context: format!("add lifetime for {name}"),
                source,
            })?;
            Ok(())
        })
    }
}

impl ActiveRepository for SqliteRepositories {
    fn create(&self, name: &str, start: DateTime<Utc>) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO active_sessions (name, start_time) VALUES (?1, ?2)",
                params![name, start.to_rfc3339()],
            )
            .map_err(|source| CoreError::Repository {
                context: format!("create active session for {name}"),
                source,
            })?;
            Ok(())
        })
    }

    fn get(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT start_time FROM active_sessions WHERE name = ?1",
                params![name],
                |row| row.get::<_, String>(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                source => Err(CoreError::Repository {
                    context: format!("get active session for {name}"),
                    source,
                }),
            })
        })?
        .map(|value| parse_timestamp(&value, "active_sessions.start_time"))
        .transpose()
    }

    fn list(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        let rows = self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT name, start_time FROM active_sessions ORDER BY name")
                .map_err(|source| CoreError::Repository {
                    context: "prepare list active sessions".to_string(),
                    source,
                })?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|source| CoreError::Repository {
                    context: "query active sessions".to_string(),
                    source,
                })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|source| CoreError::Repository {
                    context: "read active session rows".to_string(),
                    source,
                })
        })?;

        rows.into_iter()
            .map(|(name, start)| Ok((name.clone(), parse_timestamp(&start, "active_sessions.start_time")?)))
            .collect()
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM active_sessions WHERE name = ?1", params![name])
                .map_err(|source| CoreError::Repository {
                    context: format!("remove active session for {name}"),
                    source,
                })?;
            Ok(())
        })
    }

    fn remove_all(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM active_sessions", [])
                .map_err(|source| CoreError::Repository {
                    context: "remove all active sessions".to_string(),
                    source,
                })?;
            Ok(())
        })
    }
}

impl HistoryRepository for SqliteRepositories {
    fn append(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        duration_seconds: i64,
    ) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO session_history (name, start_time, end_time, duration_seconds) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, start.to_rfc3339(), end.to_rfc3339(), duration_seconds],
            )
            .map_err(|source| CoreError::Repository {
                context: format!("append history for {name}"),
                source,
            })?;
            Ok(())
        })
    }

    fn remove_for(&self, name: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM session_history WHERE name = ?1", params![name])
                .map_err(|source| CoreError::Repository {
                    context: format!("remove history for {name}"),
                    source,
                })?;
            Ok(())
        })
    }

    fn remove_all(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM session_history", [])
                .map_err(|source| CoreError::Repository {
                    context: "remove all history".to_string(),
                    source,
                })?;
            Ok(())
        })
    }

    fn count(&self, name: &str) -> Result<i64> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM session_history WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(|source| CoreError::Repository {
                context: format!("count history for {name}"),
                source,
            })
        })
    }

    fn last(&self, name: &str) -> Result<Option<SessionHistoryRow>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT id, name, start_time, end_time, duration_seconds FROM session_history \
                 WHERE name = ?1 ORDER BY end_time DESC LIMIT 1",
                params![name],
                |row| history_row_from(row),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                source => Err(CoreError::Repository {
                    context: format!("last history for {name}"),
                    source,
                }),
            })
        })
    }

    fn list(&self, name: &str, limit: i64) -> Result<Vec<SessionHistoryRow>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, start_time, end_time, duration_seconds FROM session_history \
                     WHERE name = ?1 ORDER BY start_time DESC LIMIT ?2",
                )
                .map_err(|source| CoreError::Repository {
                    context: "prepare list history".to_string(),
                    source,
                })?;
            let rows = stmt
                .query_map(params![name, limit], history_row_from)
                .map_err(|source| CoreError::Repository {
                    context: "query history".to_string(),
                    source,
                })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|source| CoreError::Repository {
                    context: "read history rows".to_string(),
                    source,
                })
        })
    }

    fn list_all(&self, limit: i64) -> Result<Vec<SessionHistoryRow>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, start_time, end_time, duration_seconds FROM session_history \
                     ORDER BY start_time DESC LIMIT ?1",
                )
                .map_err(|source| CoreError::Repository {
                    context: "prepare list_all history".to_string(),
                    source,
                })?;
            let rows = stmt
                .query_map(params![limit], history_row_from)
                .map_err(|source| CoreError::Repository {
                    context: "query list_all history".to_string(),
                    source,
                })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|source| CoreError::Repository {
                    context: "read list_all history rows".to_string(),
                    source,
                })
        })
    }

    fn list_for_date(&self, name: &str, day: NaiveDate) -> Result<Vec<SessionHistoryRow>> {
        let start_of_day = day.and_hms_opt(0, 0, 0).unwrap();
        let end_of_day = day.and_hms_opt(23, 59, 59).unwrap();
        self.list_in_range_raw(name, start_of_day, end_of_day)
    }

    fn list_in_range(&self, name: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<SessionHistoryRow>> {
        let start = from.and_hms_opt(0, 0, 0).unwrap();
        let end = to.and_hms_opt(23, 59, 59).unwrap();
        self.list_in_range_raw(name, start, end)
    }
}

impl SqliteRepositories {
    fn list_in_range_raw(
        &self,
        name: &str,
        start: chrono::NaiveDateTime,
        end: chrono::NaiveDateTime,
    ) -> Result<Vec<SessionHistoryRow>> {
        let start = Utc.from_utc_datetime(&start).to_rfc3339();
        let end = Utc.from_utc_datetime(&end).to_rfc3339();
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, start_time, end_time, duration_seconds FROM session_history \
                     WHERE name = ?1 AND start_time >= ?2 AND start_time <= ?3 \
                     ORDER BY start_time ASC",
                )
                .map_err(|source| CoreError::Repository {
                    context: "prepare date-range history".to_string(),
                    source,
                })?;
            let rows = stmt
                .query_map(params![name, start, end], history_row_from)
                .map_err(|source| CoreError::Repository {
                    context: "query date-range history".to_string(),
                    source,
                })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|source| CoreError::Repository {
                    context: "read date-range history rows".to_string(),
                    source,
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn repo() -> (tempfile::TempDir, SqliteRepositories) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apptime.db");
        let repo = SqliteRepositories::open(&path).unwrap();
        (dir, repo)
    }

    #[test]
    fn add_then_get_round_trips() {
        let (_dir, repo) = repo();
        ProgramRepository::add(&repo, "code", Some("editor"), None).unwrap();
        let program = ProgramRepository::get(&repo, "code").unwrap().unwrap();
        assert_eq!(program.category.as_deref(), Some("editor"));
        assert_eq!(program.lifetime_seconds, 0);
    }

    #[test]
    fn duplicate_active_session_is_a_constraint_violation() {
        let (_dir, repo) = repo();
        let now = Utc::now();
        ActiveRepository::create(&repo, "code", now).unwrap();
        let err = ActiveRepository::create(&repo, "code", now).unwrap_err();
        assert!(crate::error::is_unique_violation(&err));
    }

    #[test]
    fn add_lifetime_accumulates() {
        let (_dir, repo) = repo();
        ProgramRepository::add(&repo, "code", None, None).unwrap();
        ProgramRepository::add_lifetime(&repo, "code", 12).unwrap();
        ProgramRepository::add_lifetime(&repo, "code", 30).unwrap();
        let program = ProgramRepository::get(&repo, "code").unwrap().unwrap();
        assert_eq!(program.lifetime_seconds, 42);
    }

    #[test]
    fn history_last_and_count() {
        let (_dir, repo) = repo();
        let start = Utc::now() - Duration::seconds(60);
        let end = Utc::now();
        HistoryRepository::append(&repo, "code", start, end, 60).unwrap();
        assert_eq!(HistoryRepository::count(&repo, "code").unwrap(), 1);
        let last = HistoryRepository::last(&repo, "code").unwrap().unwrap();
        assert_eq!(last.duration_seconds, 60);
    }
}
