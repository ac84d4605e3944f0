//! Data model shared by the Registry, Coordinator, and repositories.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user-configured application identity, persisted.
///
/// `name` is always stored case-folded: every entry point that accepts
/// a name folds it before it reaches this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedProgram {
    pub name: String,
    pub category: Option<String>,
    pub project: Option<String>,
    pub lifetime_seconds: i64,
}

/// At most one row exists per program name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSessionRow {
    pub name: String,
    pub start: DateTime<Utc>,
}

/// Append-only archived session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHistoryRow {
    pub id: i64,
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_seconds: i64,
}

/// In-memory Registry entry. Lifetime matches the `TrackedProgram` row's,
/// but the entry may be momentarily absent between daemon start and the
/// first refresh (the Registry materializes it lazily).
#[derive(Debug, Clone)]
pub struct Tracked {
    pub category: Option<String>,
    pub project: Option<String>,
    pub pids: HashSet<u32>,
    pub start_at: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
}

impl Tracked {
    pub fn new(category: Option<String>, project: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            category,
            project,
            pids: HashSet::new(),
            start_at: None,
            last_seen: now,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.pids.is_empty()
    }
}

/// Lower-cases a tracked-program name the way every entry point into the
/// Registry and Coordinator must before touching shared state.
pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

/// A single activity heartbeat, dispatched by the Heartbeat Scheduler to
/// whichever outbound destinations configuration enables.
#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub entity: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub category: String,
    pub project: String,
    pub timestamp: i64,
}

impl Heartbeat {
    pub fn new(entity: String, category: String, project: String, timestamp: i64) -> Self {
        Self {
            entity,
            kind: "app",
            category,
            project,
            timestamp,
        }
    }
}
