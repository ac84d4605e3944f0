//! # apptime-core
//!
//! Shared session-lifecycle engine for apptime: the Tracking Registry, the
//! Session Coordinator, configuration loading, and the repository traits
//! both the daemon and CLI build on.
//!
//! Synchronous, no async runtime. Clients provide their own threading.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod registry;
pub mod repository;
pub mod types;

pub use config::Config;
pub use coordinator::Coordinator;
pub use error::{CoreError, Result};
pub use registry::{InsertOutcome, RemoveOutcome, Registry};
pub use repository::{ActiveRepository, HistoryRepository, ProgramRepository, Repositories};
pub use types::{fold_name, ActiveSessionRow, Heartbeat, SessionHistoryRow, Tracked, TrackedProgram};
