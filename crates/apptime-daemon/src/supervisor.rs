//! The Lifecycle Supervisor: owns the root cancellation token plus one
//! child each for the current Observer and Heartbeat Scheduler, and
//! serializes Start/Refresh/Pause/Resume/Shutdown so at most one
//! transition runs at a time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{error, info, warn};

use apptime_core::{ActiveRepository, Config, Coordinator, ProgramRepository, Registry, Repositories};

use crate::cancel::CancelToken;
use crate::heartbeat;
use crate::observer::poll::{self, CoreHandles};
use crate::observer::ObserverHandle;

pub struct Supervisor {
    root_token: CancelToken,
    registry: Arc<Registry>,
    repos: Arc<Repositories>,
    config: Mutex<Config>,
    observer: Mutex<Option<ObserverHandle>>,
    scheduler: Mutex<Option<heartbeat::SchedulerHandle>>,
    transition: Mutex<()>,
    reap_orphans_on_start: bool,
}

impl Supervisor {
    pub fn new(config: Config, repos: Repositories, reap_orphans_on_start: bool) -> Self {
        Self {
            root_token: CancelToken::new(),
            registry: Arc::new(Registry::new()),
            repos: Arc::new(repos),
            config: Mutex::new(config),
            observer: Mutex::new(None),
            scheduler: Mutex::new(None),
            transition: Mutex::new(()),
            reap_orphans_on_start,
        }
    }

    fn coordinator(&self) -> Coordinator<'_> {
        Coordinator::new(&self.registry, &self.repos)
    }

    pub fn coordinator_create_session(&self, name: &str, pid: u32) {
        self.coordinator().create_session(name, pid, chrono::Utc::now());
    }

    pub fn coordinator_end_session(&self, name: &str, pid: u32) {
        self.coordinator().end_session(name, pid, chrono::Utc::now());
    }

    /// Loads the tracked set and configuration, populates the Registry,
    /// and starts the Observer (if any programs are tracked) and the
    /// Heartbeat Scheduler (if enabled).
    pub fn start(&self) {
        let _guard = self.transition.lock().expect("supervisor transition mutex poisoned");
        self.load_tracked_set();
        if self.reap_orphans_on_start {
            self.reap_orphans_locked();
        }
        self.start_observer_locked();
        self.start_scheduler_locked();
        info!("supervisor start transition complete");
    }

    /// Closes `ActiveSession` rows left behind by a prior crash: at Start
    /// the Registry has no live PIDs yet (they're rediscovered by the
    /// first observer tick), so any row here has no process behind it.
    /// Only runs when `--reap-orphans-on-start` is set; the spec leaves
    /// the default behavior (adopt on PID rediscovery, never reap) as the
    /// source's intent is ambiguous. See spec.md §9.
    fn reap_orphans_locked(&self) {
        let rows = match self.repos.active.list() {
            Ok(rows) => rows,
            Err(err) => {
                error!(error = %err, "failed to list active sessions for orphan reap");
                return;
            }
        };

        for (name, _start) in rows {
            if self.registry.is_open(&name) {
                continue;
            }
            warn!(program = %name, "reaping orphaned active session from a prior crash");
            self.coordinator().archive(&name, chrono::Utc::now());
        }
    }

    /// Reloads configuration and the tracked set, stopping and restarting
    /// the Observer and Scheduler against the new state. Idempotent and
    /// serialized with itself via `transition`.
    pub fn refresh(&self) {
        let _guard = self.transition.lock().expect("supervisor transition mutex poisoned");
        info!("refresh: stopping scheduler and observer");
        self.stop_scheduler_locked();
        self.stop_observer_locked();

        let previous_names: std::collections::HashSet<String> =
            self.registry.snapshot_keys().into_iter().collect();

        self.load_tracked_set();

        let current_names: std::collections::HashSet<String> =
            match self.repos.programs.list_names() {
                Ok(names) => names.into_iter().map(|name| apptime_core::fold_name(&name)).collect(),
                Err(err) => {
                    error!(error = %err, "refresh: failed to reload tracked set");
                    std::collections::HashSet::new()
                }
            };

        for dropped in previous_names.difference(&current_names) {
            // Removal doesn't archive automatically: the contract is that
            // the CLI already closed the active session row before it
            // asked for this refresh.
            self.registry.remove(dropped);
        }

        self.start_observer_locked();
        self.start_scheduler_locked();
        info!("refresh transition complete");
    }

    /// Stops the Observer and Scheduler but leaves the Registry untouched,
    /// so Resume can continue any sessions that were already open.
    pub fn pause(&self) {
        let _guard = self.transition.lock().expect("supervisor transition mutex poisoned");
        info!("pausing observer and scheduler");
        self.stop_scheduler_locked();
        self.stop_observer_locked();
    }

    /// Equivalent to refresh: reload configuration and restart both
    /// background tasks against the current Registry state.
    pub fn resume(&self) {
        self.refresh();
    }

    /// Cancels everything, archives every program the Registry still
    /// believes has live PIDs, and returns once the flush is durable.
    pub fn shutdown(&self) {
        let _guard = self.transition.lock().expect("supervisor transition mutex poisoned");
        info!("shutdown: stopping observer and scheduler");
        self.root_token.cancel();
        self.stop_scheduler_locked();
        self.stop_observer_locked();

        info!("shutdown: flushing open sessions");
        self.coordinator().flush_open_sessions(chrono::Utc::now());
    }

    pub fn root_token(&self) -> CancelToken {
        self.root_token.clone()
    }

    fn load_tracked_set(&self) {
        match apptime_core::config::load() {
            Ok(config) => {
                *self.config.lock().expect("supervisor config mutex poisoned") = config;
            }
            Err(err) => {
                error!(error = %err, "failed to load configuration, keeping previous");
            }
        }

        let programs = match self.repos.programs.list() {
            Ok(programs) => programs,
            Err(err) => {
                error!(error = %err, "failed to load tracked programs");
                return;
            }
        };

        for program in programs {
            self.registry.ensure(&program.name, program.category, program.project);
        }
    }

    fn start_observer_locked(&self) {
        let names = self.registry.snapshot_keys();
        if names.is_empty() {
            info!("no tracked programs, not starting observer");
            return;
        }

        let config = self.config.lock().expect("supervisor config mutex poisoned").clone();
        let core = Arc::new(CoreHandles {
            registry: self.registry.clone(),
            repos: self.repos.clone(),
        });

        let handle = poll::start(names, config.poll_interval(), config.grace_window(), core);
        *self.observer.lock().expect("supervisor observer mutex poisoned") = Some(handle);
        info!("observer started");
    }

    fn stop_observer_locked(&self) {
        if let Some(handle) = self.observer.lock().expect("supervisor observer mutex poisoned").take() {
            handle.stop();
            info!("observer stopped");
        }
    }

    fn start_scheduler_locked(&self) {
        let config = self.config.lock().expect("supervisor config mutex poisoned").clone();
        if !config.heartbeats_enabled() {
            return;
        }

        let handle = heartbeat::start(config, self.registry.clone());
        *self.scheduler.lock().expect("supervisor scheduler mutex poisoned") = Some(handle);
        info!("heartbeat scheduler started");
    }

    fn stop_scheduler_locked(&self) {
        if let Some(handle) = self.scheduler.lock().expect("supervisor scheduler mutex poisoned").take() {
            handle.stop();
            info!("heartbeat scheduler stopped");
        }
    }
}

/// How long `shutdown` waits for background tasks to notice cancellation
/// before giving up on a clean join. Not currently used to bound `stop`
/// directly (the token wakes waiters immediately), kept as the default
/// poll tick fallback for components that can't subscribe to the token.
#[allow(dead_code)]
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
