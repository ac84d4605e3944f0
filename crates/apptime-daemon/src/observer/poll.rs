//! The polling back-end: a ticker that enumerates all processes each
//! interval, derives an identity per process, and feeds transitions to the
//! Session Coordinator. Grace-windowed liveness absorbs single-tick PID
//! misses from short-lived processes or enumeration races.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use sysinfo::{ProcessRefreshKind, System};
use tracing::debug;

use apptime_core::Coordinator;

use crate::cancel::CancelToken;
use crate::identity;

use super::ObserverHandle;

/// Starts the polling loop on its own thread. `tracked_names` must already
/// be case-folded; the loop only matches against this fixed set for its
/// lifetime — a changed tracked set means a new observer via refresh.
pub fn start(
    tracked_names: Vec<String>,
    poll_interval: Duration,
    grace_window: Duration,
    core: Arc<CoreHandles>,
) -> ObserverHandle {
    let token = CancelToken::new();
    let loop_token = token.clone();

    let join = thread::spawn(move || {
        run(tracked_names, poll_interval, grace_window, core, loop_token)
    });

    ObserverHandle::new(token, join)
}

/// The pieces of the daemon the observer needs to drive the Coordinator
/// and read the Registry's liveness bookkeeping. Bundled so `start` takes
/// one `Arc` instead of three.
pub struct CoreHandles {
    pub registry: Arc<apptime_core::Registry>,
    pub repos: Arc<apptime_core::Repositories>,
}

fn run(
    tracked_names: Vec<String>,
    poll_interval: Duration,
    grace_window: Duration,
    core: Arc<CoreHandles>,
    token: CancelToken,
) {
    let tracked: std::collections::HashSet<String> = tracked_names.into_iter().collect();
    let mut sys = System::new();
    let coordinator = Coordinator::new(&core.registry, &core.repos);

    loop {
        if token.is_cancelled() {
            break;
        }

        sys.refresh_processes_specifics(ProcessRefreshKind::everything());
        let now = Utc::now();

        let mut seen: HashMap<(String, u32), ()> = HashMap::new();

        for (pid, _process) in sys.processes() {
            let pid_u32 = pid.as_u32();
            let Some(name) = identity::resolve(&sys, *pid) else {
                continue;
            };
            if !tracked.contains(&name) {
                continue;
            }
            seen.insert((name.clone(), pid_u32), ());
            core.registry.touch_last_seen(&name, now);
            coordinator.create_session(&name, pid_u32, now);
        }

        for (name, pid, last_seen) in core.registry.iter_for_observer() {
            if seen.contains_key(&(name.clone(), pid)) {
                continue;
            }
            let elapsed = now.signed_duration_since(last_seen);
            let elapsed = elapsed.to_std().unwrap_or(Duration::ZERO);
            if elapsed >= grace_window {
                debug!(program = %name, pid, ?elapsed, "grace window elapsed, ending session");
                coordinator.end_session(&name, pid, now);
            }
        }

        if token.wait_timeout(poll_interval) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apptime_core::repository::memory::MemoryRepositories;
    use apptime_core::{ActiveRepository, Registry, Repositories};

    fn handles() -> Arc<CoreHandles> {
        let shared = Arc::new(MemoryRepositories::new());
        Arc::new(CoreHandles {
            registry: Arc::new(Registry::new()),
            repos: Arc::new(Repositories {
                programs: Box::new(shared.clone()),
                active: Box::new(shared.clone()),
                history: Box::new(shared.clone()),
            }),
        })
    }

    #[test]
    fn grace_window_does_not_fire_before_elapsed() {
        let core = handles();
        core.registry.insert_pid("selftest-ghost", 999_999, Utc::now());
        core.repos.active.create("selftest-ghost", Utc::now()).unwrap();

        let now = Utc::now();
        core.registry.touch_last_seen("selftest-ghost", now);

        assert!(core.registry.is_open("selftest-ghost"));
    }
}
