//! The Process Observer: two interchangeable back-ends behind one
//! interface, `start(tracked_names) -> handle` / `stop(handle)`. Exactly
//! one back-end runs per host. [`poll`] is used on systems that expose
//! processes via enumeration (the common case `sysinfo` targets);
//! [`subscribe`] is the event-subscription alternative for platforms that
//! offer a native process creation/termination event source.

pub mod poll;
pub mod subscribe;

use std::thread::JoinHandle;

use crate::cancel::{CancelToken, TaskHandle};

/// A running observer instance. Stopping drops the token (cancelling the
/// background task) and joins its thread, so the caller knows the prior
/// generation has fully drained before starting a new one. Single-flight
/// discipline lives here: a caller must `stop` the previous handle before
/// calling `start` again, so two observers for the same tracked set never
/// run concurrently and corrupt a PID set's first/last transitions.
pub struct ObserverHandle(TaskHandle);

impl ObserverHandle {
    pub fn new(token: CancelToken, join: JoinHandle<()>) -> Self {
        Self(TaskHandle::new(token, join))
    }

    pub fn stop(self) {
        self.0.stop();
    }
}
