//! A small cancellation token, standing in for `tokio_util::CancellationToken`
//! in a runtime with no async executor. Cancelling a token cancels every
//! child derived from it, transitively. Children are never mutated in
//! place, only replaced on refresh, so a stale handler from a prior
//! generation can't resurrect work it no longer owns: it simply holds a
//! token that was dropped from the tree and will never be cancelled by
//! the new one, but also never controls anything live.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: Mutex<bool>,
    signal: Condvar,
    children: Mutex<Vec<Arc<Inner>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: Mutex::new(false),
                signal: Condvar::new(),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Derives a child token. If `self` is already cancelled, the child is
    /// born cancelled too.
    pub fn child(&self) -> Self {
        let child = Self::new();
        let already_cancelled = *self.inner.cancelled.lock().expect("cancel token mutex poisoned");
        if already_cancelled {
            child.cancel();
        } else {
            self.inner
                .children
                .lock()
                .expect("cancel token mutex poisoned")
                .push(child.inner.clone());
        }
        child
    }

    pub fn cancel(&self) {
        let children = {
            let mut cancelled = self.inner.cancelled.lock().expect("cancel token mutex poisoned");
            *cancelled = true;
            self.inner.signal.notify_all();
            std::mem::take(&mut *self.inner.children.lock().expect("cancel token mutex poisoned"))
        };
        for child in children {
            Self { inner: child }.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock().expect("cancel token mutex poisoned")
    }

    /// Blocks until cancelled or `timeout` elapses, whichever comes first.
    /// Returns `true` if cancellation was observed. Used by the polling
    /// back-end and the heartbeat ticker so a suspension point is always
    /// bounded by the token instead of a raw `thread::sleep`.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let cancelled = self.inner.cancelled.lock().expect("cancel token mutex poisoned");
        if *cancelled {
            return true;
        }
        let (guard, _) = self
            .inner
            .signal
            .wait_timeout(cancelled, timeout)
            .expect("cancel token mutex poisoned");
        *guard
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A background task paired with the token that cancels it. Shared shape
/// for the Observer and the Heartbeat Scheduler: both are "start a thread,
/// hand back something that stops it and waits for it to drain."
pub struct TaskHandle {
    token: CancelToken,
    join: Option<std::thread::JoinHandle<()>>,
}

impl TaskHandle {
    pub fn new(token: CancelToken, join: std::thread::JoinHandle<()>) -> Self {
        Self {
            token,
            join: Some(join),
        }
    }

    /// Cancels the task and blocks until its thread exits. Callers rely on
    /// this to enforce single-flight discipline: stop the previous handle
    /// fully before starting a new one.
    pub fn stop(mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wait_timeout_returns_false_when_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn cancel_wakes_a_waiting_thread_immediately() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(10));
        token.cancel();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn is_cancelled_reflects_state_after_cancel() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancelling_parent_cancels_child() {
        let parent = CancelToken::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn child_born_after_parent_cancelled_is_already_cancelled() {
        let parent = CancelToken::new();
        parent.cancel();
        let child = parent.child();
        assert!(child.is_cancelled());
    }
}
