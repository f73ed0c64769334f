//! Cooperative cancellation shared by the dispatch loop, the scheduler thread,
//! and signal handlers.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Upper bound on how long a waiter sleeps before re-reading the flag.
///
/// Signal handlers can only flip the atomic, they cannot notify the condvar,
/// so waits are sliced to keep signal-driven cancellation responsive.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Cloneable cancellation token: an atomic flag plus a condvar for prompt wakeups.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    flag: Arc<AtomicBool>,
    lock: Mutex<()>,
    wake: Condvar,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::from_flag(Arc::new(AtomicBool::new(false)))
    }

    /// Wrap an existing flag, e.g. one registered with `signal_hook::flag`.
    #[must_use]
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self {
            inner: Arc::new(Inner {
                flag,
                lock: Mutex::new(()),
                wake: Condvar::new(),
            }),
        }
    }

    /// The underlying flag, for registration with signal handlers.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.inner.flag)
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        let _guard = self.inner.lock.lock();
        self.inner.wake.notify_all();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Block for up to `timeout`. Returns `true` if cancelled before it elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let slice = (deadline - now).min(POLL_SLICE);
            let mut guard = self.inner.lock.lock();
            if self.is_cancelled() {
                return true;
            }
            let _ = self.inner.wake.wait_for(&mut guard, slice);
        }
    }
}
