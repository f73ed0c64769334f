//! Signal handling: SIGTERM/SIGINT request shutdown, SIGHUP requests a config reload.
//!
//! Uses the `signal-hook` crate for safe signal registration. Handlers only flip
//! atomics; the daemon loop polls them, and the shutdown flag doubles as the
//! [`CancelToken`] handed to long-running work.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

use crate::core::cancel::CancelToken;

// ──────────────────── signal handler ────────────────────

/// Signal state shared between the OS handlers and the daemon loop.
#[derive(Clone)]
pub struct SignalHandler {
    shutdown: CancelToken,
    reload_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a handler and register OS signal hooks.
    ///
    /// Registration is best-effort; failures are logged to stderr but not fatal.
    pub fn new() -> Self {
        let handler = Self::unregistered();
        handler.register_signals();
        handler
    }

    /// A handler with no OS hooks, driven only by the `request_*` methods.
    pub fn unregistered() -> Self {
        Self {
            shutdown: CancelToken::new(),
            reload_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Check (and clear) whether a config reload has been requested.
    pub fn should_reload(&self) -> bool {
        self.reload_flag.swap(false, Ordering::Relaxed)
    }

    /// Token that fires on SIGTERM/SIGINT or [`request_shutdown`](Self::request_shutdown).
    pub fn shutdown_token(&self) -> CancelToken {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn request_reload(&self) {
        self.reload_flag.store(true, Ordering::Relaxed);
    }

    fn register_signals(&self) {
        // SIGTERM / SIGINT -> shutdown
        for (signal, name) in [(SIGTERM, "SIGTERM"), (SIGINT, "SIGINT")] {
            if let Err(e) = signal_hook::flag::register(signal, self.shutdown.flag()) {
                eprintln!("[HWL-SIGNAL] failed to register {name}: {e}");
            }
        }

        // SIGHUP -> reload (Unix only)
        #[cfg(unix)]
        {
            use signal_hook::consts::SIGHUP;
            if let Err(e) = signal_hook::flag::register(SIGHUP, Arc::clone(&self.reload_flag)) {
                eprintln!("[HWL-SIGNAL] failed to register SIGHUP: {e}");
            }
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_handler_requests_nothing() {
        let handler = SignalHandler::unregistered();
        assert!(!handler.should_shutdown());
        assert!(!handler.should_reload());
    }

    #[test]
    fn reload_flag_clears_on_read() {
        let handler = SignalHandler::unregistered();
        handler.request_reload();
        assert!(handler.should_reload());
        assert!(!handler.should_reload());
    }

    #[test]
    fn shutdown_request_fires_the_token() {
        let handler = SignalHandler::unregistered();
        let token = handler.shutdown_token();
        let clone = handler.clone();

        clone.request_shutdown();
        assert!(handler.should_shutdown());
        assert!(token.is_cancelled());
        assert!(token.wait_timeout(Duration::from_secs(1)));
    }

    #[test]
    fn raw_flag_store_is_seen_as_shutdown() {
        let handler = SignalHandler::unregistered();
        handler.shutdown_token().flag().store(true, Ordering::SeqCst);
        assert!(handler.should_shutdown());
    }
}
