//! Signal handling for graceful shutdown.
//!
//! Centralized Ctrl+C handling built around an `AtomicBool` flag shared
//! across threads. The worker pool checks the flag before dispatching each
//! job, and the reporting loop checks it between matches, so an interrupt
//! drains the run cleanly: in-flight fingerprint work is cancelled, the
//! cache is saved with everything collected so far, and the process exits 0.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Shutdown handle wrapping the shared interrupt flag.
///
/// Cloning shares the underlying flag; the clone observes the same
/// interrupt state as the original.
#[derive(Debug, Clone)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a new handler with the flag initially unset.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Manually request a shutdown.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Get a clone of the flag for passing to worker components.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Reset the flag to `false`. Used when the process-wide handler is
    /// reused across invocations (tests).
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl Default for ShutdownHandler {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install a Ctrl+C handler that sets the shutdown flag on interrupt.
///
/// The ctrlc handler can only be registered once per process, so repeated
/// calls (and calls racing another registration, as happens when tests run
/// in parallel) return the already-installed handler or fall back to an
/// unhooked one that still supports [`ShutdownHandler::request_shutdown`].
pub fn install_handler() -> ShutdownHandler {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return handler.clone();
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    match ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Cleaning up...");
        let _ = std::io::stderr().flush();
    }) {
        Ok(()) => {
            let _ = GLOBAL_HANDLER.set(handler.clone());
            handler
        }
        Err(_) => {
            if let Some(existing) = GLOBAL_HANDLER.get() {
                existing.reset();
                existing.clone()
            } else {
                log::debug!("Ctrl+C handler already registered, using unhooked handler");
                let fallback = ShutdownHandler::new();
                let _ = GLOBAL_HANDLER.set(fallback.clone());
                fallback
            }
        }
    }
}
