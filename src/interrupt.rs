//! Ctrl-C handling: cancels an in-flight completion instead of killing the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
#[cfg(unix)]
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

/// Exit status used when Ctrl-C arrives with nothing to cancel.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Shared flags between the signal thread and the session.
///
/// `cancel` is handed to the backend; it is raised by Ctrl-C only while a
/// request is in flight.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    cancel: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
}

impl Interrupt {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag the backend polls while requesting and streaming.
    #[must_use]
    pub fn cancellation(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Marks a request as in flight until the guard drops.
    #[must_use]
    pub fn begin_request(&self) -> RequestGuard {
        self.cancel.store(false, Ordering::SeqCst);
        self.busy.store(true, Ordering::SeqCst);
        RequestGuard {
            busy: Arc::clone(&self.busy),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// What a Ctrl-C does right now: `true` when it cancelled a request.
    pub fn trigger(&self) -> bool {
        if self.is_busy() {
            self.cancel.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Starts the SIGINT thread. Dropping the guard unregisters it.
    #[cfg(unix)]
    pub fn install(&self) -> std::io::Result<SignalGuard> {
        use signal_hook::consts::SIGINT;
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT])?;
        let handle = signals.handle();
        let interrupt = self.clone();
        let thread = thread::spawn(move || {
            for _ in signals.forever() {
                if interrupt.trigger() {
                    info!("interrupt received; cancelling the request");
                } else {
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            }
        });
        Ok(SignalGuard {
            handle,
            thread: Some(thread),
        })
    }

    #[cfg(not(unix))]
    pub fn install(&self) -> std::io::Result<SignalGuard> {
        warn!("Ctrl-C cancellation is not supported on this platform");
        Ok(SignalGuard {})
    }
}

/// Clears the in-flight mark on drop.
#[derive(Debug)]
pub struct RequestGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// Keeps the SIGINT handler registered.
#[cfg(unix)]
pub struct SignalGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<JoinHandle<()>>,
}

#[cfg(unix)]
impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("signal thread panicked");
            }
        }
    }
}

#[cfg(not(unix))]
pub struct SignalGuard {}
