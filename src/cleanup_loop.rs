//! Background reclamation of idle keys.
//!
//! The loop runs on a dedicated OS thread and only holds a `Weak` reference to
//! the controller. It waits on a channel between sweeps, so a stop request or
//! dropping the controller (which drops the sender) wakes it immediately.

use std::{
    sync::{
        Arc, PoisonError,
        mpsc::{self, RecvTimeoutError, Sender},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::AdmissionController;

/// Shortest pause between two sweeps.
pub(crate) const MIN_CLEANUP_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a running cleanup thread.
pub(crate) struct CleanupLoop {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

pub(crate) fn effective_interval(interval: Duration) -> Duration {
    if interval < MIN_CLEANUP_INTERVAL {
        tracing::warn!(
            requested = ?interval,
            applied = ?MIN_CLEANUP_INTERVAL,
            "cleanup interval too short, clamping"
        );
        return MIN_CLEANUP_INTERVAL;
    }

    interval
}

impl AdmissionController {
    /// Start sweeping expired keys every window.
    ///
    /// See [`run_cleanup_loop_with_interval`](Self::run_cleanup_loop_with_interval).
    pub fn run_cleanup_loop(self: &Arc<Self>) {
        self.run_cleanup_loop_with_interval(*self.window());
    }

    /// Start a background thread calling [`sweep`](Self::sweep) with
    /// `Instant::now()` right away and then every `interval`.
    ///
    /// Intervals shorter than 1ms are raised to 1ms. Idempotent: if a loop is
    /// already running this is a no-op, and the running loop keeps its original
    /// interval.
    ///
    /// The loop samples the wall clock. Controllers driven with simulated
    /// timestamps should call `sweep` themselves instead.
    pub fn run_cleanup_loop_with_interval(self: &Arc<Self>, interval: Duration) {
        let mut guard = self
            .cleanup_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if guard.is_some() {
            return;
        }

        let interval = effective_interval(interval);
        let controller = Arc::downgrade(self);
        let (stop, stop_rx) = mpsc::channel::<()>();

        let spawned = thread::Builder::new()
            .name("windowgate-cleanup".to_string())
            .spawn(move || {
                loop {
                    let Some(controller) = controller.upgrade() else {
                        break;
                    };
                    controller.sweep(Instant::now());
                    drop(controller);

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                tracing::debug!("cleanup loop exited");
            });

        match spawned {
            Ok(thread) => {
                tracing::debug!(?interval, "cleanup loop started");
                *guard = Some(CleanupLoop { stop, thread });
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn cleanup loop thread");
            }
        }
    } // end method run_cleanup_loop_with_interval

    /// Stop the background loop, if any, and wait for its thread to exit.
    ///
    /// Idempotent. Returns once the thread has finished; at most one sweep that
    /// was already in progress completes first.
    pub fn stop_cleanup_loop(&self) {
        let running = self
            .cleanup_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(CleanupLoop { stop, thread }) = running else {
            return;
        };

        // The thread may already be gone if its controller upgrade failed.
        let _ = stop.send(());
        drop(stop);

        if thread.join().is_err() {
            tracing::warn!("cleanup loop thread panicked");
        }

        tracing::debug!("cleanup loop stopped");
    } // end method stop_cleanup_loop
}
