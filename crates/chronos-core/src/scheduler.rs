//! Daemon-thread timers for the background subsystems (expiry sweep, TTL
//! rewrite, snapshot write, health scoring).
//!
//! Each [`Scheduler`] owns one OS thread woken on a fixed interval via
//! [`crossbeam_channel::tick`]. `stop()` sends a shutdown signal and waits
//! up to a grace period for the thread to drain its in-flight tick before
//! giving up, mirroring the "daemon thread with a shared stop token"
//! pattern the design calls for in place of the source's per-scheduler
//! daemon threads.

use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Grace period `stop()` waits for the worker thread to finish its
/// current tick before returning regardless.
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// A named background timer running `task` on every tick of `interval`
/// until stopped.
pub struct Scheduler {
    name: &'static str,
    stop_tx: crossbeam_channel::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns the timer thread immediately.
    pub fn spawn<F>(name: &'static str, interval: Duration, mut task: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let ticks = crossbeam_channel::tick(interval);
                loop {
                    crossbeam_channel::select! {
                        recv(ticks) -> _ => task(),
                        recv(stop_rx) -> _ => break,
                    }
                }
            })
            .expect("failed to spawn scheduler thread");

        Self {
            name,
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signals the timer to stop and waits up to [`STOP_GRACE_PERIOD`] for
    /// it to drain its in-flight tick. Consumes the scheduler: calling
    /// `stop()` twice is not possible by construction.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        let Some(handle) = self.handle.take() else {
            return;
        };
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        let name = self.name;
        thread::spawn(move || {
            let _ = handle.join();
            let _ = done_tx.send(());
        });
        if done_rx.recv_timeout(STOP_GRACE_PERIOD).is_err() {
            tracing::warn!(scheduler = name, "did not stop within grace period, abandoning");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Best-effort: a scheduler dropped without an explicit stop() call
        // (e.g. panic unwind) still signals its thread to exit rather than
        // leaking a daemon thread past the owning Cache's lifetime.
        let _ = self.stop_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fires_on_interval_until_stopped() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let scheduler = Scheduler::spawn("test-ticker", Duration::from_millis(10), move || {
            counter_clone.fetch_add(1, Ordering::Relaxed);
        });
        thread::sleep(Duration::from_millis(65));
        scheduler.stop();
        let fired = counter.load(Ordering::Relaxed);
        assert!(fired >= 3, "expected several ticks, got {fired}");
    }

    #[test]
    fn stop_returns_promptly_after_task_completes() {
        let scheduler = Scheduler::spawn("instant", Duration::from_millis(5), || {});
        thread::sleep(Duration::from_millis(20));
        let start = std::time::Instant::now();
        scheduler.stop();
        assert!(start.elapsed() < STOP_GRACE_PERIOD);
    }
}
