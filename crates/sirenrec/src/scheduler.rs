//! Rotation scheduler.
//!
//! Drives segment rotation on a fixed period while a session records. The
//! scheduler only decides *when*; what a rotation does is the tick closure
//! handed to [`RotationScheduler::spawn`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Fires a tick closure every `period` until cancelled.
#[derive(Debug, Clone, Copy)]
pub struct RotationScheduler {
    period: Duration,
}

impl RotationScheduler {
    /// Create a scheduler with the given period.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// The tick period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start ticking on a background task.
    ///
    /// The first tick fires one full period after this call. A slow tick
    /// delays the following ones instead of bunching them up.
    pub fn spawn<F, Fut>(&self, tick: F) -> RotationHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let wake = Arc::new(Notify::new());
        let period = self.period;

        let task = tokio::spawn({
            let running = Arc::clone(&running);
            let wake = Arc::clone(&wake);
            async move {
                debug!(period_ms = period.as_millis(), "Rotation scheduler started");

                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;
                        () = wake.notified() => break,
                        _ = ticker.tick() => {}
                    }
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    tick().await;
                }

                debug!("Rotation scheduler stopped");
            }
        });

        RotationHandle {
            running,
            wake,
            task: Some(task),
        }
    }
}

/// Controls a running scheduler. Dropping the handle cancels it.
#[derive(Debug)]
pub struct RotationHandle {
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl RotationHandle {
    /// Request cancellation without waiting.
    ///
    /// No new tick starts after this returns. A tick already running is
    /// left to finish.
    pub fn cancel(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.wake.notify_one();
        }
    }

    /// Check if cancellation has not been requested yet.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Cancel and wait for the background task to exit.
    pub async fn join(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Rotation scheduler task failed");
            }
        }
    }
}

impl Drop for RotationHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
