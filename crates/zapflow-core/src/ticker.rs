//! Cancellable periodic task
//!
//! One abstraction for every recurring job in the process, instead of
//! ad hoc timers scattered per component.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle to a running periodic task
pub struct Ticker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Spawn a task that runs `work` every `period` until cancelled.
    /// The first run happens after one full period.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut work: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // Consume the immediate first tick
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!(task = name, "Periodic task cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        work().await;
                    }
                }
            }
        });

        Self { token, handle }
    }

    /// Cancel the task and wait for it to finish
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }

    /// Cancellation token for cooperative shutdown of related work
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ticker_runs_and_cancels() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        let ticker = Ticker::spawn("test", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        ticker.shutdown().await;

        let runs = count.load(Ordering::SeqCst);
        assert!(runs >= 3, "expected at least 3 runs, got {}", runs);
    }
}
