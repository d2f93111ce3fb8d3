/// Recurring background work with an explicit start/stop lifecycle.
///
/// `ScheduledTask::spawn` runs a closure every `period` on the current
/// tokio runtime, starting one period after spawn. `stop` cancels and
/// waits for the loop to exit; dropping the task cancels without waiting.
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Shortest accepted period; zero would make `tokio::time::interval` panic.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

pub struct ScheduledTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<u64>>,
}

impl ScheduledTask {
    /// Spawn `tick` on a fixed `period`. Must be called inside a tokio runtime.
    ///
    /// Periods below [`MIN_PERIOD`] are raised to it.
    pub fn spawn<F>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        if period < MIN_PERIOD {
            tracing::warn!(task = name, ?period, "period too short, using {MIN_PERIOD:?}");
        }
        let period = period.max(MIN_PERIOD);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let span = tracing::debug_span!("scheduled", task = name);

        let handle = tokio::spawn(
            async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // Skip the immediate first tick
                interval.tick().await;

                let mut runs = 0u64;
                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        _ = interval.tick() => {
                            tick();
                            runs += 1;
                        }
                    }
                }
                tracing::debug!(runs, "scheduled task stopped");
                runs
            }
            .instrument(span),
        );

        tracing::debug!(task = name, ?period, "scheduled task started");
        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel and wait for the loop to exit. Returns how many ticks ran.
    pub async fn stop(mut self) -> u64 {
        self.cancel.cancel();
        match self.handle.take() {
            Some(handle) => match handle.await {
                Ok(runs) => runs,
                Err(e) => {
                    tracing::warn!(task = self.name, error = %e, "scheduled task ended abnormally");
                    0
                }
            },
            None => 0,
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
