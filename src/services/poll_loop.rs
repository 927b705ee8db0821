// src/services/poll_loop.rs
//! Timer bookkeeping shared by the tracking and notification pollers.
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::errors::{SparrowError as AppError, SparrowResult};

/// A running poll loop. Dropping the handle does not stop the loop; call `stop`.
#[derive(Debug)]
pub(crate) struct PollHandle {
    pub poller_id: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Cancels the timer and any in-flight request, returning the task to await.
    pub fn stop(self) -> JoinHandle<()> {
        self.cancel.cancel();
        self.task
    }
}

/// Counts live poll loops. A loop is counted from spawn until its task exits.
#[derive(Debug, Clone, Default)]
pub(crate) struct LoopCounter(Arc<AtomicUsize>);

impl LoopCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn enter(&self) -> LoopGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        LoopGuard(self.0.clone())
    }
}

struct LoopGuard(Arc<AtomicUsize>);

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// When the first tick fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FirstTick {
    Immediate,
    AfterPeriod,
}

/// Spawns a loop that calls `tick` once per `period` until cancelled.
///
/// Each tick receives the loop's token so it can race its own I/O against
/// cancellation. Ticks never overlap: the next one waits for the previous to finish.
pub(crate) fn spawn_poll_loop<F, Fut>(
    poller_id: String,
    period: Duration,
    first_tick: FirstTick,
    counter: &LoopCounter,
    mut tick: F,
) -> PollHandle
where
    F: FnMut(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let guard = counter.enter();
    let loop_cancel = cancel.clone();
    let loop_id = poller_id.clone();

    let task = tokio::spawn(async move {
        let _guard = guard;
        let start = match first_tick {
            FirstTick::Immediate => Instant::now(),
            FirstTick::AfterPeriod => Instant::now() + period,
        };
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = loop_cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            tracing::debug!(poller_id = %loop_id, "Poll tick");
            tick(loop_cancel.clone()).await;

            if loop_cancel.is_cancelled() {
                break;
            }
        }

        tracing::debug!(poller_id = %loop_id, "Poll loop stopped");
    });

    PollHandle {
        poller_id,
        cancel,
        task,
    }
}

/// Runs `fut` unless `cancel` fires first.
pub(crate) async fn until_cancelled<T, Fut>(cancel: &CancellationToken, fut: Fut) -> SparrowResult<T>
where
    Fut: Future<Output = SparrowResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        result = fut => result,
    }
}

pub(crate) fn validate_period(period: Duration, what: &str) -> SparrowResult<Duration> {
    if period.is_zero() {
        return Err(AppError::invalid_config(format!("{} must be greater than zero", what)));
    }
    Ok(period)
}
