//! Generic background task scheduler.
//!
//! Each named task runs once after its delay and then, if an interval is
//! given, repeats on that interval indefinitely. Invocations of the same
//! task id never overlap: every id runs on its own sequential loop, and a
//! tick that fires while the prior run is still executing is dropped, not
//! queued. Task errors are logged and never cancel future recurrences or
//! other tasks. `stop()` halts future ticks but lets an in-flight run
//! finish to completion.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

struct TaskSpec {
    id: String,
    delay: Duration,
    interval: Option<Duration>,
    run: TaskFn,
}

/// Single-process scheduler for named background tasks.
pub struct TaskScheduler {
    cancel: CancellationToken,
    pending: Vec<TaskSpec>,
    handles: Vec<JoinHandle<()>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            pending: Vec::new(),
            handles: Vec::new(),
        }
    }

    /// Register a task. With `interval: None` the task runs exactly once
    /// after `delay`; otherwise it re-runs every `interval` thereafter.
    pub fn schedule<F, Fut>(&mut self, id: &str, delay: Duration, interval: Option<Duration>, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let run: TaskFn = Arc::new(move || Box::pin(f()));
        self.pending.push(TaskSpec {
            id: id.to_string(),
            delay,
            interval,
            run,
        });
    }

    /// Begin dispatching all registered tasks.
    pub fn start(&mut self) {
        for spec in self.pending.drain(..) {
            let cancel = self.cancel.clone();
            debug!(
                "Scheduling task '{}' (delay {:?}, interval {:?})",
                spec.id, spec.delay, spec.interval
            );
            self.handles.push(tokio::spawn(run_task(spec, cancel)));
        }
    }

    /// Prevent any future invocation from starting and wait for in-flight
    /// runs to finish.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!("Task join error: {e}");
            }
        }
        info!("Scheduler stopped");
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_task(spec: TaskSpec, cancel: CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(spec.delay) => {}
        _ = cancel.cancelled() => return,
    }

    let Some(period) = spec.interval else {
        run_once(&spec).await;
        return;
    };

    let mut ticker = interval_at(Instant::now(), period);
    // A tick that fires mid-run is dropped rather than queued
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => {
                debug!("Task '{}' shut down", spec.id);
                return;
            }
        }

        let started = Instant::now();
        run_once(&spec).await;
        if started.elapsed() > period {
            warn!(
                "Task '{}' overran its {:?} interval; skipping missed ticks",
                spec.id, period
            );
        }
    }
}

async fn run_once(spec: &TaskSpec) {
    if let Err(e) = (spec.run)().await {
        error!("Task '{}' failed: {e:#}", spec.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn one_shot_runs_exactly_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();

        let mut scheduler = TaskScheduler::new();
        scheduler.schedule("once", Duration::from_secs(5), None, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_repeats_until_stopped() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();

        let mut scheduler = TaskScheduler::new();
        scheduler.schedule(
            "tick",
            Duration::ZERO,
            Some(Duration::from_secs(10)),
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        );
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 4); // t = 0, 10, 20, 30

        scheduler.stop().await;
        let frozen = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(counter.load(Ordering::SeqCst), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_task_keeps_recurring() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();

        let mut scheduler = TaskScheduler::new();
        scheduler.schedule(
            "flaky",
            Duration::ZERO,
            Some(Duration::from_secs(10)),
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("boom")
                }
            },
        );
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_ticks_are_skipped_not_queued() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();

        let mut scheduler = TaskScheduler::new();
        scheduler.schedule(
            "slow",
            Duration::ZERO,
            Some(Duration::from_secs(10)),
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    // Runs longer than the interval
                    tokio::time::sleep(Duration::from_secs(15)).await;
                    Ok(())
                }
            },
        );
        scheduler.start();

        // Starts at t = 0, 20, 40; the t = 10 and t = 30 ticks are dropped
        tokio::time::sleep(Duration::from_secs(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn independent_tasks_run_independently() {
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let (ca, cb) = (a.clone(), b.clone());

        let mut scheduler = TaskScheduler::new();
        scheduler.schedule("a", Duration::ZERO, Some(Duration::from_secs(5)), move || {
            let c = ca.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("a always fails")
            }
        });
        scheduler.schedule("b", Duration::ZERO, Some(Duration::from_secs(5)), move || {
            let c = cb.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(a.load(Ordering::SeqCst), 3);
        assert_eq!(b.load(Ordering::SeqCst), 3);
    }
}
