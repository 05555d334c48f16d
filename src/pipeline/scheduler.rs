use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Work run on a fixed interval by the [`Scheduler`].
///
/// A tick always runs to completion; cancellation is only observed between
/// ticks (and by ticks that choose to check the token themselves).
#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn tick(&self, cancel: &CancellationToken);

    /// Runs once after every task's loop has stopped, so it can rely on
    /// no other tick still being in flight.
    async fn shutdown(&self) {}
}

struct Registered {
    task: Arc<dyn PeriodicTask>,
    handle: JoinHandle<()>,
}

/// Runs named periodic tasks until the shared token is cancelled.
pub struct Scheduler {
    cancel: CancellationToken,
    tasks: Vec<Registered>,
}

impl Scheduler {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            tasks: Vec::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.task.name()).collect()
    }

    pub fn spawn(&mut self, task: Arc<dyn PeriodicTask>, every: Duration) {
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(run_periodic(Arc::clone(&task), every, cancel));
        self.tasks.push(Registered { task, handle });
    }

    /// Wait for every task to stop, then run the shutdown hooks in
    /// registration order. Only returns after cancellation.
    pub async fn join(self) {
        let (tasks, handles): (Vec<_>, Vec<_>) = self
            .tasks
            .into_iter()
            .map(|Registered { task, handle }| (task, handle))
            .unzip();

        for (task, result) in tasks.iter().zip(join_all(handles).await) {
            match result {
                Ok(()) => debug!(task = task.name(), "Task joined"),
                Err(e) => error!(task = task.name(), error = %e, "Task join error"),
            }
        }

        for task in &tasks {
            task.shutdown().await;
            info!(task = task.name(), "Periodic task stopped");
        }
    }

    /// Cancel all tasks and wait for them to finish their current tick
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.join().await;
    }
}

async fn run_periodic(task: Arc<dyn PeriodicTask>, every: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(task = task.name(), every = ?every, "Periodic task started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => task.tick(&cancel).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Counter {
        ticks: AtomicUsize,
        shut_down: AtomicBool,
    }

    #[async_trait]
    impl PeriodicTask for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn tick(&self, _cancel: &CancellationToken) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&self) {
            self.shut_down.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_ticks_until_cancelled() {
        let counter = Arc::new(Counter {
            ticks: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        });
        let mut scheduler = Scheduler::new(CancellationToken::new());
        scheduler.spawn(counter.clone(), Duration::from_millis(10));
        assert_eq!(scheduler.task_names(), vec!["counter"]);

        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.shutdown().await;

        let ticks = counter.ticks.load(Ordering::SeqCst);
        assert!(ticks >= 2, "expected several ticks, got {}", ticks);
        assert!(counter.shut_down.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.ticks.load(Ordering::SeqCst), ticks);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_shutdown_only() {
        let counter = Arc::new(Counter {
            ticks: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut scheduler = Scheduler::new(cancel);
        scheduler.spawn(counter.clone(), Duration::from_millis(10));
        scheduler.join().await;

        assert_eq!(counter.ticks.load(Ordering::SeqCst), 0);
        assert!(counter.shut_down.load(Ordering::SeqCst));
    }

    struct Recorder {
        name: &'static str,
        tick_delay: Duration,
        events: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PeriodicTask for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn tick(&self, _cancel: &CancellationToken) {
            tokio::time::sleep(self.tick_delay).await;
            self.events.lock().unwrap().push(format!("{} tick", self.name));
        }

        async fn shutdown(&self) {
            self.events.lock().unwrap().push(format!("{} shutdown", self.name));
        }
    }

    #[tokio::test]
    async fn test_shutdown_hooks_wait_for_in_flight_ticks() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(CancellationToken::new());
        scheduler.spawn(
            Arc::new(Recorder {
                name: "slow",
                tick_delay: Duration::from_millis(100),
                events: Arc::clone(&events),
            }),
            Duration::from_millis(10),
        );
        scheduler.spawn(
            Arc::new(Recorder {
                name: "fast",
                tick_delay: Duration::ZERO,
                events: Arc::clone(&events),
            }),
            Duration::from_secs(3600),
        );

        // The slow task is mid-tick when cancellation arrives.
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.shutdown().await;

        let events = events.lock().unwrap().clone();
        let slow_tick = events.iter().rposition(|e| e == "slow tick");
        let first_shutdown = events.iter().position(|e| e.ends_with("shutdown"));
        assert!(slow_tick.is_some(), "events: {:?}", events);
        assert!(slow_tick < first_shutdown, "events: {:?}", events);
        assert_eq!(
            &events[events.len() - 2..],
            ["slow shutdown".to_string(), "fast shutdown".to_string()]
        );
    }
}
