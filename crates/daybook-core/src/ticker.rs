//! One-second display tick for a running timer.
//!
//! The ticker only reads a snapshot of the task and publishes the value to
//! show. It never commits time; that happens when the timer stops. Drop or
//! [`DisplayTicker::cancel`] it whenever the running state changes or the
//! task leaves view.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::task::{Task, TaskId};
use crate::timer::elapsed_seconds;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub id: TaskId,
    pub time_spent: u64,
    pub start_time: Option<DateTime<Utc>>,
}

impl TimerSnapshot {
    pub fn of(task: &Task) -> Self {
        Self {
            id: task.id,
            time_spent: task.time_spent,
            start_time: task.start_time,
        }
    }

    pub fn display_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.time_spent
            + self
                .start_time
                .map(|start| elapsed_seconds(start, now))
                .unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct DisplayTicker {
    snapshot: TimerSnapshot,
    handle: JoinHandle<()>,
    rx: watch::Receiver<u64>,
}

impl DisplayTicker {
    /// Must be called inside a tokio runtime.
    pub fn spawn(task: &Task) -> Self {
        Self::spawn_with_clock(TimerSnapshot::of(task), Utc::now)
    }

    pub fn spawn_with_clock<C>(snapshot: TimerSnapshot, clock: C) -> Self
    where
        C: Fn() -> DateTime<Utc> + Send + 'static,
    {
        let (tx, rx) = watch::channel(snapshot.display_seconds(clock()));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_PERIOD);
            loop {
                interval.tick().await;
                let value = snapshot.display_seconds(clock());
                trace!(id = snapshot.id, value, "tick");
                if tx.send(value).is_err() {
                    break;
                }
            }
        });
        debug!(id = snapshot.id, "display ticker started");

        Self {
            snapshot,
            handle,
            rx,
        }
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.snapshot
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.rx.clone()
    }

    /// Latest published display value.
    pub fn current(&self) -> u64 {
        *self.rx.borrow()
    }

    /// Whether this ticker still reflects `task`; a changed start or total
    /// means it must be replaced.
    pub fn is_stale_for(&self, task: &Task) -> bool {
        self.snapshot != TimerSnapshot::of(task)
    }

    /// Whether `stored`, the latest persisted record of the watched task,
    /// still shows the same running timer.
    pub fn still_current(&self, stored: Option<&Task>) -> bool {
        stored.is_some_and(|task| task.timer_running() && !self.is_stale_for(task))
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for DisplayTicker {
    fn drop(&mut self) {
        self.handle.abort();
        debug!(id = self.snapshot.id, "display ticker cancelled");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI64, Ordering};

    use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};

    use super::{DisplayTicker, TICK_PERIOD, TimerSnapshot};
    use crate::task::Task;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0)
            .single()
            .expect("valid base")
    }

    fn running_task() -> Task {
        let day = NaiveDate::from_ymd_opt(2024, 1, 10).expect("valid day");
        let mut task = Task::new(7, "Deep work".into(), "Work".into(), day);
        task.time_spent = 120;
        task.start_time = Some(base());
        task
    }

    fn fake_clock(offset: Arc<AtomicI64>) -> impl Fn() -> DateTime<Utc> + Send + 'static {
        move || base() + ChronoDuration::seconds(offset.load(Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_accumulated_plus_elapsed_each_tick() {
        let offset = Arc::new(AtomicI64::new(0));
        let task = running_task();
        let ticker = DisplayTicker::spawn_with_clock(TimerSnapshot::of(&task), fake_clock(offset.clone()));
        let mut rx = ticker.subscribe();
        assert_eq!(ticker.current(), 120);

        offset.store(3, Ordering::SeqCst);
        tokio::time::advance(TICK_PERIOD).await;
        rx.changed().await.expect("tick");
        assert_eq!(*rx.borrow_and_update(), 123);
        assert_eq!(task.time_spent, 120);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_ticker_closes_the_channel() {
        let offset = Arc::new(AtomicI64::new(0));
        let ticker =
            DisplayTicker::spawn_with_clock(TimerSnapshot::of(&running_task()), fake_clock(offset));
        let mut rx = ticker.subscribe();

        ticker.cancel();
        tokio::time::advance(TICK_PERIOD * 3).await;

        while rx.changed().await.is_ok() {}
        assert!(rx.has_changed().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_is_current_only_while_storage_agrees() {
        let mut task = running_task();
        let ticker = DisplayTicker::spawn_with_clock(
            TimerSnapshot::of(&task),
            fake_clock(Arc::new(AtomicI64::new(0))),
        );
        assert_eq!(ticker.snapshot().id, 7);
        assert!(ticker.still_current(Some(&task)));
        assert!(!ticker.still_current(None));

        task.start_time = Some(base() + ChronoDuration::seconds(40));
        assert!(!ticker.still_current(Some(&task)));
    }

    #[test]
    fn snapshot_goes_stale_when_timer_state_changes() {
        let mut task = running_task();
        let snapshot = TimerSnapshot::of(&task);
        assert_eq!(snapshot.display_seconds(base() + ChronoDuration::seconds(10)), 130);

        task.start_time = None;
        task.time_spent = 130;
        assert_ne!(TimerSnapshot::of(&task), snapshot);
        assert_eq!(TimerSnapshot::of(&task).display_seconds(base()), 130);
    }
}
