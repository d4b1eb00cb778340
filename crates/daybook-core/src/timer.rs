//! Single-active-timer state machine.
//!
//! The engine keeps an explicit pointer to the running task. Scanning the
//! collection for running flags is kept only as a consistency check.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::task::{Task, TaskId};

/// Whole seconds between `start` and `now`, rounded to nearest.
/// A start in the future (clock skew) counts as zero.
pub fn elapsed_seconds(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (now - start).num_milliseconds().max(0);
    ((millis + 500) / 1000) as u64
}

/// Ids of tasks whose running flag is set.
pub fn running_by_scan<'a, I>(tasks: I) -> Vec<TaskId>
where
    I: IntoIterator<Item = &'a Task>,
{
    tasks
        .into_iter()
        .filter(|task| task.timer_running())
        .map(|task| task.id)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped {
    pub id: TaskId,
    pub elapsed: u64,
    pub time_spent: u64,
}

/// Outcome of one toggle. Both sides are set when starting one task
/// stopped another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transition {
    pub stopped: Option<Stopped>,
    pub started: Option<(TaskId, DateTime<Utc>)>,
}

#[derive(Debug, Clone, Default)]
pub struct TimerEngine {
    running: Option<TaskId>,
}

impl TimerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the engine from freshly loaded tasks.
    ///
    /// When more than one task claims a running timer, the most recently
    /// started one keeps running and the others are stopped at `now`.
    pub fn adopt<'a, I>(tasks: I, now: DateTime<Utc>) -> (Self, Vec<Stopped>)
    where
        I: IntoIterator<Item = &'a mut Task>,
    {
        let mut running: Vec<&'a mut Task> = tasks
            .into_iter()
            .filter(|task| task.timer_running())
            .collect();
        running.sort_by_key(|task| task.start_time);

        let keep = running.pop().map(|task| task.id);
        let mut stopped = Vec::with_capacity(running.len());
        for task in running {
            warn!(id = task.id, "more than one running timer loaded; stopping older one");
            stopped.push(stop(task, now));
        }

        debug!(running = ?keep, "adopted timer state");
        (Self { running: keep }, stopped)
    }

    pub fn running(&self) -> Option<TaskId> {
        self.running
    }

    pub fn is_running(&self, id: TaskId) -> bool {
        self.running == Some(id)
    }

    /// Drops the pointer when the running task leaves the visible set.
    pub fn forget(&mut self, id: TaskId) {
        if self.running == Some(id) {
            debug!(id, "running task left view");
            self.running = None;
        }
    }

    /// Stops `task` if it holds the running timer. Used before a task leaves
    /// the visible set so its interval is accumulated instead of left open.
    pub fn release(&mut self, task: &mut Task, now: DateTime<Utc>) -> Option<Stopped> {
        if !self.is_running(task.id) {
            return None;
        }
        debug!(id = task.id, "running task leaving view; stopping timer");
        self.running = None;
        Some(stop(task, now))
    }

    /// Toggles the timer of `target` across the whole visible collection.
    ///
    /// A running target is stopped and stays stopped. Any other target
    /// stops whichever task is running, then starts. Unknown targets leave
    /// everything untouched.
    pub fn toggle<'a, I>(&mut self, tasks: I, target: TaskId, now: DateTime<Utc>) -> Transition
    where
        I: IntoIterator<Item = &'a mut Task>,
    {
        let mut target_task: Option<&'a mut Task> = None;
        let mut current: Option<&'a mut Task> = None;

        for task in tasks {
            if task.id == target {
                target_task = Some(task);
            } else if self.running == Some(task.id) {
                current = Some(task);
            }
        }

        let Some(target_task) = target_task else {
            return Transition::default();
        };

        if self.running == Some(target) {
            let stopped = stop(target_task, now);
            self.running = None;
            return Transition {
                stopped: Some(stopped),
                started: None,
            };
        }

        let stopped = current.map(|task| stop(task, now));
        target_task.start_time = Some(now);
        self.running = Some(target);

        Transition {
            stopped,
            started: Some((target, now)),
        }
    }
}

fn stop(task: &mut Task, now: DateTime<Utc>) -> Stopped {
    let elapsed = task.elapsed(now);
    task.time_spent += elapsed;
    task.start_time = None;
    Stopped {
        id: task.id,
        elapsed,
        time_spent: task.time_spent,
    }
}
