use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type TaskId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,

    pub text: String,

    pub category: String,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub completed_at: Option<NaiveDate>,

    /// Fully accumulated seconds. Never includes the interval of a running timer.
    #[serde(default)]
    pub time_spent: u64,

    pub date: NaiveDate,

    /// Set while the timer runs; its presence is the running flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: TaskId, text: String, category: String, date: NaiveDate) -> Self {
        Self {
            id,
            text,
            category,
            completed: false,
            completed_at: None,
            time_spent: 0,
            date,
            start_time: None,
        }
    }

    pub fn timer_running(&self) -> bool {
        self.start_time.is_some()
    }

    /// Seconds elapsed on the running timer, zero when idle.
    pub fn elapsed(&self, now: DateTime<Utc>) -> u64 {
        self.start_time
            .map(|start| crate::timer::elapsed_seconds(start, now))
            .unwrap_or(0)
    }

    /// Value shown on a clock: accumulated time plus the running interval.
    pub fn display_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.time_spent + self.elapsed(now)
    }

    pub fn is_overdue(&self, scope: NaiveDate) -> bool {
        !self.completed && self.date < scope
    }
}

/// Fields a backend needs to create a task; the backend allocates the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub text: String,
    pub category: String,
    pub date: NaiveDate,
}

/// Partial update. `None` leaves a field untouched; nested options clear it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub completed: Option<bool>,
    pub completed_at: Option<Option<NaiveDate>>,
    pub time_spent: Option<u64>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    pub fn completion(completed: bool, completed_at: Option<NaiveDate>) -> Self {
        Self {
            completed: Some(completed),
            completed_at: Some(completed_at),
            ..Self::default()
        }
    }

    pub fn stopped(time_spent: u64) -> Self {
        Self {
            time_spent: Some(time_spent),
            start_time: Some(None),
            ..Self::default()
        }
    }

    pub fn started(start: DateTime<Utc>) -> Self {
        Self {
            start_time: Some(Some(start)),
            ..Self::default()
        }
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
        if let Some(time_spent) = self.time_spent {
            task.time_spent = time_spent;
        }
        if let Some(date) = self.date {
            task.date = date;
        }
        if let Some(start_time) = self.start_time {
            task.start_time = start_time;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{Task, TaskPatch};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).expect("valid date")
    }

    #[test]
    fn overdue_requires_earlier_date_and_incomplete() {
        let mut task = Task::new(1, "Write report".into(), "Work".into(), day(9));
        assert!(task.is_overdue(day(10)));
        assert!(!task.is_overdue(day(9)));

        task.completed = true;
        assert!(!task.is_overdue(day(10)));
    }

    #[test]
    fn display_adds_running_interval_without_mutating() {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 10, 9, 0, 0)
            .single()
            .expect("valid start");
        let mut task = Task::new(1, "Read".into(), "Learning".into(), day(10));
        task.time_spent = 60;
        task.start_time = Some(start);

        let now = start + chrono::Duration::seconds(90);
        assert_eq!(task.display_seconds(now), 150);
        assert_eq!(task.time_spent, 60);
    }

    #[test]
    fn patch_clears_nested_options() {
        let mut task = Task::new(1, "Run".into(), "Health".into(), day(10));
        task.completed = true;
        task.completed_at = Some(day(10));

        TaskPatch::completion(false, None).apply(&mut task);
        assert!(!task.completed);
        assert_eq!(task.completed_at, None);
    }

    #[test]
    fn idle_tasks_omit_start_time_when_serialized() {
        let task = Task::new(4, "Call mom".into(), "Personal".into(), day(3));
        let json = serde_json::to_string(&task).expect("serialize");
        assert!(!json.contains("start_time"));
        assert!(json.contains("\"date\":\"2024-01-03\""));
    }
}
