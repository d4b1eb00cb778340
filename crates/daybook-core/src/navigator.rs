use chrono::NaiveDate;
use tracing::debug;

use crate::datetime::{format_long_date, shift_days};
use crate::task::Task;

/// Incomplete tasks dated before `scope`. A read-only view: these tasks
/// only join the scope through an explicit move.
pub fn compute_overdue<I>(tasks: I, scope: NaiveDate) -> Vec<Task>
where
    I: IntoIterator<Item = Task>,
{
    tasks
        .into_iter()
        .filter(|task| task.is_overdue(scope))
        .collect()
}

/// Emitted when the viewed day changes; the holder reloads for `scope`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeChange {
    pub previous: NaiveDate,
    pub scope: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct Navigator {
    today: NaiveDate,
    scope: NaiveDate,
}

impl Navigator {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            scope: today,
        }
    }

    pub fn scope(&self) -> NaiveDate {
        self.scope
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn is_today(&self) -> bool {
        self.scope == self.today
    }

    /// Returns the change to act on, or `None` when already viewing `date`.
    pub fn set_scope(&mut self, date: NaiveDate) -> Option<ScopeChange> {
        if date == self.scope {
            return None;
        }
        let change = ScopeChange {
            previous: self.scope,
            scope: date,
        };
        debug!(from = %change.previous, to = %change.scope, "scope changed");
        self.scope = date;
        Some(change)
    }

    pub fn shift(&mut self, days: i64) -> anyhow::Result<Option<ScopeChange>> {
        let target = shift_days(self.scope, days)?;
        Ok(self.set_scope(target))
    }

    pub fn go_to_today(&mut self) -> Option<ScopeChange> {
        self.set_scope(self.today)
    }

    /// Title and subtitle for the day header.
    pub fn heading(&self) -> (String, String) {
        let long = format_long_date(self.scope);
        if self.is_today() {
            ("Today".to_string(), long)
        } else {
            let weekday = self.scope.format("%A").to_string();
            (weekday, format!("Viewing tasks for {long}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::{Navigator, ScopeChange, compute_overdue};
    use crate::task::Task;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).expect("valid day")
    }

    #[test]
    fn overdue_filters_earlier_incomplete_tasks() {
        let mut done = Task::new(2, "Done".into(), "Work".into(), day(8));
        done.completed = true;
        let tasks = vec![
            Task::new(1, "Old".into(), "Work".into(), day(8)),
            done,
            Task::new(3, "Current".into(), "Work".into(), day(10)),
            Task::new(4, "Future".into(), "Work".into(), day(12)),
        ];

        let ids: Vec<_> = compute_overdue(tasks, day(10)).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn set_scope_reports_only_real_changes() {
        let mut nav = Navigator::new(day(10));
        assert_eq!(nav.set_scope(day(10)), None);
        assert_eq!(
            nav.set_scope(day(9)),
            Some(ScopeChange {
                previous: day(10),
                scope: day(9),
            })
        );
        assert!(!nav.is_today());
        assert_eq!(nav.go_to_today().map(|c| c.scope), Some(day(10)));
        assert!(nav.is_today());
    }

    #[test]
    fn shift_moves_by_days() {
        let mut nav = Navigator::new(day(31));
        let change = nav.shift(1).expect("shift").expect("changed");
        assert_eq!(change.scope, NaiveDate::from_ymd_opt(2024, 2, 1).expect("valid"));
    }

    #[test]
    fn heading_depends_on_today() {
        let mut nav = Navigator::new(day(10));
        assert_eq!(
            nav.heading(),
            ("Today".to_string(), "Wednesday, January 10, 2024".to_string())
        );

        nav.set_scope(day(8));
        assert_eq!(
            nav.heading(),
            (
                "Monday".to_string(),
                "Viewing tasks for Monday, January 8, 2024".to_string()
            )
        );
    }
}
