use indexmap::IndexMap;
use serde::Serialize;

use crate::category::Category;
use crate::task::Task;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProductivityData {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryData {
    pub name: String,
    /// Minutes rounded to two decimals.
    pub minutes: f64,
}

pub fn compute_productivity(tasks: &[Task]) -> ProductivityData {
    let total = tasks.len();
    let completed = tasks.iter().filter(|task| task.completed).count();
    let percentage = if total > 0 {
        ((completed as f64 / total as f64) * 100.0).round() as u8
    } else {
        0
    };

    ProductivityData {
        total,
        completed,
        pending: total - completed,
        percentage,
    }
}

/// Minutes tracked per category.
///
/// Every registered category starts at zero so it is never absent from the
/// accumulation; names that are not registered get an entry of their own.
/// Entries that round to zero are left out of the result.
pub fn compute_category_time(tasks: &[Task], categories: &[Category]) -> Vec<CategoryData> {
    let mut minutes: IndexMap<&str, f64> = categories
        .iter()
        .map(|category| (category.name.as_str(), 0.0))
        .collect();

    for task in tasks {
        *minutes.entry(task.category.as_str()).or_insert(0.0) += task.time_spent as f64 / 60.0;
    }

    minutes
        .into_iter()
        .map(|(name, total)| CategoryData {
            name: name.to_string(),
            minutes: round_hundredths(total),
        })
        .filter(|entry| entry.minutes > 0.0)
        .collect()
}

fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
