use anyhow::{anyhow, bail};
use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::debug;

use super::Backend;
use crate::category::{Category, CategoryVisuals, default_categories};
use crate::task::{NewTask, Task, TaskId, TaskPatch};

#[derive(Debug, Default)]
struct Tables {
    categories: Vec<Category>,
    tasks: Vec<Task>,
    fail_writes: bool,
    fail_reads: bool,
}

/// Volatile backend seeded with the default categories. Reads and writes can
/// be made to fail to exercise error paths and the store's sync ledger.
#[derive(Debug)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_tasks(vec![])
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tables: Mutex::new(Tables {
                categories: default_categories(),
                tasks,
                fail_writes: false,
                fail_reads: false,
            }),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.tables.lock().fail_writes = fail;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.tables.lock().fail_reads = fail;
    }

    pub fn stored_task(&self, id: TaskId) -> Option<Task> {
        self.tables.lock().tasks.iter().find(|task| task.id == id).cloned()
    }

    pub fn stored_tasks(&self) -> Vec<Task> {
        self.tables.lock().tasks.clone()
    }
}

fn check_readable(tables: &Tables) -> anyhow::Result<()> {
    if tables.fail_reads {
        bail!("backend unavailable");
    }
    Ok(())
}

fn check_writable(tables: &Tables) -> anyhow::Result<()> {
    if tables.fail_writes {
        bail!("backend unavailable");
    }
    Ok(())
}

impl Backend for MemoryBackend {
    fn list_categories(&self) -> anyhow::Result<Vec<Category>> {
        let tables = self.tables.lock();
        check_readable(&tables)?;
        Ok(tables.categories.clone())
    }

    fn create_category(
        &self,
        name: &str,
        emoji: &str,
        visuals: &CategoryVisuals,
    ) -> anyhow::Result<Category> {
        let mut tables = self.tables.lock();
        check_writable(&tables)?;
        let id = tables.categories.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        let category = Category {
            id,
            name: name.to_string(),
            emoji: emoji.to_string(),
            visuals: visuals.clone(),
        };
        tables.categories.push(category.clone());
        Ok(category)
    }

    fn list_tasks(&self, scope: NaiveDate) -> anyhow::Result<Vec<Task>> {
        let tables = self.tables.lock();
        check_readable(&tables)?;
        Ok(tables
            .tasks
            .iter()
            .filter(|task| task.date == scope)
            .cloned()
            .collect())
    }

    fn list_incomplete_tasks_before(&self, scope: NaiveDate) -> anyhow::Result<Vec<Task>> {
        let tables = self.tables.lock();
        check_readable(&tables)?;
        let mut tasks: Vec<Task> = tables
            .tasks
            .iter()
            .filter(|task| task.is_overdue(scope))
            .cloned()
            .collect();
        tasks.sort_by_key(|task| (task.date, task.id));
        Ok(tasks)
    }

    fn list_running_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let tables = self.tables.lock();
        check_readable(&tables)?;
        Ok(tables.tasks.iter().filter(|task| task.timer_running()).cloned().collect())
    }

    fn create_task(&self, new: &NewTask) -> anyhow::Result<Task> {
        let mut tables = self.tables.lock();
        check_writable(&tables)?;
        let id = tables.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        let task = Task::new(id, new.text.clone(), new.category.clone(), new.date);
        tables.tasks.push(task.clone());
        debug!(id, "memory backend created task");
        Ok(task)
    }

    fn update_task(&self, id: TaskId, patch: &TaskPatch) -> anyhow::Result<Task> {
        let mut tables = self.tables.lock();
        check_writable(&tables)?;
        let task = tables
            .tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| anyhow!("task not found: {id}"))?;
        patch.apply(task);
        Ok(task.clone())
    }

    fn delete_task(&self, id: TaskId) -> anyhow::Result<()> {
        self.delete_tasks(&[id])
    }

    fn delete_tasks(&self, ids: &[TaskId]) -> anyhow::Result<()> {
        let mut tables = self.tables.lock();
        check_writable(&tables)?;
        tables.tasks.retain(|task| !ids.contains(&task.id));
        Ok(())
    }

    fn move_tasks(&self, ids: &[TaskId], scope: NaiveDate) -> anyhow::Result<Vec<Task>> {
        let mut tables = self.tables.lock();
        check_writable(&tables)?;
        let mut moved = Vec::new();
        for task in tables.tasks.iter_mut().filter(|task| ids.contains(&task.id)) {
            task.date = scope;
            moved.push(task.clone());
        }
        Ok(moved)
    }
}
