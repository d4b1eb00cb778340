//! File-backed store used when no remote backend is configured.
//!
//! Tasks and categories live in two JSON-lines blobs, rewritten atomically
//! through a temp file on every change. A missing or unreadable blob falls
//! back to an empty task list or the default categories.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::Backend;
use crate::category::{Category, CategoryVisuals, default_categories};
use crate::task::{NewTask, Task, TaskId, TaskPatch};

#[derive(Debug)]
pub struct LocalStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub categories_path: PathBuf,
}

impl LocalStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let categories_path = data_dir.join("categories.data");

        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }

        let store = Self {
            data_dir,
            tasks_path,
            categories_path,
        };

        if !store.categories_path.exists() {
            info!("seeding default categories");
            store.save_categories(&default_categories())?;
        }

        info!(
            data_dir = %store.data_dir.display(),
            tasks = %store.tasks_path.display(),
            categories = %store.categories_path.display(),
            "opened local store"
        );
        Ok(store)
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> Vec<Task> {
        match load_jsonl(&self.tasks_path) {
            Ok(Some(tasks)) => tasks,
            Ok(None) => vec![],
            Err(err) => {
                warn!(error = %format!("{err:#}"), "task blob unreadable; starting from an empty list");
                quarantine(&self.tasks_path);
                vec![]
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn load_categories(&self) -> Vec<Category> {
        match load_jsonl(&self.categories_path) {
            Ok(Some(categories)) if !categories.is_empty() => categories,
            Ok(_) => default_categories(),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "category blob unreadable; using defaults");
                quarantine(&self.categories_path);
                default_categories()
            }
        }
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    #[tracing::instrument(skip(self, categories))]
    pub fn save_categories(&self, categories: &[Category]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.categories_path, categories)
            .context("failed to save categories.data")
    }

    pub fn next_task_id(&self, tasks: &[Task]) -> TaskId {
        tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    fn modify_tasks<T, F>(&self, change: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut Vec<Task>) -> anyhow::Result<T>,
    {
        let mut tasks = self.load_tasks();
        let out = change(&mut tasks)?;
        self.save_tasks(&tasks)?;
        Ok(out)
    }
}

impl Backend for LocalStore {
    fn list_categories(&self) -> anyhow::Result<Vec<Category>> {
        Ok(self.load_categories())
    }

    #[tracing::instrument(skip(self, visuals))]
    fn create_category(
        &self,
        name: &str,
        emoji: &str,
        visuals: &CategoryVisuals,
    ) -> anyhow::Result<Category> {
        let mut categories = self.load_categories();
        let category = Category {
            id: categories.iter().map(|c| c.id).max().unwrap_or(0) + 1,
            name: name.to_string(),
            emoji: emoji.to_string(),
            visuals: visuals.clone(),
        };
        categories.push(category.clone());
        self.save_categories(&categories)?;
        Ok(category)
    }

    fn list_tasks(&self, scope: NaiveDate) -> anyhow::Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .load_tasks()
            .into_iter()
            .filter(|task| task.date == scope)
            .collect();
        tasks.sort_by_key(|task| task.id);
        Ok(tasks)
    }

    fn list_incomplete_tasks_before(&self, scope: NaiveDate) -> anyhow::Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .load_tasks()
            .into_iter()
            .filter(|task| task.is_overdue(scope))
            .collect();
        tasks.sort_by_key(|task| (task.date, task.id));
        Ok(tasks)
    }

    fn list_running_tasks(&self) -> anyhow::Result<Vec<Task>> {
        Ok(self
            .load_tasks()
            .into_iter()
            .filter(|task| task.timer_running())
            .collect())
    }

    #[tracing::instrument(skip(self, new), fields(date = %new.date))]
    fn create_task(&self, new: &NewTask) -> anyhow::Result<Task> {
        self.modify_tasks(|tasks| {
            let id = self.next_task_id(tasks);
            let task = Task::new(id, new.text.clone(), new.category.clone(), new.date);
            tasks.push(task.clone());
            debug!(id, "created task");
            Ok(task)
        })
    }

    #[tracing::instrument(skip(self, patch))]
    fn update_task(&self, id: TaskId, patch: &TaskPatch) -> anyhow::Result<Task> {
        self.modify_tasks(|tasks| {
            let task = tasks
                .iter_mut()
                .find(|task| task.id == id)
                .ok_or_else(|| anyhow!("task not found: {id}"))?;
            patch.apply(task);
            Ok(task.clone())
        })
    }

    fn delete_task(&self, id: TaskId) -> anyhow::Result<()> {
        self.delete_tasks(&[id])
    }

    #[tracing::instrument(skip(self))]
    fn delete_tasks(&self, ids: &[TaskId]) -> anyhow::Result<()> {
        self.modify_tasks(|tasks| {
            let before = tasks.len();
            tasks.retain(|task| !ids.contains(&task.id));
            debug!(removed = before - tasks.len(), "deleted tasks");
            Ok(())
        })
    }

    #[tracing::instrument(skip(self))]
    fn move_tasks(&self, ids: &[TaskId], scope: NaiveDate) -> anyhow::Result<Vec<Task>> {
        self.modify_tasks(|tasks| {
            let mut moved = Vec::new();
            for task in tasks.iter_mut().filter(|task| ids.contains(&task.id)) {
                task.date = scope;
                moved.push(task.clone());
            }
            Ok(moved)
        })
    }
}

/// `Ok(None)` when the blob does not exist.
#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<Vec<T>>> {
    debug!(file = %path.display(), "loading jsonl");
    if !path.exists() {
        return Ok(None);
    }
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(Some(out))
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

/// Moves an unreadable blob aside so the next save does not destroy it.
fn quarantine(path: &Path) {
    let mut aside = path.as_os_str().to_owned();
    aside.push(".corrupt");
    match fs::rename(path, &aside) {
        Ok(()) => warn!(from = %path.display(), to = ?aside, "moved unreadable blob aside"),
        Err(err) => warn!(file = %path.display(), error = %err, "could not move unreadable blob aside"),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::LocalStore;
    use crate::backend::Backend;
    use crate::category::{default_categories, palette_visuals};
    use crate::task::{NewTask, TaskPatch};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).expect("valid day")
    }

    fn new_task(text: &str, d: u32) -> NewTask {
        NewTask {
            text: text.to_string(),
            category: "Work".to_string(),
            date: day(d),
        }
    }

    #[test]
    fn first_open_seeds_default_categories() {
        let temp = tempdir().expect("tempdir");
        let store = LocalStore::open(temp.path()).expect("open store");
        assert_eq!(store.list_categories().expect("list"), default_categories());
        assert!(store.categories_path.exists());
    }

    #[test]
    fn tasks_roundtrip_through_the_blob() {
        let temp = tempdir().expect("tempdir");
        let store = LocalStore::open(temp.path()).expect("open store");

        let first = store.create_task(&new_task("Plan sprint", 10)).expect("create");
        let second = store.create_task(&new_task("Old errand", 8)).expect("create");
        assert_eq!((first.id, second.id), (1, 2));

        store
            .update_task(first.id, &TaskPatch::stopped(125))
            .expect("update");

        let reopened = LocalStore::open(temp.path()).expect("reopen");
        let today = reopened.list_tasks(day(10)).expect("list");
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].time_spent, 125);

        let overdue = reopened.list_incomplete_tasks_before(day(10)).expect("overdue");
        assert_eq!(overdue.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn move_and_batch_delete() {
        let temp = tempdir().expect("tempdir");
        let store = LocalStore::open(temp.path()).expect("open store");
        for d in [7, 8, 9] {
            store.create_task(&new_task("carry", d)).expect("create");
        }

        let moved = store.move_tasks(&[1, 2], day(10)).expect("move");
        assert!(moved.iter().all(|t| t.date == day(10)));
        assert_eq!(store.list_tasks(day(10)).expect("list").len(), 2);

        store.delete_tasks(&[1, 3]).expect("delete");
        let left: Vec<_> = store.load_tasks().into_iter().map(|t| t.id).collect();
        assert_eq!(left, vec![2]);
    }

    #[test]
    fn corrupt_blobs_fall_back_without_failing() {
        let temp = tempdir().expect("tempdir");
        let store = LocalStore::open(temp.path()).expect("open store");
        fs::write(&store.tasks_path, "{not json\n").expect("corrupt tasks");
        fs::write(&store.categories_path, "[]]\n").expect("corrupt categories");

        assert!(store.list_tasks(day(10)).expect("list").is_empty());
        assert_eq!(store.list_categories().expect("list"), default_categories());
        assert!(temp.path().join("tasks.data.corrupt").exists());
    }

    #[test]
    fn created_categories_keep_their_visuals() {
        let temp = tempdir().expect("tempdir");
        let store = LocalStore::open(temp.path()).expect("open store");
        let created = store
            .create_category("Fitness", "💪", &palette_visuals(0))
            .expect("create");
        assert_eq!(created.id, 6);

        let listed = store.list_categories().expect("list");
        assert_eq!(listed.last(), Some(&created));
    }
}
