//! Task collection for one scope plus the overdue carryover.
//!
//! Mutations are applied in memory first, then written through the backend.
//! Every write leaves a [`SyncState`] for the affected task so a failed call
//! is visible instead of silently diverging from storage.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};

use crate::backend::Backend;
use crate::category::Category;
use crate::error::TrackerError;
use crate::navigator::compute_overdue;
use crate::stats::{self, CategoryData, ProductivityData};
use crate::task::{NewTask, Task, TaskId, TaskPatch};
use crate::timer::{self, Stopped, TimerEngine, Transition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Synced,
    Pending,
    Failed(String),
}

pub struct TaskStore<B> {
    backend: Arc<B>,
    scope: NaiveDate,
    tasks: Vec<Task>,
    overdue: Vec<Task>,
    timer: TimerEngine,
    sync: BTreeMap<TaskId, SyncState>,
}

impl<B: Backend> TaskStore<B> {
    #[instrument(skip(backend, now))]
    pub fn load(backend: Arc<B>, scope: NaiveDate, now: DateTime<Utc>) -> Result<Self, TrackerError> {
        let mut store = Self {
            backend,
            scope,
            tasks: vec![],
            overdue: vec![],
            timer: TimerEngine::new(),
            sync: BTreeMap::new(),
        };
        store.reload(scope, now)?;
        Ok(store)
    }

    /// Replaces the in-memory view with storage's view of `scope`.
    #[instrument(skip(self, now))]
    pub fn reload(&mut self, scope: NaiveDate, now: DateTime<Utc>) -> Result<(), TrackerError> {
        let tasks = self
            .backend
            .list_tasks(scope)
            .map_err(TrackerError::persistence("list_tasks"))?;
        let earlier = self
            .backend
            .list_incomplete_tasks_before(scope)
            .map_err(TrackerError::persistence("list_incomplete_tasks_before"))?;

        self.scope = scope;
        self.tasks = tasks;
        self.overdue = compute_overdue(earlier, scope);
        self.sync.clear();

        let (engine, stopped) = TimerEngine::adopt(self.tasks.iter_mut().chain(self.overdue.iter_mut()), now);
        self.timer = engine;
        for stop in stopped {
            self.persist_stop(stop);
        }

        info!(
            scope = %scope,
            tasks = self.tasks.len(),
            overdue = self.overdue.len(),
            running = ?self.timer.running(),
            "loaded scope"
        );
        Ok(())
    }

    pub fn scope(&self) -> NaiveDate {
        self.scope
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn overdue(&self) -> &[Task] {
        &self.overdue
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.visible().find(|task| task.id == id)
    }

    pub fn running(&self) -> Option<TaskId> {
        self.timer.running()
    }

    pub fn running_task(&self) -> Option<&Task> {
        self.running().and_then(|id| self.get(id))
    }

    /// Storage's record of `id` when its timer is running there.
    pub fn stored_running(&self, id: TaskId) -> Result<Option<Task>, TrackerError> {
        let running = self
            .backend
            .list_running_tasks()
            .map_err(TrackerError::persistence("list_running_tasks"))?;
        Ok(running.into_iter().find(|task| task.id == id))
    }

    pub fn sync_state(&self, id: TaskId) -> Option<&SyncState> {
        self.sync.get(&id)
    }

    /// Tasks whose last write did not reach storage, with the reason.
    pub fn unsynced(&self) -> Vec<(TaskId, &str)> {
        self.sync
            .iter()
            .filter_map(|(id, state)| match state {
                SyncState::Failed(reason) => Some((*id, reason.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn productivity(&self) -> ProductivityData {
        stats::compute_productivity(&self.tasks)
    }

    pub fn category_time(&self, categories: &[Category]) -> Vec<CategoryData> {
        stats::compute_category_time(&self.tasks, categories)
    }

    /// Creates a task dated `scope`. The backend allocates the id, so a
    /// failed create is returned as an error rather than recorded.
    #[instrument(skip(self))]
    pub fn add(&mut self, text: &str, category: &str, scope: NaiveDate) -> Result<Task, TrackerError> {
        let text = text.trim();
        let category = category.trim();
        if text.is_empty() {
            return Err(TrackerError::Validation("Task text cannot be empty.".to_string()));
        }
        if category.is_empty() {
            return Err(TrackerError::Validation("Task category cannot be empty.".to_string()));
        }

        let task = self
            .backend
            .create_task(&NewTask {
                text: text.to_string(),
                category: category.to_string(),
                date: scope,
            })
            .map_err(TrackerError::persistence("create_task"))?;

        if task.date == self.scope {
            self.tasks.push(task.clone());
        } else if task.is_overdue(self.scope) {
            self.overdue.push(task.clone());
        }
        self.sync.insert(task.id, SyncState::Synced);

        info!(id = task.id, date = %task.date, "task added");
        Ok(task)
    }

    /// Flips completion. `completed_at` becomes the viewed scope date.
    /// Unknown ids are ignored. A running timer keeps running.
    #[instrument(skip(self))]
    pub fn toggle_complete(&mut self, id: TaskId) -> Option<Task> {
        let scope = self.scope;
        let Some(task) = self.visible_mut().find(|task| task.id == id) else {
            debug!(id, "toggle on unknown task ignored");
            return None;
        };

        let completed = !task.completed;
        let completed_at = completed.then_some(scope);
        let patch = TaskPatch::completion(completed, completed_at);
        patch.apply(task);
        let updated = task.clone();

        self.write(id, "update_task", |backend| backend.update_task(id, &patch).map(drop));
        info!(id, completed, "task completion toggled");
        Some(updated)
    }

    /// Removes a task. Returns whether anything was removed.
    #[instrument(skip(self))]
    pub fn delete(&mut self, id: TaskId) -> bool {
        if !self.remove_visible(&BTreeSet::from([id])) {
            debug!(id, "delete on unknown task ignored");
            return false;
        }
        self.write(id, "delete_task", |backend| backend.delete_task(id));
        info!(id, "task deleted");
        true
    }

    /// Batch removal of the visible tasks among `ids`. Returns how many
    /// were removed.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub fn delete_many(&mut self, ids: &[TaskId]) -> usize {
        let known: BTreeSet<TaskId> = ids
            .iter()
            .copied()
            .filter(|id| self.get(*id).is_some())
            .collect();
        if known.is_empty() {
            return 0;
        }

        self.remove_visible(&known);
        let known: Vec<TaskId> = known.into_iter().collect();
        self.write_many(&known, "delete_tasks", |backend| backend.delete_tasks(&known));
        info!(removed = known.len(), "tasks deleted");
        known.len()
    }

    /// Deletes every completed task of the scope.
    pub fn clear_completed(&mut self) -> usize {
        let completed: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|task| task.completed)
            .map(|task| task.id)
            .collect();
        if completed.is_empty() {
            return 0;
        }
        self.delete_many(&completed)
    }

    /// Re-dates the visible tasks among `ids` to `new_scope` and returns
    /// them. Tasks landing on the viewed scope join its list; anything that
    /// no longer qualifies as overdue leaves the overdue view. A running
    /// timer on a task that leaves the view is stopped at `now`.
    #[instrument(skip(self, ids, now), fields(count = ids.len()))]
    pub fn move_to_scope(&mut self, ids: &[TaskId], new_scope: NaiveDate, now: DateTime<Utc>) -> Vec<Task> {
        let scope = self.scope;
        let wanted: BTreeSet<TaskId> = ids.iter().copied().collect();
        let mut moved = Vec::new();
        let mut stops = Vec::new();
        for task in self
            .tasks
            .iter_mut()
            .chain(self.overdue.iter_mut())
            .filter(|task| wanted.contains(&task.id))
        {
            task.date = new_scope;
            let stays_visible = task.date == scope || task.is_overdue(scope);
            if !stays_visible {
                stops.extend(self.timer.release(task, now));
            }
            moved.push(task.clone());
        }
        if moved.is_empty() {
            return moved;
        }

        self.rebucket();
        for stop in stops {
            self.persist_stop(stop);
        }

        let moved_ids: Vec<TaskId> = moved.iter().map(|task| task.id).collect();
        self.write_many(&moved_ids, "move_tasks", |backend| {
            let stored = backend.move_tasks(&moved_ids, new_scope)?;
            debug!(stored = stored.len(), "backend moved tasks");
            Ok(())
        });
        info!(moved = moved.len(), to = %new_scope, "tasks moved");
        moved
    }

    /// Moves the whole overdue view into the viewed scope.
    pub fn move_overdue(&mut self, now: DateTime<Utc>) -> Vec<Task> {
        let ids: Vec<TaskId> = self.overdue.iter().map(|task| task.id).collect();
        self.move_to_scope(&ids, self.scope, now)
    }

    /// Starts or stops the timer of `id`, stopping any other running timer.
    ///
    /// Completed tasks may not be started; a completed task whose timer is
    /// still running can be stopped. Unknown ids yield `Ok(None)`. Stops are
    /// written through so accumulated time is durable.
    ///
    /// Starting also stops timers that storage still holds for tasks outside
    /// the view, so at most one timer runs across every day. When that check
    /// cannot reach storage nothing is started.
    #[instrument(skip(self, now))]
    pub fn toggle_timer(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<Option<Transition>, TrackerError> {
        let Some(target) = self.get(id) else {
            debug!(id, "timer toggle on unknown task ignored");
            return Ok(None);
        };
        if target.completed && !self.timer.is_running(id) {
            return Err(TrackerError::TimerOnCompletedTask(id));
        }

        let hidden = if self.timer.is_running(id) {
            vec![]
        } else {
            self.stop_hidden_timers(now)?
        };

        let mut transition = self
            .timer
            .toggle(self.tasks.iter_mut().chain(self.overdue.iter_mut()), id, now);
        debug_assert!(timer::running_by_scan(self.visible()).len() <= 1);

        if let Some(stop) = transition.stopped {
            self.persist_stop(stop);
        } else {
            transition.stopped = hidden.first().copied();
        }
        if let Some((started, at)) = transition.started {
            let patch = TaskPatch::started(at);
            self.write(started, "update_task", |backend| {
                backend.update_task(started, &patch).map(drop)
            });
            info!(id = started, "timer started");
        }
        Ok(Some(transition))
    }

    /// Stops timers that storage reports running for tasks not in view.
    fn stop_hidden_timers(&mut self, now: DateTime<Utc>) -> Result<Vec<Stopped>, TrackerError> {
        let running = self
            .backend
            .list_running_tasks()
            .map_err(TrackerError::persistence("list_running_tasks"))?;

        let mut stopped = Vec::new();
        for task in running {
            if self.get(task.id).is_some() {
                continue;
            }
            let elapsed = task.elapsed(now);
            let stop = Stopped {
                id: task.id,
                elapsed,
                time_spent: task.time_spent + elapsed,
            };
            warn!(id = task.id, date = %task.date, "timer running outside the view; stopping it");
            self.persist_stop(stop);
            stopped.push(stop);
        }
        Ok(stopped)
    }

    fn persist_stop(&mut self, stop: Stopped) {
        let patch = TaskPatch::stopped(stop.time_spent);
        self.write(stop.id, "update_task", |backend| {
            backend.update_task(stop.id, &patch).map(drop)
        });
        info!(
            id = stop.id,
            elapsed = stop.elapsed,
            time_spent = stop.time_spent,
            "timer stopped"
        );
    }

    fn visible(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().chain(self.overdue.iter())
    }

    fn visible_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.tasks.iter_mut().chain(self.overdue.iter_mut())
    }

    fn remove_visible(&mut self, ids: &BTreeSet<TaskId>) -> bool {
        let before = self.tasks.len() + self.overdue.len();
        self.tasks.retain(|task| !ids.contains(&task.id));
        self.overdue.retain(|task| !ids.contains(&task.id));
        for id in ids {
            self.timer.forget(*id);
        }
        before != self.tasks.len() + self.overdue.len()
    }

    /// Re-sorts visible tasks into the scope list and the overdue view after
    /// dates changed. Tasks fitting neither leave the view.
    fn rebucket(&mut self) {
        let scope = self.scope;
        let mut staying = Vec::with_capacity(self.tasks.len());
        let mut arriving = Vec::new();
        let mut overdue = Vec::with_capacity(self.overdue.len());

        for task in self.tasks.drain(..) {
            if task.date == scope {
                staying.push(task);
            } else if task.is_overdue(scope) {
                overdue.push(task);
            } else {
                self.timer.forget(task.id);
            }
        }
        for task in self.overdue.drain(..) {
            if task.date == scope {
                arriving.push(task);
            } else if task.is_overdue(scope) {
                overdue.push(task);
            } else {
                self.timer.forget(task.id);
            }
        }

        staying.extend(arriving);
        self.tasks = staying;
        self.overdue = overdue;
    }

    fn write<F>(&mut self, id: TaskId, op: &'static str, call: F)
    where
        F: FnOnce(&B) -> anyhow::Result<()>,
    {
        self.write_many(&[id], op, call);
    }

    fn write_many<F>(&mut self, ids: &[TaskId], op: &'static str, call: F)
    where
        F: FnOnce(&B) -> anyhow::Result<()>,
    {
        for id in ids {
            self.sync.insert(*id, SyncState::Pending);
        }

        let outcome = match call(&self.backend) {
            Ok(()) => SyncState::Synced,
            Err(err) => {
                warn!(op, ids = ?ids, error = %format!("{err:#}"), "persistence call failed; memory is ahead of storage");
                SyncState::Failed(format!("{op}: {err:#}"))
            }
        };
        for id in ids {
            self.sync.insert(*id, outcome.clone());
        }
    }
}
