//! Persistence contract for tasks and categories.
//!
//! The application constructs one backend and hands an `Arc` of it to the
//! task store and the category registry.

pub mod local;
pub mod memory;

use chrono::NaiveDate;

use crate::category::{Category, CategoryVisuals};
use crate::task::{NewTask, Task, TaskId, TaskPatch};

pub use local::LocalStore;
pub use memory::MemoryBackend;

pub trait Backend {
    /// Categories in creation order.
    fn list_categories(&self) -> anyhow::Result<Vec<Category>>;

    fn create_category(
        &self,
        name: &str,
        emoji: &str,
        visuals: &CategoryVisuals,
    ) -> anyhow::Result<Category>;

    /// Tasks dated exactly `scope`, in creation order.
    fn list_tasks(&self, scope: NaiveDate) -> anyhow::Result<Vec<Task>>;

    /// Incomplete tasks dated before `scope`, oldest first.
    fn list_incomplete_tasks_before(&self, scope: NaiveDate) -> anyhow::Result<Vec<Task>>;

    /// Tasks on any day whose timer is running.
    fn list_running_tasks(&self) -> anyhow::Result<Vec<Task>>;

    fn create_task(&self, new: &NewTask) -> anyhow::Result<Task>;

    fn update_task(&self, id: TaskId, patch: &TaskPatch) -> anyhow::Result<Task>;

    fn delete_task(&self, id: TaskId) -> anyhow::Result<()>;

    fn delete_tasks(&self, ids: &[TaskId]) -> anyhow::Result<()>;

    /// Re-dates `ids` to `scope` and returns the updated records.
    fn move_tasks(&self, ids: &[TaskId], scope: NaiveDate) -> anyhow::Result<Vec<Task>>;
}
