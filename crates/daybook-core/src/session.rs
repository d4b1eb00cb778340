use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{instrument, warn};

use crate::backend::Backend;
use crate::category::CategoryRegistry;
use crate::error::TrackerError;
use crate::navigator::{Navigator, ScopeChange};
use crate::stats::{CategoryData, ProductivityData};
use crate::store::TaskStore;
use crate::task::Task;

/// Everything loaded for one viewed day, sharing a single backend handle.
pub struct Session<B> {
    navigator: Navigator,
    registry: CategoryRegistry<B>,
    store: TaskStore<B>,
}

impl<B: Backend> Session<B> {
    #[instrument(skip(backend, now))]
    pub fn open(
        backend: Arc<B>,
        today: NaiveDate,
        scope: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Self, TrackerError> {
        let mut navigator = Navigator::new(today);
        navigator.set_scope(scope);
        let registry = CategoryRegistry::load(Arc::clone(&backend))?;
        let store = TaskStore::load(backend, navigator.scope(), now)?;
        Ok(Self {
            navigator,
            registry,
            store,
        })
    }

    /// Switches the viewed day and reloads its tasks and overdue set.
    /// When the reload fails the previous day stays in view.
    pub fn set_scope(
        &mut self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<ScopeChange>, TrackerError> {
        let change = self.navigator.set_scope(date);
        self.follow(change, now)
    }

    /// Moves the view `days` away from the current day.
    pub fn shift_scope(&mut self, days: i64, now: DateTime<Utc>) -> anyhow::Result<Option<ScopeChange>> {
        let change = self.navigator.shift(days)?;
        Ok(self.follow(change, now)?)
    }

    pub fn go_to_today(&mut self, now: DateTime<Utc>) -> Result<Option<ScopeChange>, TrackerError> {
        let change = self.navigator.go_to_today();
        self.follow(change, now)
    }

    fn follow(
        &mut self,
        change: Option<ScopeChange>,
        now: DateTime<Utc>,
    ) -> Result<Option<ScopeChange>, TrackerError> {
        let Some(change) = change else {
            return Ok(None);
        };
        if let Err(err) = self.store.reload(change.scope, now) {
            warn!(scope = %change.scope, "reload failed; keeping {}", change.previous);
            self.navigator.set_scope(change.previous);
            return Err(err);
        }
        Ok(Some(change))
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn registry(&self) -> &CategoryRegistry<B> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CategoryRegistry<B> {
        &mut self.registry
    }

    pub fn store(&self) -> &TaskStore<B> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TaskStore<B> {
        &mut self.store
    }

    pub fn scope(&self) -> NaiveDate {
        self.navigator.scope()
    }

    /// Adds a task to the viewed day, defaulting to the first category.
    pub fn add_task(&mut self, text: &str, category: Option<&str>) -> Result<Task, TrackerError> {
        let category = match category {
            Some(name) => name.to_string(),
            None => self
                .registry
                .default_category()
                .map(|c| c.name.clone())
                .unwrap_or_default(),
        };
        let scope = self.scope();
        self.store.add(text, &category, scope)
    }

    pub fn productivity(&self) -> ProductivityData {
        self.store.productivity()
    }

    pub fn category_time(&self) -> Vec<CategoryData> {
        self.store.category_time(self.registry.list_categories())
    }
}
