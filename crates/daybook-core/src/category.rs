use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::backend::Backend;
use crate::error::TrackerError;

pub const PLACEHOLDER_EMOJI: &str = "✨";

/// Fill used in charts for names that are not registered.
pub const UNREGISTERED_FILL: &str = "#9ca3af";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryVisuals {
    pub base: String,
    pub text: String,
    pub border: String,
    pub fill: String,
}

impl CategoryVisuals {
    fn from_slots([base, text, border, fill]: [&str; 4]) -> Self {
        Self {
            base: base.to_string(),
            text: text.to_string(),
            border: border.to_string(),
            fill: fill.to_string(),
        }
    }

    /// Neutral look for tasks whose category is not registered.
    pub fn fallback() -> Self {
        Self::from_slots(["bg-gray-100", "text-gray-800", "border-gray-200", UNREGISTERED_FILL])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(default = "placeholder_emoji")]
    pub emoji: String,
    pub visuals: CategoryVisuals,
}

fn placeholder_emoji() -> String {
    PLACEHOLDER_EMOJI.to_string()
}

const DEFAULT_CATEGORIES: [(&str, &str, [&str; 4]); 5] = [
    ("Work", "💼", ["bg-sky-100", "text-sky-800", "border-sky-200", "#0ea5e9"]),
    ("Personal", "🏡", ["bg-emerald-100", "text-emerald-800", "border-emerald-200", "#10b981"]),
    ("Learning", "📚", ["bg-purple-100", "text-purple-800", "border-purple-200", "#8b5cf6"]),
    ("Health", "❤️‍🩹", ["bg-rose-100", "text-rose-800", "border-rose-200", "#f43f5e"]),
    ("Social", "🎉", ["bg-amber-100", "text-amber-800", "border-amber-200", "#f59e0b"]),
];

const CUSTOM_PALETTE: [[&str; 4]; 4] = [
    ["bg-teal-100", "text-teal-800", "border-teal-200", "#14b8a6"],
    ["bg-pink-100", "text-pink-800", "border-pink-200", "#ec4899"],
    ["bg-indigo-100", "text-indigo-800", "border-indigo-200", "#6366f1"],
    ["bg-gray-100", "text-gray-800", "border-gray-200", "#6b7280"],
];

pub const PALETTE_SIZE: usize = CUSTOM_PALETTE.len();

/// Seed set written on first run, ids `1..=5`.
pub fn default_categories() -> Vec<Category> {
    DEFAULT_CATEGORIES
        .iter()
        .zip(1u64..)
        .map(|((name, emoji, slots), id)| Category {
            id,
            name: name.to_string(),
            emoji: emoji.to_string(),
            visuals: CategoryVisuals::from_slots(*slots),
        })
        .collect()
}

pub fn is_default_name(name: &str) -> bool {
    DEFAULT_CATEGORIES.iter().any(|(default, _, _)| *default == name)
}

pub fn palette_visuals(slot: usize) -> CategoryVisuals {
    CategoryVisuals::from_slots(CUSTOM_PALETTE[slot % PALETTE_SIZE])
}

/// Slot for the next custom category: the count of custom categories
/// already present, cycled over the palette.
pub fn next_palette_slot(categories: &[Category]) -> usize {
    categories
        .iter()
        .filter(|category| !is_default_name(&category.name))
        .count()
        % PALETTE_SIZE
}

/// Ordered category set backed by the persistence handle.
pub struct CategoryRegistry<B> {
    backend: Arc<B>,
    categories: Vec<Category>,
}

impl<B: Backend> CategoryRegistry<B> {
    #[instrument(skip(backend))]
    pub fn load(backend: Arc<B>) -> Result<Self, TrackerError> {
        let categories = backend
            .list_categories()
            .map_err(TrackerError::persistence("list_categories"))?;
        debug!(count = categories.len(), "loaded categories");
        Ok(Self {
            backend,
            categories,
        })
    }

    /// Validates, assigns the next palette slot and persists a new category.
    /// Nothing changes when validation or the backend call fails.
    #[instrument(skip(self))]
    pub fn add_category(&mut self, name: &str, emoji: &str) -> Result<Category, TrackerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TrackerError::Validation(
                "Category name cannot be empty.".to_string(),
            ));
        }

        if self.lookup(name).is_some() {
            return Err(TrackerError::Duplicate(
                "This category name already exists.".to_string(),
            ));
        }

        let emoji = match emoji.trim() {
            "" => PLACEHOLDER_EMOJI,
            given => given,
        };
        let slot = next_palette_slot(&self.categories);
        let visuals = palette_visuals(slot);

        let created = self
            .backend
            .create_category(name, emoji, &visuals)
            .map_err(TrackerError::persistence("create_category"))?;

        info!(id = created.id, name = %created.name, slot, "added category");
        self.categories.push(created.clone());
        Ok(created)
    }

    pub fn list_categories(&self) -> &[Category] {
        &self.categories
    }

    /// Case-insensitive lookup of a registered name.
    pub fn lookup(&self, name: &str) -> Option<&Category> {
        let lowered = name.trim().to_lowercase();
        self.categories
            .iter()
            .find(|category| category.name.to_lowercase() == lowered)
    }

    /// Category preselected for new tasks.
    pub fn default_category(&self) -> Option<&Category> {
        self.categories.first()
    }

    pub fn custom_count(&self) -> usize {
        self.categories
            .iter()
            .filter(|category| !is_default_name(&category.name))
            .count()
    }
}
