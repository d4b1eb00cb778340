use crate::task::TaskId;

/// Failures surfaced by the task store, category registry and AI collaborator.
///
/// Validation and duplicate errors are raised before any state changes.
/// Persistence errors only escape from operations that cannot proceed
/// without the backend's answer (loading, creating records); the other
/// mutations record the failure in the store's sync ledger instead.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {0} is completed; its timer cannot be started")]
    TimerOnCompletedTask(TaskId),

    #[error("persistence call `{op}` failed: {source:#}")]
    Persistence {
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("AI service request failed: {0:#}")]
    AiService(#[source] anyhow::Error),
}

impl TrackerError {
    pub fn persistence(op: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Persistence { op, source }
    }

    /// Errors that should be shown next to the input that caused them.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Duplicate(_) | Self::TimerOnCompletedTask(_)
        )
    }
}
