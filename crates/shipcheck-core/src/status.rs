//! Task status records for process-wide workflows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task name shared by the update check and the background download.
pub const UPDATE_DOWNLOAD_TASK: &str = "update-download";

/// State of a named task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// No record, or the record was cleared.
    #[default]
    Idle,
    /// A check or download cycle is in flight.
    Running,
    /// The last cycle ended with an error.
    Failed,
    /// The last cycle completed.
    Done,
}

impl TaskState {
    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Done)
    }

    /// Returns true while a cycle holds the task.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// A named status record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    /// Task name (the store key).
    pub name: String,

    /// Current state.
    pub state: TaskState,

    /// Human-readable progress or error message.
    pub message: String,

    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl TaskStatus {
    /// Create a status record stamped with the current time.
    pub fn new(name: impl Into<String>, state: TaskState, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state,
            message: message.into(),
            updated_at: Utc::now(),
        }
    }

    /// An idle record for a task with no stored status.
    pub fn idle(name: impl Into<String>) -> Self {
        Self::new(name, TaskState::Idle, "")
    }
}
