//! Process-wide task status tracking.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use shipcheck_core::{TaskState, TaskStatus};

use crate::store::StoreError;

/// Key/value store of named task status records.
#[async_trait]
pub trait TaskStatusStore: Send + Sync {
    /// Current record for `name`; an idle record when none is stored.
    async fn get(&self, name: &str) -> Result<TaskStatus, StoreError>;

    /// Replace the record for `name`.
    async fn set(&self, name: &str, state: TaskState, message: &str) -> Result<(), StoreError>;

    /// Remove the record for `name`.
    async fn clear(&self, name: &str) -> Result<(), StoreError>;
}

/// In-memory status store. Records do not survive a restart, so a cycle
/// interrupted by process exit never leaves the task stuck in `Running`.
#[derive(Default)]
pub struct InMemoryTaskStatusStore {
    records: RwLock<HashMap<String, TaskStatus>>,
}

impl InMemoryTaskStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStatusStore for InMemoryTaskStatusStore {
    async fn get(&self, name: &str) -> Result<TaskStatus, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .get(name)
            .cloned()
            .unwrap_or_else(|| TaskStatus::idle(name)))
    }

    async fn set(&self, name: &str, state: TaskState, message: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.insert(name.to_string(), TaskStatus::new(name, state, message));
        Ok(())
    }

    async fn clear(&self, name: &str) -> Result<(), StoreError> {
        self.records.write().await.remove(name);
        Ok(())
    }
}
