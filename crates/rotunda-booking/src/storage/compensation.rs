use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::compensation::CompensationTask;
use crate::error::Result;

/// Durable queue of pending compensation tasks
#[async_trait]
pub trait CompensationQueue: Send + Sync {
    async fn enqueue(&self, task: CompensationTask) -> Result<()>;

    /// Removes and returns up to `limit` tasks whose next attempt is due.
    async fn dequeue_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<CompensationTask>>;
}

/// FIFO queue held in memory
pub struct InMemoryCompensationQueue {
    tasks: RwLock<Vec<CompensationTask>>,
}

impl InMemoryCompensationQueue {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

impl Default for InMemoryCompensationQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompensationQueue for InMemoryCompensationQueue {
    async fn enqueue(&self, task: CompensationTask) -> Result<()> {
        self.tasks.write().await.push(task);
        Ok(())
    }

    async fn dequeue_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<CompensationTask>> {
        let mut tasks = self.tasks.write().await;
        let mut due = Vec::new();
        let mut index = 0;
        while index < tasks.len() && due.len() < limit {
            if tasks[index].is_due(now) {
                due.push(tasks.remove(index));
            } else {
                index += 1;
            }
        }
        Ok(due)
    }
}
