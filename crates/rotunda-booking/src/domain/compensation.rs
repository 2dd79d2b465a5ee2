use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::types::{CounterKey, ProductId, ProductScope};
use crate::storage::counters::CounterStore;

/// Durable record of an inventory release that failed
///
/// Created whenever a counter decrement cannot be applied, so reserved
/// units are never silently leaked. A worker retries the release with
/// exponential backoff until it succeeds or the task escalates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationTask {
    pub id: Uuid,
    pub product_id: ProductId,
    pub scope: ProductScope,
    pub slots: Vec<DateTime<Utc>>,
    pub quantity: u32,
    pub error: String,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
}

impl CompensationTask {
    pub fn new(
        product_id: ProductId,
        scope: ProductScope,
        slots: Vec<DateTime<Utc>>,
        quantity: u32,
        error: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            product_id,
            scope,
            slots,
            quantity,
            error: error.into(),
            retry_count: 0,
            created_at: now,
            next_attempt_at: now,
        }
    }

    /// Counter keys this task still has to decrement.
    pub fn counter_keys(&self) -> Vec<CounterKey> {
        if self.scope.is_slot_bound() {
            self.slots
                .iter()
                .map(|slot| CounterKey::for_slot(self.product_id, self.scope, *slot))
                .collect()
        } else {
            vec![CounterKey::product_wide(self.product_id, self.scope)]
        }
    }

    pub fn record_attempt(&mut self, backoff_base_secs: u64) {
        self.retry_count += 1;
        let delay = Self::backoff_delay(backoff_base_secs, self.retry_count);
        self.next_attempt_at = Utc::now() + Duration::seconds(delay as i64);
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_attempt_at
    }

    pub fn is_escalated(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }

    // Doubles per attempt, capped at an hour
    fn backoff_delay(base_secs: u64, retry_count: u32) -> u64 {
        let exponent = retry_count.saturating_sub(1).min(16);
        base_secs.saturating_mul(1u64 << exponent).min(3600)
    }
}

/// Outcome of one compensation pass
#[derive(Debug, Default)]
pub struct CompensationRun {
    pub released: u32,
    pub retried: u32,
    pub pending: Vec<CompensationTask>,
    pub escalated: Vec<CompensationTask>,
}

/// Retries failed releases against the counter store
pub struct CompensationWorker {
    counters: Arc<dyn CounterStore>,
    backoff_base_secs: u64,
    max_retries: u32,
}

impl CompensationWorker {
    pub fn new(counters: Arc<dyn CounterStore>, backoff_base_secs: u64, max_retries: u32) -> Self {
        Self {
            counters,
            backoff_base_secs,
            max_retries,
        }
    }

    /// Attempts every due task once. Keys that release successfully are
    /// dropped from the task so a later retry never decrements them twice.
    pub async fn run_once(&self, tasks: Vec<CompensationTask>, now: DateTime<Utc>) -> CompensationRun {
        let mut run = CompensationRun::default();
        for mut task in tasks {
            if !task.is_due(now) {
                run.pending.push(task);
                continue;
            }

            let mut failed: Vec<CounterKey> = Vec::new();
            let mut last_error = String::new();
            for key in task.counter_keys() {
                if let Err(err) = self.counters.release(&key, task.quantity).await {
                    last_error = err.to_string();
                    failed.push(key);
                }
            }

            if failed.is_empty() {
                info!(
                    "Compensation task {} released {} unit(s) of product {}",
                    task.id, task.quantity, task.product_id
                );
                run.released += 1;
                continue;
            }

            task.slots = failed.iter().filter_map(|key| key.slot).collect();
            task.error = last_error;
            task.record_attempt(self.backoff_base_secs);

            if task.is_escalated(self.max_retries) {
                error!(
                    "Compensation task {} for product {} escalated after {} attempts: {}",
                    task.id, task.product_id, task.retry_count, task.error
                );
                run.escalated.push(task);
            } else {
                warn!(
                    "Compensation task {} for product {} failed attempt {}: {}",
                    task.id, task.product_id, task.retry_count, task.error
                );
                run.retried += 1;
                run.pending.push(task);
            }
        }
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::PlaceId;
    use crate::error::{BookingError, Result};
    use crate::storage::counters::{CounterUsage, InMemoryCounterStore};
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct OfflineCounterStore;

    #[async_trait]
    impl CounterStore for OfflineCounterStore {
        async fn try_reserve(
            &self,
            _key: &CounterKey,
            _capacity: u32,
            _quantity: u32,
        ) -> Result<bool> {
            Err(storage_offline())
        }

        async fn release(&self, _key: &CounterKey, _quantity: u32) -> Result<bool> {
            Err(storage_offline())
        }

        async fn usage(&self, _key: &CounterKey) -> Result<CounterUsage> {
            Err(storage_offline())
        }
    }

    fn storage_offline() -> BookingError {
        BookingError::StorageError {
            operation: "release".to_string(),
            source: "counter partition offline".into(),
        }
    }

    fn place_task(slots: Vec<DateTime<Utc>>) -> CompensationTask {
        CompensationTask::new(
            ProductId::new(),
            ProductScope::Place {
                place_id: PlaceId::new(),
            },
            slots,
            2,
            "first failure",
        )
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(CompensationTask::backoff_delay(30, 1), 30);
        assert_eq!(CompensationTask::backoff_delay(30, 2), 60);
        assert_eq!(CompensationTask::backoff_delay(30, 5), 480);
        assert_eq!(CompensationTask::backoff_delay(30, 12), 3600);
        assert_eq!(CompensationTask::backoff_delay(30, 40), 3600);
    }

    #[test]
    fn test_new_task_is_immediately_due() {
        let task = place_task(vec![Utc::now()]);
        assert_eq!(task.retry_count, 0);
        assert!(task.is_due(Utc::now()));
        assert!(!task.is_escalated(5));
    }

    #[test]
    fn test_escalation_threshold() {
        let mut task = place_task(vec![Utc::now()]);
        for _ in 0..5 {
            task.record_attempt(30);
        }
        assert!(task.is_escalated(5));
        assert!(!task.is_escalated(6));
    }

    #[test]
    fn test_counter_keys_per_scope() {
        let first = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 6, 2, 11, 0, 0).unwrap();

        let slot_bound = place_task(vec![first, second]);
        let keys = slot_bound.counter_keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].slot, Some(first));

        let product_wide = CompensationTask::new(
            ProductId::new(),
            ProductScope::Reservation,
            Vec::new(),
            1,
            "boom",
        );
        let keys = product_wide.counter_keys();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].slot, None);
    }

    #[tokio::test]
    async fn test_worker_releases_due_tasks() {
        let counters = Arc::new(InMemoryCounterStore::new());
        let slot = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
        let task = place_task(vec![slot]);
        let key = task.counter_keys()[0];
        counters.try_reserve(&key, 10, 2).await.unwrap();

        let worker = CompensationWorker::new(counters.clone(), 30, 5);
        let run = worker.run_once(vec![task], Utc::now()).await;

        assert_eq!(run.released, 1);
        assert!(run.pending.is_empty());
        assert!(run.escalated.is_empty());
        assert_eq!(counters.usage(&key).await.unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_worker_skips_tasks_that_are_not_due() {
        let counters = Arc::new(InMemoryCounterStore::new());
        let mut task = place_task(vec![Utc::now()]);
        task.next_attempt_at = Utc::now() + Duration::minutes(10);

        let worker = CompensationWorker::new(counters, 30, 5);
        let run = worker.run_once(vec![task], Utc::now()).await;

        assert_eq!(run.released, 0);
        assert_eq!(run.pending.len(), 1);
        assert_eq!(run.pending[0].retry_count, 0);
    }

    #[tokio::test]
    async fn test_worker_escalates_after_max_retries() {
        let worker = CompensationWorker::new(Arc::new(OfflineCounterStore), 30, 2);
        let task = place_task(vec![Utc::now()]);

        let first = worker.run_once(vec![task], Utc::now()).await;
        assert_eq!(first.pending.len(), 1);
        assert_eq!(first.pending[0].retry_count, 1);

        // Force the retry due despite backoff
        let mut retry = first.pending.into_iter().next().unwrap();
        retry.next_attempt_at = Utc::now();
        let second = worker.run_once(vec![retry], Utc::now()).await;

        assert!(second.pending.is_empty());
        assert_eq!(second.escalated.len(), 1);
        assert_eq!(second.escalated[0].retry_count, 2);
    }
}
