use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::types::CounterKey;
use crate::error::Result;

/// Reserved units versus capacity of one counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterUsage {
    pub capacity: u32,
    pub reserved: u32,
}

impl CounterUsage {
    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.reserved)
    }
}

/// Inventory counters, the single source of truth against overselling
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increments the reserved count by `quantity` iff the
    /// result stays within `capacity`. The check and the increment are one
    /// indivisible operation; no availability probe beforehand can be
    /// trusted under concurrency. Returns whether the increment applied.
    async fn try_reserve(&self, key: &CounterKey, capacity: u32, quantity: u32) -> Result<bool>;

    /// Decrements the reserved count, clamping at zero so a duplicate
    /// release never drives the counter negative. Returns whether any
    /// units were actually freed.
    async fn release(&self, key: &CounterKey, quantity: u32) -> Result<bool>;

    async fn usage(&self, key: &CounterKey) -> Result<CounterUsage>;
}

/// Counter store over a sharded concurrent map
///
/// Counters are created lazily on first reservation attempt, and the
/// capacity is refreshed on every attempt so catalogue quantity changes
/// take effect without a migration.
pub struct InMemoryCounterStore {
    counters: DashMap<CounterKey, CounterUsage>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn try_reserve(&self, key: &CounterKey, capacity: u32, quantity: u32) -> Result<bool> {
        let mut entry = self.counters.entry(*key).or_default();
        entry.capacity = capacity;
        match entry.reserved.checked_add(quantity) {
            Some(next) if next <= entry.capacity => {
                entry.reserved = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &CounterKey, quantity: u32) -> Result<bool> {
        match self.counters.get_mut(key) {
            Some(mut entry) => {
                let freed = entry.reserved.min(quantity);
                entry.reserved -= freed;
                Ok(freed > 0)
            }
            None => Ok(false),
        }
    }

    async fn usage(&self, key: &CounterKey) -> Result<CounterUsage> {
        Ok(self
            .counters
            .get(key)
            .map(|entry| *entry)
            .unwrap_or_default())
    }
}
