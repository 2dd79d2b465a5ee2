use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, warn};

use crate::domain::compensation::{CompensationRun, CompensationTask, CompensationWorker};
use crate::domain::products::Product;
use crate::domain::types::{CounterKey, ProductId, ProductScope};
use crate::error::{BookingError, Result};
use crate::storage::compensation::CompensationQueue;
use crate::storage::counters::CounterStore;

/// Inventory consumed by one product line of an active booking
#[derive(Debug, Clone, PartialEq)]
pub struct ProductUsage {
    pub product_id: ProductId,
    pub scope: ProductScope,
    pub quantity: u32,
    pub slots: Vec<DateTime<Utc>>,
}

/// Receipt for successfully reserved inventory
#[derive(Debug, Clone)]
pub struct InventoryHold {
    pub product_id: ProductId,
    pub quantity: u32,
    pub keys: Vec<CounterKey>,
}

/// Checks and claims add-on inventory
///
/// Availability answers are advisory; only `reserve`, which goes through
/// the counter store's conditional increment, can actually claim units.
#[derive(Clone)]
pub struct AvailabilityService {
    counters: Arc<dyn CounterStore>,
    compensation: Arc<dyn CompensationQueue>,
}

impl AvailabilityService {
    pub fn new(counters: Arc<dyn CounterStore>, compensation: Arc<dyn CompensationQueue>) -> Self {
        Self {
            counters,
            compensation,
        }
    }

    /// Whether `quantity` more units fit in every requested slot.
    ///
    /// Slot-bound scopes judge against the usage of overlapping bookings;
    /// reservation scope judges against the global counter and ignores
    /// both the slots and the overlap list.
    pub async fn is_available(
        &self,
        product: &Product,
        requested_slots: &[DateTime<Utc>],
        quantity: u32,
        overlapping: &[ProductUsage],
    ) -> Result<bool> {
        if quantity == 0 {
            return Err(BookingError::Validation {
                field: "quantity".to_string(),
                message: "requested quantity must be positive".to_string(),
            });
        }
        match product.scope() {
            ProductScope::Reservation => {
                let key = CounterKey::product_wide(product.id, product.scope());
                let usage = self.counters.usage(&key).await?;
                Ok(quantity <= product.total_quantity.saturating_sub(usage.reserved))
            }
            _ => {
                Self::require_slots(requested_slots)?;
                Ok(requested_slots.iter().all(|slot| {
                    Self::committed_at(overlapping, product.id, slot)
                        .saturating_add(quantity)
                        <= product.total_quantity
                }))
            }
        }
    }

    /// Largest quantity that still fits in all requested slots, floored
    /// at zero.
    pub async fn available_quantity(
        &self,
        product: &Product,
        requested_slots: &[DateTime<Utc>],
        overlapping: &[ProductUsage],
    ) -> Result<u32> {
        match product.scope() {
            ProductScope::Reservation => {
                let key = CounterKey::product_wide(product.id, product.scope());
                let usage = self.counters.usage(&key).await?;
                Ok(product.total_quantity.saturating_sub(usage.reserved))
            }
            _ => {
                Self::require_slots(requested_slots)?;
                let peak = requested_slots
                    .iter()
                    .map(|slot| Self::committed_at(overlapping, product.id, slot))
                    .max()
                    .unwrap_or(0);
                Ok(product.total_quantity.saturating_sub(peak))
            }
        }
    }

    /// Claims `quantity` units in every counter the product touches.
    ///
    /// Counters are taken one at a time; when one refuses or fails, every
    /// counter already taken is released again before the error surfaces,
    /// so a failed booking never strands inventory.
    pub async fn reserve(
        &self,
        product: &Product,
        slots: &[DateTime<Utc>],
        quantity: u32,
    ) -> Result<InventoryHold> {
        if quantity == 0 {
            return Err(BookingError::Validation {
                field: "quantity".to_string(),
                message: "requested quantity must be positive".to_string(),
            });
        }
        let keys = Self::keys_for(product.id, product.scope(), slots)?;

        let mut taken: Vec<CounterKey> = Vec::with_capacity(keys.len());
        for key in &keys {
            match self
                .counters
                .try_reserve(key, product.total_quantity, quantity)
                .await
            {
                Ok(true) => taken.push(*key),
                Ok(false) => {
                    let available = self
                        .counters
                        .usage(key)
                        .await
                        .map(|usage| usage.remaining())
                        .unwrap_or(0);
                    self.release_units(product.id, product.scope(), quantity, &taken)
                        .await;
                    return Err(BookingError::InventoryUnavailable {
                        product_id: product.id,
                        slot: key.slot,
                        requested: quantity,
                        available,
                    });
                }
                Err(err) => {
                    self.release_units(product.id, product.scope(), quantity, &taken)
                        .await;
                    return Err(err);
                }
            }
        }

        Ok(InventoryHold {
            product_id: product.id,
            quantity,
            keys,
        })
    }

    /// Returns previously claimed units. Failures are absorbed into
    /// compensation tasks rather than surfaced, and releasing more than
    /// is reserved clamps at zero inside the store.
    pub async fn release(
        &self,
        product_id: ProductId,
        scope: ProductScope,
        slots: &[DateTime<Utc>],
        quantity: u32,
    ) -> Result<()> {
        let keys = Self::keys_for(product_id, scope, slots)?;
        self.release_units(product_id, scope, quantity, &keys).await;
        Ok(())
    }

    /// Retries queued compensation tasks once against the counter store.
    ///
    /// Tasks that fail again but still have retries left go back into the
    /// queue with their backoff advanced; escalated ones are dropped from
    /// the queue and handed to the caller.
    pub async fn run_compensation(
        &self,
        backoff_base_secs: u64,
        max_retries: u32,
        batch: usize,
    ) -> Result<CompensationRun> {
        let now = Utc::now();
        let due = self.compensation.dequeue_due(now, batch).await?;
        if due.is_empty() {
            return Ok(CompensationRun::default());
        }

        let worker = CompensationWorker::new(self.counters.clone(), backoff_base_secs, max_retries);
        let run = worker.run_once(due, now).await;
        for task in &run.pending {
            self.compensation.enqueue(task.clone()).await?;
        }
        Ok(run)
    }

    pub async fn release_hold(&self, hold: &InventoryHold) {
        let Some(first) = hold.keys.first() else {
            return;
        };
        self.release_units(hold.product_id, first.scope, hold.quantity, &hold.keys)
            .await;
    }

    async fn release_units(
        &self,
        product_id: ProductId,
        scope: ProductScope,
        quantity: u32,
        keys: &[CounterKey],
    ) {
        let mut failed: Vec<CounterKey> = Vec::new();
        let mut last_error = String::new();
        for key in keys {
            match self.counters.release(key, quantity).await {
                Ok(_) => {}
                Err(err) => {
                    last_error = err.to_string();
                    failed.push(*key);
                }
            }
        }
        if failed.is_empty() {
            return;
        }

        warn!(
            "{} counter(s) for product {} could not be released: {}",
            failed.len(),
            product_id,
            last_error
        );
        let slots: Vec<DateTime<Utc>> = failed.iter().filter_map(|key| key.slot).collect();
        let task = CompensationTask::new(product_id, scope, slots, quantity, last_error);
        if let Err(err) = self.compensation.enqueue(task).await {
            error!(
                "Failed to enqueue compensation task for product {}: {}",
                product_id, err
            );
        }
    }

    fn keys_for(
        product_id: ProductId,
        scope: ProductScope,
        slots: &[DateTime<Utc>],
    ) -> Result<Vec<CounterKey>> {
        if scope.is_slot_bound() {
            Self::require_slots(slots)?;
            Ok(slots
                .iter()
                .map(|slot| CounterKey::for_slot(product_id, scope, *slot))
                .collect())
        } else {
            Ok(vec![CounterKey::product_wide(product_id, scope)])
        }
    }

    fn require_slots(slots: &[DateTime<Utc>]) -> Result<()> {
        if slots.is_empty() {
            return Err(BookingError::Validation {
                field: "slots".to_string(),
                message: "slot-bound products require at least one slot".to_string(),
            });
        }
        Ok(())
    }

    fn committed_at(
        overlapping: &[ProductUsage],
        product_id: ProductId,
        slot: &DateTime<Utc>,
    ) -> u32 {
        overlapping
            .iter()
            .filter(|usage| usage.product_id == product_id && usage.slots.contains(slot))
            .fold(0u32, |total, usage| total.saturating_add(usage.quantity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::products::PricingStrategy;
    use crate::domain::types::{Money, PlaceId};
    use crate::storage::compensation::InMemoryCompensationQueue;
    use crate::storage::counters::{CounterUsage, InMemoryCounterStore};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn place_product(total_quantity: u32) -> Product {
        Product::new(
            ProductScope::Place {
                place_id: PlaceId::new(),
            },
            "Projector",
            PricingStrategy::SimpleStock {
                unit_price: Money::new(dec!(30)).unwrap(),
            },
            total_quantity,
        )
        .unwrap()
    }

    fn reservation_product(total_quantity: u32) -> Product {
        Product::new(
            ProductScope::Reservation,
            "Welcome kit",
            PricingStrategy::OneTime {
                price: Money::new(dec!(20)).unwrap(),
            },
            total_quantity,
        )
        .unwrap()
    }

    fn slot(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, 0, 0).unwrap()
    }

    fn service() -> (
        Arc<InMemoryCounterStore>,
        Arc<InMemoryCompensationQueue>,
        AvailabilityService,
    ) {
        let counters = Arc::new(InMemoryCounterStore::new());
        let queue = Arc::new(InMemoryCompensationQueue::new());
        let service = AvailabilityService::new(counters.clone(), queue.clone());
        (counters, queue, service)
    }

    #[tokio::test]
    async fn test_is_available_sums_overlapping_usage_per_slot() {
        let (_, _, service) = service();
        let product = place_product(10);
        let slots = vec![slot(10), slot(11)];
        let overlapping = vec![
            ProductUsage {
                product_id: product.id,
                scope: product.scope(),
                quantity: 4,
                slots: vec![slot(10)],
            },
            ProductUsage {
                product_id: product.id,
                scope: product.scope(),
                quantity: 3,
                slots: vec![slot(10), slot(11)],
            },
        ];

        // Slot 10:00 already carries 7 units
        assert!(service
            .is_available(&product, &slots, 3, &overlapping)
            .await
            .unwrap());
        assert!(!service
            .is_available(&product, &slots, 4, &overlapping)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_is_available_ignores_other_products() {
        let (_, _, service) = service();
        let product = place_product(2);
        let other = ProductUsage {
            product_id: ProductId::new(),
            scope: product.scope(),
            quantity: 2,
            slots: vec![slot(10)],
        };

        assert!(service
            .is_available(&product, &[slot(10)], 2, &[other])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_available_quantity_uses_peak_slot_usage() {
        let (_, _, service) = service();
        let product = place_product(10);
        let slots = vec![slot(10), slot(11), slot(12)];
        let overlapping = vec![
            ProductUsage {
                product_id: product.id,
                scope: product.scope(),
                quantity: 6,
                slots: vec![slot(11)],
            },
            ProductUsage {
                product_id: product.id,
                scope: product.scope(),
                quantity: 2,
                slots: vec![slot(10), slot(11)],
            },
        ];

        let available = service
            .available_quantity(&product, &slots, &overlapping)
            .await
            .unwrap();
        assert_eq!(available, 2);
    }

    #[tokio::test]
    async fn test_available_quantity_floors_at_zero() {
        let (_, _, service) = service();
        let product = place_product(3);
        let overlapping = vec![ProductUsage {
            product_id: product.id,
            scope: product.scope(),
            quantity: 5,
            slots: vec![slot(10)],
        }];

        let available = service
            .available_quantity(&product, &[slot(10)], &overlapping)
            .await
            .unwrap();
        assert_eq!(available, 0);
    }

    #[tokio::test]
    async fn test_reservation_scope_judges_against_global_counter() {
        let (_, _, service) = service();
        let product = reservation_product(3);

        service.reserve(&product, &[], 2).await.unwrap();

        assert!(service.is_available(&product, &[], 1, &[]).await.unwrap());
        assert!(!service.is_available(&product, &[], 2, &[]).await.unwrap());
        assert_eq!(
            service.available_quantity(&product, &[], &[]).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_reserve_claims_every_slot_counter() {
        let (counters, _, service) = service();
        let product = place_product(5);
        let slots = vec![slot(10), slot(11)];

        let hold = service.reserve(&product, &slots, 2).await.unwrap();
        assert_eq!(hold.keys.len(), 2);

        for key in &hold.keys {
            assert_eq!(counters.usage(key).await.unwrap().reserved, 2);
        }
    }

    #[tokio::test]
    async fn test_reserve_rolls_back_taken_slots_on_refusal() {
        let (counters, queue, service) = service();
        let product = place_product(1);
        let first = CounterKey::for_slot(product.id, product.scope(), slot(10));
        let second = CounterKey::for_slot(product.id, product.scope(), slot(11));

        // The second slot is already full
        counters.try_reserve(&second, 1, 1).await.unwrap();

        let result = service.reserve(&product, &[slot(10), slot(11)], 1).await;
        match result {
            Err(BookingError::InventoryUnavailable {
                slot: failed_slot,
                requested,
                available,
                ..
            }) => {
                assert_eq!(failed_slot, Some(slot(11)));
                assert_eq!(requested, 1);
                assert_eq!(available, 0);
            }
            other => panic!("expected InventoryUnavailable, got {other:?}"),
        }

        // The first slot went back to free and nothing needed compensating
        assert_eq!(counters.usage(&first).await.unwrap().reserved, 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_reserve_requires_slots_for_slot_bound_scope() {
        let (_, _, service) = service();
        let product = place_product(5);
        assert!(service.reserve(&product, &[], 1).await.is_err());
    }

    #[tokio::test]
    async fn test_release_clamps_and_stays_quiet() {
        let (counters, queue, service) = service();
        let product = place_product(5);
        let slots = vec![slot(10)];

        service.reserve(&product, &slots, 2).await.unwrap();
        service
            .release(product.id, product.scope(), &slots, 2)
            .await
            .unwrap();
        // A duplicate release finds nothing to free and stays silent
        service
            .release(product.id, product.scope(), &slots, 2)
            .await
            .unwrap();

        let key = CounterKey::for_slot(product.id, product.scope(), slot(10));
        assert_eq!(counters.usage(&key).await.unwrap().reserved, 0);
        assert!(queue.is_empty().await);
    }

    struct UnreliableCounterStore {
        inner: InMemoryCounterStore,
    }

    #[async_trait]
    impl CounterStore for UnreliableCounterStore {
        async fn try_reserve(
            &self,
            key: &CounterKey,
            capacity: u32,
            quantity: u32,
        ) -> Result<bool> {
            self.inner.try_reserve(key, capacity, quantity).await
        }

        async fn release(&self, _key: &CounterKey, _quantity: u32) -> Result<bool> {
            Err(BookingError::StorageError {
                operation: "release".to_string(),
                source: "counter partition offline".into(),
            })
        }

        async fn usage(&self, key: &CounterKey) -> Result<CounterUsage> {
            self.inner.usage(key).await
        }
    }

    #[tokio::test]
    async fn test_failed_rollback_enqueues_compensation() {
        let flaky = Arc::new(UnreliableCounterStore {
            inner: InMemoryCounterStore::new(),
        });
        let queue = Arc::new(InMemoryCompensationQueue::new());
        let service = AvailabilityService::new(flaky.clone(), queue.clone());

        let product = place_product(1);
        let second = CounterKey::for_slot(product.id, product.scope(), slot(11));
        flaky.inner.try_reserve(&second, 1, 1).await.unwrap();

        // Slot 11:00 refuses, and rolling back slot 10:00 fails too
        let result = service.reserve(&product, &[slot(10), slot(11)], 1).await;
        assert!(matches!(
            result,
            Err(BookingError::InventoryUnavailable { .. })
        ));

        let tasks = queue.dequeue_due(Utc::now(), 10).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].product_id, product.id);
        assert_eq!(tasks[0].slots, vec![slot(10)]);
        assert_eq!(tasks[0].quantity, 1);
        assert!(!tasks[0].error.is_empty());
    }
}
