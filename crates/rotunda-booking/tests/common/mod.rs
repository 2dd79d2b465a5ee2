#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use rotunda_booking::config::BookingConfig;
use rotunda_booking::domain::inventory::AvailabilityService;
use rotunda_booking::domain::pricing::{PriceOverride, PricingPolicy};
use rotunda_booking::domain::products::{PricingStrategy, Product};
use rotunda_booking::domain::types::{CounterKey, Money, PlaceId, ProductScope, RoomId, TimeSlot};
use rotunda_booking::domain::BookingManager;
use rotunda_booking::storage::{
    CounterStore, InMemoryCompensationQueue, InMemoryCounterStore, InMemoryPricingPolicyStore,
    InMemoryReservationPricingStore, PricingPolicyStore,
};

pub struct TestContext {
    pub counters: Arc<InMemoryCounterStore>,
    pub queue: Arc<InMemoryCompensationQueue>,
    pub policies: Arc<InMemoryPricingPolicyStore>,
    pub reservations: Arc<InMemoryReservationPricingStore>,
    pub availability: AvailabilityService,
    pub manager: BookingManager,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(BookingConfig::default())
    }

    pub fn with_config(config: BookingConfig) -> Self {
        let counters = Arc::new(InMemoryCounterStore::new());
        let queue = Arc::new(InMemoryCompensationQueue::new());
        let policies = Arc::new(InMemoryPricingPolicyStore::new());
        let reservations = Arc::new(InMemoryReservationPricingStore::new());
        let availability = AvailabilityService::new(counters.clone(), queue.clone());
        let manager = BookingManager::new(
            policies.clone(),
            reservations.clone(),
            availability.clone(),
            config,
        );
        TestContext {
            counters,
            queue,
            policies,
            reservations,
            availability,
            manager,
        }
    }

    /// Seeds an hourly room at the given default price and returns its id.
    pub async fn seed_hourly_room(&self, place_id: PlaceId, default_price: Decimal) -> RoomId {
        self.seed_hourly_room_with_overrides(place_id, default_price, Vec::new())
            .await
    }

    pub async fn seed_hourly_room_with_overrides(
        &self,
        place_id: PlaceId,
        default_price: Decimal,
        overrides: Vec<PriceOverride>,
    ) -> RoomId {
        let room_id = RoomId::new();
        let policy = PricingPolicy::new(
            room_id,
            place_id,
            TimeSlot::Hour,
            money(default_price),
            overrides,
        )
        .expect("valid policy");
        self.policies.save(&policy).await.expect("policy saved");
        room_id
    }

    pub async fn reserved_at(&self, key: &CounterKey) -> u32 {
        self.counters.usage(key).await.expect("counter usage").reserved
    }
}

pub fn money(amount: Decimal) -> Money {
    Money::new(amount).expect("valid amount")
}

pub fn place_product(place_id: PlaceId, unit_price: Decimal, total_quantity: u32) -> Product {
    Product::new(
        ProductScope::Place { place_id },
        "Projector",
        PricingStrategy::SimpleStock {
            unit_price: money(unit_price),
        },
        total_quantity,
    )
    .expect("valid product")
}

pub fn room_product(
    place_id: PlaceId,
    room_id: RoomId,
    unit_price: Decimal,
    total_quantity: u32,
) -> Product {
    Product::new(
        ProductScope::Room { place_id, room_id },
        "Video wall",
        PricingStrategy::SimpleStock {
            unit_price: money(unit_price),
        },
        total_quantity,
    )
    .expect("valid product")
}

pub fn reservation_product(flat_price: Decimal, total_quantity: u32) -> Product {
    Product::new(
        ProductScope::Reservation,
        "Welcome kit",
        PricingStrategy::OneTime {
            price: money(flat_price),
        },
        total_quantity,
    )
    .expect("valid product")
}

/// An instant on 2025-06-`day` at `hour`:00 UTC. June 2nd is a Monday.
pub fn june_hour(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap()
}
