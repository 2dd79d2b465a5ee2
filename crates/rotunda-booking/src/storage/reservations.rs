use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::reservations::{ReservationPricing, ReservationStatus};
use crate::domain::types::{PlaceId, ReservationId, RoomId};
use crate::error::Result;

/// Which bookings to collect when computing overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapSelector {
    Room(RoomId),
    Place(PlaceId),
}

/// Persisted price snapshots
#[async_trait]
pub trait ReservationPricingStore: Send + Sync {
    async fn save(&self, snapshot: &ReservationPricing) -> Result<()>;

    async fn find_by_id(&self, id: &ReservationId) -> Result<Option<ReservationPricing>>;

    async fn find_by_status(&self, status: ReservationStatus) -> Result<Vec<ReservationPricing>>;

    /// Pending snapshots whose hold deadline has passed, oldest deadline
    /// first, capped at `limit`.
    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReservationPricing>>;

    /// Active snapshots for the room or place whose booked slots fall
    /// inside the half-open window.
    async fn find_overlapping(
        &self,
        selector: OverlapSelector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ReservationPricing>>;
}

pub struct InMemoryReservationPricingStore {
    reservations: RwLock<HashMap<ReservationId, ReservationPricing>>,
}

impl InMemoryReservationPricingStore {
    pub fn new() -> Self {
        Self {
            reservations: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryReservationPricingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReservationPricingStore for InMemoryReservationPricingStore {
    async fn save(&self, snapshot: &ReservationPricing) -> Result<()> {
        self.reservations
            .write()
            .await
            .insert(snapshot.reservation_id, snapshot.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ReservationId) -> Result<Option<ReservationPricing>> {
        Ok(self.reservations.read().await.get(id).cloned())
    }

    async fn find_by_status(&self, status: ReservationStatus) -> Result<Vec<ReservationPricing>> {
        Ok(self
            .reservations
            .read()
            .await
            .values()
            .filter(|snapshot| snapshot.status == status)
            .cloned()
            .collect())
    }

    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReservationPricing>> {
        let mut expired: Vec<ReservationPricing> = self
            .reservations
            .read()
            .await
            .values()
            .filter(|snapshot| snapshot.is_expired_at(now))
            .cloned()
            .collect();
        expired.sort_by_key(|snapshot| snapshot.expires_at);
        expired.truncate(limit);
        Ok(expired)
    }

    async fn find_overlapping(
        &self,
        selector: OverlapSelector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ReservationPricing>> {
        Ok(self
            .reservations
            .read()
            .await
            .values()
            .filter(|snapshot| {
                let selected = match selector {
                    OverlapSelector::Room(room_id) => snapshot.room_id == room_id,
                    OverlapSelector::Place(place_id) => snapshot.place_id == place_id,
                };
                selected
                    && snapshot.status.consumes_inventory()
                    && snapshot.slot_breakdown.overlaps_range(start, end)
            })
            .cloned()
            .collect())
    }
}
