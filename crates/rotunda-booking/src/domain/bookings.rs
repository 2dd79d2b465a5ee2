use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::BookingConfig;
use crate::domain::compensation::CompensationRun;
use crate::domain::inventory::{AvailabilityService, InventoryHold, ProductUsage};
use crate::domain::products::Product;
use crate::domain::reservations::ReservationPricing;
use crate::domain::types::{ProductScope, ReservationId, RoomId};
use crate::error::{BookingError, Result};
use crate::storage::policies::PricingPolicyStore;
use crate::storage::reservations::{OverlapSelector, ReservationPricingStore};

/// One booking order: a room, a window and the requested add-ons
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub room_id: RoomId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub products: Vec<(Product, u32)>,
    pub hold_minutes: Option<i64>,
}

/// Drives the booking lifecycle end to end
///
/// Pricing comes from the room's policy, inventory from the availability
/// service, and the resulting snapshot is what gets persisted. Inventory
/// is claimed before a snapshot is saved and returned whenever the
/// booking dies, whatever the stage.
pub struct BookingManager {
    policies: Arc<dyn PricingPolicyStore>,
    reservations: Arc<dyn ReservationPricingStore>,
    availability: AvailabilityService,
    config: BookingConfig,
}

impl BookingManager {
    pub fn new(
        policies: Arc<dyn PricingPolicyStore>,
        reservations: Arc<dyn ReservationPricingStore>,
        availability: AvailabilityService,
        config: BookingConfig,
    ) -> Self {
        Self {
            policies,
            reservations,
            availability,
            config,
        }
    }

    pub fn availability(&self) -> &AvailabilityService {
        &self.availability
    }

    /// Prices the window, claims inventory for every product line and
    /// persists a pending snapshot.
    pub async fn create_booking(&self, request: BookingRequest) -> Result<ReservationPricing> {
        debug!(
            "Creating booking for room {} from {} to {}",
            request.room_id, request.start, request.end
        );

        let policy = self
            .policies
            .find_by_room(&request.room_id)
            .await?
            .ok_or(BookingError::PolicyNotFound {
                room_id: request.room_id,
            })?;

        let slot_breakdown = policy.calculate_breakdown(request.start, request.end)?;
        let slots = slot_breakdown.slots();

        let mut lines = Vec::with_capacity(request.products.len());
        for (product, quantity) in &request.products {
            lines.push(product.calculate_price(*quantity)?);
        }

        let holds = self.claim_inventory(&request.products, &slots).await?;

        let hold_minutes = request
            .hold_minutes
            .unwrap_or(self.config.default_hold_minutes);
        let reservation = match ReservationPricing::calculate(
            request.room_id,
            policy.place_id,
            slot_breakdown,
            lines,
            hold_minutes,
        ) {
            Ok(reservation) => reservation,
            Err(err) => {
                self.return_holds(&holds).await;
                return Err(err);
            }
        };

        if let Err(err) = self.reservations.save(&reservation).await {
            self.return_holds(&holds).await;
            return Err(err);
        }

        info!(
            "Booking {} created for room {}: {} slot(s), {} product line(s), total {}",
            reservation.reservation_id,
            reservation.room_id,
            reservation.slot_breakdown.slot_count(),
            reservation.product_breakdowns.len(),
            reservation.total_price
        );
        Ok(reservation)
    }

    /// Confirms a pending booking, refusing holds that have lapsed.
    pub async fn confirm_booking(&self, id: &ReservationId) -> Result<ReservationPricing> {
        let mut reservation = self.load(id).await?;
        if reservation.is_expired() {
            return Err(BookingError::ReservationExpired { id: *id });
        }
        reservation.confirm()?;
        self.reservations.save(&reservation).await?;

        info!("Booking {} confirmed", id);
        Ok(reservation)
    }

    /// Cancels a booking and returns everything it held.
    pub async fn cancel_booking(&self, id: &ReservationId) -> Result<ReservationPricing> {
        let mut reservation = self.load(id).await?;
        reservation.cancel()?;
        self.reservations.save(&reservation).await?;
        self.release_usages(*id, &reservation.product_usages()).await;

        info!("Booking {} cancelled", id);
        Ok(reservation)
    }

    /// Swaps the product lines of a pending booking.
    ///
    /// New inventory is claimed before the old lines are touched, so a
    /// refused swap leaves the booking exactly as it was. The old lines'
    /// inventory is only returned once the new snapshot is saved.
    pub async fn update_booking_products(
        &self,
        id: &ReservationId,
        products: Vec<(Product, u32)>,
    ) -> Result<ReservationPricing> {
        let mut reservation = self.load(id).await?;

        let mut lines = Vec::with_capacity(products.len());
        for (product, quantity) in &products {
            lines.push(product.calculate_price(*quantity)?);
        }

        let slots = reservation.slot_breakdown.slots();
        let previous = reservation.product_usages();

        let holds = self.claim_inventory(&products, &slots).await?;

        if let Err(err) = reservation.update_products(lines) {
            self.return_holds(&holds).await;
            return Err(err);
        }
        if let Err(err) = self.reservations.save(&reservation).await {
            self.return_holds(&holds).await;
            return Err(err);
        }

        self.release_usages(*id, &previous).await;

        info!(
            "Booking {} products updated: {} line(s), total {}",
            id,
            reservation.product_breakdowns.len(),
            reservation.total_price
        );
        Ok(reservation)
    }

    /// Cancels pending bookings whose hold deadline passed, one batch at
    /// a time. There is no timer; call this from a periodic job.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let expired = self
            .reservations
            .find_expired_pending(Utc::now(), self.config.sweep_batch_size)
            .await?;

        let mut swept = 0;
        for reservation in expired {
            match self.cancel_booking(&reservation.reservation_id).await {
                Ok(_) => swept += 1,
                Err(err) => warn!(
                    "Expired booking {} could not be cancelled: {}",
                    reservation.reservation_id, err
                ),
            }
        }

        if swept > 0 {
            info!("Expired sweep cancelled {} booking(s)", swept);
        }
        Ok(swept)
    }

    /// Retries failed inventory releases, one batch at a time. Call this
    /// from the same periodic job that sweeps expired holds.
    pub async fn run_compensation(&self) -> Result<CompensationRun> {
        let run = self
            .availability
            .run_compensation(
                self.config.compensation_backoff_secs,
                self.config.compensation_max_retries,
                self.config.sweep_batch_size,
            )
            .await?;
        if run.released > 0 {
            info!("Compensation pass released {} task(s)", run.released);
        }
        Ok(run)
    }

    /// Whether `quantity` more units of the product fit into the window.
    pub async fn check_product_availability(
        &self,
        room_id: &RoomId,
        product: &Product,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        quantity: u32,
    ) -> Result<bool> {
        let slots = self.window_slots(room_id, start, end).await?;
        let overlapping = self.overlapping_usage(product, start, end).await?;
        self.availability
            .is_available(product, &slots, quantity, &overlapping)
            .await
    }

    /// Largest product quantity that still fits into the window.
    pub async fn product_availability(
        &self,
        room_id: &RoomId,
        product: &Product,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32> {
        let slots = self.window_slots(room_id, start, end).await?;
        let overlapping = self.overlapping_usage(product, start, end).await?;
        self.availability
            .available_quantity(product, &slots, &overlapping)
            .await
    }

    async fn window_slots(
        &self,
        room_id: &RoomId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let policy = self
            .policies
            .find_by_room(room_id)
            .await?
            .ok_or(BookingError::PolicyNotFound { room_id: *room_id })?;
        policy.granularity.slots_between(start, end)
    }

    async fn overlapping_usage(
        &self,
        product: &Product,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ProductUsage>> {
        let selector = match product.scope() {
            ProductScope::Place { place_id } => OverlapSelector::Place(place_id),
            ProductScope::Room { room_id, .. } => OverlapSelector::Room(room_id),
            ProductScope::Reservation => return Ok(Vec::new()),
        };
        let overlapping = self
            .reservations
            .find_overlapping(selector, start, end)
            .await?;
        Ok(overlapping
            .iter()
            .flat_map(|snapshot| snapshot.product_usages())
            .collect())
    }

    /// Reserves every product line, unwinding the lines already taken
    /// when a later one is refused.
    async fn claim_inventory(
        &self,
        products: &[(Product, u32)],
        slots: &[DateTime<Utc>],
    ) -> Result<Vec<InventoryHold>> {
        let mut holds: Vec<InventoryHold> = Vec::with_capacity(products.len());
        for (product, quantity) in products {
            match self.availability.reserve(product, slots, *quantity).await {
                Ok(hold) => holds.push(hold),
                Err(err) => {
                    self.return_holds(&holds).await;
                    return Err(err);
                }
            }
        }
        Ok(holds)
    }

    async fn return_holds(&self, holds: &[InventoryHold]) {
        for hold in holds {
            self.availability.release_hold(hold).await;
        }
    }

    async fn release_usages(&self, id: ReservationId, usages: &[ProductUsage]) {
        for usage in usages {
            if let Err(err) = self
                .availability
                .release(usage.product_id, usage.scope, &usage.slots, usage.quantity)
                .await
            {
                warn!(
                    "Inventory for product {} on booking {} could not be released: {}",
                    usage.product_id, id, err
                );
            }
        }
    }

    async fn load(&self, id: &ReservationId) -> Result<ReservationPricing> {
        self.reservations
            .find_by_id(id)
            .await?
            .ok_or(BookingError::ReservationNotFound { id: *id })
    }
}
