use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::inventory::ProductUsage;
use crate::domain::pricing::SlotPriceBreakdown;
use crate::domain::products::ProductPriceBreakdown;
use crate::domain::types::{Money, PlaceId, ReservationId, RoomId};
use crate::error::{BookingError, Result};

/// Reservation lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        matches!(
            (self, next),
            (ReservationStatus::Pending, ReservationStatus::Confirmed)
                | (ReservationStatus::Pending, ReservationStatus::Cancelled)
                | (ReservationStatus::Confirmed, ReservationStatus::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Cancelled)
    }

    pub fn consumes_inventory(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationStatus::Pending => write!(f, "pending"),
            ReservationStatus::Confirmed => write!(f, "confirmed"),
            ReservationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Immutable price snapshot of one booking
///
/// Captures what the customer was quoted at booking time. Later catalogue
/// or policy changes never alter an existing snapshot; only a product
/// update while pending recomputes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationPricing {
    pub reservation_id: ReservationId,
    pub room_id: RoomId,
    pub place_id: PlaceId,
    pub status: ReservationStatus,
    pub slot_breakdown: SlotPriceBreakdown,
    pub product_breakdowns: Vec<ProductPriceBreakdown>,
    pub total_price: Money,
    pub calculated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ReservationPricing {
    pub fn calculate(
        room_id: RoomId,
        place_id: PlaceId,
        slot_breakdown: SlotPriceBreakdown,
        product_breakdowns: Vec<ProductPriceBreakdown>,
        hold_minutes: i64,
    ) -> Result<Self> {
        if hold_minutes <= 0 {
            return Err(BookingError::Validation {
                field: "hold_minutes".to_string(),
                message: format!("hold duration must be positive, got {hold_minutes}"),
            });
        }
        for line in &product_breakdowns {
            line.validate()?;
        }

        let now = Utc::now();
        let total_price = Self::combined_total(&slot_breakdown, &product_breakdowns);
        Ok(Self {
            reservation_id: ReservationId::new(),
            room_id,
            place_id,
            status: ReservationStatus::Pending,
            slot_breakdown,
            product_breakdowns,
            total_price,
            calculated_at: now,
            expires_at: now + Duration::minutes(hold_minutes),
        })
    }

    /// Rebuilds a persisted snapshot, re-checking that the stored total
    /// still equals the sum of its parts.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        reservation_id: ReservationId,
        room_id: RoomId,
        place_id: PlaceId,
        status: ReservationStatus,
        slot_breakdown: SlotPriceBreakdown,
        product_breakdowns: Vec<ProductPriceBreakdown>,
        total_price: Money,
        calculated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self> {
        for line in &product_breakdowns {
            line.validate()?;
        }
        let computed = Self::combined_total(&slot_breakdown, &product_breakdowns);
        if computed != total_price {
            return Err(BookingError::PriceInconsistency {
                reservation_id,
                stored: total_price,
                computed,
            });
        }
        Ok(Self {
            reservation_id,
            room_id,
            place_id,
            status,
            slot_breakdown,
            product_breakdowns,
            total_price,
            calculated_at,
            expires_at,
        })
    }

    pub fn confirm(&mut self) -> Result<()> {
        self.transition_to(ReservationStatus::Confirmed)
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.transition_to(ReservationStatus::Cancelled)
    }

    fn transition_to(&mut self, next: ReservationStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(BookingError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Replaces the product lines and recomputes the total, legal only
    /// while the reservation is pending. The room portion and the hold
    /// deadline stay as quoted.
    pub fn update_products(
        &mut self,
        product_breakdowns: Vec<ProductPriceBreakdown>,
    ) -> Result<()> {
        if self.status != ReservationStatus::Pending {
            return Err(BookingError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: ReservationStatus::Pending.to_string(),
            });
        }
        for line in &product_breakdowns {
            line.validate()?;
        }
        self.product_breakdowns = product_breakdowns;
        self.total_price = Self::combined_total(&self.slot_breakdown, &self.product_breakdowns);
        self.calculated_at = Utc::now();
        Ok(())
    }

    /// A pending reservation past its deadline no longer holds inventory;
    /// there is no timer, expiry is judged against the clock on read.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending && now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Inventory consumed by this snapshot, one entry per product line.
    pub fn product_usages(&self) -> Vec<ProductUsage> {
        self.product_breakdowns
            .iter()
            .map(|line| ProductUsage {
                product_id: line.product_id,
                scope: line.scope,
                quantity: line.quantity,
                slots: if line.scope.is_slot_bound() {
                    self.slot_breakdown.slots()
                } else {
                    Vec::new()
                },
            })
            .collect()
    }

    fn combined_total(
        slot_breakdown: &SlotPriceBreakdown,
        product_breakdowns: &[ProductPriceBreakdown],
    ) -> Money {
        product_breakdowns
            .iter()
            .fold(slot_breakdown.total_price(), |total, line| {
                total.add(line.total_price)
            })
    }
}
