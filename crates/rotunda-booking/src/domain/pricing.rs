use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::types::{Money, PlaceId, RoomId, TimeRange, TimeSlot};
use crate::error::{BookingError, Result};

/// Special price for one weekday window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceOverride {
    pub day: Weekday,
    pub window: TimeRange,
    pub price: Money,
}

/// Per-room price schedule
///
/// Every slot costs `default_price` unless an override window for the
/// slot's weekday contains the slot's start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub room_id: RoomId,
    pub place_id: PlaceId,
    pub granularity: TimeSlot,
    pub default_price: Money,
    overrides: Vec<PriceOverride>,
}

impl PricingPolicy {
    pub fn new(
        room_id: RoomId,
        place_id: PlaceId,
        granularity: TimeSlot,
        default_price: Money,
        overrides: Vec<PriceOverride>,
    ) -> Result<Self> {
        Self::validate_overrides(&overrides)?;
        Ok(Self {
            room_id,
            place_id,
            granularity,
            default_price,
            overrides,
        })
    }

    pub fn overrides(&self) -> &[PriceOverride] {
        &self.overrides
    }

    /// Swaps the whole override set, leaving the policy untouched when the
    /// replacement fails validation.
    pub fn replace_overrides(&mut self, overrides: Vec<PriceOverride>) -> Result<()> {
        Self::validate_overrides(&overrides)?;
        self.overrides = overrides;
        Ok(())
    }

    pub fn price_at(&self, day: Weekday, time: NaiveTime) -> Money {
        self.overrides
            .iter()
            .find(|o| o.day == day && o.window.contains(time))
            .map(|o| o.price)
            .unwrap_or(self.default_price)
    }

    /// Prices every slot of the half-open range at this policy's granularity.
    pub fn calculate_breakdown(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SlotPriceBreakdown> {
        let entries = self
            .granularity
            .slots_between(start, end)?
            .into_iter()
            .map(|slot| SlotPrice {
                slot,
                price: self.price_at(slot.weekday(), slot.time()),
            })
            .collect();
        SlotPriceBreakdown::new(entries)
    }

    fn validate_overrides(overrides: &[PriceOverride]) -> Result<()> {
        for (index, current) in overrides.iter().enumerate() {
            for other in overrides.iter().skip(index + 1) {
                if current.day == other.day && current.window.overlaps(&other.window) {
                    return Err(BookingError::Validation {
                        field: "overrides".to_string(),
                        message: format!(
                            "overlapping price overrides on {}: {} and {}",
                            current.day, current.window, other.window
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Priced slot of one booking window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPrice {
    pub slot: DateTime<Utc>,
    pub price: Money,
}

/// Ordered per-slot price lines of a snapshot, never empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPriceBreakdown {
    entries: Vec<SlotPrice>,
}

impl SlotPriceBreakdown {
    pub fn new(entries: Vec<SlotPrice>) -> Result<Self> {
        if entries.is_empty() {
            return Err(BookingError::Validation {
                field: "entries".to_string(),
                message: "slot breakdown cannot be empty".to_string(),
            });
        }
        if entries.windows(2).any(|pair| pair[0].slot >= pair[1].slot) {
            return Err(BookingError::Validation {
                field: "entries".to_string(),
                message: "slot breakdown must be strictly ordered by slot".to_string(),
            });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[SlotPrice] {
        &self.entries
    }

    pub fn slots(&self) -> Vec<DateTime<Utc>> {
        self.entries.iter().map(|e| e.slot).collect()
    }

    pub fn slot_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_price(&self) -> Money {
        self.entries
            .iter()
            .fold(Money::zero(), |total, entry| total.add(entry.price))
    }

    pub fn overlaps_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.slot >= start && entry.slot < end)
    }
}
