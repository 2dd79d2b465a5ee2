use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{BookingError, Result};

/// Venue identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaceId(Uuid);

impl PlaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PlaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(Uuid);

impl RoomId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Add-on product identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(Uuid);

impl ProductId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reservation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(Uuid);

impl ReservationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReservationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Monetary amount with cent precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn new(amount: Decimal) -> Result<Self> {
        if amount < Decimal::ZERO {
            return Err(BookingError::Validation {
                field: "amount".to_string(),
                message: format!("monetary amount cannot be negative: {amount}"),
            });
        }
        Ok(Self(amount.round_dp(2)))
    }

    pub fn from_f64(amount: f64) -> Option<Self> {
        Decimal::from_f64(amount).and_then(|d| Self::new(d).ok())
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn add(&self, other: Money) -> Self {
        Self((self.0 + other.0).round_dp(2))
    }

    pub fn subtract(&self, other: Money) -> Option<Self> {
        if self.0 >= other.0 {
            Some(Self((self.0 - other.0).round_dp(2)))
        } else {
            None
        }
    }

    pub fn times(&self, quantity: u32) -> Self {
        Self((self.0 * Decimal::from(quantity)).round_dp(2))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Booking granularity for a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSlot {
    Hour,
    HalfHour,
}

impl TimeSlot {
    pub fn duration(&self) -> Duration {
        match self {
            TimeSlot::Hour => Duration::minutes(60),
            TimeSlot::HalfHour => Duration::minutes(30),
        }
    }

    pub fn minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    /// Slices a half-open range into slot start instants.
    ///
    /// Both ends must sit on the slot grid so that counters for the same
    /// room or place always bucket time identically across bookings.
    pub fn slots_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        if start >= end {
            return Err(BookingError::Validation {
                field: "time_range".to_string(),
                message: format!("start {start} must precede end {end}"),
            });
        }
        self.ensure_aligned(start, "start")?;
        self.ensure_aligned(end, "end")?;

        let step = self.duration();
        let mut slots = Vec::new();
        let mut cursor = start;
        while cursor < end {
            slots.push(cursor);
            cursor = cursor + step;
        }
        Ok(slots)
    }

    fn ensure_aligned(&self, instant: DateTime<Utc>, field: &str) -> Result<()> {
        let time = instant.time();
        let slot_seconds = (self.minutes() * 60) as u32;
        if time.nanosecond() != 0 || time.num_seconds_from_midnight() % slot_seconds != 0 {
            return Err(BookingError::Validation {
                field: field.to_string(),
                message: format!("{instant} does not fall on a {}-minute boundary", self.minutes()),
            });
        }
        Ok(())
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSlot::Hour => write!(f, "hour"),
            TimeSlot::HalfHour => write!(f, "half_hour"),
        }
    }
}

/// Half-open time-of-day window within a single day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self> {
        if start >= end {
            return Err(BookingError::Validation {
                field: "time_range".to_string(),
                message: format!("start {start} must precede end {end}"),
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Inventory sharing scope of a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductScope {
    /// Shared by every room of the venue, per slot
    Place { place_id: PlaceId },
    /// Dedicated to one room, per slot
    Room { place_id: PlaceId, room_id: RoomId },
    /// One global pool with no time dimension
    Reservation,
}

impl ProductScope {
    pub fn is_slot_bound(&self) -> bool {
        !matches!(self, ProductScope::Reservation)
    }
}

impl fmt::Display for ProductScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductScope::Place { .. } => write!(f, "place"),
            ProductScope::Room { .. } => write!(f, "room"),
            ProductScope::Reservation => write!(f, "reservation"),
        }
    }
}

/// Partition key of one inventory counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub product_id: ProductId,
    pub scope: ProductScope,
    pub slot: Option<DateTime<Utc>>,
}

impl CounterKey {
    pub fn for_slot(product_id: ProductId, scope: ProductScope, slot: DateTime<Utc>) -> Self {
        Self {
            product_id,
            scope,
            slot: Some(slot),
        }
    }

    pub fn product_wide(product_id: ProductId, scope: ProductScope) -> Self {
        Self {
            product_id,
            scope,
            slot: None,
        }
    }
}
