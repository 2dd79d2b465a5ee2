pub mod bookings;
pub mod compensation;
pub mod inventory;
pub mod pricing;
pub mod products;
pub mod reservations;
pub mod types;

pub use bookings::{BookingManager, BookingRequest};
pub use compensation::{CompensationRun, CompensationTask, CompensationWorker};
pub use inventory::{AvailabilityService, InventoryHold, ProductUsage};
pub use pricing::{PriceOverride, PricingPolicy, SlotPrice, SlotPriceBreakdown};
pub use products::{PricingStrategy, Product, ProductPriceBreakdown};
pub use reservations::{ReservationPricing, ReservationStatus};
pub use types::{
    CounterKey, Money, PlaceId, ProductId, ProductScope, ReservationId, RoomId, TimeRange,
    TimeSlot,
};
