use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::types::{Money, ProductId, ReservationId, RoomId};

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error(
        "Insufficient inventory for product {product_id} (slot {slot:?}): requested {requested}, available {available}"
    )]
    InventoryUnavailable {
        product_id: ProductId,
        slot: Option<DateTime<Utc>>,
        requested: u32,
        available: u32,
    },

    #[error(
        "Price snapshot for reservation {reservation_id} is inconsistent: stored {stored}, computed {computed}"
    )]
    PriceInconsistency {
        reservation_id: ReservationId,
        stored: Money,
        computed: Money,
    },

    #[error("No pricing policy configured for room {room_id}")]
    PolicyNotFound { room_id: RoomId },

    #[error("Reservation not found: {id}")]
    ReservationNotFound { id: ReservationId },

    #[error("Reservation {id} has expired")]
    ReservationExpired { id: ReservationId },

    #[error("Storage error during {operation}: {source}")]
    StorageError {
        operation: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, BookingError>;
