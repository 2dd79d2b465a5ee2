pub mod config;
pub mod domain;
pub mod error;
pub mod storage;

pub use config::BookingConfig;
pub use error::{BookingError, Result};
