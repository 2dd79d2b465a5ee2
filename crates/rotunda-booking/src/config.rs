use anyhow::{anyhow, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookingConfig {
    /// How long a pending booking holds its price and inventory, in minutes
    pub default_hold_minutes: i64,
    /// Maximum expired bookings cancelled per sweep
    pub sweep_batch_size: usize,
    /// Release retries before a compensation task escalates
    pub compensation_max_retries: u32,
    /// Base delay of the compensation backoff, in seconds
    pub compensation_backoff_secs: u64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            default_hold_minutes: 30,
            sweep_batch_size: 100,
            compensation_max_retries: 5,
            compensation_backoff_secs: 30,
        }
    }
}

impl BookingConfig {
    pub fn load(path_override: Option<PathBuf>) -> Result<Self> {
        let default_config = BookingConfig::default();
        let mut figment = Figment::from(Serialized::defaults(default_config));

        if let Some(path) = path_override {
            if path.exists() {
                figment = figment.merge(Toml::file(&path));
            }
        } else {
            let default_path = PathBuf::from("booking.toml");
            if default_path.exists() {
                figment = figment.merge(Toml::file(default_path));
            }
        }

        figment = figment.merge(Env::prefixed("BOOKING_"));

        figment
            .extract()
            .map_err(|e| anyhow!("Configuration error: {}", e))
    }

    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }
}
