use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::application::issuer::DEFAULT_CHARGE_WINDOW_MINUTES;
use crate::application::sweeper::DEFAULT_SWEEP_INTERVAL;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
}

/// Service configuration, loaded from the environment (a `.env` file is
/// honored in development).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub pix: ProviderConfig,
    pub card: ProviderConfig,
    pub analytics_url: Option<String>,
    /// Charge validity window in minutes.
    pub charge_window_minutes: i64,
    pub sweep_interval: Duration,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let bind_addr = match env::var("BIND_ADDR") {
            Ok(raw) => raw.parse().map_err(|err: std::net::AddrParseError| {
                ConfigError::Invalid {
                    name: "BIND_ADDR",
                    reason: err.to_string(),
                }
            })?,
            Err(_) => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        Ok(Self {
            bind_addr,
            pix: ProviderConfig {
                base_url: require("PIX_BASE_URL")?,
                api_key: require("PIX_API_KEY")?,
            },
            card: ProviderConfig {
                base_url: require("CARD_BASE_URL")?,
                api_key: require("CARD_API_KEY")?,
            },
            analytics_url: env::var("ANALYTICS_URL").ok(),
            charge_window_minutes: parse_or("CHARGE_WINDOW_MINUTES", DEFAULT_CHARGE_WINDOW_MINUTES)?,
            sweep_interval: Duration::from_secs(parse_or(
                "SWEEP_INTERVAL_SECONDS",
                DEFAULT_SWEEP_INTERVAL.as_secs() as i64,
            )? as u64),
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_or(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|err: std::num::ParseIntError| {
            ConfigError::Invalid {
                name,
                reason: err.to_string(),
            }
        }),
        Err(_) => Ok(default),
    }
}
