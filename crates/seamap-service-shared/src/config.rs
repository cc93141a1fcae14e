//! Environment-driven service configuration.
//!
//! # Environment Variables
//!
//! - `VECTOR_DATA_DIR`: Directory scanned for `.gpkg`/`.geojson` containers (default: `data/vector`)
//! - `SERVICE_PORT`: HTTP port (default: 8080)
//! - `RESPONSE_CACHE_CAPACITY`: Cached layer payloads (default: 32)
//! - `RESPONSE_MAX_BYTES`: Payload ceiling in bytes (default: 50 MiB)
//! - `CACHE_MAX_AGE_SECS`: `Cache-Control` max-age (default: 300)
//! - `LOAD_TIMEOUT_MS`: Budget for building one layer payload (default: 5000)
//!
//! Unparseable values fall back to the default with a warning.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use seamap_lib::catalog::{
    CatalogConfig, DEFAULT_CACHE_MAX_AGE_SECS, DEFAULT_DATA_DIR, DEFAULT_RESPONSE_CACHE_CAPACITY,
    DEFAULT_RESPONSE_MAX_BYTES,
};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default budget for loading and serializing one layer.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_millis(5000);

/// Configuration for a vector layer service process.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub port: u16,
    pub catalog: CatalogConfig,
    pub load_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            catalog: CatalogConfig::default(),
            load_timeout: DEFAULT_LOAD_TIMEOUT,
        }
    }
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("VECTOR_DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        Self {
            port: parse_or(&lookup, "SERVICE_PORT", DEFAULT_PORT),
            catalog: CatalogConfig {
                data_dir,
                response_cache_capacity: parse_or(
                    &lookup,
                    "RESPONSE_CACHE_CAPACITY",
                    DEFAULT_RESPONSE_CACHE_CAPACITY,
                ),
                response_max_bytes: parse_or(
                    &lookup,
                    "RESPONSE_MAX_BYTES",
                    DEFAULT_RESPONSE_MAX_BYTES,
                ),
                cache_max_age_secs: parse_or(
                    &lookup,
                    "CACHE_MAX_AGE_SECS",
                    DEFAULT_CACHE_MAX_AGE_SECS,
                ),
            },
            load_timeout: Duration::from_millis(parse_or(
                &lookup,
                "LOAD_TIMEOUT_MS",
                DEFAULT_LOAD_TIMEOUT.as_millis() as u64,
            )),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = key, value = %raw, default = %default, "ignoring invalid value");
            default
        }),
    }
}
