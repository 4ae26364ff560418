//! Configuration loader for the `wow-relay` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Parsing goes through a lookup function so the same
//! code serves the process environment and tests.
//!
use std::env;
use std::time::Duration;

use anyhow::{anyhow, Result};
use uuid::Uuid;

use crate::client::DEFAULT_ENDPOINT;
use crate::coordinator::{clamp_interval, CoordinatorSettings};
use crate::models::{Credentials, Parameter, ParameterMapping};

/// Parse an optional numeric variable with a default value.
macro_rules! parse_env {
    ($lookup:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required, non-empty string variable.
macro_rules! require_env {
    ($lookup:expr, $var_name:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

const DEFAULT_INTERVAL_MIN: u64 = 10;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HA_BASE_URL: &str = "http://localhost:8123";
const DEFAULT_HTTP_PORT: u16 = 8080;

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// WOW site id and authentication key.
    pub credentials: Credentials,

    /// Weather parameter to sensor id.
    pub mapping: ParameterMapping,

    /// Upload interval, already clamped to the allowed range.
    pub update_interval: Duration,

    /// Record and expose the last sent data.
    pub debug_mode: bool,

    /// WOW ingestion endpoint.
    pub endpoint: String,

    /// Upload request timeout, always shorter than the interval.
    pub http_timeout: Duration,

    /// Send a credential check at startup.
    pub verify_on_start: bool,

    /// Home Assistant base URL.
    pub ha_base_url: String,

    /// Home Assistant long-lived access token.
    pub ha_token: String,

    /// Port of the status server.
    pub http_port: u16,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `WOW_SITE_ID` – site UUID
/// - `WOW_AUTH_KEY` – site authentication key
/// - `HA_TOKEN` – Home Assistant access token
///
/// Optional:
/// - `WOW_UPDATE_INTERVAL_MIN` – upload interval in minutes, clamped to 10..=60 (default: 10)
/// - `WOW_DEBUG_MODE` – expose last sent data (default: false)
/// - `WOW_ENDPOINT` – ingestion URL (default: WOW `automaticreading`)
/// - `WOW_HTTP_TIMEOUT_SECS` – upload timeout (default: 30)
/// - `WOW_VERIFY_ON_START` – check credentials at startup (default: false)
/// - `WOW_SENSOR_*` – sensor id per weather parameter (default: unmapped)
/// - `HA_BASE_URL` – Home Assistant URL (default: http://localhost:8123)
/// - `HTTP_PORT` – status server port (default: 8080)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    load_from(|name| env::var(name).ok())
}

/// Load configuration through an arbitrary variable lookup.
pub fn load_from<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let site_id = require_env!(lookup, "WOW_SITE_ID");
    Uuid::parse_str(&site_id).map_err(|e| anyhow!("Invalid WOW_SITE_ID '{}': {}", site_id, e))?;

    let auth_key = require_env!(lookup, "WOW_AUTH_KEY");
    let ha_token = require_env!(lookup, "HA_TOKEN");

    let interval_min = parse_env!(lookup, "WOW_UPDATE_INTERVAL_MIN", u64, DEFAULT_INTERVAL_MIN);
    let requested = Duration::from_secs(interval_min.saturating_mul(60));
    let update_interval = clamp_interval(requested);
    if update_interval != requested {
        tracing::warn!(
            "WOW_UPDATE_INTERVAL_MIN={} is outside the allowed range, using {} minutes",
            interval_min,
            update_interval.as_secs() / 60
        );
    }

    let timeout_secs = parse_env!(lookup, "WOW_HTTP_TIMEOUT_SECS", u64, DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(anyhow!("Invalid WOW_HTTP_TIMEOUT_SECS: must be greater than 0"));
    }
    let http_timeout = Duration::from_secs(timeout_secs).min(update_interval / 2);

    let debug_mode = parse_flag(&lookup, "WOW_DEBUG_MODE")?;
    let verify_on_start = parse_flag(&lookup, "WOW_VERIFY_ON_START")?;

    let endpoint = lookup("WOW_ENDPOINT")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
    let ha_base_url = lookup("HA_BASE_URL")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_HA_BASE_URL.to_string());
    let http_port = parse_env!(lookup, "HTTP_PORT", u16, DEFAULT_HTTP_PORT);

    let mapping: ParameterMapping = Parameter::ALL
        .iter()
        .filter_map(|&p| {
            lookup(p.env_var())
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .map(|id| (p, id))
        })
        .collect();

    Ok(Config {
        credentials: Credentials { site_id, auth_key },
        mapping,
        update_interval,
        debug_mode,
        endpoint,
        http_timeout,
        verify_on_start,
        ha_base_url,
        ha_token,
        http_port,
    })
}

/// Boolean flag: `1|true|yes|on` or `0|false|no|off`, unset means false.
fn parse_flag<F>(lookup: &F, name: &str) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    match lookup(name).map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(anyhow!("Invalid {}: '{}' is not a boolean", name, other)),
    }
}

impl Config {
    // ---
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            credentials: self.credentials.clone(),
            mapping: self.mapping.clone(),
            interval: self.update_interval,
            debug_mode: self.debug_mode,
        }
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the WOW authentication key and the Home Assistant token while
    /// showing all other values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  WOW_SITE_ID             : {}", self.credentials.site_id);
        tracing::info!("  WOW_AUTH_KEY            : ******");
        tracing::info!("  WOW_ENDPOINT            : {}", self.endpoint);
        tracing::info!("  WOW_UPDATE_INTERVAL_MIN : {}", self.update_interval.as_secs() / 60);
        tracing::info!("  WOW_HTTP_TIMEOUT_SECS   : {}", self.http_timeout.as_secs());
        tracing::info!("  WOW_DEBUG_MODE          : {}", self.debug_mode);
        tracing::info!("  WOW_VERIFY_ON_START     : {}", self.verify_on_start);
        tracing::info!("  HA_BASE_URL             : {}", self.ha_base_url);
        tracing::info!("  HA_TOKEN                : ******");
        tracing::info!("  HTTP_PORT               : {}", self.http_port);

        if self.mapping.is_empty() {
            tracing::warn!("  No WOW_SENSOR_* variables set, no weather fields will be sent");
        }
        for (parameter, sensor_id) in &self.mapping {
            tracing::info!("  {:<23} : {}", parameter.env_var(), sensor_id);
        }
    }
}
