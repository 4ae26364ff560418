//! Data models for the upload pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::units::Quantity;

// ---

/// A weather measurement category accepted by the WOW ingestion endpoint.
///
/// Declaration order is the order in which fields are rendered into a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Temperature,
    Humidity,
    Pressure,
    Rain,
    DailyRain,
    WindSpeed,
    WindDirection,
    WindGust,
    DewPoint,
}

impl Parameter {
    // ---
    pub const ALL: [Parameter; 9] = [
        Self::Temperature,
        Self::Humidity,
        Self::Pressure,
        Self::Rain,
        Self::DailyRain,
        Self::WindSpeed,
        Self::WindDirection,
        Self::WindGust,
        Self::DewPoint,
    ];

    /// Query parameter name used by the WOW API.
    pub fn wow_field(self) -> &'static str {
        match self {
            Self::Temperature => "tempf",
            Self::Humidity => "humidity",
            Self::Pressure => "baromin",
            Self::Rain => "rainin",
            Self::DailyRain => "dailyrainin",
            Self::WindSpeed => "windspeedmph",
            Self::WindDirection => "winddir",
            Self::WindGust => "windgustmph",
            Self::DewPoint => "dewptf",
        }
    }

    pub fn quantity(self) -> Quantity {
        match self {
            Self::Temperature | Self::DewPoint => Quantity::Temperature,
            Self::Humidity => Quantity::Humidity,
            Self::Pressure => Quantity::Pressure,
            Self::Rain | Self::DailyRain => Quantity::Rain,
            Self::WindSpeed | Self::WindGust => Quantity::Speed,
            Self::WindDirection => Quantity::Direction,
        }
    }

    /// Environment variable holding the sensor id mapped to this parameter.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::Temperature => "WOW_SENSOR_TEMPERATURE",
            Self::Humidity => "WOW_SENSOR_HUMIDITY",
            Self::Pressure => "WOW_SENSOR_PRESSURE",
            Self::Rain => "WOW_SENSOR_RAIN",
            Self::DailyRain => "WOW_SENSOR_RAIN_DAILY",
            Self::WindSpeed => "WOW_SENSOR_WIND_SPEED",
            Self::WindDirection => "WOW_SENSOR_WIND_DIR",
            Self::WindGust => "WOW_SENSOR_WIND_GUST",
            Self::DewPoint => "WOW_SENSOR_DEW_POINT",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
            Self::Rain => "rain",
            Self::DailyRain => "daily_rain",
            Self::WindSpeed => "wind_speed",
            Self::WindDirection => "wind_direction",
            Self::WindGust => "wind_gust",
            Self::DewPoint => "dew_point",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameter to sensor id in the host registry. Unmapped parameters are never sent.
pub type ParameterMapping = BTreeMap<Parameter, String>;

/// Site credentials for the WOW API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    // ---
    /// Site identifier (UUID formatted).
    pub site_id: String,

    /// Site authentication key (short numeric PIN).
    pub auth_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("site_id", &self.site_id)
            .field("auth_key", &"******")
            .finish()
    }
}

/// Current value of one mapped sensor, as read from the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    // ---
    pub parameter: Parameter,
    pub sensor_id: String,
    pub value: f64,
    pub unit: Option<String>,
}

/// Sensor values already expressed in the WOW target units.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedSnapshot {
    // ---
    pub values: BTreeMap<Parameter, f64>,
    pub taken_at: DateTime<Utc>,
}

// ---

/// Result of a single upload cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Success,
    RateLimited,
    AuthError { message: String },
    NetworkError { message: String },
    /// Non-success response that is neither throttling nor an auth failure.
    Rejected { status: u16, message: String },
    SensorsUnavailable(BTreeSet<Parameter>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    RateLimited,
    AuthError,
    NetworkError,
    Rejected,
    SensorsUnavailable,
}

impl UploadOutcome {
    // ---
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success => OutcomeKind::Success,
            Self::RateLimited => OutcomeKind::RateLimited,
            Self::AuthError { .. } => OutcomeKind::AuthError,
            Self::NetworkError { .. } => OutcomeKind::NetworkError,
            Self::Rejected { .. } => OutcomeKind::Rejected,
            Self::SensorsUnavailable(_) => OutcomeKind::SensorsUnavailable,
        }
    }

    /// Human readable message stored as `last_error`.
    pub fn describe(&self) -> String {
        match self {
            Self::Success => "Upload accepted".to_string(),
            Self::RateLimited => {
                "Rate limit exceeded (HTTP 429), waiting for the next scheduled upload".to_string()
            }
            Self::AuthError { message } => {
                format!("Authentication failed, check site id and key: {message}")
            }
            Self::NetworkError { message } => format!("Network error: {message}"),
            Self::Rejected { status, message } => format!("HTTP {status}: {message}"),
            Self::SensorsUnavailable(missing) => {
                let names: Vec<&str> = missing.iter().map(|p| p.name()).collect();
                format!("Sensors unavailable: {}", names.join(", "))
            }
        }
    }
}

// ---

/// Display state of the uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Pending,
    Ok,
    Error,
}

/// Status exposed to the host. Written only by the coordinator after each cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadStatus {
    // ---
    pub state: StatusState,
    pub last_outcome: Option<OutcomeKind>,
    pub last_upload: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub next_upload: Option<DateTime<Utc>>,
    pub upload_count: u64,
    pub site_id: String,
    pub debug_mode: bool,

    /// Mapped parameters that blocked the last cycle.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<Parameter>,

    /// Parameters of the last attempted upload, credentials stripped. Debug mode only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sent_data: Option<BTreeMap<String, String>>,
}

impl UploadStatus {
    // ---
    pub fn new(site_id: impl Into<String>, debug_mode: bool) -> Self {
        Self {
            state: StatusState::Pending,
            last_outcome: None,
            last_upload: None,
            last_error: None,
            next_upload: None,
            upload_count: 0,
            site_id: site_id.into(),
            debug_mode,
            unavailable: Vec::new(),
            last_sent_data: None,
        }
    }

    /// Fold the outcome of a finished cycle into the status.
    ///
    /// `at` is the cycle timestamp, `sent` the debug view of the parameters
    /// that went out (if the cycle got as far as uploading).
    pub fn record(
        &mut self,
        outcome: &UploadOutcome,
        at: DateTime<Utc>,
        next_upload: DateTime<Utc>,
        sent: Option<BTreeMap<String, String>>,
    ) {
        // ---
        self.last_outcome = Some(outcome.kind());
        self.next_upload = Some(next_upload);

        if self.debug_mode && sent.is_some() {
            self.last_sent_data = sent;
        }

        match outcome {
            UploadOutcome::Success => {
                self.state = StatusState::Ok;
                self.upload_count += 1;
                self.last_upload = Some(at);
                self.last_error = None;
                self.unavailable.clear();
            }
            UploadOutcome::SensorsUnavailable(missing) => {
                self.state = StatusState::Error;
                self.last_error = Some(outcome.describe());
                self.unavailable = missing.iter().copied().collect();
            }
            UploadOutcome::RateLimited
            | UploadOutcome::AuthError { .. }
            | UploadOutcome::NetworkError { .. }
            | UploadOutcome::Rejected { .. } => {
                self.state = StatusState::Error;
                self.last_error = Some(outcome.describe());
                self.unavailable.clear();
            }
        }
    }
}
