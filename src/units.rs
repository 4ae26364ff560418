//! Unit conversion into the imperial units expected by the WOW ingestion API.
//!
//! Every helper here is a pure numeric function. [`convert`] dispatches on the
//! [`Quantity`] a parameter measures and on the unit tag reported by the sensor
//! registry. Unit tags are matched case-insensitively after trimming, so `°C`,
//! `c` and `Celsius` are all accepted for temperature.

use std::fmt;

use thiserror::Error;

// ---

/// Physical quantity class of a weather parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Temperature,
    Humidity,
    Pressure,
    Rain,
    Speed,
    Direction,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
            Self::Rain => "rain",
            Self::Speed => "speed",
            Self::Direction => "direction",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("unsupported {quantity} unit '{unit}'")]
    UnsupportedUnit { quantity: Quantity, unit: String },
}

// ---

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    (celsius * 9.0 / 5.0) + 32.0
}

/// Hectopascal and millibar are the same magnitude.
pub fn hpa_to_inhg(hpa: f64) -> f64 {
    hpa * 0.02953
}

pub fn pa_to_inhg(pa: f64) -> f64 {
    hpa_to_inhg(pa / 100.0)
}

pub fn mmhg_to_inhg(mmhg: f64) -> f64 {
    mmhg * 0.03937
}

pub fn mm_to_inches(mm: f64) -> f64 {
    mm * 0.03937
}

pub fn cm_to_inches(cm: f64) -> f64 {
    mm_to_inches(cm * 10.0)
}

pub fn ms_to_mph(ms: f64) -> f64 {
    ms * 2.23694
}

pub fn kmh_to_mph(kmh: f64) -> f64 {
    kmh * 0.621371
}

pub fn knots_to_mph(knots: f64) -> f64 {
    knots * 1.15078
}

/// Wrap a compass bearing into `[0, 360)`; 360 becomes 0 (north).
///
/// Rounded to hundredths first so a bearing like 359.996 cannot render as 360.
pub fn wrap_degrees(degrees: f64) -> f64 {
    let wrapped = ((degrees * 100.0).round() / 100.0).rem_euclid(360.0);
    if wrapped == 0.0 {
        0.0
    } else {
        wrapped
    }
}

// ---

/// Convert `value`, reported in `unit`, to the WOW target unit for `quantity`.
///
/// Targets: °F for temperature, inHg for pressure, inches for rain, mph for
/// speed, degrees in `[0, 360)` for direction and percent for humidity.
/// A missing unit is only accepted for humidity and direction, which are
/// dimensionless in most registries.
///
/// Returns [`UnitError::UnsupportedUnit`] for any tag outside the recognised
/// set of the quantity.
pub fn convert(quantity: Quantity, value: f64, unit: Option<&str>) -> Result<f64, UnitError> {
    // ---
    let tag = unit.map(|u| u.trim().to_lowercase()).unwrap_or_default();

    let converted = match (quantity, tag.as_str()) {
        (Quantity::Temperature, "°c" | "c" | "celsius") => Some(celsius_to_fahrenheit(value)),
        (Quantity::Temperature, "°f" | "f" | "fahrenheit") => Some(value),

        (Quantity::Humidity, "%" | "") => Some(value),

        (Quantity::Pressure, "hpa" | "mbar" | "mb") => Some(hpa_to_inhg(value)),
        (Quantity::Pressure, "pa") => Some(pa_to_inhg(value)),
        (Quantity::Pressure, "mmhg") => Some(mmhg_to_inhg(value)),
        (Quantity::Pressure, "inhg" | "in") => Some(value),

        (Quantity::Rain, "mm" | "millimeter" | "millimeters") => Some(mm_to_inches(value)),
        (Quantity::Rain, "cm") => Some(cm_to_inches(value)),
        (Quantity::Rain, "in" | "inch" | "inches") => Some(value),

        (Quantity::Speed, "m/s" | "ms") => Some(ms_to_mph(value)),
        (Quantity::Speed, "km/h" | "kmh" | "kph") => Some(kmh_to_mph(value)),
        (Quantity::Speed, "kn" | "kt" | "knots") => Some(knots_to_mph(value)),
        (Quantity::Speed, "mph") => Some(value),

        (Quantity::Direction, "°" | "deg" | "degrees" | "") => Some(wrap_degrees(value)),

        _ => None,
    };

    converted.ok_or_else(|| UnitError::UnsupportedUnit {
        quantity,
        unit: unit.unwrap_or_default().to_string(),
    })
}

/// Whether `unit` is a recognised source unit for `quantity`.
pub fn is_supported(quantity: Quantity, unit: Option<&str>) -> bool {
    convert(quantity, 0.0, unit).is_ok()
}
