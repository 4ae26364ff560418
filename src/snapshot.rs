//! Sensor snapshot collection and conversion.
//!
//! Gating is all-or-nothing: every mapped parameter must yield a finite
//! numeric value in a recognised unit, otherwise the snapshot is incomplete and
//! no upload happens. Unmapped parameters are simply absent.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::models::{ConvertedSnapshot, Parameter, ParameterMapping, SensorReading};
use crate::registry::SensorRegistry;
use crate::units;

// ---

/// Outcome of reading all mapped sensors.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Complete(Vec<SensorReading>),
    /// Mapped parameters that could not be read.
    Incomplete(BTreeSet<Parameter>),
}

/// Read the current value of every mapped sensor.
pub async fn read_snapshot(mapping: &ParameterMapping, registry: &dyn SensorRegistry) -> Snapshot {
    // ---
    let mut readings = Vec::with_capacity(mapping.len());
    let mut unavailable = BTreeSet::new();

    for (&parameter, sensor_id) in mapping {
        match read_one(parameter, sensor_id, registry).await {
            Some(reading) => readings.push(reading),
            None => {
                unavailable.insert(parameter);
            }
        }
    }

    if unavailable.is_empty() {
        Snapshot::Complete(readings)
    } else {
        Snapshot::Incomplete(unavailable)
    }
}

async fn read_one(
    parameter: Parameter,
    sensor_id: &str,
    registry: &dyn SensorRegistry,
) -> Option<SensorReading> {
    // ---
    let Some(raw) = registry.get_value(sensor_id).await else {
        warn!(
            "Sensor {} ({}) has no value in {} registry",
            sensor_id,
            parameter,
            registry.name()
        );
        return None;
    };

    let value = match raw.state.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            warn!(
                "Sensor {} ({}) reported non-numeric state '{}'",
                sensor_id, parameter, raw.state
            );
            return None;
        }
    };

    if !units::is_supported(parameter.quantity(), raw.unit.as_deref()) {
        warn!(
            "Sensor {} ({}) reports unsupported unit {:?}",
            sensor_id, parameter, raw.unit
        );
        return None;
    }

    debug!(
        "Sensor {} ({}): value={}, unit={:?}",
        sensor_id, parameter, value, raw.unit
    );

    Some(SensorReading {
        parameter,
        sensor_id: sensor_id.to_string(),
        value,
        unit: raw.unit,
    })
}

/// Convert every reading to its WOW target unit.
///
/// Returns the parameters whose unit could not be converted as an error, so the
/// caller can treat them exactly like unavailable sensors.
pub fn convert(
    readings: &[SensorReading],
    taken_at: DateTime<Utc>,
) -> Result<ConvertedSnapshot, BTreeSet<Parameter>> {
    // ---
    let mut values = BTreeMap::new();
    let mut failed = BTreeSet::new();

    for reading in readings {
        match units::convert(
            reading.parameter.quantity(),
            reading.value,
            reading.unit.as_deref(),
        ) {
            Ok(converted) => {
                values.insert(reading.parameter, converted);
            }
            Err(e) => {
                warn!("Cannot convert {} ({}): {}", reading.sensor_id, reading.parameter, e);
                failed.insert(reading.parameter);
            }
        }
    }

    if failed.is_empty() {
        Ok(ConvertedSnapshot { values, taken_at })
    } else {
        Err(failed)
    }
}
