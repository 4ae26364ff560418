//! Read interface into the host sensor registry.
//!
//! The upload pipeline only ever asks the registry for the current value of a
//! sensor id. Two implementations ship with the crate:
//! - [`HaRegistry`] reads entity states from the Home Assistant REST API
//! - [`MemoryRegistry`] holds values set in-process by an embedding host

use async_trait::async_trait;

mod home_assistant;
mod memory;

pub use home_assistant::{HaEntityState, HaRegistry, RegistryError};
pub use memory::MemoryRegistry;

// ---

/// Raw value reported by the registry for one sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryValue {
    // ---
    /// State as reported, possibly non-numeric (e.g. `unavailable`).
    pub state: String,

    /// Unit of measurement tag, if the sensor declares one.
    pub unit: Option<String>,
}

impl RegistryValue {
    pub fn new(state: impl Into<String>, unit: Option<&str>) -> Self {
        Self {
            state: state.into(),
            unit: unit.map(str::to_string),
        }
    }
}

#[async_trait]
pub trait SensorRegistry: Send + Sync {
    /// Current value of `sensor_id`, or `None` when the registry has no value.
    async fn get_value(&self, sensor_id: &str) -> Option<RegistryValue>;

    /// Registry name for logging.
    fn name(&self) -> &str;
}
