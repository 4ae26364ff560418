//! In-memory sensor registry.
//!
//! Values are set by the embedding host or by tests; a sensor with no value
//! reads as unavailable.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RegistryValue, SensorRegistry};

// ---

/// In-process sensor registry whose values are pushed by the host.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    values: RwLock<HashMap<String, RegistryValue>>,
}

impl MemoryRegistry {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, sensor_id: impl Into<String>, state: impl Into<String>, unit: Option<&str>) {
        self.values
            .write()
            .await
            .insert(sensor_id.into(), RegistryValue::new(state, unit));
    }

    pub async fn remove(&self, sensor_id: &str) {
        self.values.write().await.remove(sensor_id);
    }
}

#[async_trait]
impl SensorRegistry for MemoryRegistry {
    async fn get_value(&self, sensor_id: &str) -> Option<RegistryValue> {
        self.values.read().await.get(sensor_id).cloned()
    }

    fn name(&self) -> &str {
        "memory"
    }
}
