//! Home Assistant REST API as the sensor registry.
//!
//! Each lookup is a single `GET /api/states/{entity_id}` with a bearer token.
//! Failures are never propagated to the upload pipeline: a sensor that cannot
//! be read is reported as having no value and the cycle gates on it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use super::{RegistryValue, SensorRegistry};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("authentication with Home Assistant failed")]
    AuthenticationFailed,

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
}

/// Entity state as returned by `/api/states/{entity_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaEntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl HaEntityState {
    pub fn unit_of_measurement(&self) -> Option<&str> {
        self.attributes
            .get("unit_of_measurement")
            .and_then(|u| u.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HaRegistry {
    base_url: String,
    token: String,
    client: Client,
}

impl HaRegistry {
    // ---
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, RegistryError> {
        // ---
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    /// Fetch the full state of one entity.
    pub async fn get_state(&self, entity_id: &str) -> Result<HaEntityState, RegistryError> {
        // ---
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        debug!("Getting state for entity {} from {}", entity_id, url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let state = response.json::<HaEntityState>().await?;
                debug!("Entity {} = '{}'", entity_id, state.state);
                Ok(state)
            }
            StatusCode::NOT_FOUND => Err(RegistryError::EntityNotFound(entity_id.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(RegistryError::AuthenticationFailed)
            }
            status => Err(RegistryError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl SensorRegistry for HaRegistry {
    async fn get_value(&self, sensor_id: &str) -> Option<RegistryValue> {
        // ---
        match self.get_state(sensor_id).await {
            Ok(state) => {
                let unit = state.unit_of_measurement().map(str::to_string);
                Some(RegistryValue {
                    state: state.state,
                    unit,
                })
            }
            Err(RegistryError::EntityNotFound(id)) => {
                warn!("Home Assistant has no entity {}", id);
                None
            }
            Err(e @ RegistryError::AuthenticationFailed) => {
                error!("Failed to read {}: {}", sensor_id, e);
                None
            }
            Err(e) => {
                warn!("Failed to read {}: {}", sensor_id, e);
                None
            }
        }
    }

    fn name(&self) -> &str {
        "home-assistant"
    }
}
