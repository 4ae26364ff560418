//! `POST /upload`: force an immediate upload cycle.
//!
//! The request returns as soon as the trigger is accepted; the outcome shows
//! up in `/status` once the cycle finishes.

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::coordinator::{CoordinatorHandle, TriggerResult};

// ---

#[derive(Serialize)]
struct TriggerResponse {
    trigger: TriggerResult,
}

pub fn router() -> Router<CoordinatorHandle> {
    // ---
    Router::new().route("/upload", post(handler))
}

async fn handler(State(handle): State<CoordinatorHandle>) -> impl IntoResponse {
    // ---
    let trigger = handle.trigger_now();

    let status = match trigger {
        TriggerResult::Queued | TriggerResult::Coalesced => {
            info!("POST /upload - manual upload {:?}", trigger);
            StatusCode::ACCEPTED
        }
        TriggerResult::Stopped => {
            warn!("POST /upload - coordinator is not running");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };

    (status, Json(TriggerResponse { trigger }))
}
