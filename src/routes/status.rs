//! `GET /status`: read-only snapshot of the upload status.

use axum::{extract::State, routing::get, Json, Router};

use crate::coordinator::CoordinatorHandle;
use crate::models::UploadStatus;

// ---

pub fn router() -> Router<CoordinatorHandle> {
    // ---
    Router::new().route("/status", get(handler))
}

async fn handler(State(handle): State<CoordinatorHandle>) -> Json<UploadStatus> {
    // ---
    Json(handle.get_status())
}
